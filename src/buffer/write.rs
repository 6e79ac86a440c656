// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use crate::segment::{grow_size, Segment};
use crate::{End, Error, Result};
use super::Buffer;

/// Which region of the chain a reservation points into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Reserved {
	/// Slack on the tail segment.
	Tail,
	/// An empty segment directly behind the laden ones.
	Spare,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct Reservation {
	pub kind: Reserved,
	pub size: usize,
	pub version: u64,
}

impl Buffer {
	/// Appends a copy of `data`. The bytes land in the tail segment's slack
	/// when they fit whole; otherwise a fresh segment is allocated, sized
	/// `max(n, 2 * last_capacity)` rounded up to a power of two.
	pub fn add(&mut self, data: &[u8]) -> Result {
		self.check_unfrozen(End::Back)?;
		if data.is_empty() {
			return Ok(());
		}
		self.add_raw(data);
		self.after_mutation(data.len(), 0);
		Ok(())
	}

	/// Append without freeze checks or callback dispatch; shared by the
	/// public ops that already did both.
	pub(crate) fn add_raw(&mut self, data: &[u8]) {
		if self.chain.try_extend_tail(data) {
			return;
		}
		let last_cap = self
			.chain
			.back_mut()
			.filter(|seg| seg.is_writable())
			.map_or(0, |seg| seg.capacity());
		let mut seg = self.chain.take_spare(data.len()).unwrap_or_else(|| {
			Segment::heap(grow_size(data.len(), last_cap, self.opts.min_segment))
		});
		seg.extend(data);
		self.chain.push_back(seg);
	}

	/// Moves every byte of `src` onto the back of this buffer by relinking
	/// its segments; nothing is copied. `src` is left empty. Callbacks fire
	/// on both buffers.
	pub fn add_buffer(&mut self, src: &mut Buffer) -> Result {
		self.check_unfrozen(End::Back)?;
		src.check_unfrozen(End::Front)?;
		let moved = src.len();
		if moved == 0 {
			return Ok(());
		}
		self.chain.append_from(&mut src.chain);
		src.after_mutation(0, moved);
		self.after_mutation(moved, 0);
		Ok(())
	}

	/// Appends caller-owned bytes without copying them. The buffer holds the
	/// view object (`Vec`, `&'static [u8]`, `Arc<[u8]>`, ...) and runs
	/// `cleanup` exactly once when the last byte is drained or the buffer is
	/// dropped. Reference segments are read-only and never coalesce, so
	/// interleaving [`add`](Self::add) with `add_reference` fragments the
	/// chain until a [`pullup`](Self::pullup).
	pub fn add_reference<D, F>(&mut self, data: D, cleanup: F) -> Result
	where
		D: AsRef<[u8]> + Send + 'static,
		F: FnOnce() + Send + 'static,
	{
		self.check_unfrozen(End::Back)?;
		let seg = Segment::external(data, cleanup);
		let n = seg.len();
		if n == 0 {
			// Dropping the segment runs the cleanup.
			return Ok(());
		}
		self.chain.push_back(seg);
		self.after_mutation(n, 0);
		Ok(())
	}

	/// Appends `len` bytes starting at `offset` in `file`. No bytes are read
	/// now; the buffer owns the descriptor and streams the range out through
	/// the kernel on [`write_to`](Self::write_to), closing it on release.
	pub fn add_file(&mut self, file: File, offset: u64, len: u64) -> Result {
		self.check_unfrozen(End::Back)?;
		if len == 0 {
			return Ok(());
		}
		let seg = Segment::file(file, offset, len);
		self.chain.push_back(seg);
		self.after_mutation(len as usize, 0);
		Ok(())
	}

	/// Appends formatted text, returning the number of bytes added.
	pub fn add_fmt(&mut self, args: std::fmt::Arguments<'_>) -> Result<usize> {
		use std::fmt::Write;

		struct Sink<'b> {
			buf: &'b mut Buffer,
			written: usize,
			error: Option<Error>,
		}

		impl Write for Sink<'_> {
			fn write_str(&mut self, s: &str) -> std::fmt::Result {
				match self.buf.add(s.as_bytes()) {
					Ok(()) => {
						self.written += s.len();
						Ok(())
					}
					Err(err) => {
						self.error = Some(err);
						Err(std::fmt::Error)
					}
				}
			}
		}

		let mut sink = Sink { buf: self, written: 0, error: None };
		match sink.write_fmt(args) {
			Ok(()) => Ok(sink.written),
			Err(_) => Err(sink.error.unwrap_or_else(|| {
				std::io::Error::other("formatter error").into()
			})),
		}
	}

	/// Inserts a copy of `data` in front of the existing bytes, writing into
	/// the head segment's front slack when possible. New head segments are
	/// filled back-aligned so repeated prepends keep landing in slack.
	pub fn prepend(&mut self, data: &[u8]) -> Result {
		self.check_unfrozen(End::Front)?;
		if data.is_empty() {
			return Ok(());
		}
		if !self.chain.try_prepend_head(data) {
			let cap = grow_size(data.len(), 0, self.opts.min_segment);
			let mut seg = self
				.chain
				.take_spare(data.len())
				.unwrap_or_else(|| Segment::heap(cap));
			seg.fill_back(data);
			self.chain.push_front(seg);
		}
		self.after_mutation(data.len(), 0);
		Ok(())
	}

	/// Splices every byte of `src` in front of this buffer's bytes without
	/// copying. `src` is left empty.
	pub fn prepend_buffer(&mut self, src: &mut Buffer) -> Result {
		self.check_unfrozen(End::Front)?;
		src.check_unfrozen(End::Front)?;
		let moved = src.len();
		if moved == 0 {
			return Ok(());
		}
		self.chain.prepend_from(&mut src.chain);
		src.after_mutation(0, moved);
		self.after_mutation(moved, 0);
		Ok(())
	}

	/// Makes sure at least `n` bytes can be appended without allocating,
	/// spread over at most two segments. The logical length is unchanged.
	pub fn expand(&mut self, n: usize) -> Result {
		self.check_unfrozen(End::Back)?;
		self.ensure_write_space(n);
		self.after_mutation(0, 0);
		Ok(())
	}

	pub(crate) fn ensure_write_space(&mut self, n: usize) {
		let slack = self.chain.tail_slack();
		if slack >= n {
			return;
		}
		let need = n - slack;
		if self.chain.first_spare_cap() >= need {
			return;
		}
		let last_cap = self
			.chain
			.back_mut()
			.filter(|seg| seg.is_writable())
			.map_or(0, |seg| seg.capacity());
		let seg = Segment::heap(grow_size(need, last_cap, self.opts.min_segment));
		self.chain.insert_spare_front(seg);
	}

	/// Hands out a contiguous writable region of at least `n` bytes of tail
	/// slack without changing the logical length. Call
	/// [`commit`](Self::commit) to publish up to `n` of the bytes written
	/// into it. Reserving again before committing returns the same region (or
	/// a larger one); any other mutation discards the reservation.
	pub fn reserve(&mut self, n: usize) -> Result<&mut [u8]> {
		self.check_unfrozen(End::Back)?;
		let kind = if self.chain.tail_slack() >= n {
			Reserved::Tail
		} else {
			if self.chain.first_spare_cap() < n {
				let cap = grow_size(n, 0, self.opts.min_segment);
				self.chain.insert_spare_front(Segment::heap(cap));
			}
			Reserved::Spare
		};
		self.version = self.version.wrapping_add(1);
		self.reservation = Some(Reservation { kind, size: n, version: self.version });
		Ok(self.region_mut(kind, n))
	}

	fn region_mut(&mut self, kind: Reserved, n: usize) -> &mut [u8] {
		let (tail, spare) = self.chain.read_regions();
		let region = match kind {
			Reserved::Tail => tail,
			Reserved::Spare => spare,
		};
		match region {
			Some(slack) => &mut slack[..n],
			None => {
				debug_assert_eq!(n, 0, "nonzero reservation with no region");
				&mut []
			}
		}
	}

	/// Publishes `k` bytes written into the reserved region as logical
	/// length. Fails without side effects if nothing is reserved, the
	/// reservation went stale, or `k` exceeds it.
	pub fn commit(&mut self, k: usize) -> Result {
		self.check_unfrozen(End::Back)?;
		let Some(res) = self.reservation else {
			return Err(Error::NoReservation);
		};
		if res.version != self.version {
			return Err(Error::StaleReservation);
		}
		if k > res.size {
			return Err(Error::CommitTooLarge { committed: k, reserved: res.size });
		}
		self.reservation = None;
		match res.kind {
			Reserved::Tail => self.chain.extend_tail(k),
			Reserved::Spare => self.chain.promote_spare(k),
		}
		self.after_mutation(k, 0);
		Ok(())
	}
}
