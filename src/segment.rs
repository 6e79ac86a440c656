// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;
use std::fmt;
use std::fs::File;
use std::io;
use nix::sys::uio::pread;
use tracing::debug;

/// Backing storage for a [`Segment`].
enum Store {
	/// Owned, writable memory, allocated zero-filled.
	Heap(Box<[u8]>),
	/// Externally-referenced bytes. The view object is owned (or shared, when
	/// it is an `Arc`) by the segment; `cleanup` fires exactly once when the
	/// segment is released.
	Extern {
		data: Box<dyn AsRef<[u8]> + Send>,
		cleanup: Option<Box<dyn FnOnce() + Send>>,
	},
	/// Bytes living in a file. The `File` owns the descriptor; dropping the
	/// segment closes it. `offset` is the absolute base of the segment's
	/// region, before the misalign is applied.
	File { file: File, offset: u64 },
}

/// One contiguous byte region in a buffer chain. Live bytes sit between a
/// *misalign* (bytes already drained off the front) and the tail slack, so
/// front-drain is a pair of counter bumps rather than a memmove.
pub(crate) struct Segment {
	store: Store,
	misalign: usize,
	len: usize,
}

/// Picks the capacity for a fresh heap segment: at least `need`, at least
/// double the previous tail's capacity, rounded up to a power of two with a
/// floor of `min_segment`.
pub(crate) fn grow_size(need: usize, last_cap: usize, min_segment: usize) -> usize {
	need.max(last_cap.saturating_mul(2))
		.max(min_segment)
		.checked_next_power_of_two()
		.unwrap_or(need)
}

impl Segment {
	/// A fresh writable segment of exactly `capacity` bytes.
	pub fn heap(capacity: usize) -> Self {
		Self {
			store: Store::Heap(vec![0; capacity].into_boxed_slice()),
			misalign: 0,
			len: 0,
		}
	}

	/// A read-only segment viewing caller-provided bytes. `cleanup` runs when
	/// the segment is released, fully drained or dropped with its buffer.
	pub fn external<D, F>(data: D, cleanup: F) -> Self
	where
		D: AsRef<[u8]> + Send + 'static,
		F: FnOnce() + Send + 'static,
	{
		let len = data.as_ref().len();
		Self {
			store: Store::Extern {
				data: Box::new(data),
				cleanup: Some(Box::new(cleanup)),
			},
			misalign: 0,
			len,
		}
	}

	/// A segment of `len` bytes starting at `offset` in `file`. No bytes are
	/// read until the segment is written out or materialized.
	pub fn file(file: File, offset: u64, len: u64) -> Self {
		Self {
			store: Store::File { file, offset },
			misalign: 0,
			len: len as usize,
		}
	}

	pub fn len(&self) -> usize { self.len }
	pub fn is_empty(&self) -> bool { self.len == 0 }

	pub fn capacity(&self) -> usize {
		match &self.store {
			Store::Heap(buf) => buf.len(),
			Store::Extern { data, .. } => (**data).as_ref().len(),
			Store::File { .. } => self.misalign + self.len,
		}
	}

	/// Only heap segments accept writes.
	pub fn is_writable(&self) -> bool {
		matches!(self.store, Store::Heap(_))
	}

	pub fn is_file(&self) -> bool {
		matches!(self.store, Store::File { .. })
	}

	/// Writable space after the live bytes.
	pub fn tail_slack(&self) -> usize {
		match self.store {
			Store::Heap(_) => self.capacity() - self.misalign - self.len,
			_ => 0,
		}
	}

	/// Writable space before the live bytes, usable by prepend.
	pub fn front_slack(&self) -> usize {
		match self.store {
			Store::Heap(_) => self.misalign,
			_ => 0,
		}
	}

	/// The live bytes of an in-memory segment. File-backed segments have no
	/// in-memory bytes; materialize first.
	pub fn data(&self) -> &[u8] {
		let range = self.misalign..self.misalign + self.len;
		match &self.store {
			Store::Heap(buf) => &buf[range],
			Store::Extern { data, .. } => &(**data).as_ref()[range],
			Store::File { .. } => panic!("file-backed segment read without materialization"),
		}
	}

	/// The writable slack after the live bytes, empty unless heap.
	pub fn slack_mut(&mut self) -> &mut [u8] {
		let start = self.misalign + self.len;
		match &mut self.store {
			Store::Heap(buf) => &mut buf[start..],
			_ => &mut [],
		}
	}

	/// Copies as much of `data` as fits into the tail slack, returning the
	/// number of bytes written.
	pub fn extend(&mut self, data: &[u8]) -> usize {
		let n = min(self.tail_slack(), data.len());
		let start = self.misalign + self.len;
		if let Store::Heap(buf) = &mut self.store {
			buf[start..start + n].copy_from_slice(&data[..n]);
			self.len += n;
			n
		} else {
			0
		}
	}

	/// Publishes `n` bytes previously written into the tail slack.
	pub fn extend_within(&mut self, n: usize) {
		debug_assert!(n <= self.tail_slack(), "extend past slack");
		self.len += n;
	}

	/// Copies `data` into the front slack, returning `false` when it does not
	/// fit or the segment is read-only.
	pub fn prepend(&mut self, data: &[u8]) -> bool {
		let n = data.len();
		if self.front_slack() < n {
			return false;
		}
		let start = self.misalign - n;
		if let Store::Heap(buf) = &mut self.store {
			buf[start..self.misalign].copy_from_slice(data);
			self.misalign = start;
			self.len += n;
			true
		} else {
			false
		}
	}

	/// Fills a fresh heap segment so the data ends flush with the capacity,
	/// leaving all slack at the front for later prepends.
	pub fn fill_back(&mut self, data: &[u8]) {
		debug_assert!(self.len == 0 && self.misalign == 0, "fill_back on a laden segment");
		let cap = self.capacity();
		self.misalign = cap - data.len();
		let start = self.misalign;
		if let Store::Heap(buf) = &mut self.store {
			buf[start..].copy_from_slice(data);
			self.len = data.len();
		}
	}

	/// Drops `n` bytes off the front. O(1): only the misalign moves.
	pub fn drain(&mut self, n: usize) {
		debug_assert!(n <= self.len, "drain past end of segment");
		self.misalign += n;
		self.len -= n;
	}

	/// Resets a drained heap segment for reuse.
	pub fn reset(&mut self) {
		debug_assert!(self.is_writable(), "reset of a read-only segment");
		self.misalign = 0;
		self.len = 0;
	}

	/// Copies live bytes starting at `off` into `dst` without consuming them,
	/// returning the number of bytes copied. File-backed segments are read in
	/// place with `pread`; the store is left untouched.
	pub fn read_at(&self, off: usize, dst: &mut [u8]) -> io::Result<usize> {
		let n = min(self.len.saturating_sub(off), dst.len());
		if n == 0 {
			return Ok(0);
		}
		match &self.store {
			Store::File { file, offset } => {
				let mut base = offset + (self.misalign + off) as u64;
				let mut filled = 0;
				while filled < n {
					let read = pread(file, &mut dst[filled..n], base as i64)
						.map_err(|err| io::Error::from_raw_os_error(err as i32))?;
					if read == 0 {
						return Err(io::Error::new(
							io::ErrorKind::UnexpectedEof,
							"file-backed segment shorter than its declared length",
						));
					}
					filled += read;
					base += read as u64;
				}
				Ok(n)
			}
			_ => {
				let start = off;
				dst[..n].copy_from_slice(&self.data()[start..start + n]);
				Ok(n)
			}
		}
	}

	/// Replaces a file store with a heap store holding the remaining bytes,
	/// closing the descriptor. In-memory segments are left as they are.
	pub fn materialize(&mut self) -> io::Result<()> {
		if !self.is_file() {
			return Ok(());
		}
		debug!(len = self.len, "materializing file-backed segment");
		let mut buf = vec![0; self.len].into_boxed_slice();
		self.read_at(0, &mut buf)?;
		self.store = Store::Heap(buf);
		self.misalign = 0;
		Ok(())
	}

	/// The file handle and absolute offset of the next unread byte, for the
	/// sendfile path.
	pub fn file_region(&self) -> Option<(&File, u64)> {
		match &self.store {
			Store::File { file, offset } => Some((file, offset + self.misalign as u64)),
			_ => None,
		}
	}
}

impl Drop for Segment {
	fn drop(&mut self) {
		if let Store::Extern { cleanup, .. } = &mut self.store {
			if let Some(run) = cleanup.take() {
				run();
			}
		}
	}
}

impl fmt::Debug for Segment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let kind = match self.store {
			Store::Heap(_) => "heap",
			Store::Extern { .. } => "extern",
			Store::File { .. } => "file",
		};
		f.debug_struct("Segment")
			.field("store", &kind)
			.field("misalign", &self.misalign)
			.field("len", &self.len)
			.finish()
	}
}

#[cfg(test)]
mod test {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use super::{grow_size, Segment};

	#[test]
	fn heap_extend_drain() {
		let mut seg = Segment::heap(16);
		assert_eq!(seg.extend(b"Hello World!"), 12, "should write 12 bytes");
		assert_eq!(seg.tail_slack(), 4);
		seg.drain(6);
		assert_eq!(seg.data(), b"World!");
		assert_eq!(seg.front_slack(), 6, "drained bytes become front slack");
		seg.drain(6);
		assert!(seg.is_empty());
	}

	#[test]
	fn prepend_into_front_slack() {
		let mut seg = Segment::heap(8);
		seg.fill_back(b"tail");
		assert_eq!(seg.front_slack(), 4);
		assert!(seg.prepend(b"head"));
		assert_eq!(seg.data(), b"headtail");
		assert!(!seg.prepend(b"x"), "no slack left");
	}

	#[test]
	fn external_cleanup_fires_once() {
		let fired = Arc::new(AtomicUsize::new(0));
		let counter = fired.clone();
		let seg = Segment::external(b"bytes".as_slice(), move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		assert_eq!(seg.data(), b"bytes");
		assert!(!seg.is_writable());
		drop(seg);
		assert_eq!(fired.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn grow_doubles_and_rounds() {
		assert_eq!(grow_size(1, 0, 1024), 1024);
		assert_eq!(grow_size(100, 1024, 1024), 2048);
		assert_eq!(grow_size(5000, 1024, 1024), 8192);
		assert_eq!(grow_size(3000, 0, 1024), 4096);
	}
}
