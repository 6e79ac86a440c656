// SPDX-License-Identifier: Apache-2.0

//! Reading and writing buffers against file descriptors. Reads scatter into
//! up to two slack regions with one `readv`; writes gather the head segments
//! into one `writev`, switching to `sendfile` when the head is file-backed so
//! file bytes never pass through userland.

use std::cmp::min;
use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::AsFd;
use arrayvec::ArrayVec;
use cfg_if::cfg_if;
use nix::sys::uio::{readv, writev};
use tracing::trace;
use crate::{Buffer, End, Result};

/// Most segments gathered into a single writev batch.
const MAX_WRITE_IOVEC: usize = 64;

fn from_errno(err: nix::errno::Errno) -> io::Error {
	io::Error::from_raw_os_error(err as i32)
}

impl Buffer {
	/// Reads from `fd` onto the back of the buffer, preparing `howmuch` bytes
	/// of slack (the configured default when `None`) and filling it with a
	/// single scatter read. Returns the bytes read; `Ok(0)` is end of file.
	pub fn read_from<F: AsFd>(&mut self, fd: F, howmuch: Option<usize>) -> Result<usize> {
		self.check_unfrozen(End::Back)?;
		let want = howmuch.unwrap_or(self.opts.read_default);
		if want == 0 {
			return Ok(0);
		}
		self.ensure_write_space(want);

		let (tail, spare) = self.chain.read_regions();
		let mut iov = ArrayVec::<IoSliceMut<'_>, 2>::new();
		let mut room = 0;
		for slack in [tail, spare].into_iter().flatten() {
			let take = min(slack.len(), want - room);
			room += take;
			iov.push(IoSliceMut::new(&mut slack[..take]));
			if room == want {
				break;
			}
		}
		debug_assert!(room >= want, "expand left too little slack");

		let read = readv(fd, &mut iov).map_err(from_errno)?;
		trace!(bytes = read, regions = iov.len(), "readv into buffer");
		drop(iov);
		if read > 0 {
			self.chain.commit_read(read);
			self.after_mutation(read, 0);
		}
		Ok(read)
	}

	/// Writes the whole buffer to `fd`; see [`write_atmost`](Self::write_atmost).
	pub fn write_to<F: AsFd>(&mut self, fd: F) -> Result<usize> {
		self.write_atmost(fd, usize::MAX)
	}

	/// Writes up to `howmuch` bytes from the front of the buffer to `fd` in
	/// one gather batch, draining exactly what was written. When the front
	/// segment is file-backed its bytes are pushed with `sendfile` instead,
	/// falling back to materialize-and-write where the fast path is missing.
	/// A short count means the descriptor would not take more.
	pub fn write_atmost<F: AsFd>(&mut self, fd: F, howmuch: usize) -> Result<usize> {
		self.check_unfrozen(End::Front)?;
		let limit = min(howmuch, self.len());
		if limit == 0 {
			return Ok(0);
		}

		let head_is_file = self.chain.first().is_some_and(|seg| seg.is_file());
		let written = if head_is_file {
			self.sendfile_head(fd, limit)?
		} else {
			let mut iov = ArrayVec::<IoSlice<'_>, MAX_WRITE_IOVEC>::new();
			let mut gathered = 0;
			for seg in self.chain.iter() {
				if seg.is_file() || gathered == limit || iov.is_full() {
					break;
				}
				let take = min(seg.len(), limit - gathered);
				iov.push(IoSlice::new(&seg.data()[..take]));
				gathered += take;
			}
			let written = writev(fd, &iov).map_err(from_errno)?;
			trace!(bytes = written, segments = iov.len(), "writev from buffer");
			written
		};

		if written > 0 {
			self.chain.drain(written, self.opts.max_spare);
			self.after_mutation(0, written);
		}
		Ok(written)
	}

	cfg_if! {
		if #[cfg(any(target_os = "linux", target_os = "android"))] {
			fn sendfile_head<F: AsFd>(&mut self, fd: F, limit: usize) -> Result<usize> {
				use nix::errno::Errno;
				use nix::sys::sendfile::sendfile;

				let head = self.chain.first().expect("laden head");
				let count = min(head.len(), limit);
				let (file, base) = head.file_region().expect("file-backed head");
				let mut offset = base as i64;
				match sendfile(&fd, file, Some(&mut offset), count) {
					Ok(sent) => {
						trace!(bytes = sent, offset = base, "sendfile from buffer");
						Ok(sent)
					}
					// The destination does not take sendfile; push the bytes
					// through userland instead.
					Err(Errno::EINVAL | Errno::ENOSYS | Errno::EOPNOTSUPP) => {
						self.write_head_materialized(fd, count)
					}
					Err(err) => Err(from_errno(err).into()),
				}
			}
		} else {
			fn sendfile_head<F: AsFd>(&mut self, fd: F, limit: usize) -> Result<usize> {
				let head = self.chain.first().expect("laden head");
				let count = min(head.len(), limit);
				self.write_head_materialized(fd, count)
			}
		}
	}

	fn write_head_materialized<F: AsFd>(&mut self, fd: F, count: usize) -> Result<usize> {
		let head = self.chain.get_mut(0).expect("laden head");
		head.materialize()?;
		let data = &self.chain.first().expect("laden head").data()[..count];
		let written = writev(fd, &[IoSlice::new(data)]).map_err(from_errno)?;
		trace!(bytes = written, "writev of materialized file segment");
		Ok(written)
	}
}
