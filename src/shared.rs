// SPDX-License-Identifier: Apache-2.0

use std::cell::{RefCell, RefMut};
use std::os::fd::AsFd;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use crate::callback::{CallbackHandle, CallbackInfo, DeferBinding, DeferQueue};
use crate::{Buffer, End, LineStyle, Result};

/// A [`Buffer`] behind a recursive lock, shareable across threads. Every
/// operation takes the lock for its whole duration, error paths included;
/// [`lock`](Self::lock) holds it across a multi-step sequence, and is
/// re-entrant on the owning thread.
///
/// Synchronous callbacks run with the lock held, so a callback reaching for
/// an unrelated lock can deadlock; route callbacks through
/// [`defer_callbacks`](Self::defer_callbacks) to run them outside the
/// critical section.
#[derive(Clone)]
pub struct SharedBuffer {
	inner: Arc<Shared>,
}

struct Shared {
	lock: ReentrantMutex<RefCell<Buffer>>,
}

/// Keeps a [`SharedBuffer`] locked. Dropping it releases one level of the
/// recursive lock.
pub struct SharedGuard<'a> {
	guard: ReentrantMutexGuard<'a, RefCell<Buffer>>,
}

impl SharedGuard<'_> {
	/// The buffer, exclusively borrowed. Release the borrow before anything
	/// that re-enters the buffer, callbacks included.
	pub fn buffer(&self) -> RefMut<'_, Buffer> {
		self.guard.borrow_mut()
	}
}

impl Default for SharedBuffer {
	fn default() -> Self { Buffer::new().into_shared() }
}

impl Buffer {
	/// Attaches a recursive lock, making the buffer shareable across
	/// threads.
	pub fn into_shared(self) -> SharedBuffer {
		SharedBuffer {
			inner: Arc::new(Shared { lock: ReentrantMutex::new(RefCell::new(self)) }),
		}
	}
}

impl SharedBuffer {
	pub fn new() -> Self { Self::default() }

	/// Acquires the lock until the guard drops.
	pub fn lock(&self) -> SharedGuard<'_> {
		SharedGuard { guard: self.inner.lock.lock() }
	}

	/// Runs `f` on the buffer under the lock.
	pub fn with<R>(&self, f: impl FnOnce(&mut Buffer) -> R) -> R {
		let guard = self.inner.lock.lock();
		let mut buf = guard.borrow_mut();
		f(&mut buf)
	}

	pub fn len(&self) -> usize { self.with(|buf| Buffer::len(buf)) }
	pub fn is_empty(&self) -> bool { self.with(|buf| Buffer::is_empty(buf)) }
	pub fn contiguous_space(&self) -> usize { self.with(|buf| Buffer::contiguous_space(buf)) }

	pub fn add(&self, data: &[u8]) -> Result {
		self.with(|buf| buf.add(data))
	}

	pub fn prepend(&self, data: &[u8]) -> Result {
		self.with(|buf| buf.prepend(data))
	}

	pub fn drain(&self, n: usize) -> Result {
		self.with(|buf| buf.drain(n))
	}

	pub fn remove(&self, dst: &mut [u8]) -> Result<usize> {
		self.with(|buf| buf.remove(dst))
	}

	pub fn copy_out(&self, dst: &mut [u8]) -> Result<usize> {
		self.with(|buf| buf.copy_out(dst))
	}

	pub fn read_line(&self, style: LineStyle) -> Result<Option<Vec<u8>>> {
		self.with(|buf| buf.read_line(style))
	}

	pub fn read_from<F: AsFd>(&self, fd: F, howmuch: Option<usize>) -> Result<usize> {
		self.with(|buf| buf.read_from(fd, howmuch))
	}

	pub fn write_to<F: AsFd>(&self, fd: F) -> Result<usize> {
		self.with(|buf| buf.write_to(fd))
	}

	pub fn write_atmost<F: AsFd>(&self, fd: F, howmuch: usize) -> Result<usize> {
		self.with(|buf| buf.write_atmost(fd, howmuch))
	}

	pub fn freeze(&self, end: End) {
		self.with(|buf| buf.freeze(end));
	}

	pub fn unfreeze(&self, end: End) -> Result {
		self.with(|buf| buf.unfreeze(end))
	}

	pub fn add_callback<F>(&self, cb: F) -> CallbackHandle
	where
		F: FnMut(&mut Buffer, &CallbackInfo) + Send + 'static,
	{
		self.with(|buf| buf.add_callback(cb))
	}

	pub fn remove_callback(&self, handle: CallbackHandle) -> Result {
		self.with(|buf| buf.remove_callback(handle))
	}

	/// Moves every byte of `src` onto the back of this buffer without
	/// copying. Both locks are taken in a globally fixed order, so two
	/// threads moving bytes between the same pair in opposite directions
	/// cannot deadlock. Moving a buffer onto itself is a no-op.
	pub fn add_buffer(&self, src: &SharedBuffer) -> Result {
		let Some((dst_guard, src_guard)) = self.lock_pair(src) else {
			return Ok(());
		};
		let mut dst = dst_guard.borrow_mut();
		let mut src = src_guard.borrow_mut();
		dst.add_buffer(&mut src)
	}

	/// Splices every byte of `src` in front of this buffer's bytes; the
	/// locking contract matches [`add_buffer`](Self::add_buffer).
	pub fn prepend_buffer(&self, src: &SharedBuffer) -> Result {
		let Some((dst_guard, src_guard)) = self.lock_pair(src) else {
			return Ok(());
		};
		let mut dst = dst_guard.borrow_mut();
		let mut src = src_guard.borrow_mut();
		dst.prepend_buffer(&mut src)
	}

	/// Moves up to `n` bytes into `dst`; the locking contract matches
	/// [`add_buffer`](Self::add_buffer).
	pub fn remove_buffer(&self, dst: &SharedBuffer, n: usize) -> Result<usize> {
		let Some((src_guard, dst_guard)) = self.lock_pair(dst) else {
			return Ok(0);
		};
		let mut src = src_guard.borrow_mut();
		let mut dst = dst_guard.borrow_mut();
		src.remove_buffer(&mut dst, n)
	}

	/// Locks self and other by ascending address; `None` when they are the
	/// same buffer. The guards are returned as (self, other).
	fn lock_pair<'a>(
		&'a self,
		other: &'a SharedBuffer,
	) -> Option<(ReentrantMutexGuard<'a, RefCell<Buffer>>, ReentrantMutexGuard<'a, RefCell<Buffer>>)> {
		if Arc::ptr_eq(&self.inner, &other.inner) {
			return None;
		}
		let ours_first = Arc::as_ptr(&self.inner) < Arc::as_ptr(&other.inner);
		if ours_first {
			let ours = self.inner.lock.lock();
			let theirs = other.inner.lock.lock();
			Some((ours, theirs))
		} else {
			let theirs = other.inner.lock.lock();
			let ours = self.inner.lock.lock();
			Some((ours, theirs))
		}
	}

	/// Routes callback dispatch through `queue`: mutations enqueue at most
	/// one task per batch window, and the task re-locks the buffer and runs
	/// the callbacks with the accumulated deltas, FIFO per buffer.
	pub fn defer_callbacks(&self, queue: Arc<dyn DeferQueue>) {
		let binding = Binding {
			queue,
			shared: Arc::downgrade(&self.inner),
			scheduled: Arc::new(AtomicBool::new(false)),
		};
		self.with(|buf| buf.defer = Some(Box::new(binding)));
	}
}

struct Binding {
	queue: Arc<dyn DeferQueue>,
	shared: Weak<Shared>,
	scheduled: Arc<AtomicBool>,
}

impl DeferBinding for Binding {
	fn schedule(&mut self) {
		if self.scheduled.swap(true, Ordering::AcqRel) {
			return;
		}
		let shared = self.shared.clone();
		let scheduled = self.scheduled.clone();
		self.queue.defer(Box::new(move || {
			scheduled.store(false, Ordering::Release);
			if let Some(shared) = shared.upgrade() {
				let guard = shared.lock.lock();
				let mut buf = guard.borrow_mut();
				buf.dispatch_now();
			}
		}));
	}
}

#[cfg(test)]
mod test {
	use super::SharedBuffer;

	fn assert_send_sync<T: Send + Sync>() {}

	#[test]
	fn handles_are_shareable() {
		assert_send_sync::<SharedBuffer>();
	}

	#[test]
	fn lock_is_recursive() {
		let buf = SharedBuffer::new();
		let outer = buf.lock();
		outer.buffer().add(b"abc").unwrap();
		// Same thread, second acquisition.
		assert_eq!(buf.len(), 3);
	}
}
