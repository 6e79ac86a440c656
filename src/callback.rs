// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use parking_lot::Mutex;
use crate::{Buffer, Error, Result};

/// What one dispatch reports: the buffer length before the batch, and the
/// bytes added and removed by it. Batches accumulated while an entry was
/// suspended arrive as one dispatch with the cumulative deltas.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CallbackInfo {
	pub orig_size: usize,
	pub n_added: usize,
	pub n_deleted: usize,
}

/// A change listener. Runs after mutating operations, under the buffer lock
/// when one is attached; it may mutate the buffer and may remove itself, but
/// not other entries.
pub type BufferCallback = Box<dyn FnMut(&mut Buffer, &CallbackInfo) + Send>;

/// Names an installed callback entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CallbackHandle {
	pub(crate) id: u64,
}

struct Entry {
	id: u64,
	/// Taken out while the callback runs, so re-entrant dispatch coalesces
	/// instead of recursing into the same closure.
	cb: Option<BufferCallback>,
	enabled: bool,
	suspended: u32,
	n_added: usize,
	n_deleted: usize,
	/// Buffer length snapshotted when the entry was first suspended, so the
	/// resume dispatch reports the size before the whole batch.
	suspend_origin: Option<usize>,
}

impl Entry {
	fn pending(&self) -> bool {
		self.n_added > 0 || self.n_deleted > 0
	}
}

/// The per-buffer set of callback entries and dispatch state.
#[derive(Default)]
pub(crate) struct Registry {
	entries: Vec<Entry>,
	next_id: u64,
	running: Option<u64>,
	dispatching: bool,
}

impl Registry {
	pub fn add(&mut self, cb: BufferCallback) -> CallbackHandle {
		let id = self.next_id;
		self.next_id += 1;
		self.entries.push(Entry {
			id,
			cb: Some(cb),
			enabled: true,
			suspended: 0,
			n_added: 0,
			n_deleted: 0,
			suspend_origin: None,
		});
		CallbackHandle { id }
	}

	/// Removes an entry without firing it. During dispatch only the running
	/// entry may remove itself.
	pub fn remove(&mut self, handle: CallbackHandle) -> Result {
		if let Some(running) = self.running {
			if running != handle.id {
				return Err(Error::CallbackBusy);
			}
		}
		let index = self.index_of(handle)?;
		self.entries.remove(index);
		Ok(())
	}

	pub fn set_enabled(&mut self, handle: CallbackHandle, enabled: bool) -> Result {
		let index = self.index_of(handle)?;
		self.entries[index].enabled = enabled;
		Ok(())
	}

	/// Suspends dispatch for one entry. Deltas keep accumulating; `total` is
	/// remembered on the first suspension as the batch origin.
	pub fn suspend(&mut self, handle: CallbackHandle, total: usize) -> Result {
		let index = self.index_of(handle)?;
		let entry = &mut self.entries[index];
		if entry.suspended == 0 {
			entry.suspend_origin = Some(total);
		}
		entry.suspended += 1;
		Ok(())
	}

	/// Drops one level of suspension. Returns `true` when the entry became
	/// runnable again and has deltas to report.
	pub fn unsuspend(&mut self, handle: CallbackHandle) -> Result<bool> {
		let index = self.index_of(handle)?;
		let entry = &mut self.entries[index];
		if entry.suspended == 0 {
			return Err(Error::UnknownCallback);
		}
		entry.suspended -= 1;
		Ok(entry.suspended == 0 && entry.pending())
	}

	/// Merges one operation's deltas into every enabled entry.
	pub fn record(&mut self, added: usize, deleted: usize) {
		for entry in &mut self.entries {
			if entry.enabled {
				entry.n_added += added;
				entry.n_deleted += deleted;
			}
		}
	}

	pub fn pending_ids(&self) -> Vec<u64> {
		self.entries
			.iter()
			.filter(|entry| {
				entry.enabled && entry.suspended == 0 && entry.pending() && entry.cb.is_some()
			})
			.map(|entry| entry.id)
			.collect()
	}

	/// Starts one entry's dispatch: takes its closure and resets the deltas.
	/// Returns `None` when the entry is gone or no longer due.
	pub fn begin(&mut self, id: u64, total: usize) -> Option<(BufferCallback, CallbackInfo)> {
		let entry = self.entries.iter_mut().find(|entry| entry.id == id)?;
		if !entry.enabled || entry.suspended > 0 || !entry.pending() {
			return None;
		}
		let cb = entry.cb.take()?;
		let n_added = std::mem::take(&mut entry.n_added);
		let n_deleted = std::mem::take(&mut entry.n_deleted);
		let orig_size = entry
			.suspend_origin
			.take()
			.unwrap_or_else(|| (total + n_deleted).saturating_sub(n_added));
		Some((cb, CallbackInfo { orig_size, n_added, n_deleted }))
	}

	/// Returns an entry's closure after its dispatch. The entry may have
	/// removed itself meanwhile, in which case the closure is dropped.
	pub fn finish(&mut self, id: u64, cb: BufferCallback) {
		if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
			entry.cb = Some(cb);
		}
	}

	pub fn set_running(&mut self, id: Option<u64>) -> Option<u64> {
		std::mem::replace(&mut self.running, id)
	}

	pub fn dispatching(&self) -> bool { self.dispatching }

	/// Marks the outermost dispatch loop as running. Returns `false` when one
	/// is already active higher in the call stack.
	pub fn begin_dispatch(&mut self) -> bool {
		!std::mem::replace(&mut self.dispatching, true)
	}

	pub fn end_dispatch(&mut self) {
		self.dispatching = false;
	}

	fn index_of(&self, handle: CallbackHandle) -> Result<usize> {
		self.entries
			.iter()
			.position(|entry| entry.id == handle.id)
			.ok_or(Error::UnknownCallback)
	}
}

impl Buffer {
	/// Installs a change callback, enabled, and returns its handle. Every
	/// mutating operation reports its byte deltas to every installed,
	/// enabled, unsuspended callback.
	pub fn add_callback<F>(&mut self, cb: F) -> CallbackHandle
	where
		F: FnMut(&mut Buffer, &CallbackInfo) + Send + 'static,
	{
		self.callbacks.add(Box::new(cb))
	}

	/// Uninstalls a callback without firing it. A running callback may
	/// remove itself; removing a different entry during dispatch fails with
	/// [`Error::CallbackBusy`].
	pub fn remove_callback(&mut self, handle: CallbackHandle) -> Result {
		self.callbacks.remove(handle)
	}

	/// Disabled callbacks accumulate no deltas; changes made while disabled
	/// are never reported.
	pub fn set_callback_enabled(&mut self, handle: CallbackHandle, enabled: bool) -> Result {
		self.callbacks.set_enabled(handle, enabled)
	}

	/// Postpones dispatch for one entry; deltas accumulate. Suspensions
	/// stack.
	pub fn suspend_callback(&mut self, handle: CallbackHandle) -> Result {
		let total = self.len();
		self.callbacks.suspend(handle, total)
	}

	/// Undoes one suspension; on the last one, dispatches the accumulated
	/// batch if it is nonempty.
	pub fn unsuspend_callback(&mut self, handle: CallbackHandle) -> Result {
		if self.callbacks.unsuspend(handle)? {
			self.dispatch();
		}
		Ok(())
	}
}

/// A task handed to an external event loop by deferred dispatch.
pub type Job = Box<dyn FnOnce() + Send>;

/// Binding to an external event loop: deferred callback dispatch enqueues
/// jobs here instead of running callbacks inside the mutating call.
pub trait DeferQueue: Send + Sync {
	fn defer(&self, job: Job);
}

/// Buffer-side half of a deferred-dispatch binding; implemented over a weak
/// handle to the shared buffer so queued jobs can re-acquire it.
pub(crate) trait DeferBinding: Send {
	/// Enqueues a dispatch task unless one is already pending.
	fn schedule(&mut self);
}

/// A plain FIFO job queue. Event loops drain it with
/// [`run_pending`](Self::run_pending) once per iteration; jobs enqueued by a
/// running job run in the next drain.
#[derive(Default)]
pub struct JobQueue {
	jobs: Mutex<VecDeque<Job>>,
}

impl JobQueue {
	pub fn new() -> Self { Self::default() }

	pub fn is_empty(&self) -> bool {
		self.jobs.lock().is_empty()
	}

	/// Runs every job queued before this call, in FIFO order, and returns
	/// how many ran. Jobs run outside the queue lock.
	pub fn run_pending(&self) -> usize {
		let mut batch: VecDeque<Job> = std::mem::take(&mut *self.jobs.lock());
		let ran = batch.len();
		for job in batch.drain(..) {
			job();
		}
		ran
	}
}

impl DeferQueue for JobQueue {
	fn defer(&self, job: Job) {
		self.jobs.lock().push_back(job);
	}
}

#[cfg(test)]
mod test {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use crate::Buffer;

	#[test]
	fn deltas_reach_every_callback() {
		let mut buf = Buffer::new();
		let seen = Arc::new(AtomicUsize::new(0));
		for _ in 0..2 {
			let seen = seen.clone();
			buf.add_callback(move |_, info| {
				seen.fetch_add(info.n_added, Ordering::SeqCst);
			});
		}
		buf.add(b"12345").unwrap();
		assert_eq!(seen.load(Ordering::SeqCst), 10);
	}

	#[test]
	fn suspension_accumulates_one_batch() {
		let mut buf = Buffer::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let observed = Arc::new(AtomicUsize::new(0));
		let (calls2, observed2) = (calls.clone(), observed.clone());
		let handle = buf.add_callback(move |_, info| {
			calls2.fetch_add(1, Ordering::SeqCst);
			observed2.store(info.n_added, Ordering::SeqCst);
			assert_eq!(info.orig_size, 0, "origin is the length before the batch");
		});
		buf.suspend_callback(handle).unwrap();
		buf.add(b"abc").unwrap();
		buf.add(b"def").unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 0);
		buf.unsuspend_callback(handle).unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(observed.load(Ordering::SeqCst), 6);
	}

	#[test]
	fn callback_may_remove_itself_only() {
		let mut buf = Buffer::new();
		let first = buf.add_callback(|_, _| {});
		let handle = Arc::new(AtomicUsize::new(0));
		let stored = handle.clone();
		let second = buf.add_callback(move |buf, _| {
			let own = crate::CallbackHandle { id: stored.load(Ordering::SeqCst) as u64 };
			assert!(buf.remove_callback(first).is_err(), "foreign removal is rejected");
			buf.remove_callback(own).unwrap();
		});
		handle.store(second.id as usize, Ordering::SeqCst);
		buf.add(b"x").unwrap();
		buf.add(b"y").unwrap();
		assert!(buf.remove_callback(second).is_err(), "second already removed itself");
	}

	#[test]
	fn reentrant_mutation_is_reported() {
		let mut buf = Buffer::new();
		let added = Arc::new(AtomicUsize::new(0));
		let sum = added.clone();
		buf.add_callback(move |buf, info| {
			sum.fetch_add(info.n_added, Ordering::SeqCst);
			if buf.len() < 4 {
				buf.add(b"!").unwrap();
			}
		});
		buf.add(b"abc").unwrap();
		// The callback's own add is delivered by the outer dispatch loop.
		assert_eq!(added.load(Ordering::SeqCst), 4);
		assert_eq!(buf.len(), 4);
	}

	#[test]
	fn disabled_entries_miss_deltas() {
		let mut buf = Buffer::new();
		let seen = Arc::new(AtomicUsize::new(0));
		let sum = seen.clone();
		let handle = buf.add_callback(move |_, info| {
			sum.fetch_add(info.n_added, Ordering::SeqCst);
		});
		buf.set_callback_enabled(handle, false).unwrap();
		buf.add(b"hidden").unwrap();
		buf.set_callback_enabled(handle, true).unwrap();
		buf.add(b"seen").unwrap();
		assert_eq!(seen.load(Ordering::SeqCst), 4);
	}
}
