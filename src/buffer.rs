// SPDX-License-Identifier: Apache-2.0

mod options;
mod read;
mod write;

use std::fmt;
pub use options::BufferOptions;
use crate::callback::{DeferBinding, Registry};
use crate::chain::Chain;
use crate::{End, Error, Result};

/// A chained byte buffer. Bytes are appended at the back and drained from the
/// front; storage is a chain of segments, so appends, cross-buffer moves, and
/// front-drains never shift existing bytes.
///
/// A `Buffer` is single-threaded. To share one across threads behind a
/// recursive lock, convert it with [`into_shared`](Self::into_shared).
pub struct Buffer {
	pub(crate) chain: Chain,
	pub(crate) opts: BufferOptions,
	pub(crate) callbacks: Registry,
	pub(crate) defer: Option<Box<dyn DeferBinding>>,
	/// Bumped on every mutation; positions and reservations minted against an
	/// older value are stale.
	pub(crate) version: u64,
	freeze_front: u32,
	freeze_back: u32,
	pub(crate) reservation: Option<write::Reservation>,
}

impl Default for Buffer {
	fn default() -> Self { Self::new() }
}

impl Buffer {
	/// An empty buffer with default options.
	pub fn new() -> Self {
		Self::with_options(BufferOptions::default())
	}

	pub fn with_options(opts: BufferOptions) -> Self {
		Self {
			chain: Chain::new(),
			opts,
			callbacks: Registry::default(),
			defer: None,
			version: 0,
			freeze_front: 0,
			freeze_back: 0,
			reservation: None,
		}
	}

	pub fn options(&self) -> &BufferOptions { &self.opts }

	/// Bytes currently stored.
	pub fn len(&self) -> usize { self.chain.total() }

	pub fn is_empty(&self) -> bool { self.len() == 0 }

	/// Bytes stored contiguously at the front, readable without a pullup.
	pub fn contiguous_space(&self) -> usize { self.chain.contiguous() }

	/// Blocks mutation at one end: the front barrier fails drain-side
	/// operations (drain, remove, read_line, write-to-fd, prepend), the back
	/// barrier fails append-side ones (add, expand, reserve, read-from-fd).
	/// Barriers stack; pair every freeze with an [`unfreeze`](Self::unfreeze).
	pub fn freeze(&mut self, end: End) {
		match end {
			End::Front => self.freeze_front += 1,
			End::Back => self.freeze_back += 1,
		}
	}

	pub fn unfreeze(&mut self, end: End) -> Result {
		let counter = match end {
			End::Front => &mut self.freeze_front,
			End::Back => &mut self.freeze_back,
		};
		if *counter == 0 {
			return Err(Error::NotFrozen(end));
		}
		*counter -= 1;
		Ok(())
	}

	pub(crate) fn check_unfrozen(&self, end: End) -> Result {
		let frozen = match end {
			End::Front => self.freeze_front,
			End::Back => self.freeze_back,
		};
		if frozen > 0 {
			Err(Error::Frozen(end))
		} else {
			Ok(())
		}
	}

	/// Close out a mutating operation: stale any outstanding positions and
	/// reservation, merge the deltas into the callback registry, and dispatch.
	pub(crate) fn after_mutation(&mut self, added: usize, deleted: usize) {
		self.version = self.version.wrapping_add(1);
		self.reservation = None;
		if added == 0 && deleted == 0 {
			return;
		}
		self.callbacks.record(added, deleted);
		self.dispatch();
	}

	pub(crate) fn dispatch(&mut self) {
		if self.callbacks.dispatching() {
			// The outermost dispatch loop picks up deltas recorded by a
			// running callback.
			return;
		}
		if let Some(binding) = self.defer.as_mut() {
			binding.schedule();
			return;
		}
		self.dispatch_now();
	}

	/// Runs pending callbacks on the calling thread, looping until no entry
	/// has undelivered deltas. Used directly by deferred dispatch tasks.
	pub(crate) fn dispatch_now(&mut self) {
		if !self.callbacks.begin_dispatch() {
			return;
		}
		loop {
			let pending = self.callbacks.pending_ids();
			if pending.is_empty() {
				break;
			}
			for id in pending {
				let total = self.len();
				let Some((mut cb, info)) = self.callbacks.begin(id, total) else {
					continue;
				};
				let prev = self.callbacks.set_running(Some(id));
				cb(self, &info);
				self.callbacks.set_running(prev);
				self.callbacks.finish(id, cb);
			}
		}
		self.callbacks.end_dispatch();
	}
}

impl fmt::Debug for Buffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Buffer")
			.field("len", &self.len())
			.field("segments", &self.chain.laden())
			.finish_non_exhaustive()
	}
}
