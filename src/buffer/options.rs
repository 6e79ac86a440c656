// SPDX-License-Identifier: Apache-2.0

use crate::{DEFAULT_READ_SIZE, MIN_SEGMENT_SIZE};

/// Options for tuning [`Buffer`](super::Buffer) allocation and IO behavior.
///
/// # Minimum segment size
///
/// The smallest heap segment the buffer will allocate. Appends that outgrow
/// the tail allocate `max(n, 2 * last_capacity)` rounded up to a power of two,
/// floored at this value. Defaults to `1024`.
///
/// # Spare segments
///
/// Fully-drained heap segments are kept and reused for later appends instead
/// of going back to the allocator, up to this count. Defaults to `2`.
///
/// # Default read size
///
/// How many bytes of slack [`read_from`](super::Buffer::read_from) prepares
/// when the caller does not say how much to read. Defaults to `4096`.
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub struct BufferOptions {
	pub min_segment: usize,
	pub max_spare: usize,
	pub read_default: usize,
}

impl Default for BufferOptions {
	fn default() -> Self {
		Self {
			min_segment: MIN_SEGMENT_SIZE,
			max_spare: 2,
			read_default: DEFAULT_READ_SIZE,
		}
	}
}

impl BufferOptions {
	/// Returns the minimum heap segment size.
	pub fn min_segment(&self) -> usize { self.min_segment }
	/// Returns the number of drained segments kept for reuse.
	pub fn max_spare(&self) -> usize { self.max_spare }
	/// Returns the default read-from-fd request size.
	pub fn read_default(&self) -> usize { self.read_default }

	/// Sets the minimum heap segment size.
	pub fn set_min_segment(mut self, value: usize) -> Self {
		self.min_segment = value.max(1);
		self
	}

	/// Sets the number of drained segments kept for reuse.
	pub fn set_max_spare(mut self, value: usize) -> Self {
		self.max_spare = value;
		self
	}

	/// Sets the default read-from-fd request size.
	pub fn set_read_default(mut self, value: usize) -> Self {
		self.read_default = value.max(1);
		self
	}
}
