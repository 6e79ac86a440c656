// SPDX-License-Identifier: Apache-2.0

//! A zero-copy chained byte buffer for staging network IO.
//!
//! ## How it works
//!
//! A [`Buffer`] stores its bytes in a chain of *segments* rather than one
//! contiguous allocation. Appends land in the tail segment's slack or in a
//! freshly linked segment; draining the front bumps a per-segment *misalign*
//! counter past the consumed bytes. Neither ever shifts data, so the usual
//! cost center of a staging buffer, the memmove behind every drain, is gone.
//! Whole buffers move between each other by relinking their segments.
//!
//! Three kinds of segment share the chain:
//!
//! - *Heap* segments own writable memory. Fully drained ones are kept and
//!   reused for later appends.
//! - *Reference* segments ([`add_reference`](Buffer::add_reference)) view
//!   caller-owned bytes and run a cleanup exactly once when released. They
//!   are read-only and never coalesce: appending into one would mean copying
//!   the bytes the caller handed over to avoid copying.
//! - *File* segments ([`add_file`](Buffer::add_file)) hold a descriptor and a
//!   range. Writing the buffer to a socket streams them through `sendfile`
//!   where the platform has it, so the file bytes never enter userland.
//!
//! Interleaving `add` with `add_reference` or `add_file` fragments the chain;
//! [`pullup`](Buffer::pullup) coerces a prefix back into one segment when a
//! parser needs it contiguous.
//!
//! Searching and line reading ([`search`](Buffer::search),
//! [`read_line`](Buffer::read_line)) walk the chain in place, matching across
//! segment boundaries, and hand back [`Position`]s that resume later scans
//! without restarting from the head.
//!
//! Change callbacks observe every mutation as (bytes added, bytes deleted)
//! batches. By default they run inside the mutating call; bind a
//! [`DeferQueue`] to run them from an event loop instead. A [`Buffer`] is
//! single-threaded; [`into_shared`](Buffer::into_shared) puts it behind a
//! recursive lock for cross-thread use.

mod buffer;
mod callback;
mod chain;
mod error;
mod find;
mod io;
mod position;
mod segment;
mod shared;
mod std_io;

pub use buffer::{Buffer, BufferOptions};
pub use callback::{BufferCallback, CallbackHandle, CallbackInfo, DeferQueue, Job, JobQueue};
pub use error::{End, Error, Result};
pub use find::LineStyle;
pub use position::Position;
pub use shared::{SharedBuffer, SharedGuard};

/// Smallest heap segment allocated by default.
pub const MIN_SEGMENT_SIZE: usize = 1024;
/// Default slack prepared by [`Buffer::read_from`] when no size is given.
pub const DEFAULT_READ_SIZE: usize = 4096;
