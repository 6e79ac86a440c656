// SPDX-License-Identifier: Apache-2.0

use std::fmt::{self, Display, Formatter};
use std::io;

pub type Result<T = ()> = std::result::Result<T, Error>;

/// One end of a buffer, for [freeze](crate::Buffer::freeze) barriers. Front is
/// the drain side, back is the append side.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum End {
	Front,
	Back,
}

impl Display for End {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Front => "front",
			Self::Back => "back",
		})
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A mutation was attempted in a frozen direction.
	#[error("buffer is frozen at the {0}")]
	Frozen(End),
	/// The buffer is not frozen at the given end, so it cannot be unfrozen.
	#[error("buffer is not frozen at the {0}")]
	NotFrozen(End),
	/// [`commit`](crate::Buffer::commit) was called with no space reserved.
	#[error("no reserved space to commit")]
	NoReservation,
	/// The buffer was mutated between [`reserve`](crate::Buffer::reserve) and
	/// [`commit`](crate::Buffer::commit), discarding the reservation.
	#[error("reservation was invalidated by a later mutation")]
	StaleReservation,
	/// More bytes were committed than were reserved.
	#[error("commit of {committed} bytes exceeds the {reserved} reserved")]
	CommitTooLarge { committed: usize, reserved: usize },
	/// A logical offset past the end of the buffer.
	#[error("position {pos} is out of range for a buffer of {len} bytes")]
	OutOfRange { pos: usize, len: usize },
	/// A callback tried to remove a *different* callback during dispatch. Only
	/// self-removal is permitted while dispatch is running.
	#[error("cannot remove another callback entry during dispatch")]
	CallbackBusy,
	/// The callback handle does not name an installed entry.
	#[error("unknown callback handle")]
	UnknownCallback,
	#[error(transparent)]
	Io(#[from] io::Error),
}

impl From<Error> for io::Error {
	fn from(value: Error) -> Self {
		match value {
			Error::Io(inner) => inner,
			other => io::Error::other(other),
		}
	}
}
