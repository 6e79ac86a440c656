// SPDX-License-Identifier: Apache-2.0

use crate::{Buffer, Error, Result};

/// A logical offset into a [`Buffer`], carrying an opaque segment hint so
/// that repeated searches resume in amortized constant time instead of
/// walking the chain from the head.
///
/// A position is minted against one snapshot of the buffer: any mutation
/// stales the hint, and the next operation consuming the position silently
/// recomputes it from the offset.
#[derive(Copy, Clone, Debug)]
pub struct Position {
	pub(crate) pos: usize,
	/// (laden segment index, byte offset within that segment's data).
	pub(crate) hint: (usize, usize),
	pub(crate) version: u64,
}

impl Position {
	/// The logical byte offset, in `0..=len`.
	pub fn pos(&self) -> usize { self.pos }
}

impl Buffer {
	/// Builds a position at logical offset `pos`, computing its hint by
	/// walking the chain from the head.
	pub fn position(&self, pos: usize) -> Result<Position> {
		if pos > self.len() {
			return Err(Error::OutOfRange { pos, len: self.len() });
		}
		let hint = self.walk((0, 0), pos);
		Ok(Position { pos, hint, version: self.version })
	}

	/// Advances `p` by `delta` bytes, walking forward from its hint rather
	/// than from the head of the chain.
	pub fn advance(&self, p: &mut Position, delta: usize) -> Result {
		let pos = p.pos + delta;
		if pos > self.len() {
			return Err(Error::OutOfRange { pos, len: self.len() });
		}
		let p = self.rebase(p);
		let hint = self.walk(p.hint, delta);
		*p = Position { pos, hint, version: self.version };
		Ok(())
	}

	/// Refreshes a possibly-stale position in place, recomputing the hint
	/// from the logical offset when the buffer has mutated since it was
	/// minted.
	pub(crate) fn rebase<'p>(&self, p: &'p mut Position) -> &'p mut Position {
		if p.version != self.version {
			*p = self
				.position(p.pos.min(self.len()))
				.expect("clamped position is in range");
		}
		p
	}

	/// Walks `delta` bytes forward from `hint`, normalizing so the offset is
	/// strictly inside its segment except at the very end of the buffer.
	pub(crate) fn walk(&self, hint: (usize, usize), delta: usize) -> (usize, usize) {
		let (mut idx, mut off) = hint;
		let mut left = delta;
		loop {
			let Some(seg) = self.chain.get(idx) else {
				debug_assert_eq!(left, 0, "walk past the end of the chain");
				return (idx, 0);
			};
			let room = seg.len() - off;
			if left < room {
				return (idx, off + left);
			}
			left -= room;
			idx += 1;
			off = 0;
		}
	}
}
