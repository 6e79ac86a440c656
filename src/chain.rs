// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;
use std::collections::VecDeque;
use crate::segment::Segment;

/// An ordered sequence of [`Segment`]s forming one buffer, with laden segments
/// in front and empty spares behind them. The front `laden` positions hold the
/// readable data in order; everything after is writable slack waiting to be
/// claimed by an append or a reserve.
pub(crate) struct Chain {
	segs: VecDeque<Segment>,
	laden: usize,
	total: usize,
}

impl Default for Chain {
	fn default() -> Self { Self::new() }
}

impl Chain {
	pub fn new() -> Self {
		Self {
			segs: VecDeque::new(),
			laden: 0,
			total: 0,
		}
	}

	/// Total bytes across laden segments.
	pub fn total(&self) -> usize { self.total }
	/// Number of segments holding data.
	pub fn laden(&self) -> usize { self.laden }

	fn spares(&self) -> usize { self.segs.len() - self.laden }

	/// The `index`th laden segment.
	pub fn get(&self, index: usize) -> Option<&Segment> {
		(index < self.laden).then(|| &self.segs[index])
	}

	pub fn get_mut(&mut self, index: usize) -> Option<&mut Segment> {
		(index < self.laden).then(|| &mut self.segs[index])
	}

	pub fn first(&self) -> Option<&Segment> { self.get(0) }

	pub fn back_mut(&mut self) -> Option<&mut Segment> {
		let last = self.laden.checked_sub(1)?;
		Some(&mut self.segs[last])
	}

	pub fn iter(&self) -> impl Iterator<Item = &Segment> {
		self.segs.iter().take(self.laden)
	}

	/// Bytes stored contiguously at the front.
	pub fn contiguous(&self) -> usize {
		self.first().map_or(0, Segment::len)
	}

	/// Links a laden segment after the last one with data, before any spares.
	pub fn push_back(&mut self, seg: Segment) {
		debug_assert!(!seg.is_empty(), "laden push of an empty segment");
		self.total += seg.len();
		self.segs.insert(self.laden, seg);
		self.laden += 1;
	}

	/// Links a laden segment at the front.
	pub fn push_front(&mut self, seg: Segment) {
		debug_assert!(!seg.is_empty(), "laden push of an empty segment");
		self.total += seg.len();
		self.segs.push_front(seg);
		self.laden += 1;
	}

	/// Unlinks the front laden segment.
	pub fn pop_front(&mut self) -> Option<Segment> {
		if self.laden == 0 {
			return None;
		}
		let seg = self.segs.pop_front()?;
		self.laden -= 1;
		self.total -= seg.len();
		Some(seg)
	}

	/// Unlinks the last laden segment.
	pub fn pop_back(&mut self) -> Option<Segment> {
		let last = self.laden.checked_sub(1)?;
		let seg = self.segs.remove(last)?;
		self.laden -= 1;
		self.total -= seg.len();
		Some(seg)
	}

	/// Takes the first spare whose capacity is at least `min_cap`.
	pub fn take_spare(&mut self, min_cap: usize) -> Option<Segment> {
		let index = (self.laden..self.segs.len())
			.find(|&i| self.segs[i].capacity() >= min_cap)?;
		self.segs.remove(index)
	}

	/// Inserts an empty segment directly after the laden ones, so it is the
	/// next segment a tail write spills into.
	pub fn insert_spare_front(&mut self, seg: Segment) {
		debug_assert!(seg.is_empty(), "spare push of a laden segment");
		self.segs.insert(self.laden, seg);
	}

	/// Writable slack on the tail segment, zero when the tail is read-only.
	pub fn tail_slack(&self) -> usize {
		match self.laden.checked_sub(1) {
			Some(last) => self.segs[last].tail_slack(),
			None => 0,
		}
	}

	/// Capacity of the spare directly after the laden segments.
	pub fn first_spare_cap(&self) -> usize {
		self.segs.get(self.laden).map_or(0, Segment::capacity)
	}

	/// Copies `data` into the tail segment if all of it fits in the slack.
	pub fn try_extend_tail(&mut self, data: &[u8]) -> bool {
		let Some(back) = self.back_mut() else { return false };
		if back.tail_slack() < data.len() {
			return false;
		}
		let n = back.extend(data);
		debug_assert_eq!(n, data.len());
		self.total += n;
		true
	}

	/// Publishes `n` bytes written into the tail segment's slack.
	pub fn extend_tail(&mut self, n: usize) {
		if n == 0 {
			return;
		}
		self.back_mut()
			.expect("published bytes with no tail segment")
			.extend_within(n);
		self.total += n;
	}

	/// Publishes `n` bytes written into the first spare, promoting it to the
	/// laden range.
	pub fn promote_spare(&mut self, n: usize) {
		if n == 0 {
			return;
		}
		self.segs[self.laden].extend_within(n);
		self.laden += 1;
		self.total += n;
	}

	/// Copies `data` into the head segment's front slack if it fits.
	pub fn try_prepend_head(&mut self, data: &[u8]) -> bool {
		let Some(first) = self.get_mut(0) else { return false };
		if first.prepend(data) {
			self.total += data.len();
			true
		} else {
			false
		}
	}

	/// Removes up to `n` bytes from the front. Fully drained heap segments are
	/// recycled as spares up to `max_spare`; drained reference and file
	/// segments are released on the spot, firing their cleanup.
	pub fn drain(&mut self, n: usize, max_spare: usize) -> usize {
		let mut left = min(n, self.total);
		let drained = left;
		while left > 0 {
			let seg = &mut self.segs[0];
			let take = min(seg.len(), left);
			seg.drain(take);
			left -= take;
			self.total -= take;
			if seg.is_empty() {
				let mut seg = self.segs.pop_front().expect("laden head");
				self.laden -= 1;
				if seg.is_writable() && self.spares() < max_spare {
					seg.reset();
					self.segs.push_back(seg);
				}
			}
		}
		drained
	}

	/// Relinks every laden segment of `other` onto the back of this chain.
	/// `other`'s spares stay behind for its own reuse.
	pub fn append_from(&mut self, other: &mut Chain) {
		while let Some(seg) = other.pop_front() {
			self.push_back(seg);
		}
	}

	/// Relinks every laden segment of `other` in front of this chain,
	/// preserving their order.
	pub fn prepend_from(&mut self, other: &mut Chain) {
		while let Some(seg) = other.pop_back() {
			self.push_front(seg);
		}
	}

	/// Mutable slack views for a scatter read: the tail segment's slack and
	/// the first spare, in that order.
	pub fn read_regions(&mut self) -> (Option<&mut [u8]>, Option<&mut [u8]>) {
		let laden = self.laden;
		let segs = self.segs.make_contiguous();
		let (front, rest) = segs.split_at_mut(laden);
		let tail = front
			.last_mut()
			.filter(|seg| seg.is_writable())
			.map(Segment::slack_mut)
			.filter(|slack| !slack.is_empty());
		let spare = rest.first_mut().map(Segment::slack_mut);
		(tail, spare)
	}

	/// Publishes `n` bytes filled by a scatter read across the tail slack and
	/// the first spare.
	pub fn commit_read(&mut self, n: usize) {
		let into_tail = min(n, self.tail_slack());
		self.extend_tail(into_tail);
		self.promote_spare(n - into_tail);
	}
}

#[cfg(test)]
mod test {
	use crate::segment::Segment;
	use super::Chain;

	fn laden(data: &[u8]) -> Segment {
		let mut seg = Segment::heap(data.len().next_power_of_two());
		seg.extend(data);
		seg
	}

	#[test]
	fn counters_track_pushes_and_pops() {
		let mut chain = Chain::new();
		chain.push_back(laden(b"abc"));
		chain.push_back(laden(b"defg"));
		chain.insert_spare_front(Segment::heap(8));
		assert_eq!(chain.total(), 7);
		assert_eq!(chain.laden(), 2);
		assert_eq!(chain.contiguous(), 3);

		let first = chain.pop_front().unwrap();
		assert_eq!(first.data(), b"abc");
		assert_eq!(chain.total(), 4);
		assert_eq!(chain.laden(), 1);
	}

	#[test]
	fn laden_pushes_stay_ahead_of_spares() {
		let mut chain = Chain::new();
		chain.insert_spare_front(Segment::heap(8));
		chain.push_back(laden(b"abc"));
		assert_eq!(chain.first().unwrap().data(), b"abc");
		assert_eq!(chain.first_spare_cap(), 8);
	}

	#[test]
	fn drain_recycles_heap_segments() {
		let mut chain = Chain::new();
		chain.push_back(laden(b"abcd"));
		chain.push_back(laden(b"efgh"));
		assert_eq!(chain.drain(6, 2), 6);
		assert_eq!(chain.total(), 2);
		assert_eq!(chain.laden(), 1);
		assert_eq!(chain.first().unwrap().data(), b"gh");
		assert_eq!(chain.first_spare_cap(), 4, "drained head kept as a spare");
	}

	#[test]
	fn append_from_moves_segments_whole() {
		let mut dst = Chain::new();
		let mut src = Chain::new();
		dst.push_back(laden(b"abc"));
		src.push_back(laden(b"def"));
		src.push_back(laden(b"ghi"));
		dst.append_from(&mut src);
		assert_eq!(dst.total(), 9);
		assert_eq!(dst.laden(), 3);
		assert_eq!(src.total(), 0);
		assert_eq!(src.laden(), 0);
	}

	#[test]
	fn prepend_from_preserves_order() {
		let mut dst = Chain::new();
		let mut src = Chain::new();
		dst.push_back(laden(b"tail"));
		src.push_back(laden(b"a"));
		src.push_back(laden(b"b"));
		dst.prepend_from(&mut src);
		let parts: Vec<_> = dst.iter().map(|seg| seg.data().to_vec()).collect();
		assert_eq!(parts, [b"a".to_vec(), b"b".to_vec(), b"tail".to_vec()]);
	}
}
