//! Hole search: the smallest free hole that satisfies a request.

use crate::{
  align_up,
  backing::Backing,
  block::{HEADER_SIZE, OVERHEAD},
  free_list::Hole,
  is_aligned,
  region::HeapRegion,
};

impl<B: Backing> HeapRegion<B> {
  /// Bytes to skip at `addr` so that a block placed after them has a
  /// page-aligned payload.
  ///
  /// The skipped prefix becomes a hole of its own, so a non-zero padding is
  /// never smaller than a header+footer pair; if the distance to the next
  /// boundary is too short, the following page is used.
  pub(crate) fn alignment_padding(
    &self,
    addr: usize,
  ) -> usize {
    let payload = addr + HEADER_SIZE;
    if is_aligned!(payload, self.page_size) {
      return 0;
    }

    let padding = align_up!(payload, self.page_size) - payload;
    if padding < OVERHEAD {
      padding + self.page_size
    } else {
      padding
    }
  }

  /// Size of `hole` that is usable for a request of the given alignment.
  pub(crate) fn effective_size(
    &self,
    hole: &Hole,
    page_aligned: bool,
  ) -> usize {
    if page_aligned {
      hole.size.saturating_sub(self.alignment_padding(hole.addr))
    } else {
      hole.size
    }
  }

  /// Index in the free list of the smallest hole whose effective size is at
  /// least `min_size`.
  ///
  /// Holes smaller than `min_size` can never fit, so the scan starts at the
  /// first hole that is large enough on paper. Without alignment that hole
  /// is the answer.
  pub(crate) fn find_hole(
    &self,
    min_size: usize,
    page_aligned: bool,
  ) -> Option<usize> {
    let first = self.free_list.partition_point(|hole| hole.size < min_size);

    if !page_aligned {
      return (first < self.free_list.len()).then_some(first);
    }

    (first..self.free_list.len()).find(|&index| {
      self
        .free_list
        .lookup(index)
        .is_some_and(|hole| self.effective_size(hole, true) >= min_size)
    })
  }
}
