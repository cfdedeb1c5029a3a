//! Allocation: carve a block out of the smallest fitting hole, growing the
//! region when no hole fits.
//!
//! ```text
//!   hole found at pos:
//!   ┌──────────────┬──────────────────────────┬──────────────────────┐
//!   │ prefix hole  │     allocated block      │    remainder hole    │
//!   │ (alignment)  │  header | payload | ftr  │   (if big enough)    │
//!   └──────────────┴──────────────────────────┴──────────────────────┘
//!   pos            pos + padding                           pos + hole size
//! ```

use crate::{
  align,
  backing::Backing,
  block::{HEADER_SIZE, OVERHEAD},
  error::HeapError,
  region::{Address, HeapRegion},
};

impl<B: Backing> HeapRegion<B> {
  /// Allocates at least `size` bytes and returns the payload address.
  ///
  /// With `page_aligned` the payload starts on a page boundary. When no hole
  /// is large enough the region grows towards `max`; if it cannot grow far
  /// enough the call fails with [`HeapError::OutOfMemory`] and the region is
  /// left exactly as it was.
  pub fn allocate(
    &mut self,
    size: usize,
    page_aligned: bool,
  ) -> Result<Address, HeapError> {
    let limit = self.max - self.start;
    if size > limit {
      log::warn!("allocate({size:#x}) exceeds the heap limit {limit:#x}");
      return Err(HeapError::OutOfMemory {
        requested: size,
        limit,
      });
    }
    let needed = align!(size) + OVERHEAD;

    let old_end = self.end;
    let index = match self.find_or_grow(needed, page_aligned) {
      Ok(index) => index,
      Err(err) => {
        self.rollback_growth(old_end)?;
        return Err(err);
      }
    };

    let Some(hole) = self.free_list.remove_at(index) else {
      return Err(HeapError::Invariant(format!("free list has no entry {index}")));
    };
    let mut pos = hole.addr;
    let mut hole_size = hole.size;

    if page_aligned {
      let padding = self.alignment_padding(pos);
      if padding > 0 {
        // The prefix stays free; the block before the hole is in use and the
        // allocation follows right after, so it has no free neighbour.
        self.make_hole(pos, pos + padding)?;
        pos += padding;
        hole_size -= padding;
      }
    }

    // A leftover too small for a header and footer goes to the allocation.
    let block_size = if hole_size - needed < OVERHEAD {
      hole_size
    } else {
      needed
    };

    self.write_block(pos, block_size, true)?;

    if hole_size > block_size {
      self.make_hole(pos + block_size, pos + hole_size)?;
    }

    let ptr = pos + HEADER_SIZE;
    log::trace!(
      "allocate({size:#x}, aligned={page_aligned}) -> {ptr:#x} ({block_size:#x} byte block)"
    );

    Ok(ptr)
  }

  /// Index of a hole that fits `needed` bytes, growing the region until one
  /// exists.
  ///
  /// Every round strictly moves `end` towards `max`, so the number of rounds
  /// is bounded by the pages left below the ceiling.
  fn find_or_grow(
    &mut self,
    needed: usize,
    page_aligned: bool,
  ) -> Result<usize, HeapError> {
    let rounds = (self.max - self.start) / self.page_size + 1;

    for _ in 0..rounds {
      if let Some(index) = self.find_hole(needed, page_aligned) {
        return Ok(index);
      }

      let shortfall = self.growth_shortfall(needed, page_aligned)?;
      let old_end = self.end;
      self.set_size(self.size() + shortfall)?;
      self.attach_growth(old_end)?;
    }

    self.find_hole(needed, page_aligned).ok_or(HeapError::OutOfMemory {
      requested: self.size() + needed,
      limit: self.max - self.start,
    })
  }

  /// Bytes the region must grow by so that its tail can hold `needed` bytes.
  fn growth_shortfall(
    &self,
    needed: usize,
    page_aligned: bool,
  ) -> Result<usize, HeapError> {
    let (tail_addr, tail_free) = match self.block_ending_at(self.end)? {
      Some((addr, header)) if !header.allocated => (addr, header.size),
      _ => (self.end, 0),
    };

    let padding = if page_aligned {
      self.alignment_padding(tail_addr)
    } else {
      0
    };

    Ok((needed + padding).saturating_sub(tail_free).max(1))
  }
}
