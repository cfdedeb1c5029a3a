//! Growing and contracting the region within `[start, max)`.

use crate::{align_down, backing::Backing, block::OVERHEAD, error::HeapError, region::HeapRegion};

impl<B: Backing> HeapRegion<B> {
  fn round_to_page(
    &self,
    size: usize,
  ) -> Option<usize> {
    size
      .checked_add(self.page_size - 1)
      .map(|size| align_down!(size, self.page_size))
  }

  /// Moves `end` to `start + new_size`, with `new_size` rounded up to a page.
  ///
  /// Only the bounds and the backing memory change; block metadata is the
  /// caller's business. Contracting must not cut into a block that stays in
  /// use.
  pub(crate) fn set_size(
    &mut self,
    new_size: usize,
  ) -> Result<(), HeapError> {
    let limit = self.max - self.start;
    let new_size = match self.round_to_page(new_size) {
      Some(size) if size <= limit => size,
      _ => {
        log::warn!("cannot resize heap at {:#x} to {new_size:#x}, limit is {limit:#x}", self.start);
        return Err(HeapError::OutOfMemory {
          requested: new_size,
          limit,
        });
      }
    };

    let current = self.size();
    if new_size == current {
      return Ok(());
    }

    self.backing.commit(new_size)?;
    log::debug!(
      "{} heap at {:#x}: {current:#x} -> {new_size:#x} bytes",
      if new_size > current { "expanded" } else { "contracted" },
      self.start
    );
    self.end = self.start + new_size;

    Ok(())
  }

  /// Hands the bytes added after `old_end` to the block layout: a free block
  /// ending at `old_end` is extended, otherwise a new hole is made.
  pub(crate) fn attach_growth(
    &mut self,
    old_end: usize,
  ) -> Result<(), HeapError> {
    if self.end <= old_end {
      return Ok(());
    }

    match self.block_ending_at(old_end)? {
      Some((addr, header)) if !header.allocated => {
        self.unlist_hole(addr)?;
        self.make_hole(addr, self.end)
      }
      _ => self.make_hole(old_end, self.end),
    }
  }

  /// Undoes growth performed since `end` was `old_end`. Everything past
  /// `old_end` belongs to the free tail block at that point.
  pub(crate) fn rollback_growth(
    &mut self,
    old_end: usize,
  ) -> Result<(), HeapError> {
    if self.end <= old_end {
      return Ok(());
    }

    let tail = self.block_ending_at(self.end)?;
    self.set_size(old_end - self.start)?;

    if let Some((addr, header)) = tail {
      if !header.allocated {
        self.unlist_hole(addr)?;
        if addr < old_end {
          self.make_hole(addr, old_end)?;
        }
      }
    }

    Ok(())
  }

  /// Resizes the region to `new_size` bytes, rounded up to a page.
  ///
  /// Growing fails with [`HeapError::OutOfMemory`] past `max`; the new
  /// bytes join the free tail block or become a new hole. Shrinking is only
  /// allowed through the free block at the tail, and only if what is left of
  /// that block is either nothing or still a valid block; anything else is
  /// rejected with [`HeapError::ShrinkTruncates`] and leaves the region as
  /// it was.
  pub fn resize(
    &mut self,
    new_size: usize,
  ) -> Result<(), HeapError> {
    let limit = self.max - self.start;
    let target = match self.round_to_page(new_size) {
      Some(size) if size <= limit => size,
      _ => {
        return Err(HeapError::OutOfMemory {
          requested: new_size,
          limit,
        });
      }
    };

    let current = self.size();
    if target > current {
      let old_end = self.end;
      self.set_size(target)?;
      self.attach_growth(old_end)
    } else if target < current {
      self.shrink_to(target)
    } else {
      Ok(())
    }
  }

  fn shrink_to(
    &mut self,
    target: usize,
  ) -> Result<(), HeapError> {
    let new_end = self.start + target;
    let truncates = HeapError::ShrinkTruncates { target: new_end };

    let Some((addr, header)) = self.block_ending_at(self.end)? else {
      return Err(truncates);
    };
    if header.allocated || addr > new_end {
      return Err(truncates);
    }

    let remaining = new_end - addr;
    if remaining != 0 && remaining < OVERHEAD {
      return Err(truncates);
    }

    self.set_size(target)?;
    self.unlist_hole(addr)?;
    if remaining > 0 {
      self.make_hole(addr, new_end)?;
    }

    Ok(())
  }
}
