use crate::{backing::Backing, error::HeapError, free_list::Hole, region::HeapRegion};

impl<B: Backing> HeapRegion<B> {
  /// Writes a free block spanning `[start, end)` and indexes it.
  ///
  /// Does not coalesce: the caller makes sure neither neighbour of the range
  /// is free.
  pub(crate) fn make_hole(
    &mut self,
    start: usize,
    end: usize,
  ) -> Result<(), HeapError> {
    let size = end - start;
    self.write_block(start, size, false)?;
    self.free_list.insert(Hole { addr: start, size });
    Ok(())
  }

  /// Drops the hole starting at `addr` from the index. Its bytes are left
  /// untouched.
  pub(crate) fn unlist_hole(
    &mut self,
    addr: usize,
  ) -> Result<Hole, HeapError> {
    self
      .free_list
      .remove_addr(addr)
      .ok_or_else(|| HeapError::Invariant(format!("free block at {addr:#x} is not indexed")))
  }
}
