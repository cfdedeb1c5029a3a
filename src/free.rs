//! Deallocation: return a block to the free list, merging it with free
//! neighbours on both sides and giving the tail back when it ends the region.
//!
//! ```text
//!   before:  │ free (prev) │ freed block │ free (next) │ used │
//!   after:   │            one free block               │ used │
//! ```

use crate::{
  align_up,
  backing::Backing,
  block::{FOOTER_SIZE, Header, OVERHEAD},
  error::HeapError,
  free_list::Hole,
  region::{Address, HeapRegion, NULL},
};

impl<B: Backing> HeapRegion<B> {
  /// Frees the block whose payload starts at `ptr`. Freeing [`NULL`] does
  /// nothing.
  ///
  /// # Panics
  ///
  /// Panics if `ptr` does not lead to a valid allocated block: a pointer
  /// outside the region, corrupted metadata or a double free. Walking
  /// neighbour blocks from such a header is not safe, so the heap refuses
  /// to go on. Use [`HeapRegion::try_deallocate`] to get the error instead.
  pub fn deallocate(
    &mut self,
    ptr: Address,
  ) {
    if let Err(err) = self.try_deallocate(ptr) {
      log::error!("fatal heap error while freeing {ptr:#x}: {err}");
      panic!("heap: cannot free {ptr:#x}: {err}");
    }
  }

  /// Like [`HeapRegion::deallocate`], but reports invalid pointers,
  /// corruption and double frees as errors. Nothing is modified when the
  /// block fails validation.
  pub fn try_deallocate(
    &mut self,
    ptr: Address,
  ) -> Result<(), HeapError> {
    if ptr == NULL {
      return Ok(());
    }

    let (block, header) = self.allocated_block(ptr)?;

    // Clearing the flag first lets a stale copy of this header, left inside
    // a merged hole, be recognised as already freed.
    self.write_header(block, Header::new(header.size, false))?;

    let mut addr = block;
    let mut size = header.size;

    if let Some(prev) = self.free_neighbour_before(addr)? {
      self.unlist_hole(prev.addr)?;
      addr = prev.addr;
      size += prev.size;
    }

    if let Some(next) = self.free_neighbour_after(addr + size)? {
      self.unlist_hole(next.addr)?;
      size += next.size;
    }

    if addr + size == self.end {
      match self.contract_tail(addr)? {
        Some(remaining) => size = remaining,
        None => {
          log::trace!("deallocate({ptr:#x}): tail block reclaimed");
          return Ok(());
        }
      }
    }

    self.make_hole(addr, addr + size)?;
    log::trace!("deallocate({ptr:#x}) -> hole {addr:#x} ({size:#x} bytes)");

    Ok(())
  }

  /// The free block ending right before `addr`, if there is one.
  fn free_neighbour_before(
    &self,
    addr: usize,
  ) -> Result<Option<Hole>, HeapError> {
    if addr < self.start + OVERHEAD {
      return Ok(None);
    }

    let footer = self.read_footer(addr - FOOTER_SIZE)?;
    if !footer.is_valid() || footer.header < self.start || footer.header >= addr {
      log::warn!("unreadable footer before {addr:#x}, not coalescing backwards");
      return Ok(None);
    }

    let header = self.read_header(footer.header)?;
    if header.is_valid() && !header.allocated && footer.header + header.size == addr {
      Ok(Some(Hole {
        addr: footer.header,
        size: header.size,
      }))
    } else {
      Ok(None)
    }
  }

  /// The free block starting at `addr`, if there is one.
  fn free_neighbour_after(
    &self,
    addr: usize,
  ) -> Result<Option<Hole>, HeapError> {
    if addr >= self.end {
      return Ok(None);
    }

    let header = self.read_header(addr)?;
    if !header.is_valid() {
      log::warn!("unreadable header at {addr:#x}, not coalescing forwards");
      return Ok(None);
    }

    let fits = addr.checked_add(header.size).is_some_and(|end| end <= self.end);
    if !header.allocated && fits {
      Ok(Some(Hole {
        addr,
        size: header.size,
      }))
    } else {
      Ok(None)
    }
  }

  /// Contracts the region behind the free block at `addr`, which runs up to
  /// `end`. The region keeps at least its floor size, and what is left of
  /// the block is either nothing or a whole header+footer pair.
  ///
  /// Returns the block's remaining size, or `None` if contraction swallowed
  /// it completely.
  fn contract_tail(
    &mut self,
    addr: usize,
  ) -> Result<Option<usize>, HeapError> {
    let current = self.size();
    let mut target = align_up!(addr - self.start, self.page_size).max(self.floor - self.start);
    let mut remaining = self.start + target - addr;

    if remaining > 0 && remaining < OVERHEAD {
      target += self.page_size;
      remaining += self.page_size;
    }

    if target >= current {
      return Ok(Some(self.end - addr));
    }

    self.set_size(target)?;
    Ok((remaining > 0).then_some(remaining))
  }
}
