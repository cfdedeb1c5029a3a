use std::fmt;

use crate::{
  backing::{Backing, VecBacking},
  block::{FOOTER_SIZE, Footer, HEADER_SIZE, Header, OVERHEAD},
  config::HeapConfig,
  error::{HeapError, Metadata},
  free_list::{FreeList, Hole},
};

/// An address inside a region. Payload addresses returned by
/// [`HeapRegion::allocate`] are never [`NULL`].
pub type Address = usize;

/// The null address; deallocating it is a no-op.
pub const NULL: Address = 0;

/// A heap over the address range `[start, end)`, growable up to `max`.
///
/// The region's bytes live in a [`Backing`]; byte `i` of the backing is the
/// byte at address `start + i`. All block metadata is read and written
/// through the bounds-checked accessors in this module.
pub struct HeapRegion<B: Backing = VecBacking> {
  pub(crate) start: usize,
  pub(crate) end: usize,
  pub(crate) max: usize,
  pub(crate) floor: usize,
  pub(crate) page_size: usize,
  pub(crate) free_list: FreeList,
  pub(crate) backing: B,
}

/// A block found while walking the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub addr: Address,
  pub size: usize,
  pub allocated: bool,
}

impl BlockInfo {
  /// Address handed out for this block when it is allocated.
  pub fn payload(&self) -> Address {
    self.addr + HEADER_SIZE
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  pub region_size: usize,
  pub free_bytes: usize,
  pub holes: usize,
  pub largest_hole: usize,
}

impl HeapRegion<VecBacking> {
  /// Creates a region backed by an owned byte buffer.
  pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
    let bounds = config.validate()?;
    Self::with_backing(config, VecBacking::new(bounds.max - bounds.start))
  }
}

#[cfg(unix)]
impl HeapRegion<crate::backing::MmapBacking> {
  /// Creates a region whose whole ceiling is reserved with `mmap`.
  pub fn mmap(config: HeapConfig) -> Result<Self, HeapError> {
    let bounds = config.validate()?;
    let backing = crate::backing::MmapBacking::reserve(bounds.max - bounds.start)?;
    Self::with_backing(config, backing)
  }
}

impl<B: Backing> HeapRegion<B> {
  /// Creates a region over `backing`, which must be able to hold everything
  /// up to `max`. The region starts as a single hole spanning `[start, end)`.
  pub fn with_backing(
    config: HeapConfig,
    mut backing: B,
  ) -> Result<Self, HeapError> {
    let bounds = config.validate()?;

    if backing.reserved() < bounds.max - bounds.start {
      return Err(HeapError::InvalidBounds {
        start: bounds.start,
        end: bounds.end,
        max: bounds.max,
      });
    }
    backing.commit(bounds.end - bounds.start)?;

    let mut heap = Self {
      start: bounds.start,
      end: bounds.end,
      max: bounds.max,
      floor: bounds.floor,
      page_size: bounds.page_size,
      free_list: FreeList::by_size(),
      backing,
    };

    if heap.end > heap.start {
      heap.make_hole(heap.start, heap.end)?;
    }

    log::debug!(
      "created heap [{:#x}, {:#x}) max={:#x} page={:#x}",
      heap.start,
      heap.end,
      heap.max,
      heap.page_size
    );

    Ok(heap)
  }

  pub fn start(&self) -> Address {
    self.start
  }

  pub fn end(&self) -> Address {
    self.end
  }

  pub fn max(&self) -> Address {
    self.max
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  /// Current size of the region, `end - start`.
  pub fn size(&self) -> usize {
    self.end - self.start
  }

  /// The free holes, ascending by size.
  pub fn holes(&self) -> impl Iterator<Item = Hole> + '_ {
    self.free_list.iter().copied()
  }

  pub fn backing(&self) -> &B {
    &self.backing
  }

  pub fn stats(&self) -> HeapStats {
    HeapStats {
      region_size: self.size(),
      free_bytes: self.free_list.iter().map(|hole| hole.size).sum(),
      holes: self.free_list.len(),
      largest_hole: self.free_list.iter().map(|hole| hole.size).max().unwrap_or(0),
    }
  }

  /// Walks every block from `start` to `end` in address order.
  pub fn blocks(&self) -> Blocks<'_, B> {
    Blocks {
      heap: self,
      cursor: self.start,
      failed: false,
    }
  }

  /// Usable bytes of the allocated block at `ptr`.
  pub fn usable_size(
    &self,
    ptr: Address,
  ) -> Result<usize, HeapError> {
    let (_, header) = self.allocated_block(ptr)?;
    Ok(header.size - OVERHEAD)
  }

  pub fn payload(
    &self,
    ptr: Address,
  ) -> Result<&[u8], HeapError> {
    let (_, header) = self.allocated_block(ptr)?;
    let offset = ptr - self.start;
    Ok(&self.backing.bytes()[offset..offset + header.size - OVERHEAD])
  }

  pub fn payload_mut(
    &mut self,
    ptr: Address,
  ) -> Result<&mut [u8], HeapError> {
    let (_, header) = self.allocated_block(ptr)?;
    let offset = ptr - self.start;
    Ok(&mut self.backing.bytes_mut()[offset..offset + header.size - OVERHEAD])
  }

  /// Verifies the structural invariants of the region:
  ///
  /// - every block carries a valid header and a footer pointing back to it;
  /// - block sizes add up to exactly `end - start`;
  /// - no two neighbouring blocks are both free;
  /// - the free list holds exactly the free blocks, ascending by size.
  pub fn check(&self) -> Result<(), HeapError> {
    let mut free_blocks = Vec::new();
    let mut total = 0;
    let mut previous_free = false;

    for block in self.blocks() {
      let block = block?;
      if !block.allocated {
        if previous_free {
          return Err(HeapError::Invariant(format!(
            "free block at {:#x} follows another free block",
            block.addr
          )));
        }
        free_blocks.push(Hole {
          addr: block.addr,
          size: block.size,
        });
      }
      previous_free = !block.allocated;
      total += block.size;
    }

    if total != self.size() {
      return Err(HeapError::Invariant(format!(
        "blocks cover {total:#x} bytes, region is {:#x}",
        self.size()
      )));
    }

    let mut listed: Vec<Hole> = self.free_list.iter().copied().collect();
    if listed.windows(2).any(|pair| pair[0].size > pair[1].size) {
      return Err(HeapError::Invariant("free list is not sorted by size".into()));
    }

    listed.sort_by_key(|hole| hole.addr);
    if listed != free_blocks {
      return Err(HeapError::Invariant(format!(
        "free list holds {} holes, region has {} free blocks",
        listed.len(),
        free_blocks.len()
      )));
    }

    Ok(())
  }

  fn offset(
    &self,
    addr: usize,
    len: usize,
  ) -> Result<usize, HeapError> {
    match addr.checked_add(len) {
      Some(last) if addr >= self.start && last <= self.end => Ok(addr - self.start),
      _ => Err(HeapError::OutOfRange { addr }),
    }
  }

  pub(crate) fn read_header(
    &self,
    addr: usize,
  ) -> Result<Header, HeapError> {
    let offset = self.offset(addr, HEADER_SIZE)?;
    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(&self.backing.bytes()[offset..offset + HEADER_SIZE]);
    Ok(Header::decode(&raw))
  }

  pub(crate) fn read_footer(
    &self,
    addr: usize,
  ) -> Result<Footer, HeapError> {
    let offset = self.offset(addr, FOOTER_SIZE)?;
    let mut raw = [0u8; FOOTER_SIZE];
    raw.copy_from_slice(&self.backing.bytes()[offset..offset + FOOTER_SIZE]);
    Ok(Footer::decode(&raw))
  }

  pub(crate) fn write_header(
    &mut self,
    addr: usize,
    header: Header,
  ) -> Result<(), HeapError> {
    let offset = self.offset(addr, HEADER_SIZE)?;
    self.backing.bytes_mut()[offset..offset + HEADER_SIZE].copy_from_slice(&header.encode());
    Ok(())
  }

  pub(crate) fn write_footer(
    &mut self,
    addr: usize,
    footer: Footer,
  ) -> Result<(), HeapError> {
    let offset = self.offset(addr, FOOTER_SIZE)?;
    self.backing.bytes_mut()[offset..offset + FOOTER_SIZE].copy_from_slice(&footer.encode());
    Ok(())
  }

  /// Writes a header at `addr` and the matching footer at the block's end.
  pub(crate) fn write_block(
    &mut self,
    addr: usize,
    size: usize,
    allocated: bool,
  ) -> Result<(), HeapError> {
    debug_assert!(size >= OVERHEAD, "block at {addr:#x} too small: {size}");
    self.write_header(addr, Header::new(size, allocated))?;
    self.write_footer(addr + size - FOOTER_SIZE, Footer::new(addr))
  }

  /// Reads and validates the complete block at `addr`: the header magic, a
  /// size that stays within the region, and a footer pointing back.
  pub(crate) fn read_block(
    &self,
    addr: usize,
  ) -> Result<Header, HeapError> {
    let header = self.read_header(addr)?;
    let corrupt_header = HeapError::Corruption {
      addr,
      metadata: Metadata::Header,
    };

    if !header.is_valid() || header.size < OVERHEAD {
      return Err(corrupt_header);
    }
    match addr.checked_add(header.size) {
      Some(block_end) if block_end <= self.end => {}
      _ => return Err(corrupt_header),
    }

    let footer = self.read_footer(addr + header.size - FOOTER_SIZE)?;
    if !footer.is_valid() || footer.header != addr {
      return Err(HeapError::Corruption {
        addr,
        metadata: Metadata::Footer,
      });
    }

    Ok(header)
  }

  /// Resolves a payload address to its block, which must be allocated.
  pub(crate) fn allocated_block(
    &self,
    ptr: Address,
  ) -> Result<(usize, Header), HeapError> {
    let addr = match ptr.checked_sub(HEADER_SIZE) {
      Some(addr) if addr >= self.start && ptr <= self.end => addr,
      _ => return Err(HeapError::OutOfRange { addr: ptr }),
    };

    let header = self.read_header(addr)?;
    if !header.is_valid() {
      return Err(HeapError::Corruption {
        addr,
        metadata: Metadata::Header,
      });
    }
    if !header.allocated {
      return Err(HeapError::DoubleFree { addr });
    }

    Ok((addr, self.read_block(addr)?))
  }

  /// The block whose last byte is the byte right before `block_end`.
  pub(crate) fn block_ending_at(
    &self,
    block_end: usize,
  ) -> Result<Option<(usize, Header)>, HeapError> {
    if block_end < self.start + OVERHEAD {
      return Ok(None);
    }

    let footer = self.read_footer(block_end - FOOTER_SIZE)?;
    if !footer.is_valid() {
      return Err(HeapError::Corruption {
        addr: block_end - FOOTER_SIZE,
        metadata: Metadata::Footer,
      });
    }

    let header = self.read_block(footer.header)?;
    if footer.header + header.size != block_end {
      return Err(HeapError::Corruption {
        addr: footer.header,
        metadata: Metadata::Header,
      });
    }

    Ok(Some((footer.header, header)))
  }
}

pub struct Blocks<'a, B: Backing> {
  heap: &'a HeapRegion<B>,
  cursor: usize,
  failed: bool,
}

impl<B: Backing> Iterator for Blocks<'_, B> {
  type Item = Result<BlockInfo, HeapError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed || self.cursor >= self.heap.end {
      return None;
    }

    match self.heap.read_block(self.cursor) {
      Ok(header) => {
        let info = BlockInfo {
          addr: self.cursor,
          size: header.size,
          allocated: header.allocated,
        };
        self.cursor += header.size;
        Some(Ok(info))
      }
      Err(err) => {
        self.failed = true;
        Some(Err(err))
      }
    }
  }
}

impl<B: Backing> fmt::Display for HeapRegion<B> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(
      f,
      "heap [{:#x}, {:#x}) max={:#x} holes={}",
      self.start,
      self.end,
      self.max,
      self.free_list.len()
    )?;

    for block in self.blocks() {
      match block {
        Ok(block) => writeln!(
          f,
          "  {:#012x}  {:>10}  {}",
          block.addr,
          block.size,
          if block.allocated { "used" } else { "free" }
        )?,
        Err(err) => writeln!(f, "  <{err}>")?,
      }
    }

    Ok(())
  }
}
