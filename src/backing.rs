//! Memory behind a heap region.
//!
//! A [`Backing`] reserves room for the whole region up to its ceiling and
//! makes a prefix of it usable. The heap only ever touches the committed
//! prefix, which always equals `end - start`.
//!
//! ```text
//!   ┌──────────────────────────────┬───────────────────────────────┐
//!   │          committed           │     reserved, not usable      │
//!   └──────────────────────────────┴───────────────────────────────┘
//!   start                          end                           max
//! ```

#[cfg(unix)]
use std::io;

use crate::error::HeapError;

pub trait Backing {
  /// Bytes that may ever be committed.
  fn reserved(&self) -> usize;

  /// Bytes currently usable.
  fn committed(&self) -> usize;

  /// Makes exactly the first `len` bytes usable, growing or shrinking the
  /// committed prefix. Bytes that become usable again read as zero.
  fn commit(
    &mut self,
    len: usize,
  ) -> Result<(), HeapError>;

  fn bytes(&self) -> &[u8];

  fn bytes_mut(&mut self) -> &mut [u8];
}

/// Heap-allocated backing: an owned, zero-filled byte vector.
#[derive(Debug, Default)]
pub struct VecBacking {
  bytes: Vec<u8>,
  reserved: usize,
}

impl VecBacking {
  pub fn new(reserved: usize) -> Self {
    Self {
      bytes: Vec::new(),
      reserved,
    }
  }
}

impl Backing for VecBacking {
  fn reserved(&self) -> usize {
    self.reserved
  }

  fn committed(&self) -> usize {
    self.bytes.len()
  }

  fn commit(
    &mut self,
    len: usize,
  ) -> Result<(), HeapError> {
    if len > self.reserved {
      return Err(HeapError::OutOfMemory {
        requested: len,
        limit: self.reserved,
      });
    }

    if len < self.bytes.len() {
      self.bytes.truncate(len);
      self.bytes.shrink_to_fit();
    } else {
      self.bytes.resize(len, 0);
    }

    Ok(())
  }

  fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    &mut self.bytes
  }
}

/// Returns the host's page size as reported by `sysconf(_SC_PAGESIZE)`.
#[cfg(unix)]
pub fn host_page_size() -> Result<usize, HeapError> {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  if size <= 0 {
    return Err(HeapError::Backing(io::Error::last_os_error()));
  }
  Ok(size as usize)
}

/// Anonymous-mapping backing.
///
/// The whole reservation is mapped `PROT_NONE` up front; committing flips
/// pages to read/write with `mprotect`, and releasing drops their contents
/// with `madvise(MADV_DONTNEED)` before protecting them again. This is the
/// paging step a kernel heap performs when it grows or contracts.
#[cfg(unix)]
pub struct MmapBacking {
  base: std::ptr::NonNull<u8>,
  reserved: usize,
  committed: usize,
  host_page: usize,
}

// SAFETY: the mapping is exclusively owned by this value and only reachable
// through `&self`/`&mut self`.
#[cfg(unix)]
unsafe impl Send for MmapBacking {}

#[cfg(unix)]
impl MmapBacking {
  pub fn reserve(len: usize) -> Result<Self, HeapError> {
    let host_page = host_page_size()?;
    let reserved = len;
    let map_len = crate::align_up!(len.max(1), host_page);

    let addr = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        map_len,
        libc::PROT_NONE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(HeapError::Backing(io::Error::last_os_error()));
    }

    let base = std::ptr::NonNull::new(addr as *mut u8)
      .ok_or_else(|| HeapError::Backing(io::Error::other("mmap returned a null mapping")))?;

    log::debug!("reserved {map_len:#x} bytes at {base:p}");

    Ok(Self {
      base,
      reserved,
      committed: 0,
      host_page,
    })
  }

  fn map_len(&self) -> usize {
    crate::align_up!(self.reserved.max(1), self.host_page)
  }

  fn protect(
    &self,
    offset: usize,
    len: usize,
    prot: libc::c_int,
  ) -> Result<(), HeapError> {
    if len == 0 {
      return Ok(());
    }

    let rc = unsafe { libc::mprotect(self.base.as_ptr().add(offset) as *mut libc::c_void, len, prot) };
    if rc != 0 {
      return Err(HeapError::Backing(io::Error::last_os_error()));
    }
    Ok(())
  }
}

#[cfg(unix)]
impl Backing for MmapBacking {
  fn reserved(&self) -> usize {
    self.reserved
  }

  fn committed(&self) -> usize {
    self.committed
  }

  fn commit(
    &mut self,
    len: usize,
  ) -> Result<(), HeapError> {
    if len > self.reserved {
      return Err(HeapError::OutOfMemory {
        requested: len,
        limit: self.reserved,
      });
    }

    let old_pages = crate::align_up!(self.committed, self.host_page);
    let new_pages = crate::align_up!(len, self.host_page);

    if new_pages > old_pages {
      self.protect(old_pages, new_pages - old_pages, libc::PROT_READ | libc::PROT_WRITE)?;
    } else if new_pages < old_pages {
      let released = old_pages - new_pages;
      unsafe {
        libc::madvise(
          self.base.as_ptr().add(new_pages) as *mut libc::c_void,
          released,
          libc::MADV_DONTNEED,
        );
      }
      self.protect(new_pages, released, libc::PROT_NONE)?;
    }

    if len < self.committed {
      // The tail of the last kept page stays mapped; clear it so a later
      // regrow reads zeros like freshly committed pages do.
      let tail = new_pages.min(self.committed) - len;
      unsafe { std::ptr::write_bytes(self.base.as_ptr().add(len), 0, tail) };
    }

    self.committed = len;
    Ok(())
  }

  fn bytes(&self) -> &[u8] {
    unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.committed) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.committed) }
  }
}

#[cfg(unix)]
impl Drop for MmapBacking {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.map_len());
    }
  }
}
