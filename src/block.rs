//! Block metadata: the header and footer bounding every block.
//!
//! ```text
//!   ┌──────────────┬──────────────────────────────┬──────────────┐
//!   │    Header    │           payload            │    Footer    │
//!   │   16 bytes   │                              │   16 bytes   │
//!   └──────────────┴──────────────────────────────┴──────────────┘
//!   ▲              ▲                                             ▲
//!   addr           addr + HEADER_SIZE                 addr + size - 1
//! ```
//!
//! Both structures are stored little-endian at fixed offsets:
//!
//! ```text
//!   Header: [0..4) magic  [4] allocated  [5..8) zero  [8..16) size
//!   Footer: [0..4) magic  [4..8) zero                 [8..16) header address
//! ```

/// Validity marker written into every header and footer.
pub const MAGIC: u32 = 0x1238_90AB;

pub const HEADER_SIZE: usize = 16;
pub const FOOTER_SIZE: usize = 16;

/// Smallest possible block: a header and a footer with no payload.
pub const OVERHEAD: usize = HEADER_SIZE + FOOTER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
  pub magic: u32,
  pub allocated: bool,
  /// Whole block span, header and footer included.
  pub size: usize,
}

impl Header {
  pub fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    Self {
      magic: MAGIC,
      allocated,
      size,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.magic == MAGIC
  }

  pub fn encode(&self) -> [u8; HEADER_SIZE] {
    let mut raw = [0u8; HEADER_SIZE];
    raw[0..4].copy_from_slice(&self.magic.to_le_bytes());
    raw[4] = self.allocated as u8;
    raw[8..16].copy_from_slice(&(self.size as u64).to_le_bytes());
    raw
  }

  pub fn decode(raw: &[u8; HEADER_SIZE]) -> Self {
    Self {
      magic: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
      allocated: raw[4] != 0,
      size: read_u64(raw) as usize,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
  pub magic: u32,
  /// Address of the header that opens this block.
  pub header: usize,
}

impl Footer {
  pub fn new(header: usize) -> Self {
    Self { magic: MAGIC, header }
  }

  pub fn is_valid(&self) -> bool {
    self.magic == MAGIC
  }

  pub fn encode(&self) -> [u8; FOOTER_SIZE] {
    let mut raw = [0u8; FOOTER_SIZE];
    raw[0..4].copy_from_slice(&self.magic.to_le_bytes());
    raw[8..16].copy_from_slice(&(self.header as u64).to_le_bytes());
    raw
  }

  pub fn decode(raw: &[u8; FOOTER_SIZE]) -> Self {
    Self {
      magic: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
      header: read_u64(raw) as usize,
    }
  }
}

fn read_u64(raw: &[u8; 16]) -> u64 {
  let mut word = [0u8; 8];
  word.copy_from_slice(&raw[8..16]);
  u64::from_le_bytes(word)
}
