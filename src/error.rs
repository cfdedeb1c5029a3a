use std::{fmt, io};

use thiserror::Error;

/// Which half of a block's metadata failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metadata {
  Header,
  Footer,
}

impl fmt::Display for Metadata {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Metadata::Header => f.write_str("header"),
      Metadata::Footer => f.write_str("footer"),
    }
  }
}

#[derive(Debug, Error)]
pub enum HeapError {
  #[error("out of memory: region of {requested:#x} bytes requested, limit is {limit:#x}")]
  OutOfMemory { requested: usize, limit: usize },
  #[error("invalid configuration: {0}")]
  InvalidConfig(&'static str),
  #[error("invalid region bounds: start={start:#x} end={end:#x} max={max:#x}")]
  InvalidBounds { start: usize, end: usize, max: usize },
  #[error("address {addr:#x} is outside the region")]
  OutOfRange { addr: usize },
  #[error("corrupted block {metadata} at {addr:#x}")]
  Corruption { addr: usize, metadata: Metadata },
  #[error("double free of block at {addr:#x}")]
  DoubleFree { addr: usize },
  #[error("shrinking the region to end at {target:#x} would truncate an allocated block")]
  ShrinkTruncates { target: usize },
  #[error("heap invariant violated: {0}")]
  Invariant(String),
  #[error("backing memory: {0}")]
  Backing(#[from] io::Error),
}

impl HeapError {
  /// Errors after which walking the region's metadata is no longer safe.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      HeapError::OutOfRange { .. } | HeapError::Corruption { .. } | HeapError::DoubleFree { .. }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_messages() {
    let err = HeapError::Corruption {
      addr: 0x1000,
      metadata: Metadata::Footer,
    };
    assert_eq!(err.to_string(), "corrupted block footer at 0x1000");

    let err = HeapError::OutOfMemory {
      requested: 0x5000,
      limit: 0x4000,
    };
    assert_eq!(
      err.to_string(),
      "out of memory: region of 0x5000 bytes requested, limit is 0x4000"
    );
  }

  #[test]
  fn test_fatal_classification() {
    assert!(HeapError::DoubleFree { addr: 0 }.is_fatal());
    assert!(HeapError::OutOfRange { addr: 0 }.is_fatal());
    assert!(!HeapError::ShrinkTruncates { target: 0 }.is_fatal());
    assert!(
      !HeapError::OutOfMemory {
        requested: 1,
        limit: 0
      }
      .is_fatal()
    );
  }
}
