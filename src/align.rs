/// Calculates the machine word alignment for the given size.
///
/// Every block size handed out by the heap is a multiple of the word size, so
/// headers, footers and payloads all start on word boundaries.
///
/// # Examples
///
/// ```rust
/// use rheap::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    (($value) + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
///
/// ```rust
/// use rheap::align_up;
///
/// assert_eq!(align_up!(0x1001, 0x1000), 0x2000);
/// assert_eq!(align_up!(0x2000, 0x1000), 0x2000);
/// ```
#[macro_export]
macro_rules! align_up {
  ($value:expr, $align:expr) => {
    (($value) + ($align) - 1) & !(($align) - 1)
  };
}

/// Rounds `value` down to the previous multiple of `align`, which must be a power of two.
#[macro_export]
macro_rules! align_down {
  ($value:expr, $align:expr) => {
    ($value) & !(($align) - 1)
  };
}

/// Whether `value` is a multiple of `align`, which must be a power of two.
#[macro_export]
macro_rules! is_aligned {
  ($value:expr, $align:expr) => {
    (($value) & (($align) - 1)) == 0
  };
}

#[cfg(test)]
mod tests {
  use std::mem;

  #[test]
  fn test_align() {
    let ptr_size = mem::size_of::<usize>();

    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ptr_size * i + 1)..=(ptr_size * (i + 1));

      let expected_alignment = ptr_size * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }
  }

  #[test]
  fn test_page_alignment() {
    let page = 0x1000usize;

    assert_eq!(align_up!(0usize, page), 0);
    assert_eq!(align_up!(1usize, page), page);
    assert_eq!(align_up!(page + 16, page), 2 * page);
    assert_eq!(align_down!(page + 16, page), page);
    assert_eq!(align_down!(page - 1, page), 0);

    assert!(is_aligned!(3 * page, page));
    assert!(!is_aligned!(3 * page + 8, page));
  }
}
