//! The index of free holes.
//!
//! An [`OrderedArray`] keeps its items sorted by a caller-supplied
//! `less_than` comparator. The heap instantiates it with [`Hole`] entries
//! ordered by size, so the first entry that fits a request is also the
//! smallest one that does.

use std::slice;

/// A free block as seen by the index: where it starts and how large it is.
///
/// `size` mirrors the block header and is kept in sync by the heap: an entry
/// whose block changes size is removed and inserted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hole {
  pub addr: usize,
  pub size: usize,
}

/// Orders holes ascending by size.
pub fn hole_less_than(
  a: &Hole,
  b: &Hole,
) -> bool {
  a.size < b.size
}

pub struct OrderedArray<T> {
  items: Vec<T>,
  less_than: fn(&T, &T) -> bool,
}

pub type FreeList = OrderedArray<Hole>;

impl<T> OrderedArray<T> {
  pub fn new(less_than: fn(&T, &T) -> bool) -> Self {
    Self {
      items: Vec::new(),
      less_than,
    }
  }

  /// Inserts `item` in front of the first element that is not less than it
  /// and returns its index.
  pub fn insert(
    &mut self,
    item: T,
  ) -> usize {
    let less_than = self.less_than;
    let index = self.items.partition_point(|existing| less_than(existing, &item));
    self.items.insert(index, item);
    index
  }

  pub fn lookup(
    &self,
    index: usize,
  ) -> Option<&T> {
    self.items.get(index)
  }

  pub fn remove_at(
    &mut self,
    index: usize,
  ) -> Option<T> {
    (index < self.items.len()).then(|| self.items.remove(index))
  }

  /// Index of the first element for which `pred` is false. `pred` must be
  /// true for a prefix of the array and false for the rest.
  pub fn partition_point(
    &self,
    pred: impl FnMut(&T) -> bool,
  ) -> usize {
    self.items.partition_point(pred)
  }

  pub fn position(
    &self,
    pred: impl FnMut(&T) -> bool,
  ) -> Option<usize> {
    self.items.iter().position(pred)
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> slice::Iter<'_, T> {
    self.items.iter()
  }
}

impl FreeList {
  pub fn by_size() -> Self {
    Self::new(hole_less_than)
  }

  /// Removes the hole that starts at `addr`, scanning linearly.
  pub fn remove_addr(
    &mut self,
    addr: usize,
  ) -> Option<Hole> {
    let index = self.position(|hole| hole.addr == addr)?;
    self.remove_at(index)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hole(
    addr: usize,
    size: usize,
  ) -> Hole {
    Hole { addr, size }
  }

  #[test]
  fn test_insert_keeps_ascending_size() {
    let mut list = FreeList::by_size();

    list.insert(hole(0x3000, 300));
    list.insert(hole(0x1000, 100));
    list.insert(hole(0x4000, 400));
    list.insert(hole(0x2000, 200));

    let sizes: Vec<usize> = list.iter().map(|h| h.size).collect();
    assert_eq!(sizes, vec![100, 200, 300, 400]);
  }

  #[test]
  fn test_equal_sizes_insert_in_front() {
    let mut list = FreeList::by_size();

    list.insert(hole(0x1000, 64));
    let index = list.insert(hole(0x2000, 64));

    assert_eq!(index, 0);
    assert_eq!(list.lookup(0), Some(&hole(0x2000, 64)));
  }

  #[test]
  fn test_remove() {
    let mut list = FreeList::by_size();
    list.insert(hole(0x1000, 100));
    list.insert(hole(0x2000, 200));
    list.insert(hole(0x3000, 300));

    assert_eq!(list.remove_addr(0x2000), Some(hole(0x2000, 200)));
    assert_eq!(list.remove_addr(0x2000), None);
    assert_eq!(list.remove_at(5), None);
    assert_eq!(list.remove_at(0), Some(hole(0x1000, 100)));
    assert_eq!(list.len(), 1);
  }

  #[test]
  fn test_partition_point_finds_smallest_sufficient() {
    let mut list = FreeList::by_size();
    for (i, size) in [32, 96, 96, 512, 4096].into_iter().enumerate() {
      list.insert(hole(i * 0x1000, size));
    }

    assert_eq!(list.partition_point(|h| h.size < 64), 1);
    assert_eq!(list.partition_point(|h| h.size < 96), 1);
    assert_eq!(list.partition_point(|h| h.size < 97), 3);
    assert_eq!(list.partition_point(|h| h.size < 5000), list.len());
  }

  #[test]
  fn test_generic_comparator() {
    let mut descending = OrderedArray::new(|a: &u32, b: &u32| a > b);
    for value in [3, 9, 1, 5] {
      descending.insert(value);
    }

    assert_eq!(descending.iter().copied().collect::<Vec<_>>(), vec![9, 5, 3, 1]);
    assert!(!descending.is_empty());
  }
}
