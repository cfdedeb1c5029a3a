// Behavioural properties of the heap, driven through the public API.

use rheap::{Backing, BlockInfo, HeapConfig, HeapError, HeapRegion, Hole, OVERHEAD};

const START: usize = 0x10_0000;
const PAGE: usize = 0x1000;

fn region(
  size: usize,
  max: usize,
) -> HeapRegion {
  HeapRegion::new(HeapConfig::new(START, START + size, START + max)).unwrap()
}

fn blocks(heap: &HeapRegion) -> Vec<BlockInfo> {
  heap.blocks().collect::<Result<_, _>>().unwrap()
}

/// Deterministic xorshift sequence so failures reproduce.
struct Rng(u64);

impl Rng {
  fn next(&mut self) -> u64 {
    self.0 ^= self.0 << 13;
    self.0 ^= self.0 >> 7;
    self.0 ^= self.0 << 17;
    self.0
  }

  fn below(
    &mut self,
    bound: usize,
  ) -> usize {
    (self.next() % bound as u64) as usize
  }
}

fn assert_invariants(heap: &HeapRegion) {
  heap.check().unwrap();

  let blocks = blocks(heap);
  let total: usize = blocks.iter().map(|b| b.size).sum();
  assert_eq!(total, heap.size(), "block sizes must cover the region");
  assert!(
    blocks.windows(2).all(|pair| pair[0].allocated || pair[1].allocated),
    "two neighbouring free blocks"
  );
}

#[test]
fn random_operations_keep_invariants() {
  let mut heap = region(0x4000, 0x4_0000);
  let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
  let mut live: Vec<(usize, usize, u8)> = Vec::new();

  for step in 0..2000 {
    if live.is_empty() || rng.below(3) > 0 {
      let size = rng.below(0x900);
      let aligned = rng.below(8) == 0;
      match heap.allocate(size, aligned) {
        Ok(ptr) => {
          let fill = (step % 251) as u8;
          heap.payload_mut(ptr).unwrap()[..size].fill(fill);
          if aligned {
            assert_eq!(ptr % PAGE, 0);
          }
          live.push((ptr, size, fill));
        }
        Err(HeapError::OutOfMemory { .. }) => {}
        Err(err) => panic!("step {step}: {err}"),
      }
    } else {
      let (ptr, size, fill) = live.swap_remove(rng.below(live.len()));
      assert!(
        heap.payload(ptr).unwrap()[..size].iter().all(|&b| b == fill),
        "step {step}: payload at {ptr:#x} was overwritten"
      );
      heap.deallocate(ptr);
    }

    assert_invariants(&heap);
  }

  for (ptr, _, _) in live.drain(..) {
    heap.deallocate(ptr);
    assert_invariants(&heap);
  }

  assert_eq!(heap.size(), 0x4000);
  assert_eq!(
    heap.holes().collect::<Vec<_>>(),
    vec![Hole {
      addr: START,
      size: 0x4000
    }]
  );
}

#[test]
fn round_trip_restores_free_list() {
  let mut heap = region(0x1_0000, 0x1_0000);
  let keep: Vec<usize> = (0..6).map(|i| heap.allocate(40 + i * 100, false).unwrap()).collect();
  heap.deallocate(keep[1]);
  heap.deallocate(keep[3]);

  for size in [0, 8, 40, 100, 300, 0x800] {
    for aligned in [false, true] {
      let before = heap.stats();

      let ptr = heap.allocate(size, aligned).unwrap();
      heap.deallocate(ptr);

      let after = heap.stats();
      assert_eq!(after.holes, before.holes, "size {size} aligned {aligned}");
      assert_eq!(after.free_bytes, before.free_bytes, "size {size} aligned {aligned}");
      assert_invariants(&heap);
    }
  }
}

#[test]
fn capacity_is_at_least_the_request() {
  let mut heap = region(0x1_0000, 0x10_0000);

  for size in [0, 1, 7, 8, 9, 63, 64, 65, 1000, 4095, 4096, 10_000] {
    for aligned in [false, true] {
      let ptr = heap.allocate(size, aligned).unwrap();
      let usable = heap.usable_size(ptr).unwrap();
      assert!(usable >= size);

      // The next header starts right after the usable bytes.
      let block = blocks(&heap).into_iter().find(|b| b.payload() == ptr).unwrap();
      assert_eq!(block.size - OVERHEAD, usable);
      assert_eq!(heap.payload(ptr).unwrap().len(), usable);
    }
  }
  assert_invariants(&heap);
}

#[test]
fn out_of_memory_is_deterministic() {
  // Non-aligned requests: the whole region up to max is one block.
  for (size, expect_ok) in [
    (0x4000 - OVERHEAD, true),
    (0x4000 - OVERHEAD + 8, false),
    (0x4000, false),
  ] {
    let mut heap = region(PAGE, 0x4000);
    let result = heap.allocate(size, false);

    assert_eq!(result.is_ok(), expect_ok, "size {size:#x}");
    if !expect_ok {
      assert!(matches!(result, Err(HeapError::OutOfMemory { .. })));
      assert_eq!(heap.size(), PAGE);
      assert_eq!(
        heap.holes().collect::<Vec<_>>(),
        vec![Hole {
          addr: START,
          size: PAGE
        }]
      );
    }
    assert_invariants(&heap);
  }

  // Aligned requests: the payload can start one header into the region at
  // the earliest, at the first page boundary.
  let mut heap = region(PAGE, 0x4000);
  assert!(matches!(
    heap.allocate(0x4000 - PAGE, true),
    Err(HeapError::OutOfMemory { .. })
  ));
  assert_eq!(heap.size(), PAGE);
  let ptr = heap.allocate(0x4000 - PAGE - 16, true).unwrap();
  assert_eq!(ptr, START + PAGE);
  assert_invariants(&heap);
}

#[test]
fn scenario_reuse_vacated_hole() {
  let mut heap = region(0x10_0000, 0x40_0000);
  let initial: Vec<Hole> = heap.holes().collect();

  let a = heap.allocate(64, false).unwrap();
  let b = heap.allocate(64, false).unwrap();
  heap.deallocate(a);

  let c = heap.allocate(32, false).unwrap();
  assert!(c - 16 >= a - 16 && c < b - 16, "carved from the vacated hole");
  assert_eq!(c, a);
  assert_invariants(&heap);

  heap.deallocate(b);
  heap.deallocate(c);

  assert_eq!(heap.holes().collect::<Vec<_>>(), initial);
  assert_eq!(heap.size(), 0x10_0000);
  assert_eq!(blocks(&heap).len(), 1);
  assert_invariants(&heap);
}

#[test]
fn scenario_aligned_allocation_from_mid_page_hole() {
  let mut heap = region(0x4000, 0x4000);
  let first = heap.allocate(200, false).unwrap();
  let hole_start = first - 16 + 200 + OVERHEAD;
  assert_eq!(heap.holes().count(), 1);

  let ptr = heap.allocate(512, true).unwrap();

  assert_eq!(ptr % PAGE, 0);
  let prefix = heap.holes().find(|hole| hole.addr == hole_start).unwrap();
  assert_eq!(prefix.addr + prefix.size, ptr - 16);
  assert_eq!(heap.holes().count(), 2);
  assert_invariants(&heap);

  heap.deallocate(ptr);
  heap.deallocate(first);
  assert_eq!(heap.holes().count(), 1);
  assert_invariants(&heap);
}

#[test]
fn growth_and_contraction_cycle() {
  let config = HeapConfig::new(START, START + PAGE, START + 0x20_0000).with_min_size(PAGE);
  let mut heap = HeapRegion::new(config).unwrap();

  let ptrs: Vec<usize> = (0..32).map(|_| heap.allocate(0x1000, false).unwrap()).collect();
  assert!(heap.size() >= 32 * 0x1000);
  assert_invariants(&heap);

  for ptr in ptrs.into_iter().rev() {
    heap.deallocate(ptr);
    assert_invariants(&heap);
  }

  assert_eq!(heap.size(), PAGE);
  assert_eq!(heap.backing().committed(), PAGE);
}

#[test]
fn explicit_resize_policy() {
  let mut heap = region(0x2000, 0x8000);
  let ptr = heap.allocate(0x1800, false).unwrap();

  heap.resize(0x6000).unwrap();
  assert_eq!(heap.size(), 0x6000);
  assert_invariants(&heap);

  assert!(matches!(heap.resize(0x9000), Err(HeapError::OutOfMemory { .. })));
  assert!(matches!(heap.resize(0x1000), Err(HeapError::ShrinkTruncates { .. })));
  assert_eq!(heap.size(), 0x6000);

  heap.resize(0x2000).unwrap();
  assert_eq!(heap.size(), 0x2000);
  assert_invariants(&heap);

  heap.deallocate(ptr);
  assert_invariants(&heap);
}

#[test]
fn independent_regions_on_threads() {
  let handles: Vec<_> = (0..4)
    .map(|i| {
      std::thread::spawn(move || {
        let mut heap = region(0x4000, 0x1_0000);
        let ptrs: Vec<usize> = (1..50).map(|n| heap.allocate(n * (i + 1), n % 7 == 0).unwrap()).collect();
        for ptr in ptrs {
          heap.deallocate(ptr);
        }
        heap.check().map(|_| heap.stats().holes)
      })
    })
    .collect();

  for handle in handles {
    assert_eq!(handle.join().unwrap().unwrap(), 1);
  }
}

#[cfg(unix)]
#[test]
fn mmap_backed_region() {
  let config = HeapConfig::new(START, START + PAGE, START + 0x10_0000);
  let mut heap = HeapRegion::mmap(config).unwrap();

  let big = heap.allocate(0x8000, false).unwrap();
  let aligned = heap.allocate(100, true).unwrap();
  assert_eq!(aligned % PAGE, 0);

  heap.payload_mut(big).unwrap().fill(0xCD);
  heap.payload_mut(aligned).unwrap()[..4].copy_from_slice(&[1, 2, 3, 4]);
  assert!(heap.payload(big).unwrap().iter().all(|&b| b == 0xCD));
  assert_eq!(&heap.payload(aligned).unwrap()[..4], &[1, 2, 3, 4]);
  heap.check().unwrap();

  heap.deallocate(big);
  heap.deallocate(aligned);

  assert_eq!(heap.size(), PAGE);
  assert_eq!(heap.holes().count(), 1);
  heap.check().unwrap();
}
