use std::io::Read;

use rheap::{HeapConfig, HeapError, HeapRegion, MmapBacking};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the mapping with `pmap` while the heap
/// grows and contracts.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_heap(
  label: &str,
  heap: &HeapRegion<MmapBacking>,
) {
  let stats = heap.stats();
  println!(
    "[{}] PID = {}, region = {:#x} bytes, free = {:#x} bytes in {} hole(s)",
    label,
    std::process::id(),
    stats.region_size,
    stats.free_bytes,
    stats.holes,
  );
  print!("{heap}");
}

fn main() -> Result<(), HeapError> {
  // A 1 MiB heap that may grow to 4 MiB. The addresses are logical: byte
  // `start + i` lives at offset `i` of an anonymous mapping.
  let start = 0x10_0000;
  let config = HeapConfig::new(start, start + 0x10_0000, start + 0x40_0000);
  let mut heap = HeapRegion::mmap(config)?;

  print_heap("start", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Two small allocations, carved one after the other from the
  //    initial hole.
  // --------------------------------------------------------------------
  let a = heap.allocate(64, false)?;
  let b = heap.allocate(64, false)?;
  heap.payload_mut(a)?[..4].copy_from_slice(&0xDEAD_BEEF_u32.to_le_bytes());
  println!("\n[1] a = {a:#x}, b = {b:#x}");
  print_heap("1", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free `a` and ask for something smaller. The smallest hole that
  //    fits is the one `a` left behind.
  // --------------------------------------------------------------------
  heap.deallocate(a);
  let c = heap.allocate(32, false)?;
  println!(
    "\n[2] c = {c:#x}, reused a's block? {}",
    if c == a { "Yes" } else { "No" }
  );
  print_heap("2", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A page-aligned allocation from a hole that starts mid-page. The
  //    bytes in front of the aligned block stay free.
  // --------------------------------------------------------------------
  let page = heap.allocate(512, true)?;
  println!(
    "\n[3] page = {page:#x}, page % {:#x} = {}",
    heap.page_size(),
    page % heap.page_size()
  );
  print_heap("3", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A request larger than any hole grows the region towards max.
  // --------------------------------------------------------------------
  let big = heap.allocate(0x18_0000, false)?;
  println!("\n[4] big = {big:#x}, usable = {:#x}", heap.usable_size(big)?);
  print_heap("4", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) More than max can hold fails and leaves the heap as it was.
  // --------------------------------------------------------------------
  match heap.allocate(0x40_0000, false) {
    Ok(ptr) => println!("\n[5] unexpectedly got {ptr:#x}"),
    Err(err) => println!("\n[5] {err}"),
  }
  print_heap("5", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Free everything. Neighbouring holes merge and the free tail is
  //    given back until the region is its initial size again.
  // --------------------------------------------------------------------
  for ptr in [big, page, b, c] {
    heap.deallocate(ptr);
  }
  heap.check()?;
  print_heap("end", &heap);

  Ok(())
}
