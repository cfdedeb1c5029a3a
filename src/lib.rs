//! # rheap - A Kernel-Style Heap Allocator
//!
//! This crate provides a `kmalloc`/`kfree` style heap that manages a
//! contiguous address range as a pool of variable-size blocks. Every block,
//! free or allocated, is bounded by a header and a footer, free blocks are
//! indexed by size, and freeing merges a block with its free neighbours.
//!
//! ## Overview
//!
//! ```text
//!   Heap Region:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                                                                      │
//!   │   ┌──────┬──────┬────────────┬──────┬───────────────────────────┐    │
//!   │   │ used │ free │    used    │ used │           free            │    │
//!   │   └──────┴──────┴────────────┴──────┴───────────────────────────┘    │
//!   │   ▲                                                             ▲    │   ▲
//!   │   │                                                             │    │   │
//!   │ start                                                          end   │  max
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Free list (ascending by size):  [ free(96) ] → [ free(0xe000) ]
//! ```
//!
//! An allocation takes the smallest hole that fits, splits off whatever is
//! left as a new hole and, for page-aligned requests, leaves the bytes in
//! front of the aligned block as a hole of their own. When nothing fits the
//! region grows towards `max`; when a free block ends the region, freeing it
//! gives the tail back.
//!
//! ## Crate Structure
//!
//! ```text
//!   rheap
//!   ├── align      - Alignment macros (align!, align_up!, align_down!, is_aligned!)
//!   ├── block      - Header/footer layout and the magic marker
//!   ├── free_list  - Size-ordered index of holes
//!   ├── backing    - Memory behind the region (Vec or mmap)
//!   ├── config     - Region bounds and page size
//!   ├── region     - HeapRegion, metadata accessors, inspection
//!   ├── search     - Smallest-sufficient hole search
//!   ├── hole       - Writing and indexing holes
//!   ├── growth     - Growing and contracting the region
//!   ├── alloc      - allocate
//!   ├── free       - deallocate with coalescing
//!   └── error      - HeapError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rheap::{HeapConfig, HeapRegion};
//!
//! let start = 0x10_0000;
//! let config = HeapConfig::new(start, start + 0x10_0000, start + 0x40_0000);
//! let mut heap = HeapRegion::new(config).unwrap();
//!
//! let ptr = heap.allocate(64, false).unwrap();
//! heap.payload_mut(ptr).unwrap()[..5].copy_from_slice(b"hello");
//!
//! let page = heap.allocate(256, true).unwrap();
//! assert_eq!(page % heap.page_size(), 0);
//!
//! heap.deallocate(ptr);
//! heap.deallocate(page);
//! assert_eq!(heap.holes().count(), 1);
//! ```
//!
//! ## Block Layout
//!
//! ```text
//!   ┌─────────────────────┬──────────────────────────┬─────────────────────┐
//!   │       Header        │         payload          │       Footer        │
//!   │  magic: 0x123890AB  │                          │  magic: 0x123890AB  │
//!   │  allocated: bool    │                          │  header: address    │
//!   │  size: whole block  │                          │                     │
//!   │      16 bytes       │                          │      16 bytes       │
//!   └─────────────────────┴──────────────────────────┴─────────────────────┘
//!                         ▲
//!                         └── Address returned to the caller
//! ```
//!
//! The footer lets `deallocate` find the block in front of the one being
//! freed; the header right after the footer is the block behind it.
//!
//! ## Limitations
//!
//! - **Single-threaded**: every mutating call takes `&mut self`; share a
//!   region between threads behind a lock
//! - **Smallest-fit only**: no size classes or slabs
//! - **Cheap corruption checks**: magic values and the allocated flag catch
//!   gross corruption and most double frees, not every misuse
//!
//! ## Safety
//!
//! The heap hands out addresses, not references. Payload bytes are reached
//! through [`HeapRegion::payload`] and [`HeapRegion::payload_mut`], which
//! check that the address belongs to an allocated block. The only `unsafe`
//! code lives in [`MmapBacking`], around `mmap`, `mprotect` and `munmap`.

pub mod align;
mod alloc;
pub mod backing;
mod block;
mod config;
mod error;
mod free;
mod free_list;
mod growth;
mod hole;
mod region;
mod search;

#[cfg(unix)]
pub use backing::MmapBacking;
pub use backing::{Backing, VecBacking};
pub use block::{FOOTER_SIZE, HEADER_SIZE, MAGIC, OVERHEAD};
pub use config::{DEFAULT_PAGE_SIZE, HeapConfig};
pub use error::{HeapError, Metadata};
pub use free_list::{FreeList, Hole, OrderedArray};
pub use region::{Address, BlockInfo, Blocks, HeapRegion, HeapStats, NULL};
