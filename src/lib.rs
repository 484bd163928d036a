//! # rmalloc - An Implicit Free-List Memory Allocator
//!
//! This crate provides an educational **implicit free-list allocator** in
//! Rust, modeled on the classic textbook design: boundary-tagged blocks,
//! first-fit placement, and eager coalescing over a fixed-capacity private
//! heap.
//!
//! ## Overview
//!
//! The allocator manages one contiguous 20 MiB segment as a sequence of
//! blocks. Every block carries its own metadata in-band:
//!
//! ```text
//!   Implicit Free List Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                          HEAP SEGMENT                                │
//!   │                                                                      │
//!   │  ┌────┬────────┬────────────┬────────┬──────────────────────┬────┐  │
//!   │  │ P  │ A: 24  │ B: 32 free │ C: 24  │     D: 4016 free     │ E  │  │
//!   │  └────┴────────┴────────────┴────────┴──────────────────────┴────┘  │
//!   │    ▲                                                           ▲    │
//!   │    │                                                           │    │
//!   │  Prologue                                                  Epilogue │
//!   │  (8 bytes, allocated)                          (0 bytes, allocated) │
//!   │                                                                      │
//!   │  Walking the list: next = current + current's size.                  │
//!   │  Free blocks are found by checking each block's allocated bit.       │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each block is bracketed by a 4-byte header and an identical 4-byte
//! footer (the *boundary tags*), encoding `size | allocated`. The footer is
//! what makes coalescing O(1): the previous block's size is always readable
//! just below the current block.
//!
//! ## Crate Structure
//!
//! ```text
//!   rmalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Boundary-tag word primitives (internal)
//!   ├── mem        - Fixed-capacity heap substrate (internal)
//!   └── freelist   - FreeListAllocator implementation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rmalloc::FreeListAllocator;
//!
//! fn main() {
//!     let mut allocator = FreeListAllocator::new();
//!
//!     unsafe {
//!         // Allocate memory for a u64 (initializes the heap lazily)
//!         let ptr = allocator.malloc(8) as *mut u64;
//!
//!         // Use the memory
//!         *ptr = 42;
//!         println!("Value: {}", *ptr);
//!
//!         // Free the memory (coalesces with free neighbors)
//!         allocator.free(ptr as *mut u8);
//!
//!         // Release the heap
//!         allocator.teardown();
//!     }
//! }
//! ```
//!
//! ## How It Works
//!
//! The heap substrate acquires a 20 MiB region once and exposes a
//! monotonic, capacity-capped `sbrk`:
//!
//! ```text
//!   Heap Segment Layout:
//!
//!   heap_start                         heap_brk              heap_max
//!       │                                 │                      │
//!       ▼                                 ▼                      ▼
//!       ┌─────────────────────────────────┬──────────────────────┐
//!       │   blocks (managed by freelist)  │       unused         │
//!       └─────────────────────────────────┴──────────────────────┘
//!                      20 MiB total, never returned
//! ```
//!
//! On top of it, the block allocator:
//!
//! - rounds every request up to a whole doubleword-aligned block
//!   (minimum 16 bytes: header + 8-byte payload + footer),
//! - scans the implicit list **first-fit** and splits the chosen block when
//!   the remainder is itself a legal block,
//! - extends the heap in 4 KiB chunks when no block fits,
//! - **eagerly coalesces** on free, so no two free blocks are ever adjacent.
//!
//! ## Features
//!
//! - **In-band metadata**: no side tables, the heap describes itself
//! - **O(1) coalescing**: boundary tags on both ends of every block
//! - **Deterministic placement**: first fit from the start of the heap
//! - **Self-checking**: `check_heap` walks and verifies the whole heap
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **First fit only**: no segregated or explicit free lists
//! - **Naive realloc**: always allocate-copy-free, never in place
//! - **Fixed capacity**: 20 MiB, and memory is never returned to the OS
//!   until teardown
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! All allocation and deallocation operations require `unsafe` blocks.
//! Callers must ensure:
//!
//! - Pointers returned from `malloc`/`realloc` are not used after `free`
//!   or `teardown`
//! - The same pointer is not freed twice
//! - Writes stay inside the allocated payload

pub mod align;
mod block;
mod freelist;
mod mem;

pub use freelist::FreeListAllocator;
pub use mem::OutOfMemory;
