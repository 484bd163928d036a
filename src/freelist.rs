//! # Implicit Free-List Allocator
//!
//! The core of the crate: a block allocator that manages a fixed-capacity
//! heap segment as one contiguous run of boundary-tagged blocks.
//!
//! ## How It Works
//!
//! There is no separate free list. *Every* block, allocated or free, carries
//! its size in its header, so the whole heap can be walked by repeatedly
//! adding the current block's size to its address. Free blocks are found by
//! walking that implicit list and checking the allocated bit.
//!
//! ### Heap Layout
//!
//! ```text
//!                          HEAP SEGMENT (grows upward →)
//!
//!   ┌─────┬──────┬──────┬────────────────┬────────────────┬─────┬──────┐
//!   │ pad │ 8/1  │ 8/1  │ block …        │ block …        │ ... │ 0/1  │
//!   └─────┴──────┴──────┴────────────────┴────────────────┴─────┴──────┘
//!    4 B   ▲      ▲      ▲                                       ▲
//!          │      │      │                                       │
//!          │      │      └── first real block                    └── epilogue
//!          │      └── heap_listp anchors here                        header
//!          └── prologue (header + footer, no payload)
//!
//!   Tag format: <size / allocated?>  e.g. 8/1 = size 8, allocated
//! ```
//!
//! The two sentinel blocks remove every edge case from coalescing and
//! iteration:
//!
//! * **Prologue**: an 8-byte allocated block of just a header and footer.
//!   The first real block's "previous neighbor" is always this allocated
//!   sentinel, so coalescing never looks past the front of the heap.
//! * **Epilogue**: a single allocated header of size 0 at the very end. Its
//!   zero size terminates every walk, and its allocated bit stops coalescing
//!   from running off the back. Extending the heap overwrites the old
//!   epilogue with the new block's header and writes a fresh epilogue after
//!   it.
//!
//! ### Allocation (First Fit)
//!
//! ```text
//!   malloc(size):
//!
//!   1. asize = size rounded up to a whole block
//!      (header + footer + payload, multiple of 8, at least 16)
//!
//!   2. Walk from heap_listp:
//!      [8/1] → [24/1] → [32/0] → [48/1] → [4016/0] → [0/1]
//!                          │
//!                          └── first free block with size ≥ asize wins
//!
//!   3. place() the block:
//!      - remainder ≥ 16 bytes?  split it off as a new free block
//!      - otherwise              hand out the whole block (≤ 8 bytes slack)
//!
//!   4. No fit? extend the heap by max(asize, CHUNK_SIZE) and place there.
//! ```
//!
//! ### Deallocation and Coalescing
//!
//! Freeing rewrites the block's tags and then eagerly merges with free
//! neighbors, so two adjacent free blocks never exist:
//!
//! ```text
//!   Neighbors (prev, next)    Action
//!   ──────────────────────    ─────────────────────────────────────────
//!   allocated, allocated      nothing to merge
//!   allocated, free           absorb next block
//!   free,      allocated      absorb into previous block
//!   free,      free           previous block absorbs both
//! ```
//!
//! The footer makes the previous block's size readable at `bp - 8`, which is
//! what turns each of these merges into O(1) pointer arithmetic.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **First fit only**: no segregated or explicit free lists
//! - **Naive realloc**: always moves, never resizes in place
//! - **Fixed capacity**: the heap never grows past the segment and never
//!   returns memory to it

use std::{cmp, ptr};

use crate::block::{
  block_size, footer, get, header, is_allocated, next_block, pack, prev_block,
  put, DOUBLE_SIZE, MIN_BLOCK_SIZE, WORD_SIZE,
};
use crate::mem::{HeapSegment, OutOfMemory};
use crate::align;

/// Default heap-extension step. A miss in the free-list walk grows the heap
/// by at least this much, so runs of small allocations pay for one extension
/// instead of one each.
pub(crate) const CHUNK_SIZE: usize = 1 << 12; // 4 KiB

/// An implicit free-list allocator over a private fixed-capacity heap.
///
/// # Fields
///
/// * `segment` - the substrate that owns the 20 MiB region and its break
/// * `heap_listp` - payload address of the prologue block; the entry point
///   of every heap walk. Null until the allocator is initialized.
///
/// # Lifecycle
///
/// [`init`](Self::init) builds the sentinel skeleton and the first free
/// chunk. The allocation entry points call it lazily, so a fresh allocator
/// can be used directly. [`teardown`](Self::teardown) releases the segment
/// and invalidates every outstanding pointer.
///
/// # Thread Safety
///
/// This allocator is **NOT** thread-safe. For multi-threaded usage,
/// external synchronization (e.g. a `Mutex`) is required.
pub struct FreeListAllocator {
  /// Fixed-capacity memory segment backing the heap.
  segment: HeapSegment,

  /// Payload address of the prologue; anchor of the implicit list walk.
  heap_listp: *mut u8,
}

impl FreeListAllocator {
  /// Creates a new, uninitialized allocator.
  ///
  /// No memory is acquired until [`init`](Self::init) runs, either
  /// explicitly or lazily on the first allocation.
  pub const fn new() -> Self {
    Self {
      segment: HeapSegment::new(),
      heap_listp: ptr::null_mut(),
    }
  }

  /// Checks whether the heap has been initialized.
  pub fn is_initialized(&self) -> bool {
    !self.heap_listp.is_null()
  }

  /// Initializes the heap: acquires the segment, writes the sentinel
  /// skeleton, and extends by one [`CHUNK_SIZE`] so the first allocation
  /// does not pay the extension cost.
  ///
  /// The 16-byte skeleton, in address order:
  ///
  /// ```text
  ///   ┌──────────┬───────────────┬───────────────┬───────────────┐
  ///   │ pad: 0   │ prologue  8/1 │ prologue  8/1 │ epilogue  0/1 │
  ///   └──────────┴───────────────┴───────────────┴───────────────┘
  ///    4 bytes    header          footer ◄─ heap_listp
  /// ```
  ///
  /// The padding word shifts every payload onto a doubleword boundary.
  ///
  /// # Errors
  ///
  /// Returns [`OutOfMemory`] when the segment cannot be acquired or cannot
  /// hold the skeleton plus the first chunk.
  ///
  /// # Panics
  ///
  /// Panics if the allocator was already initialized.
  ///
  /// # Safety
  ///
  /// Must be paired with [`teardown`](Self::teardown) to release the
  /// segment.
  pub unsafe fn init(&mut self) -> Result<(), OutOfMemory> {
    unsafe {
      self.segment.init()?;

      let base = self.segment.sbrk(4 * WORD_SIZE);
      if base.is_null() {
        return Err(OutOfMemory);
      }

      put(base, 0); // alignment padding
      put(base.add(WORD_SIZE), pack(DOUBLE_SIZE, true)); // prologue header
      put(base.add(2 * WORD_SIZE), pack(DOUBLE_SIZE, true)); // prologue footer
      put(base.add(3 * WORD_SIZE), pack(0, true)); // epilogue header

      // The walk anchors at the prologue's payload address, which is the
      // prologue footer: next_block() from here lands on the first real
      // block.
      self.heap_listp = base.add(2 * WORD_SIZE);

      if self.extend_heap(CHUNK_SIZE).is_null() {
        return Err(OutOfMemory);
      }

      Ok(())
    }
  }

  /// Allocates `size` bytes and returns an 8-byte-aligned payload pointer.
  ///
  /// Initializes the heap lazily if needed. Returns null when `size` is
  /// zero or when the heap cannot be extended far enough.
  ///
  /// # Size Adjustment
  ///
  /// ```text
  ///   requested size      block size handed out (asize)
  ///   ──────────────      ─────────────────────────────
  ///   0                   none (returns null)
  ///   1 ..= 8             16  (minimum block)
  ///   n > 8               round_up(n + 8, 8)
  /// ```
  ///
  /// The extra 8 bytes hold the header and footer.
  ///
  /// # Safety
  ///
  /// The returned pointer is valid until the block is freed, reallocated,
  /// or the allocator is torn down. The caller must not write outside the
  /// `size` bytes of the payload.
  pub unsafe fn malloc(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      if self.heap_listp.is_null() && self.init().is_err() {
        return ptr::null_mut();
      }

      if size == 0 {
        return ptr::null_mut();
      }

      let asize = if size <= DOUBLE_SIZE {
        MIN_BLOCK_SIZE
      } else {
        align!(size + DOUBLE_SIZE)
      };

      let block_ptr = self.find_fit(asize);
      if !block_ptr.is_null() {
        self.place(block_ptr, asize);
        return block_ptr;
      }

      // No block fits: grow the heap by at least one chunk and place the
      // request in the fresh block.
      let extend_size = cmp::max(asize, CHUNK_SIZE);
      let block_ptr = self.extend_heap(extend_size);
      if block_ptr.is_null() {
        return ptr::null_mut();
      }

      self.place(block_ptr, asize);
      block_ptr
    }
  }

  /// Frees the block at `block_ptr` and eagerly coalesces it with free
  /// neighbors.
  ///
  /// Freeing null is a no-op, matching C `free()`.
  ///
  /// # Safety
  ///
  /// `block_ptr` must be null or a pointer previously returned by
  /// [`malloc`](Self::malloc) or [`realloc`](Self::realloc) on this
  /// allocator and not freed since. Double frees and foreign pointers are
  /// undefined behavior; no validation is performed.
  pub unsafe fn free(
    &mut self,
    block_ptr: *mut u8,
  ) {
    unsafe {
      if block_ptr.is_null() {
        return;
      }

      let size = block_size(header(block_ptr));

      put(header(block_ptr), pack(size, false));
      put(footer(block_ptr), pack(size, false));

      self.coalesce(block_ptr);
    }
  }

  /// Resizes the allocation at `block_ptr` to `size` bytes.
  ///
  /// The strategy is naive: allocate a new block, copy the payload, free
  /// the old block. The leading `min(old payload size, size)` bytes of the
  /// new block equal the old contents.
  ///
  /// Degenerate forms match C `realloc`:
  ///
  /// * `size == 0` frees the block and returns null
  /// * null `block_ptr` behaves like [`malloc`](Self::malloc)
  ///
  /// On allocation failure the original block is left untouched and null is
  /// returned.
  ///
  /// # Safety
  ///
  /// Same pointer rules as [`free`](Self::free). The payload is moved with
  /// a byte-wise copy, so it must only hold trivially copyable data.
  pub unsafe fn realloc(
    &mut self,
    block_ptr: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      if size == 0 {
        self.free(block_ptr);
        return ptr::null_mut();
      }

      if block_ptr.is_null() {
        return self.malloc(size);
      }

      let new_ptr = self.malloc(size);
      if new_ptr.is_null() {
        return ptr::null_mut();
      }

      // The header counts the header and footer words; the payload is 8
      // bytes shorter.
      let old_payload = block_size(header(block_ptr)) - DOUBLE_SIZE;
      let copy_len = cmp::min(old_payload, size);
      ptr::copy_nonoverlapping(block_ptr, new_ptr, copy_len);

      self.free(block_ptr);

      new_ptr
    }
  }

  /// Walks the heap and prints a diagnostic for every violated invariant:
  /// a bad prologue, a misaligned payload, a header/footer mismatch, or a
  /// bad epilogue. With `verbose` set, also prints every block's address,
  /// size, and allocated flag.
  ///
  /// Never modifies the heap. Does nothing before initialization.
  ///
  /// # Safety
  ///
  /// The heap must not be corrupted in a way that breaks the walk itself
  /// (e.g. a size word smashed to a value that jumps past the epilogue).
  pub unsafe fn check_heap(
    &self,
    verbose: bool,
  ) {
    unsafe {
      if self.heap_listp.is_null() {
        return;
      }

      if verbose {
        println!("Heap ({:p}):", self.heap_listp);
      }

      if block_size(header(self.heap_listp)) != DOUBLE_SIZE
        || !is_allocated(header(self.heap_listp))
      {
        println!("Bad prologue header");
      }

      let mut block_ptr = self.heap_listp;
      while block_size(header(block_ptr)) > 0 {
        if verbose {
          print_block(block_ptr);
        }
        check_block(block_ptr);

        block_ptr = next_block(block_ptr);
      }

      if verbose {
        print_block(block_ptr);
      }

      if block_size(header(block_ptr)) != 0 || !is_allocated(header(block_ptr)) {
        println!("Bad epilogue header");
      }
    }
  }

  /// Releases the heap segment and resets the allocator.
  ///
  /// A later allocation re-initializes the heap lazily from scratch.
  ///
  /// # Safety
  ///
  /// Every pointer handed out by this allocator becomes dangling; the
  /// caller must not use any of them afterwards.
  pub unsafe fn teardown(&mut self) {
    unsafe {
      self.segment.teardown();
    }
    self.heap_listp = ptr::null_mut();
  }

  /// First-fit search over the implicit list.
  ///
  /// Walks from `heap_listp`, following header sizes, until the zero-sized
  /// epilogue. Returns the first free block with size ≥ `asize`, or null.
  /// Deterministic: the same heap state always yields the same block.
  unsafe fn find_fit(
    &self,
    asize: usize,
  ) -> *mut u8 {
    unsafe {
      let mut block_ptr = self.heap_listp;

      while block_size(header(block_ptr)) > 0 {
        if !is_allocated(header(block_ptr)) && asize <= block_size(header(block_ptr)) {
          return block_ptr;
        }
        block_ptr = next_block(block_ptr);
      }

      ptr::null_mut()
    }
  }

  /// Places an `asize`-byte allocation at the free block `block_ptr`.
  ///
  /// Splits the block when the remainder would still be a legal block:
  ///
  /// ```text
  ///   before:  [          free, curr_size           ]
  ///
  ///   remainder ≥ 16:
  ///   after:   [ alloc, asize ][ free, curr - asize ]
  ///
  ///   remainder < 16:
  ///   after:   [       alloc, curr_size             ]   (≤ 8 bytes slack)
  /// ```
  unsafe fn place(
    &mut self,
    block_ptr: *mut u8,
    asize: usize,
  ) {
    unsafe {
      let curr_size = block_size(header(block_ptr));

      if curr_size - asize >= MIN_BLOCK_SIZE {
        put(header(block_ptr), pack(asize, true));
        put(footer(block_ptr), pack(asize, true));

        let remainder = next_block(block_ptr);
        put(header(remainder), pack(curr_size - asize, false));
        put(footer(remainder), pack(curr_size - asize, false));
      } else {
        put(header(block_ptr), pack(curr_size, true));
        put(footer(block_ptr), pack(curr_size, true));
      }
    }
  }

  /// Extends the heap by at least `bytes` (rounded up to a doubleword).
  ///
  /// The `sbrk` return value is the payload address of the new block: its
  /// header overwrites the old epilogue word, and a fresh epilogue is
  /// written after its footer. The new block is coalesced with the previous
  /// tail, so a free tail keeps growing instead of fragmenting:
  ///
  /// ```text
  ///   before:  … [ tail block ][ 0/1 ]◄─ brk
  ///   after:   … [ tail block ][ size/0 …………… ][ 0/1 ]◄─ brk
  ///                            ▲
  ///                            └── old epilogue became the new header
  /// ```
  ///
  /// Returns the (possibly coalesced) block, or null when the substrate is
  /// exhausted.
  unsafe fn extend_heap(
    &mut self,
    bytes: usize,
  ) -> *mut u8 {
    unsafe {
      let size = align!(bytes);

      let block_ptr = self.segment.sbrk(size);
      if block_ptr.is_null() {
        return ptr::null_mut();
      }

      log::trace!("extended heap by {} bytes", size);

      put(header(block_ptr), pack(size, false));
      put(footer(block_ptr), pack(size, false));
      // new epilogue, right after the new footer
      put(header(next_block(block_ptr)), pack(0, true));

      self.coalesce(block_ptr)
    }
  }

  /// Merges the free block at `block_ptr` with free immediate neighbors.
  ///
  /// Reads the previous block's footer and the next block's header, then
  /// rewrites the boundary tags of the merged extent so that its header and
  /// footer carry identical encodings. Returns the payload address of the
  /// merged block (which moves backwards when the previous block absorbs
  /// it). The sentinels are allocated, so the merge never crosses either
  /// end of the heap.
  unsafe fn coalesce(
    &mut self,
    block_ptr: *mut u8,
  ) -> *mut u8 {
    unsafe {
      let prev_allocated = is_allocated(footer(prev_block(block_ptr)));
      let next_allocated = is_allocated(header(next_block(block_ptr)));

      let mut size = block_size(header(block_ptr));

      if prev_allocated && next_allocated {
        // case 1: nothing to merge
        block_ptr
      } else if prev_allocated && !next_allocated {
        // case 2: absorb the next block
        size += block_size(header(next_block(block_ptr)));

        put(header(block_ptr), pack(size, false));
        // footer() follows the freshly written header size, so this lands
        // on the absorbed block's footer.
        put(footer(block_ptr), pack(size, false));

        block_ptr
      } else if !prev_allocated && next_allocated {
        // case 3: the previous block absorbs this one
        let prev_ptr = prev_block(block_ptr);
        size += block_size(header(prev_ptr));

        put(footer(block_ptr), pack(size, false));
        put(header(prev_ptr), pack(size, false));

        prev_ptr
      } else {
        // case 4: the previous block absorbs this one and the next
        let prev_ptr = prev_block(block_ptr);
        let next_ptr = next_block(block_ptr);
        size += block_size(header(prev_ptr)) + block_size(header(next_ptr));

        put(header(prev_ptr), pack(size, false));
        put(footer(next_ptr), pack(size, false));

        prev_ptr
      }
    }
  }
}

/// Prints one block's tags, or an EOL marker for the epilogue.
unsafe fn print_block(block_ptr: *mut u8) {
  unsafe {
    let hsize = block_size(header(block_ptr));
    let halloc = is_allocated(header(block_ptr));

    if hsize == 0 {
      println!("{:p}: EOL", block_ptr);
      return;
    }

    let fsize = block_size(footer(block_ptr));
    let falloc = is_allocated(footer(block_ptr));

    println!(
      "{:p}: header: [{}:{}], footer: [{}:{}]",
      block_ptr,
      hsize,
      if halloc { 'a' } else { 'f' },
      fsize,
      if falloc { 'a' } else { 'f' },
    );
  }
}

/// Prints a diagnostic when the block's payload is misaligned or its header
/// and footer disagree.
unsafe fn check_block(block_ptr: *mut u8) {
  unsafe {
    if (block_ptr as usize) % DOUBLE_SIZE != 0 {
      println!("Error: {:p} is not doubleword aligned", block_ptr);
    }

    if get(header(block_ptr)) != get(footer(block_ptr)) {
      println!("Error: header does not match footer");
    }
  }
}
