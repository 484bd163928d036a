use rmalloc::FreeListAllocator;

/// A short tour of the implicit free-list allocator. Each step prints what
/// happened; the heap dumps come from `check_heap(true)`, which walks the
/// boundary tags and prints every block as `address: header: [size:flag]`.
fn main() {
  // Our allocator. It holds:
  // - a fixed-capacity heap segment (20 MiB, acquired lazily)
  // - `heap_listp`, the anchor of the implicit block list
  let mut allocator = FreeListAllocator::new();

  unsafe {
    // --------------------------------------------------------------------
    // 1) Allocate space for a u64. The first call initializes the heap:
    //    prologue, epilogue, and one 4 KiB free chunk.
    // --------------------------------------------------------------------
    let first_block = allocator.malloc(8);
    println!("[1] Allocate 8 bytes -> {:?}", first_block);

    let first_ptr = first_block as *mut u64;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());

    // --------------------------------------------------------------------
    // 2) Allocate 12 bytes. Odd sizes get rounded up to a whole
    //    doubleword-aligned block (12 + 8 bytes of tags -> 24).
    // --------------------------------------------------------------------
    let second_block = allocator.malloc(12);
    println!("\n[2] Allocate 12 bytes -> {:?}", second_block);

    // Manual alignment check: payloads are always 8-byte aligned.
    println!(
      "[2] Address = {:#X}, addr % 8 = {}",
      second_block as usize,
      second_block as usize % 8
    );

    // --------------------------------------------------------------------
    // 3) Dump the heap. Expect the two allocated blocks, the free
    //    remainder of the first chunk, and the EOL epilogue.
    // --------------------------------------------------------------------
    println!("\n[3] Heap after two allocations:");
    allocator.check_heap(true);

    // --------------------------------------------------------------------
    // 4) Free the first block, then allocate something small enough to fit
    //    in the hole. First fit scans from the start of the heap, so the
    //    freed slot is reused.
    // --------------------------------------------------------------------
    allocator.free(first_block);
    println!("\n[4] Freed first_block at {:?}", first_block);

    let third_block = allocator.malloc(4);
    println!(
      "[4] third_block == first_block? {}",
      if third_block == first_block {
        "Yes, first fit reused the freed block"
      } else {
        "No, it allocated somewhere else"
      }
    );

    // --------------------------------------------------------------------
    // 5) Grow an allocation with realloc. The contents move to the new
    //    block; the old one is freed and coalesced.
    // --------------------------------------------------------------------
    let grown = allocator.realloc(third_block, 64);
    println!("\n[5] realloc(third_block, 64) -> {:?}", grown);

    // --------------------------------------------------------------------
    // 6) Free everything. Coalescing fuses the neighbors back into a
    //    single free chunk; the dump shows one free block again.
    // --------------------------------------------------------------------
    allocator.free(grown);
    allocator.free(second_block);

    println!("\n[6] Heap after freeing everything:");
    allocator.check_heap(true);

    // --------------------------------------------------------------------
    // 7) Tear the heap down. Every outstanding pointer is now invalid.
    // --------------------------------------------------------------------
    allocator.teardown();
    println!("\n[7] End of demo. Heap segment released.");
  }
}
