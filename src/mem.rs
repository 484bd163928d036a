//! Heap substrate: a fixed-capacity memory segment with a bump pointer.
//!
//! Instead of moving the real program break, the allocator works against a
//! private segment acquired once up front:
//!
//! ```text
//!   heap_start                heap_brk                          heap_max
//!       │                         │                                 │
//!       ▼                         ▼                                 ▼
//!       ┌─────────────────────────┬─────────────────────────────────┐
//!       │        in use           │            unused               │
//!       └─────────────────────────┴─────────────────────────────────┘
//!       ◄──────── sbrk() advances heap_brk, never retreats ────────►
//! ```
//!
//! [`HeapSegment::sbrk`] hands out the old break and advances it, exactly
//! like the classic system call, except that growth stops at a hard
//! [`MAX_HEAP_SIZE`] cap. Keeping the heap private lets the allocator coexist
//! with the system allocator in the same process, which is what makes it
//! testable from an ordinary test harness.

use std::{error, fmt, ptr};

/// Capacity of the segment: the heap can never grow past this.
pub(crate) const MAX_HEAP_SIZE: usize = 20 * (1 << 20); // 20 MiB

/// Error returned when the segment cannot be acquired or extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfMemory;

impl fmt::Display for OutOfMemory {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str("out of memory: heap segment exhausted")
  }
}

impl error::Error for OutOfMemory {}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn set_errno(code: libc::c_int) {
  unsafe { *libc::__errno_location() = code };
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn set_errno(code: libc::c_int) {
  unsafe { *libc::__error() = code };
}

/// The memory segment backing the allocator.
///
/// # Fields
///
/// * `heap_start` - base of the region
/// * `heap_brk` - one past the last byte in use; only [`sbrk`](Self::sbrk)
///   moves it, and only forward
/// * `heap_max` - `heap_start + MAX_HEAP_SIZE`, the hard upper bound
///
/// All three are null until [`init`](Self::init) runs.
pub struct HeapSegment {
  heap_start: *mut u8,
  heap_brk: *mut u8,
  heap_max: *mut u8,
}

impl HeapSegment {
  /// Creates an empty segment that holds no memory.
  ///
  /// Call [`init`](Self::init) before any other operation.
  pub const fn new() -> Self {
    Self {
      heap_start: ptr::null_mut(),
      heap_brk: ptr::null_mut(),
      heap_max: ptr::null_mut(),
    }
  }

  /// Checks whether [`init`](Self::init) has acquired a region.
  pub fn is_initialized(&self) -> bool {
    !self.heap_start.is_null()
  }

  /// Acquires the [`MAX_HEAP_SIZE`] region and resets the break to its base.
  ///
  /// # Panics
  ///
  /// Panics if the segment was already initialized.
  ///
  /// # Safety
  ///
  /// The caller must pair this with [`teardown`](Self::teardown) to release
  /// the region.
  pub unsafe fn init(&mut self) -> Result<(), OutOfMemory> {
    if self.is_initialized() {
      panic!("heap segment was already initialized");
    }

    let region = unsafe { libc::malloc(MAX_HEAP_SIZE) } as *mut u8;
    if region.is_null() {
      return Err(OutOfMemory);
    }

    self.heap_start = region;
    self.heap_brk = region; // no allocations yet, so start == brk
    self.heap_max = unsafe { region.add(MAX_HEAP_SIZE) };

    Ok(())
  }

  /// Grows the heap by `increment` bytes.
  ///
  /// Returns the *old* break, i.e. the base address of the newly usable
  /// range. When the grown break would pass `heap_max`, returns null,
  /// records `ENOMEM` in the process-wide `errno`, and leaves the break
  /// where it was. The segment never shrinks.
  ///
  /// # Safety
  ///
  /// The segment must be initialized.
  pub unsafe fn sbrk(
    &mut self,
    increment: usize,
  ) -> *mut u8 {
    let old_brk = self.heap_brk;

    if (self.heap_max as usize) - (self.heap_brk as usize) < increment {
      unsafe { set_errno(libc::ENOMEM) };
      log::error!(
        "sbrk failed: cannot grow heap segment by {} bytes",
        increment
      );
      return ptr::null_mut();
    }

    self.heap_brk = unsafe { self.heap_brk.add(increment) };
    old_brk
  }

  /// Current break: one past the last byte in use.
  pub(crate) fn brk(&self) -> *mut u8 {
    self.heap_brk
  }

  /// Base of the region.
  pub(crate) fn start(&self) -> *mut u8 {
    self.heap_start
  }

  /// Releases the region and returns the segment to its empty state.
  ///
  /// # Safety
  ///
  /// Every pointer into the region becomes dangling. The caller must not
  /// use any of them afterwards.
  pub unsafe fn teardown(&mut self) {
    if !self.is_initialized() {
      return;
    }

    unsafe { libc::free(self.heap_start as *mut libc::c_void) };

    self.heap_start = ptr::null_mut();
    self.heap_brk = ptr::null_mut();
    self.heap_max = ptr::null_mut();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_segment_is_uninitialized() {
    let segment = HeapSegment::new();
    assert!(!segment.is_initialized());
  }

  #[test]
  fn init_acquires_region_with_break_at_base() {
    let mut segment = HeapSegment::new();

    unsafe {
      segment.init().unwrap();

      assert!(segment.is_initialized());
      assert_eq!(segment.start(), segment.brk());

      segment.teardown();
    }
  }

  #[test]
  fn sbrk_returns_old_break_and_advances() {
    let mut segment = HeapSegment::new();

    unsafe {
      segment.init().unwrap();

      let base = segment.brk();

      let first = segment.sbrk(16);
      assert_eq!(first, base);

      let second = segment.sbrk(4096);
      assert_eq!(second, base.add(16));
      assert_eq!(segment.brk(), base.add(16 + 4096));

      segment.teardown();
    }
  }

  #[test]
  fn sbrk_fails_past_capacity_and_records_enomem() {
    let mut segment = HeapSegment::new();

    unsafe {
      segment.init().unwrap();

      // Consume the whole segment, then ask for one more doubleword.
      let whole = segment.sbrk(MAX_HEAP_SIZE);
      assert!(!whole.is_null());

      let brk_before = segment.brk();
      let overflow = segment.sbrk(8);
      assert!(overflow.is_null());
      assert_eq!(segment.brk(), brk_before, "failed sbrk must not move brk");

      assert_eq!(
        std::io::Error::last_os_error().raw_os_error(),
        Some(libc::ENOMEM)
      );

      segment.teardown();
    }
  }

  #[test]
  fn teardown_resets_to_empty() {
    let mut segment = HeapSegment::new();

    unsafe {
      segment.init().unwrap();
      segment.teardown();
    }

    assert!(!segment.is_initialized());

    // A torn-down segment can be initialized again.
    unsafe {
      segment.init().unwrap();
      segment.teardown();
    }
  }
}
