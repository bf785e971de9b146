//! Owned byte buffers whose access latency is measured.

use std::hint::black_box;

use crate::error::{ProbeError, Result};

/// Size of a virtual memory page on the platforms we target.
pub const PAGE_SIZE: usize = 4096;

/// Size of a cache line on the platforms we target.
pub const CACHE_LINE: usize = 64;

/// A fixed-size, zero-initialized byte buffer.
///
/// The arena never grows or shrinks after creation. Every access is checked
/// against its length before it happens.
///
/// Creating an arena commits each page with one volatile write. A freshly
/// zeroed allocation is otherwise backed by the kernel's shared zero page, so
/// every read would hit the same physical frame and the warm/cold contrast
/// would vanish. Allocation and commit both perturb cache state: never time
/// them.
#[derive(Debug, Clone)]
pub struct ProbeArena {
    data: Vec<u8>,
}

impl ProbeArena {
    /// Allocate a zeroed arena of exactly `size` bytes.
    ///
    /// # Errors
    ///
    /// `OutOfRange` when `size` is zero, since no index would be valid.
    pub fn create(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(ProbeError::OutOfRange { index: 0, len: 0 });
        }
        let mut data = vec![0u8; size];
        commit_pages(&mut data);
        Ok(Self { data })
    }

    /// Allocate an arena of `pages` pages of `page_size` bytes each.
    pub fn for_pages(pages: usize, page_size: usize) -> Result<Self> {
        let size = pages
            .checked_mul(page_size)
            .ok_or(ProbeError::OutOfRange { index: pages, len: 0 })?;
        Self::create(size)
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a successfully created arena.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of whole pages of `page_size` bytes in the arena.
    pub fn page_count(&self, page_size: usize) -> usize {
        if page_size == 0 {
            0
        } else {
            self.data.len() / page_size
        }
    }

    /// Validate `index` against the arena length.
    #[inline]
    pub fn check(&self, index: usize) -> Result<()> {
        if index < self.data.len() {
            Ok(())
        } else {
            Err(ProbeError::OutOfRange {
                index,
                len: self.data.len(),
            })
        }
    }

    /// Read one byte.
    #[inline]
    pub fn read(&self, index: usize) -> Result<u8> {
        self.check(index)?;
        Ok(self.load(index))
    }

    /// Write one byte.
    #[inline]
    pub fn write(&mut self, index: usize, value: u8) -> Result<()> {
        self.check(index)?;
        self.data[index] = black_box(value);
        Ok(())
    }

    /// Load a byte whose index has already been validated.
    ///
    /// Goes through `black_box` so the read is never elided or hoisted.
    #[inline(always)]
    pub(crate) fn load(&self, index: usize) -> u8 {
        black_box(self.data[black_box(index)])
    }
}

/// Touch one byte per page so every page gets its own physical frame.
pub(crate) fn commit_pages(data: &mut [u8]) {
    for offset in (0..data.len()).step_by(PAGE_SIZE) {
        // SAFETY: `offset < data.len()` by construction of the range.
        unsafe { std::ptr::write_volatile(data.as_mut_ptr().add(offset), 0) };
    }
}
