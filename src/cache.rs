//! Cache warming and eviction.
//!
//! Warming reads one location repeatedly to pull it into the fastest cache
//! tier. Eviction reads a large secondary buffer at a fixed stride to
//! displace whatever was cached before, so only an intentionally warmed
//! location keeps a timing advantage.

use std::hint::black_box;

use crate::arena::{commit_pages, ProbeArena};
use crate::error::{ProbeError, Result};

/// Read `arena[index]` `repetitions` times with no delay.
///
/// The index is checked once up front. Hundreds to low thousands of
/// repetitions reliably warm a line; the exact count is not critical.
pub fn warm(arena: &ProbeArena, index: usize, repetitions: usize) -> Result<()> {
    arena.check(index)?;
    for _ in 0..repetitions {
        black_box(arena.load(index));
    }
    Ok(())
}

/// Secondary buffer owned by a run and swept to displace cache state.
///
/// The buffer is allocated and committed once; every sweep reuses it.
#[derive(Debug, Clone)]
pub struct Evictor {
    buffer: Vec<u8>,
    stride: usize,
}

impl Evictor {
    /// Allocate an eviction buffer of `size` bytes swept every `stride` bytes.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `size` or `stride` is zero.
    pub fn new(size: usize, stride: usize) -> Result<Self> {
        if size == 0 {
            return Err(ProbeError::OutOfRange { index: 0, len: 0 });
        }
        if stride == 0 {
            return Err(ProbeError::OutOfRange { index: 0, len: size });
        }
        let mut buffer = vec![0u8; size];
        commit_pages(&mut buffer);
        // Distinct contents keep the sweep from being folded into a constant.
        for (i, byte) in buffer.iter_mut().enumerate().step_by(stride) {
            *byte = (i / stride) as u8;
        }
        Ok(Self { buffer, stride })
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Sweep stride in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of reads one sweep performs.
    pub fn reads_per_sweep(&self) -> usize {
        self.buffer.len().div_ceil(self.stride)
    }

    /// Read one byte per stride across the whole buffer.
    ///
    /// Returns a wrapping sum of the bytes read.
    pub fn evict(&self) -> u64 {
        let mut sum = 0u64;
        for offset in (0..self.buffer.len()).step_by(self.stride) {
            sum = sum.wrapping_add(black_box(self.buffer[offset]) as u64);
        }
        black_box(sum)
    }
}

/// One-shot eviction: allocate a `size`-byte buffer and sweep it once.
pub fn evict(size: usize, stride: usize) -> Result<u64> {
    Ok(Evictor::new(size, stride)?.evict())
}
