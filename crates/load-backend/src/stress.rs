//! Synthetic load generators

use std::collections::TryReserveError;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MIB: usize = 1024 * 1024;

/// Result of one CPU burn
#[derive(Debug, Clone, Copy)]
pub struct BurnReport {
    pub elapsed: Duration,
    pub primes_found: u64,
    pub last_number_checked: u64,
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    let mut i = 2;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

/// Trial-division prime search until `duration` has passed; blocks the thread
pub fn burn_cpu(duration: Duration) -> BurnReport {
    let start = Instant::now();
    let mut primes_found = 0;
    let mut num = 2;

    while start.elapsed() < duration {
        if is_prime(num) {
            primes_found += 1;
        }
        num += 1;
    }

    BurnReport {
        elapsed: start.elapsed(),
        primes_found,
        last_number_checked: num,
    }
}

/// Process-wide store of held allocations
#[derive(Debug, Default)]
pub struct MemoryHolder {
    blocks: Mutex<Vec<Vec<u8>>>,
}

fn zeroed(size_mb: usize) -> Result<Vec<u8>, TryReserveError> {
    let bytes = size_mb * MIB;
    let mut block = Vec::new();
    block.try_reserve_exact(bytes)?;
    // Touch every page so the allocation is resident
    block.resize(bytes, 0);
    Ok(block)
}

impl MemoryHolder {
    fn blocks(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        // A poisoned holder still holds valid buffers
        self.blocks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop everything held, then hold one new block
    pub fn replace(&self, size_mb: usize) -> Result<(), TryReserveError> {
        let mut blocks = self.blocks();
        blocks.clear();
        blocks.push(zeroed(size_mb)?);
        Ok(())
    }

    /// Hold one more block alongside the existing ones
    pub fn append(&self, size_mb: usize) -> Result<(), TryReserveError> {
        let block = zeroed(size_mb)?;
        self.blocks().push(block);
        Ok(())
    }

    /// Drop everything held; returns how many blocks were dropped
    pub fn release(&self) -> usize {
        let mut blocks = self.blocks();
        let count = blocks.len();
        blocks.clear();
        count
    }

    pub fn allocations(&self) -> usize {
        self.blocks().len()
    }

    pub fn held_bytes(&self) -> usize {
        self.blocks().iter().map(Vec::len).sum()
    }
}
