use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use super::block::Block;

/// Errors that can occur while searching for a proof of work
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("Mining timed out after {iterations} attempts ({elapsed_ms} ms) at difficulty {difficulty}")]
    Timeout {
        difficulty: usize,
        iterations: u64,
        elapsed_ms: u64,
    },

    #[error("Mining cancelled after {iterations} attempts")]
    Cancelled { iterations: u64 },
}

/// Shared flag used to interrupt a running miner
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears a previous cancellation so the token can be reused
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounds on a single mining run. The default is unbounded.
#[derive(Debug, Clone, Default)]
pub struct MiningLimits {
    pub max_iterations: Option<u64>,
    pub max_duration: Option<Duration>,
    pub cancel: CancelToken,
}

impl MiningLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Whether `hash` starts with `difficulty` `'0'` characters
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Re-derives the block hash and checks it against the stored hash and the
/// block's own difficulty target
pub fn has_valid_proof(block: &Block) -> bool {
    block.is_hash_consistent() && meets_difficulty(block.hash(), block.difficulty())
}

/// Performs proof of work on a block
///
/// Sets the block difficulty, then increments the nonce from its current
/// value and rehashes until the hash carries `difficulty` leading zeros. With
/// difficulty 0 the block is resealed once and returned immediately.
///
/// # Arguments
///
/// * `block` - The block to mine, updated in place
/// * `difficulty` - Required number of leading `'0'` hex characters
/// * `limits` - Iteration, time and cancellation bounds
///
/// # Returns
///
/// The mining duration in milliseconds
pub fn mine(block: &mut Block, difficulty: usize, limits: &MiningLimits) -> Result<u64, MiningError> {
    search(block, difficulty, |block, iterations, started| {
        if limits.cancel.is_cancelled() {
            warn!("Mining block {} cancelled after {} attempts", block.index(), iterations);
            return Err(MiningError::Cancelled { iterations });
        }

        let over_iterations = limits.max_iterations.map_or(false, |max| iterations >= max);
        let over_time = limits.max_duration.map_or(false, |max| started.elapsed() >= max);
        if over_iterations || over_time {
            let elapsed_ms = elapsed_ms(started);
            warn!(
                "Mining block {} gave up after {} attempts ({} ms) at difficulty {}",
                block.index(),
                iterations,
                elapsed_ms,
                difficulty
            );
            return Err(MiningError::Timeout {
                difficulty,
                iterations,
                elapsed_ms,
            });
        }

        Ok(())
    })
}

/// Performs proof of work with no iteration or time bound
pub fn mine_unbounded(block: &mut Block, difficulty: usize) -> u64 {
    match search(block, difficulty, |_, _, _| Ok::<(), Infallible>(())) {
        Ok(duration_ms) => duration_ms,
        Err(never) => match never {},
    }
}

fn search<E>(
    block: &mut Block,
    difficulty: usize,
    mut keep_going: impl FnMut(&Block, u64, Instant) -> Result<(), E>,
) -> Result<u64, E> {
    block.set_difficulty(difficulty);
    let started = Instant::now();

    if difficulty == 0 {
        block.seal();
        block.set_mining_duration_ms(0);
        return Ok(0);
    }

    let mut iterations: u64 = 0;
    loop {
        block.bump_nonce();
        block.seal();
        iterations += 1;

        if meets_difficulty(block.hash(), difficulty) {
            break;
        }

        keep_going(&*block, iterations, started)?;
    }

    let duration_ms = elapsed_ms(started);
    block.set_mining_duration_ms(duration_ms);
    debug!(
        "Mined block {} with nonce {} in {} ms",
        block.index(),
        block.nonce(),
        duration_ms
    );

    Ok(duration_ms)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
