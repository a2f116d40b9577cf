//! Record id generation.
//!
//! Ids have the shape `<millis>-<random>-<counter>`, every segment in
//! lowercase base36:
//!
//! ```text
//! lq2k9x1c-4fz0qa-1
//! ```
//!
//! The timestamp keeps ids roughly time-ordered, the random suffix keeps
//! ids from different processes apart, and the counter guarantees that two
//! ids handed out by the same generator never collide, even within one
//! millisecond and with a degenerate random source.

use crate::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of random base36 characters in an id.
pub const RANDOM_SUFFIX_LEN: usize = 6;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates unique record ids.
pub struct IdGenerator {
    clock: Arc<dyn Clock>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    counter: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator using the system clock and an entropy-seeded RNG.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a generator using `clock` and an entropy-seeded RNG.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(clock, Box::new(StdRng::from_entropy()), 0)
    }

    /// Creates a generator from explicit parts.
    ///
    /// `counter_start` is the first counter value handed out.
    pub fn with_parts(
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send>,
        counter_start: u64,
    ) -> Self {
        Self {
            clock,
            rng: Mutex::new(rng),
            counter: AtomicU64::new(counter_start),
        }
    }

    /// Creates a deterministic generator, for tests.
    pub fn seeded(clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::with_parts(clock, Box::new(StdRng::seed_from_u64(seed)), 0)
    }

    /// Returns a fresh id.
    pub fn generate(&self) -> String {
        let millis = self.clock.now().timestamp_millis().max(0) as u64;
        let count = self.counter.fetch_add(1, Ordering::SeqCst);

        let mut suffix = String::with_capacity(RANDOM_SUFFIX_LEN);
        {
            let mut rng = self.rng.lock();
            for _ in 0..RANDOM_SUFFIX_LEN {
                suffix.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
            }
        }

        format!("{}-{}-{}", to_base36(millis), suffix, to_base36(count))
    }

    /// Returns how many ids this generator has handed out since its counter
    /// start.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("counter", &self.counter.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
