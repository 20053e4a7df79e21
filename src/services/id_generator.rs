//! Time-ordered unique id generation.
//!
//! Ids pack a random 23-bit value above a 41-bit millisecond timestamp:
//!
//! ```text
//!  63            41 40                         0
//! +----------------+----------------------------+
//! |  random (23)   |     epoch millis (41)      |
//! +----------------+----------------------------+
//! ```
//!
//! Within one millisecond tick the random halves are tracked so no value is
//! reused; the set is cleared whenever the tick changes.

use crate::services::Clock;
use crate::storage::acquire_lock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Bits reserved for the timestamp.
pub const TIME_BITS: u32 = 41;

/// Bits reserved for the per-tick random value.
pub const RANDOM_BITS: u32 = 23;

const TIME_MASK: u64 = (1 << TIME_BITS) - 1;
const RANDOM_SLOTS: u32 = 1 << RANDOM_BITS;

struct IdState {
    tick: i64,
    used: HashSet<u32>,
    rng: StdRng,
}

/// Generator for card, fact, model and log ids.
///
/// The read-check-insert sequence runs under one mutex, so a generator can be
/// shared across threads behind an `Arc`.
pub struct IdGenerator {
    clock: Arc<dyn Clock>,
    state: Mutex<IdState>,
}

impl IdGenerator {
    /// Creates a generator seeded from OS entropy.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(clock, StdRng::from_entropy())
    }

    /// Creates a generator with a deterministic random sequence.
    #[must_use]
    pub fn with_seed(clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        Self {
            clock,
            state: Mutex::new(IdState {
                tick: i64::MIN,
                used: HashSet::new(),
                rng,
            }),
        }
    }

    /// Returns the next id.
    ///
    /// Ids drawn in the same tick are distinct. If every random slot of the
    /// current tick is taken, waits for the clock to move on.
    #[must_use]
    pub fn next_id(&self) -> i64 {
        let mut state = acquire_lock(&self.state);
        loop {
            let now = self.clock.now_millis();
            if now != state.tick {
                state.tick = now;
                state.used.clear();
            }
            if state.used.len() < RANDOM_SLOTS as usize {
                break;
            }
            tracing::warn!(tick = now, "id space exhausted for tick, waiting");
            std::hint::spin_loop();
        }

        let random = loop {
            let candidate = state.rng.gen_range(0..RANDOM_SLOTS);
            if state.used.insert(candidate) {
                break candidate;
            }
        };

        compose(random, state.tick)
    }

    /// Returns the number of ids handed out in the current tick.
    #[must_use]
    pub fn issued_in_tick(&self) -> usize {
        acquire_lock(&self.state).used.len()
    }
}

fn compose(random: u32, tick: i64) -> i64 {
    let time = tick.cast_unsigned() & TIME_MASK;
    ((u64::from(random) << TIME_BITS) | time).cast_signed()
}

/// Extracts the timestamp half of an id.
#[must_use]
pub const fn id_timestamp(id: i64) -> i64 {
    (id.cast_unsigned() & TIME_MASK).cast_signed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::FixedClock;

    #[test]
    fn test_id_embeds_timestamp() {
        let clock = Arc::new(FixedClock::new(1_700_000_000_123));
        let generator = IdGenerator::with_seed(clock, 7);
        let id = generator.next_id();
        assert_eq!(id_timestamp(id), 1_700_000_000_123);
    }

    #[test]
    fn test_used_set_resets_on_new_tick() {
        let clock = Arc::new(FixedClock::new(1_000));
        let generator = IdGenerator::with_seed(Arc::clone(&clock) as Arc<dyn Clock>, 1);
        let _ = generator.next_id();
        let _ = generator.next_id();
        assert_eq!(generator.issued_in_tick(), 2);

        clock.advance_millis(1);
        let id = generator.next_id();
        assert_eq!(generator.issued_in_tick(), 1);
        assert_eq!(id_timestamp(id), 1_001);
    }

    #[test]
    fn test_high_random_bits_survive_sign() {
        assert_eq!(id_timestamp(compose(RANDOM_SLOTS - 1, 42)), 42);
        assert!(compose(RANDOM_SLOTS - 1, 42) < 0);
        assert!(compose(0, 42) > 0);
    }
}
