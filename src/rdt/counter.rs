//! Process-wide wrapping counter for `seq` and `comm_id`, in `[1, 2^31 - 1]`.

use std::sync::Mutex;

const MAX_VALUE: u32 = 2_147_483_647; // 2^31 - 1

/// A concurrency-safe counter that wraps `2^31 - 1 -> 1`. `seq` is shared by
/// every fragment a transport ever sends; `comm_id` is shared by every
/// message a session ever sends. Both are modeled by this same type.
pub struct WrappingCounter {
    value: Mutex<u32>,
}

impl WrappingCounter {
    /// Starts the counter at `start`, clamped into `[1, MAX_VALUE]`.
    pub fn starting_at(start: u32) -> Self {
        let start = start.clamp(1, MAX_VALUE);
        Self {
            value: Mutex::new(start),
        }
    }

    /// A counter seeded uniformly at random, chosen once at process start.
    pub fn random() -> Self {
        let start = rand::Rng::gen_range(&mut rand::thread_rng(), 1..=MAX_VALUE);
        Self::starting_at(start)
    }

    /// Returns the current value and advances the counter, wrapping to 1
    /// after `MAX_VALUE`.
    pub fn next(&self) -> u32 {
        let mut guard = self.value.lock().unwrap();
        let current = *guard;
        *guard = if current == MAX_VALUE { 1 } else { current + 1 };
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_after_max_value() {
        let counter = WrappingCounter::starting_at(MAX_VALUE);
        assert_eq!(counter.next(), MAX_VALUE);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
    }

    #[test]
    fn random_seed_is_within_range() {
        for _ in 0..100 {
            let counter = WrappingCounter::random();
            let v = counter.next();
            assert!(v >= 1 && v <= MAX_VALUE);
        }
    }
}
