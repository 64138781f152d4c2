//! Guid generation for download requests.
//!
//! A guid is a millisecond timestamp followed by a four-digit counter that
//! wraps at 10 000. The timestamp never goes backwards and is bumped when
//! the counter wraps within one millisecond, so every guid handed out by a
//! generator is unique.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const COUNTER_WRAP: u32 = 10_000;

#[derive(Debug, Default)]
struct GuidClock {
    last_ms: u64,
    counter: u32,
}

/// Owned guid source; each manager holds its own.
#[derive(Debug, Default)]
pub struct GuidGenerator {
    clock: Mutex<GuidClock>,
}

impl GuidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Returns the next guid.
    pub fn next_guid(&self) -> String {
        self.next_at(Self::now_ms())
    }

    /// Returns the next guid as if the wall clock read `now_ms`.
    pub fn next_at(&self, now_ms: u64) -> String {
        let mut clock = match self.clock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut ts = now_ms.max(clock.last_ms);
        let counter = (clock.counter + 1) % COUNTER_WRAP;
        if counter == 0 && ts == clock.last_ms {
            ts += 1;
        }
        clock.last_ms = ts;
        clock.counter = counter;
        format!("{}{:04}", ts, counter)
    }
}
