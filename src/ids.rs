//! Injected identity and time sources
//!
//! Author: Moroya Sakamoto

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Source of fresh revision / delta ids
pub trait IdGenerator {
    fn next_id(&self) -> Uuid;
}

/// Random v4 ids
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Counting ids starting at `start`; reproducible
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: Cell<u128>,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(start: u128) -> Self {
        Self {
            next: Cell::new(start),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> Uuid {
        let n = self.next.get();
        self.next.set(n.wrapping_add(1));
        Uuid::from_u128(n)
    }
}

/// Wall clock in milliseconds since the epoch
pub trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Always reports the same instant
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}
