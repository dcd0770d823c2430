//! Wait strategies coordinating producers and consumers of a buffer.
//!
//! A strategy answers one question: how should a thread pass the time until a
//! cursor reaches a target position? The buffer picks one at construction and
//! shares it between its writer(s) and readers. Producers that publish while a
//! blocking strategy is in play must call
//! [`signal_all_when_blocking`](WaitStrategy::signal_all_when_blocking) so
//! parked waiters re-check the cursor.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{CoreError, Result};
use crate::sequence::{Sequence, SequenceRegistry, min_sequence};

/// Capability trait for producer/consumer wait tactics.
pub trait WaitStrategy: Send + Sync + fmt::Debug {
    /// Blocks (in the strategy's own fashion) until the observed position is
    /// at least `target`, returning the observed position.
    ///
    /// When `dependents` holds live cursors the observed position is their
    /// minimum (a producer waiting for readers to drain); otherwise it is the
    /// `cursor` itself (a consumer waiting for the writer).
    fn wait_for(&self, target: i64, cursor: &Sequence, dependents: &SequenceRegistry)
    -> Result<i64>;

    /// Wakes all parked waiters. A no-op for non-parking strategies.
    fn signal_all_when_blocking(&self) {}
}

#[inline]
fn observed(cursor: &Sequence, dependents: &SequenceRegistry) -> i64 {
    if dependents.read().is_empty() {
        cursor.value()
    } else {
        min_sequence(dependents, cursor.value())
    }
}

/// Parks waiters on a condition variable; lowest CPU use, highest latency.
#[derive(Debug, Default)]
pub struct Blocking {
    gate: Mutex<()>,
    cond: Condvar,
}

impl WaitStrategy for Blocking {
    fn wait_for(
        &self,
        target: i64,
        cursor: &Sequence,
        dependents: &SequenceRegistry,
    ) -> Result<i64> {
        let mut seen = observed(cursor, dependents);
        if seen >= target {
            return Ok(seen);
        }
        let mut guard = self.gate.lock();
        loop {
            seen = observed(cursor, dependents);
            if seen >= target {
                return Ok(seen);
            }
            self.cond.wait(&mut guard);
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.gate.lock();
        self.cond.notify_all();
    }
}

/// Like [`Blocking`] but gives up with [`CoreError::Timeout`] at a deadline.
#[derive(Debug)]
pub struct TimeoutBlocking {
    gate: Mutex<()>,
    cond: Condvar,
    timeout: Duration,
}

impl TimeoutBlocking {
    /// Creates a strategy that fails waits lasting longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            gate: Mutex::new(()),
            cond: Condvar::new(),
            timeout,
        }
    }
}

impl WaitStrategy for TimeoutBlocking {
    fn wait_for(
        &self,
        target: i64,
        cursor: &Sequence,
        dependents: &SequenceRegistry,
    ) -> Result<i64> {
        let deadline = Instant::now() + self.timeout;
        let mut seen = observed(cursor, dependents);
        if seen >= target {
            return Ok(seen);
        }
        let mut guard = self.gate.lock();
        loop {
            seen = observed(cursor, dependents);
            if seen >= target {
                return Ok(seen);
            }
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                return if observed(cursor, dependents) >= target {
                    Ok(observed(cursor, dependents))
                } else {
                    Err(CoreError::Timeout)
                };
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.gate.lock();
        self.cond.notify_all();
    }
}

/// Burns a core in a tight load loop; lowest latency, highest CPU use.
#[derive(Debug, Default)]
pub struct BusySpin;

impl WaitStrategy for BusySpin {
    fn wait_for(
        &self,
        target: i64,
        cursor: &Sequence,
        dependents: &SequenceRegistry,
    ) -> Result<i64> {
        loop {
            let seen = observed(cursor, dependents);
            if seen >= target {
                return Ok(seen);
            }
            std::hint::spin_loop();
        }
    }
}

/// Spins briefly, then yields the time slice on every retry.
#[derive(Debug, Default)]
pub struct Yielding;

impl WaitStrategy for Yielding {
    fn wait_for(
        &self,
        target: i64,
        cursor: &Sequence,
        dependents: &SequenceRegistry,
    ) -> Result<i64> {
        let mut spins_left: u32 = 100;
        loop {
            let seen = observed(cursor, dependents);
            if seen >= target {
                return Ok(seen);
            }
            if spins_left > 0 {
                spins_left -= 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }
}

/// Spins, then yields, then sleeps. The buffer default: near-idle when the
/// stream stalls, still sub-microsecond on the happy path.
#[derive(Debug)]
pub struct Sleeping {
    sleep: Duration,
}

impl Sleeping {
    /// Strategy sleeping `sleep` per retry once spinning and yielding are
    /// exhausted.
    pub fn new(sleep: Duration) -> Self {
        Self { sleep }
    }
}

impl Default for Sleeping {
    fn default() -> Self {
        Self::new(Duration::from_micros(100))
    }
}

impl WaitStrategy for Sleeping {
    fn wait_for(
        &self,
        target: i64,
        cursor: &Sequence,
        dependents: &SequenceRegistry,
    ) -> Result<i64> {
        let mut retries: u32 = 200;
        loop {
            let seen = observed(cursor, dependents);
            if seen >= target {
                return Ok(seen);
            }
            if retries > 100 {
                retries -= 1;
                std::hint::spin_loop();
            } else if retries > 0 {
                retries -= 1;
                std::thread::yield_now();
            } else {
                std::thread::sleep(self.sleep);
            }
        }
    }
}

/// Exponential backoff of pause hints, capped, never leaving user space.
#[derive(Debug, Default)]
pub struct SpinWait;

impl WaitStrategy for SpinWait {
    fn wait_for(
        &self,
        target: i64,
        cursor: &Sequence,
        dependents: &SequenceRegistry,
    ) -> Result<i64> {
        let mut backoff: u32 = 1;
        loop {
            let seen = observed(cursor, dependents);
            if seen >= target {
                return Ok(seen);
            }
            for _ in 0..backoff {
                std::hint::spin_loop();
            }
            if backoff < 1 << 10 {
                backoff <<= 1;
            } else {
                std::thread::yield_now();
            }
        }
    }
}

/// The default strategy used when a buffer is built without an explicit one.
pub fn default_strategy() -> Arc<dyn WaitStrategy> {
    Arc::new(Sleeping::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn strategies() -> Vec<Arc<dyn WaitStrategy>> {
        vec![
            Arc::new(Blocking::default()),
            Arc::new(BusySpin),
            Arc::new(Yielding),
            Arc::new(Sleeping::new(Duration::from_micros(10))),
            Arc::new(SpinWait),
            Arc::new(TimeoutBlocking::new(Duration::from_secs(5))),
        ]
    }

    #[test]
    fn satisfied_wait_returns_immediately() {
        let cursor = Sequence::new(7);
        let registry = SequenceRegistry::default();
        for strategy in strategies() {
            assert_eq!(strategy.wait_for(5, &cursor, &registry).unwrap(), 7);
        }
    }

    #[test]
    fn wait_observes_concurrent_advance() {
        for strategy in strategies() {
            let cursor = Arc::new(Sequence::new(-1));
            let registry = Arc::new(SequenceRegistry::default());
            let waiter = {
                let strategy = Arc::clone(&strategy);
                let cursor = Arc::clone(&cursor);
                let registry = Arc::clone(&registry);
                thread::spawn(move || strategy.wait_for(3, &cursor, &registry).unwrap())
            };
            thread::sleep(Duration::from_millis(5));
            cursor.set(3);
            strategy.signal_all_when_blocking();
            assert!(waiter.join().unwrap() >= 3);
        }
    }

    #[test]
    fn timeout_strategy_reports_timeout() {
        let strategy = TimeoutBlocking::new(Duration::from_millis(10));
        let cursor = Sequence::new(-1);
        let registry = SequenceRegistry::default();
        assert!(matches!(
            strategy.wait_for(0, &cursor, &registry),
            Err(CoreError::Timeout)
        ));
    }
}
