//! Simulation context implementing TraceContext for deterministic testing.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracesim_env::{TaskHandle, TraceContext};

/// Virtual time plus the tasks sleeping on it.
#[derive(Debug, Default)]
struct Clock {
    /// Nanoseconds since simulation start
    now_ns: u64,

    /// Pending sleeps as (deadline ns, wake-up sender)
    sleepers: Vec<(u64, oneshot::Sender<()>)>,
}

impl Clock {
    /// Moves the clock and wakes every sleeper whose deadline has been reached.
    fn move_to(&mut self, now_ns: u64) {
        self.now_ns = now_ns;
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.sleepers)
            .into_iter()
            .partition(|(deadline, _)| *deadline <= now_ns);
        self.sleepers = pending;
        for (_, waker) in due {
            // A dropped receiver means the sleeping task was aborted
            let _ = waker.send(());
        }
    }
}

/// Simulation context backed by a virtual clock and seeded RNG streams.
///
/// This implements `TraceContext` using:
/// - A virtual clock that only moves when advanced explicitly
/// - ChaCha8 streams derived from one master seed
/// - Simulated sleep that parks the task until the clock reaches its deadline
///
/// Tasks spawned on this context make progress only as the driver calls
/// [`advance_time`](Self::advance_time), [`set_time`](Self::set_time) or
/// [`advance_to_next_deadline`](Self::advance_to_next_deadline), so
/// concurrent timers fire in virtual-time order.
#[derive(Debug, Clone)]
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Shared by clones
    clock: Arc<Mutex<Clock>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clock: Arc::new(Mutex::new(Clock::default())),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut clock = self.clock();
        let target = clock.now_ns.saturating_add(duration.as_nanos() as u64);
        clock.move_to(target);
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time: Duration) {
        self.clock().move_to(time.as_nanos() as u64);
    }

    /// Jumps to the earliest pending sleep deadline and wakes its sleepers.
    ///
    /// Returns the new time, or `None` when nothing is sleeping.
    pub fn advance_to_next_deadline(&self) -> Option<Duration> {
        let mut clock = self.clock();
        let next = clock.sleepers.iter().map(|(deadline, _)| *deadline).min()?;
        let target = next.max(clock.now_ns);
        clock.move_to(target);
        Some(Duration::from_nanos(target))
    }

    /// Number of tasks currently parked in `sleep`.
    pub fn pending_sleepers(&self) -> usize {
        self.clock().sleepers.len()
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.clock().now_ns
    }
}

#[async_trait]
impl TraceContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        let wake = {
            let mut clock = self.clock();
            let deadline = clock.now_ns.saturating_add(duration.as_nanos() as u64);
            if deadline <= clock.now_ns {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                clock.sleepers.push((deadline, tx));
                Some(rx)
            }
        };
        match wake {
            Some(rx) => {
                let _ = rx.await;
            }
            None => tokio::task::yield_now().await,
        }
    }

    fn spawn<F>(&self, name: &str, future: F) -> TaskHandle
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        TaskHandle::new(name, tokio::spawn(future))
    }

    fn derive_rng(&self, stream: u64) -> ChaCha8Rng {
        // Combine master seed with stream id for an independent sequence
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream;
        ChaCha8Rng::seed_from_u64(combined_seed)
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
