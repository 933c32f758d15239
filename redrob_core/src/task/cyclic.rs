//! Fixed-frequency tasks.
//!
//! [`Cyclic`] adapts a [`CyclicBody`] into a [`TaskBody`] whose `execute`
//! runs the step at absolute deadlines. Each deadline is derived from the
//! previous one, never from the wake-up time, so step latency does not
//! accumulate into drift.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{RedrobError, RedrobResult};
use crate::task::lifecycle::{Task, TaskBody, TaskContext};

/// Periodic work run by a [`CyclicTask`].
pub trait CyclicBody: Send + 'static {
    fn setup(&mut self) -> RedrobResult<()> {
        Ok(())
    }

    /// One period of work. An error ends the cycle loop.
    fn cyclic_step(&mut self) -> RedrobResult<()>;

    fn cleanup(&mut self) -> RedrobResult<()> {
        Ok(())
    }
}

/// Absolute-deadline pacing.
#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    next: Instant,
}

impl Pacer {
    /// First deadline is one period from now.
    pub fn new(period: Duration) -> Self {
        Self::starting_at(Instant::now(), period)
    }

    pub fn starting_at(origin: Instant, period: Duration) -> Self {
        Self {
            period,
            next: origin + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_deadline(&self) -> Instant {
        self.next
    }

    /// Sleep until the pending deadline, then move it one period on.
    /// A deadline already in the past returns at once.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        }
        self.next += self.period;
    }
}

/// [`TaskBody`] adapter running a [`CyclicBody`] at a fixed frequency.
pub struct Cyclic<C: CyclicBody> {
    body: C,
    frequency: f64,
}

impl<C: CyclicBody> Cyclic<C> {
    pub fn new(body: C, frequency: f64) -> RedrobResult<Self> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(RedrobError::bad_argument(format!(
                "cyclic frequency must be positive, got {}",
                frequency
            )));
        }
        Ok(Self { body, frequency })
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency)
    }

    pub fn inner(&self) -> &C {
        &self.body
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.body
    }
}

impl<C: CyclicBody> TaskBody for Cyclic<C> {
    type Arg = ();

    fn setup(&mut self) -> RedrobResult<()> {
        self.body.setup()
    }

    fn execute(&mut self, _arg: (), ctx: &TaskContext) -> RedrobResult<()> {
        let mut pacer = Pacer::new(self.period());
        pacer.wait();

        while !ctx.is_stopped() {
            self.body.cyclic_step()?;
            pacer.wait();
            ctx.update_exe_cnt();
        }
        Ok(())
    }

    fn cleanup(&mut self) -> RedrobResult<()> {
        self.body.cleanup()
    }
}

pub type CyclicTask<C> = Task<Cyclic<C>>;

impl<C: CyclicBody> Task<Cyclic<C>> {
    /// Build a cyclic task running `body` at `frequency` Hz.
    pub fn cyclic(name: impl Into<String>, frequency: f64, body: C) -> RedrobResult<Self> {
        Ok(Task::new(name, Cyclic::new(body, frequency)?))
    }

    pub fn frequency(&self) -> Option<f64> {
        self.body().map(Cyclic::frequency)
    }
}
