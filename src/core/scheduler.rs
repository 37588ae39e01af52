// src/core/scheduler.rs

//! The periodic timer and the coordination state it shares with the supervisor.
//!
//! The `Coordinator` is the only shared mutable state between the two tasks.
//! Signals raised by the timer are OR-ed into a flag set, and the supervisor
//! is woken through a `Notify`, which holds at most one permit. Several
//! signals that arrive before the supervisor wakes therefore coalesce into a
//! single wakeup carrying every flag.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};

/// The default cadence of health checks.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Run,
    Pause,
    /// Terminal.
    Stop,
}

/// The flags a supervisor wake may carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub stop: bool,
    pub health_check: bool,
    pub update_check: bool,
}

impl Signals {
    pub fn any(&self) -> bool {
        self.stop || self.health_check || self.update_check
    }
}

#[derive(Debug)]
struct CoordinatorState {
    phase: TimerPhase,
    phase_changed: bool,
    signals: Signals,
}

/// Shared coordination object, owned by the composition root.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    timer_wake: Notify,
    supervisor_wake: Notify,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                phase: TimerPhase::Run,
                phase_changed: false,
                signals: Signals::default(),
            }),
            timer_wake: Notify::new(),
            supervisor_wake: Notify::new(),
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.state.lock().phase
    }

    /// Changes the timer phase and wakes the timer. Leaving `Stop` is ignored.
    pub fn set_phase(&self, phase: TimerPhase) {
        {
            let mut state = self.state.lock();
            if state.phase == TimerPhase::Stop || state.phase == phase {
                return;
            }
            debug!("Timer phase {:?} -> {:?}", state.phase, phase);
            state.phase = phase;
            state.phase_changed = true;
        }
        self.timer_wake.notify_one();
    }

    /// Asks the supervisor to shut down. Idempotent and callable from any task.
    pub fn request_stop(&self) {
        self.state.lock().signals.stop = true;
        self.supervisor_wake.notify_one();
    }

    pub fn stop_requested(&self) -> bool {
        self.state.lock().signals.stop
    }

    /// Raises timer signals unless the timer is paused or stopped.
    /// Returns whether the signals were delivered.
    pub fn emit(&self, signals: Signals) -> bool {
        {
            let mut state = self.state.lock();
            if state.phase != TimerPhase::Run {
                return false;
            }
            state.signals.health_check |= signals.health_check;
            state.signals.update_check |= signals.update_check;
        }
        self.supervisor_wake.notify_one();
        true
    }

    /// Waits until at least one signal is pending and takes them.
    /// A stop request stays set once observed.
    pub async fn wait_for_signals(&self) -> Signals {
        loop {
            if let Some(signals) = self.try_take_signals() {
                return signals;
            }
            self.supervisor_wake.notified().await;
        }
    }

    /// Takes pending signals without waiting.
    pub fn try_take_signals(&self) -> Option<Signals> {
        let mut state = self.state.lock();
        if !state.signals.any() {
            return None;
        }
        let taken = state.signals;
        state.signals.health_check = false;
        state.signals.update_check = false;
        Some(taken)
    }

    /// Clears the phase-change flag, returning the phase if it had changed.
    fn take_phase_change(&self) -> Option<TimerPhase> {
        let mut state = self.state.lock();
        if !state.phase_changed {
            return None;
        }
        state.phase_changed = false;
        Some(state.phase)
    }
}

/// Drives health and update checks on independent cadences.
pub struct Scheduler {
    coordinator: Arc<Coordinator>,
    health_interval: Duration,
    /// `None` disables interval update checks.
    update_interval: Option<Duration>,
}

struct Targets {
    health: Instant,
    update: Option<Instant>,
}

impl Scheduler {
    pub fn new(
        coordinator: Arc<Coordinator>,
        health_interval: Duration,
        update_interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            health_interval,
            update_interval: (!update_interval.is_zero()).then_some(update_interval),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    fn arm(&self, now: Instant) -> Targets {
        Targets {
            health: now + self.health_interval,
            update: self.update_interval.map(|interval| now + interval),
        }
    }

    /// The timer loop. Returns once the phase becomes `Stop`.
    pub async fn run(self) {
        info!(
            "Scheduler started with health interval {:?} and update interval {:?}",
            self.health_interval, self.update_interval
        );
        let mut targets = self.arm(Instant::now());

        loop {
            let next_wake = targets
                .update
                .map_or(targets.health, |update| update.min(targets.health));

            let notified = tokio::select! {
                _ = self.coordinator.timer_wake.notified() => true,
                _ = time::sleep_until(next_wake) => false,
            };

            if notified {
                match self.coordinator.take_phase_change() {
                    Some(TimerPhase::Stop) => break,
                    // Resuming or pausing: nothing stale may fire right away.
                    Some(_) => targets = self.arm(Instant::now()),
                    None => {}
                }
                continue;
            }

            if self.coordinator.phase() == TimerPhase::Stop {
                break;
            }

            let now = Instant::now();
            let mut signals = Signals::default();
            if now >= targets.health {
                signals.health_check = true;
                targets.health = advance(targets.health, self.health_interval, now);
            }
            if let (Some(update), Some(interval)) = (targets.update, self.update_interval)
                && now >= update
            {
                signals.update_check = true;
                targets.update = Some(advance(update, interval, now));
            }

            if signals.any() && !self.coordinator.emit(signals) {
                debug!("Scheduler paused; suppressed {:?}", signals);
            }
        }

        info!("Scheduler stopped");
    }
}

/// Moves a target forward by one period without scheduling into the past.
fn advance(target: Instant, period: Duration, now: Instant) -> Instant {
    let next = target + period;
    if next <= now { now + period } else { next }
}
