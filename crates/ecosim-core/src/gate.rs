//! Reusable release-and-count barrier between the coordinator and its workers.
//!
//! The coordinator registers one worker per living entity, then calls
//! [`IterationGate::release`] which bumps the generation, resets the
//! completion counter and wakes every waiting worker. Each worker acts once
//! and calls [`IterationGate::report`]. The coordinator blocks in
//! [`IterationGate::wait_for_completion`] until every released worker has
//! reported, or the timeout elapses.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::SimulationError;

#[derive(Debug, Default)]
struct GateState {
    generation: u64,
    shutdown: bool,
    expected: usize,
    completed: usize,
    living: usize,
    births: usize,
    deaths: usize,
}

/// Why a waiting worker woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Act once for the given generation.
    Act(u64),
    /// The gate was shut down; exit without touching the grid.
    Shutdown,
}

/// What a worker reports after acting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// The entity died this step and the worker is exiting.
    pub died: bool,
    /// Offspring placed this step.
    pub births: usize,
}

/// Counter values at the end of an iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationCounts {
    pub generation: u64,
    pub expected: usize,
    pub completed: usize,
    pub living: usize,
    pub births: usize,
    pub deaths: usize,
}

#[derive(Debug, Default)]
pub struct IterationGate {
    state: Mutex<GateState>,
    release: Condvar,
    progress: Condvar,
}

impl IterationGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, GateState>, SimulationError> {
        self.state.lock().map_err(|_| SimulationError::LockPoisoned)
    }

    /// Count one more living worker. The returned generation is the last one
    /// the worker must *not* act on; it acts on the next release.
    pub fn register(&self) -> Result<u64, SimulationError> {
        let mut state = self.lock()?;
        state.living += 1;
        Ok(state.generation)
    }

    /// Undo a [`register`](Self::register) whose worker never started.
    pub fn deregister(&self) -> Result<(), SimulationError> {
        let mut state = self.lock()?;
        state.living = state.living.saturating_sub(1);
        Ok(())
    }

    /// Number of workers currently registered and alive.
    pub fn living(&self) -> Result<usize, SimulationError> {
        Ok(self.lock()?.living)
    }

    /// Start a new iteration: every registered worker is expected to report.
    /// Returns the number of expected reports.
    pub fn release(&self) -> Result<usize, SimulationError> {
        let mut state = self.lock()?;
        state.completed = 0;
        state.births = 0;
        state.deaths = 0;
        state.expected = state.living;
        state.generation += 1;
        let expected = state.expected;
        drop(state);
        self.release.notify_all();
        Ok(expected)
    }

    /// Block until a release newer than `seen` happens, or the gate shuts down.
    pub fn wait_for_release(&self, seen: u64) -> Result<Release, SimulationError> {
        let guard = self.lock()?;
        let state = self
            .release
            .wait_while(guard, |s| s.generation == seen && !s.shutdown)
            .map_err(|_| SimulationError::LockPoisoned)?;
        if state.shutdown {
            Ok(Release::Shutdown)
        } else {
            Ok(Release::Act(state.generation))
        }
    }

    /// Record that a worker finished acting for `generation`.
    pub fn report(&self, generation: u64, outcome: WorkerOutcome) -> Result<(), SimulationError> {
        let mut state = self.lock()?;
        if outcome.died {
            state.living = state.living.saturating_sub(1);
        }
        if generation == state.generation {
            state.completed += 1;
            state.births += outcome.births;
            if outcome.died {
                state.deaths += 1;
            }
        } else {
            // A straggler from an iteration that already timed out.
            warn!(
                generation,
                current = state.generation,
                "late worker report ignored for completion count"
            );
        }
        drop(state);
        self.progress.notify_all();
        Ok(())
    }

    /// Wait until every worker released by the last [`release`](Self::release) has reported.
    pub fn wait_for_completion(
        &self,
        timeout: Duration,
    ) -> Result<IterationCounts, SimulationError> {
        let started = Instant::now();
        let guard = self.lock()?;
        let (state, result) = self
            .progress
            .wait_timeout_while(guard, timeout, |s| {
                s.completed < s.expected && !s.shutdown
            })
            .map_err(|_| SimulationError::LockPoisoned)?;
        if result.timed_out() && state.completed < state.expected {
            return Err(SimulationError::IterationTimeout {
                completed: state.completed,
                expected: state.expected,
                waited: started.elapsed(),
            });
        }
        Ok(IterationCounts {
            generation: state.generation,
            expected: state.expected,
            completed: state.completed,
            living: state.living,
            births: state.births,
            deaths: state.deaths,
        })
    }

    /// Wake every worker with [`Release::Shutdown`].
    pub fn shutdown(&self) {
        match self.state.lock() {
            Ok(mut state) => state.shutdown = true,
            Err(poisoned) => poisoned.into_inner().shutdown = true,
        }
        self.release.notify_all();
        self.progress.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn release_wakes_registered_workers_once() {
        let gate = Arc::new(IterationGate::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let seen = gate.register().expect("register");
            let gate = Arc::clone(&gate);
            handles.push(thread::spawn(move || {
                let mut seen = seen;
                let mut acted = 0;
                loop {
                    match gate.wait_for_release(seen).expect("wait") {
                        Release::Act(generation) => {
                            acted += 1;
                            seen = generation;
                            gate.report(generation, WorkerOutcome::default())
                                .expect("report");
                        }
                        Release::Shutdown => break acted,
                    }
                }
            }));
        }

        for round in 1..=3 {
            assert_eq!(gate.release().expect("release"), 8);
            let counts = gate
                .wait_for_completion(Duration::from_secs(5))
                .expect("complete");
            assert_eq!(counts.generation, round);
            assert_eq!(counts.completed, counts.expected);
        }

        gate.shutdown();
        for handle in handles {
            assert_eq!(handle.join().expect("join"), 3);
        }
    }

    #[test]
    fn deaths_shrink_the_next_release() {
        let gate = IterationGate::new();
        gate.register().expect("register");
        gate.register().expect("register");
        assert_eq!(gate.release().expect("release"), 2);
        let generation = 1;
        gate.report(generation, WorkerOutcome { died: true, births: 0 })
            .expect("report");
        gate.report(generation, WorkerOutcome { died: false, births: 2 })
            .expect("report");
        let counts = gate
            .wait_for_completion(Duration::from_millis(50))
            .expect("complete");
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.deaths, 1);
        assert_eq!(counts.births, 2);
        assert_eq!(counts.living, 1);
        assert_eq!(gate.living().expect("living"), 1);
        assert_eq!(gate.release().expect("release"), 1);
    }

    #[test]
    fn missing_reports_time_out() {
        let gate = IterationGate::new();
        gate.register().expect("register");
        gate.release().expect("release");
        let err = gate
            .wait_for_completion(Duration::from_millis(20))
            .expect_err("nobody reports");
        assert!(matches!(
            err,
            SimulationError::IterationTimeout {
                completed: 0,
                expected: 1,
                ..
            }
        ));
    }

    #[test]
    fn late_reports_do_not_count_toward_new_iteration() {
        let gate = IterationGate::new();
        gate.register().expect("register");
        gate.register().expect("register");
        gate.release().expect("release");
        gate.report(1, WorkerOutcome::default()).expect("report");
        assert!(gate.wait_for_completion(Duration::from_millis(10)).is_err());

        gate.release().expect("release");
        gate.report(1, WorkerOutcome::default()).expect("late report");
        let err = gate
            .wait_for_completion(Duration::from_millis(10))
            .expect_err("late report ignored");
        assert!(matches!(
            err,
            SimulationError::IterationTimeout { completed: 0, .. }
        ));
    }

    #[test]
    fn empty_release_completes_immediately() {
        let gate = IterationGate::new();
        assert_eq!(gate.release().expect("release"), 0);
        let counts = gate
            .wait_for_completion(Duration::from_millis(1))
            .expect("nothing to wait for");
        assert_eq!(counts.expected, 0);
    }
}
