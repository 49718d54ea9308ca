use std::{
    future::Future,
    sync::{Mutex, PoisonError}
};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightOutcome {
    /// This caller executed the job, `runs` times in total (the first run plus
    /// one follow-up per batch of requests that arrived meanwhile)
    Ran { runs: usize },
    /// A run was already in flight; a single follow-up run has been scheduled
    Coalesced
}

#[derive(Debug, Default)]
struct FlightState {
    running: bool,
    pending: bool
}

/// Allows at most one execution of a job at a time.
///
/// A request that arrives while a run is in flight does not start a second
/// one. It marks the flight as pending, and the caller that owns the flight
/// runs the job exactly once more when the current run completes, no matter
/// how many requests arrived in between.
#[derive(Debug, Default)]
pub struct SingleFlight {
    state: Mutex<FlightState>
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.lock().running
    }

    pub async fn run<F, Fut>(&self, mut job: F) -> FlightOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>
    {
        {
            let mut state = self.lock();
            if state.running {
                state.pending = true;
                debug!("Run already in flight, scheduling a follow-up");
                return FlightOutcome::Coalesced;
            }
            state.running = true;
        }

        let _landing = Landing(self);
        let mut runs = 0;

        loop {
            job().await;
            runs += 1;

            let mut state = self.lock();
            if !state.pending {
                return FlightOutcome::Ran { runs };
            }
            state.pending = false;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the flight when the owning future finishes, panics, or is dropped
struct Landing<'a>(&'a SingleFlight);

impl Drop for Landing<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.running = false;
        state.pending = false;
    }
}
