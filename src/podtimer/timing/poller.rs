/*
 * Copyright (C) 2024 The Podtimer Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::time::Duration;

use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::podtimer::probe::ReadinessProbe;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(600_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Ready {
        started: Instant,
        ready_at: Instant,
        attempts: u32,
    },
    TimedOut {
        started: Instant,
        attempts: u32,
    },
    Cancelled {
        started: Instant,
        attempts: u32,
    },
}

impl PollOutcome {
    pub fn started(&self) -> Instant {
        match self {
            PollOutcome::Ready { started, .. }
            | PollOutcome::TimedOut { started, .. }
            | PollOutcome::Cancelled { started, .. } => *started,
        }
    }

    pub fn ready_at(&self) -> Option<Instant> {
        match self {
            PollOutcome::Ready { ready_at, .. } => Some(*ready_at),
            _ => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Ready { attempts, .. }
            | PollOutcome::TimedOut { attempts, .. }
            | PollOutcome::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Repeats a [`ReadinessProbe`] until it passes or `max_wait` elapses.
/// Probe calls are cut off at the deadline, so the wait never overruns it.
pub struct ReadinessPoller {
    probe: Box<dyn ReadinessProbe>,
    address: String,
    port: u16,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ReadinessPoller {
    pub fn new(probe: Box<dyn ReadinessProbe>, address: impl Into<String>, port: u16) -> Self {
        Self {
            probe,
            address: address.into(),
            port,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Zero polls back-to-back, yielding to the runtime between attempts.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn target(&self) -> (&str, u16) {
        (&self.address, self.port)
    }

    pub fn probe_name(&self) -> &'static str {
        self.probe.name()
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> PollOutcome {
        let started = Instant::now();
        let deadline = started + self.max_wait;
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled { started, attempts };
            }
            if Instant::now() >= deadline {
                return PollOutcome::TimedOut { started, attempts };
            }

            attempts = attempts.saturating_add(1);
            let probe = timeout_at(deadline, self.probe.probe(&self.address, self.port));
            let result = tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled { started, attempts },
                result = probe => result,
            };
            match result {
                Ok(true) => {
                    return PollOutcome::Ready {
                        started,
                        ready_at: Instant::now(),
                        attempts,
                    }
                }
                Ok(false) => {}
                Err(_) => return PollOutcome::TimedOut { started, attempts },
            }

            if self.poll_interval.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            let wake = (Instant::now() + self.poll_interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled { started, attempts },
                _ = sleep_until(wake) => {}
            }
        }
    }
}
