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

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::cycle::MeasurementCycle;
use super::machine::{advance, Effect};
use super::poller::{PollOutcome, ReadinessPoller};
use crate::podtimer::logger::{log_info, log_warn};
use crate::podtimer::watch::{StreamError, Subscription};

const COMPONENT: &str = "timing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEnd {
    /// The readiness wait finished, with or without the application coming up.
    Measured(MeasurementCycle),
    /// The server closed the watch before the cycle finished.
    StreamClosed(MeasurementCycle),
    /// Shutdown was requested.
    Shutdown(MeasurementCycle),
}

/// Consumes one subscription until a cycle has been measured.
pub struct TimingStateMachine<'a> {
    poller: &'a ReadinessPoller,
}

impl<'a> TimingStateMachine<'a> {
    pub fn new(poller: &'a ReadinessPoller) -> Self {
        Self { poller }
    }

    pub async fn measure(
        &self,
        subscription: &mut Subscription,
        shutdown: &CancellationToken,
    ) -> Result<CycleEnd, StreamError> {
        let mut cycle = MeasurementCycle::new();

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => return Ok(CycleEnd::Shutdown(cycle)),
                next = subscription.next() => next,
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(err)) => return Err(err),
                None => return Ok(CycleEnd::StreamClosed(cycle)),
            };

            log_info(
                COMPONENT,
                "Pod event",
                &[
                    ("event", event.kind.as_str()),
                    ("pod", &event.pod_name),
                    ("phase", event.phase.as_str()),
                ],
            );

            let (next, effect) = advance(cycle, &event, Instant::now());
            cycle = next;

            match effect {
                None => {}
                Some(Effect::CycleStarted { pod }) => {
                    log_info(COMPONENT, "New pod detected as Pending", &[("pod", &pod)]);
                }
                Some(Effect::PodRecreated { previous, pod }) => {
                    log_info(
                        COMPONENT,
                        "Recreated pod detected as Pending",
                        &[("pod", &pod), ("previous", &previous)],
                    );
                }
                Some(Effect::StreamFailed { pod }) => {
                    return Err(StreamError::Remote {
                        code: None,
                        message: format!("error event received for pod {pod}"),
                    });
                }
                Some(Effect::AwaitReadiness { pod, node }) => {
                    let node = node.as_deref().unwrap_or("unknown");
                    log_info(
                        COMPONENT,
                        "Pod is now Running",
                        &[("pod", &pod), ("node", node)],
                    );
                    return Ok(self.await_readiness(cycle, shutdown).await);
                }
            }
        }
    }

    async fn await_readiness(
        &self,
        mut cycle: MeasurementCycle,
        shutdown: &CancellationToken,
    ) -> CycleEnd {
        let (address, port) = self.poller.target();
        let port = port.to_string();
        log_info(
            COMPONENT,
            "Waiting for application to become accessible",
            &[
                ("address", address),
                ("port", &port),
                ("probe", self.poller.probe_name()),
            ],
        );

        let outcome = self.poller.wait_until_ready(shutdown).await;
        let attempts = outcome.attempts().to_string();
        match outcome {
            PollOutcome::Ready { .. } => {
                log_info(
                    COMPONENT,
                    "Application is accessible",
                    &[("attempts", &attempts)],
                );
            }
            PollOutcome::TimedOut { .. } => {
                let max_wait = humantime::format_duration(self.poller.max_wait()).to_string();
                log_warn(
                    COMPONENT,
                    "Application did not become accessible in time",
                    &[("attempts", &attempts), ("max_wait", &max_wait)],
                );
            }
            PollOutcome::Cancelled { .. } => {
                log_info(
                    COMPONENT,
                    "Readiness wait cancelled",
                    &[("attempts", &attempts)],
                );
                return CycleEnd::Shutdown(cycle);
            }
        }

        cycle.settle_readiness(outcome.started(), outcome.ready_at());
        CycleEnd::Measured(cycle)
    }
}
