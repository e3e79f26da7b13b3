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

//! Restart shell around the timing state machine. Each iteration owns one
//! watch subscription and at most one measurement cycle.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::podtimer::logger::{log_debug, log_error, log_info, log_warn};
use crate::podtimer::observability::tracing;
use crate::podtimer::report::{MetricsReport, ReportSink};
use crate::podtimer::timing::{CycleEnd, ReadinessPoller, TimingStateMachine};
use crate::podtimer::watch::{EventSource, StreamError};

const COMPONENT: &str = "supervisor";
const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct MonitorSettings {
    pub namespace: String,
    pub label_selector: String,
    /// Delay after the first failed iteration, doubled per consecutive
    /// failure. Zero restarts immediately.
    pub restart_backoff: Duration,
}

impl MonitorSettings {
    pub fn new(namespace: impl Into<String>, label_selector: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            label_selector: label_selector.into(),
            restart_backoff: Duration::ZERO,
        }
    }

    pub fn with_restart_backoff(mut self, restart_backoff: Duration) -> Self {
        self.restart_backoff = restart_backoff;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IterationOutcome {
    Reported(MetricsReport),
    /// The watch closed before any pod was tracked.
    Idle,
    Failed(StreamError),
    Shutdown,
}

pub struct Supervisor {
    source: Box<dyn EventSource>,
    poller: ReadinessPoller,
    reporter: Box<dyn ReportSink>,
    settings: MonitorSettings,
}

impl Supervisor {
    pub fn new(
        source: Box<dyn EventSource>,
        poller: ReadinessPoller,
        reporter: Box<dyn ReportSink>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            poller,
            reporter,
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Runs iterations until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut cycle: u64 = 0;
        let mut failures: u32 = 0;

        while !shutdown.is_cancelled() {
            cycle = cycle.wrapping_add(1);
            let iteration = self.run_iteration(&shutdown);
            let outcome = tracing::with_span(COMPONENT, format!("cycle-{cycle}"), iteration).await;

            match outcome {
                IterationOutcome::Shutdown => break,
                IterationOutcome::Failed(_) => {
                    failures = failures.saturating_add(1);
                    let delay = restart_delay(self.settings.restart_backoff, failures);
                    if !delay.is_zero() {
                        let delay_text = humantime::format_duration(delay).to_string();
                        log_debug(COMPONENT, "Delaying restart", &[("delay", &delay_text)]);
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = sleep(delay) => {}
                        }
                    }
                }
                IterationOutcome::Reported(_) | IterationOutcome::Idle => failures = 0,
            }
        }

        log_info(COMPONENT, "Monitoring stopped", &[]);
    }

    /// One subscribe, consume and report pass. The subscription is released
    /// before this returns.
    pub async fn run_iteration(&self, shutdown: &CancellationToken) -> IterationOutcome {
        let namespace = self.settings.namespace.as_str();
        let selector = self.settings.label_selector.as_str();
        log_info(
            COMPONENT,
            "Monitoring pod events...",
            &[("namespace", namespace), ("selector", selector)],
        );

        let subscribed = tokio::select! {
            _ = shutdown.cancelled() => return IterationOutcome::Shutdown,
            subscribed = self.source.subscribe(namespace, selector) => subscribed,
        };
        let mut subscription = match subscribed {
            Ok(subscription) => subscription,
            Err(err) => {
                log_failure("Watch subscription failed", &err);
                return IterationOutcome::Failed(err);
            }
        };

        let result = TimingStateMachine::new(&self.poller)
            .measure(&mut subscription, shutdown)
            .await;
        subscription.stop();

        match result {
            Ok(CycleEnd::Measured(cycle)) => {
                let report = MetricsReport::from_cycle(&cycle);
                self.publish(&report);
                log_info(COMPONENT, "Resuming monitoring for new pod events...", &[]);
                IterationOutcome::Reported(report)
            }
            Ok(CycleEnd::StreamClosed(cycle)) if cycle.is_idle() => {
                log_debug(COMPONENT, "Watch closed by server; re-subscribing", &[]);
                IterationOutcome::Idle
            }
            Ok(CycleEnd::StreamClosed(cycle)) => {
                log_warn(
                    COMPONENT,
                    "Watch closed before the cycle finished",
                    &[("pod", cycle.tracked_pod_name.as_deref().unwrap_or(""))],
                );
                let report = MetricsReport::from_cycle(&cycle);
                self.publish(&report);
                IterationOutcome::Reported(report)
            }
            Ok(CycleEnd::Shutdown(_)) => IterationOutcome::Shutdown,
            Err(err) => {
                log_failure("Watch failed; discarding current cycle", &err);
                IterationOutcome::Failed(err)
            }
        }
    }

    fn publish(&self, report: &MetricsReport) {
        if let Err(err) = self.reporter.emit(report) {
            let error = err.to_string();
            log_error(
                COMPONENT,
                "Failed to emit metrics report",
                &[("error", &error)],
            );
        }
    }
}

fn log_failure(message: &str, err: &StreamError) {
    let error = err.to_string();
    log_error(
        COMPONENT,
        message,
        &[("error", &error), ("kind", err.kind())],
    );
}

fn restart_delay(base: Duration, failures: u32) -> Duration {
    if base.is_zero() || failures == 0 {
        return Duration::ZERO;
    }
    let shift = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(MAX_RESTART_BACKOFF)
}
