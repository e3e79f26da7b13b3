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

//! Scripted doubles for the watch, probe and report seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};

use crate::podtimer::probe::{ProbeFuture, ReadinessProbe};
use crate::podtimer::report::{MetricsReport, ReportSink};
use crate::podtimer::util::error::BoxError;
use crate::podtimer::watch::{
    EventKind, EventSource, LifecycleEvent, PodEventStream, PodPhase, StreamError,
    SubscribeFuture, Subscription,
};

/// Probe that fails a fixed number of times before succeeding.
#[derive(Clone)]
pub struct ScriptedProbe {
    failures_before_ready: Option<u32>,
    latency: Duration,
    calls: Arc<AtomicU32>,
}

impl ScriptedProbe {
    pub fn ready_after(failures: u32) -> Self {
        Self {
            failures_before_ready: Some(failures),
            latency: Duration::ZERO,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn never() -> Self {
        Self {
            failures_before_ready: None,
            latency: Duration::ZERO,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Shared call counter, still readable after the probe moved into a poller.
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl ReadinessProbe for ScriptedProbe {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn probe<'a>(&'a self, _address: &'a str, _port: u16) -> ProbeFuture<'a> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.failures_before_ready {
                Some(failures) => call > failures,
                None => false,
            }
        })
    }
}

/// One watch session: items delivered after their delays, then either held
/// open forever or closed cleanly.
#[derive(Default)]
pub struct ScriptedSession {
    steps: Vec<(Duration, Result<LifecycleEvent, StreamError>)>,
    close: bool,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, delay: Duration, event: LifecycleEvent) -> Self {
        self.steps.push((delay, Ok(event)));
        self
    }

    pub fn error(mut self, delay: Duration, error: StreamError) -> Self {
        self.steps.push((delay, Err(error)));
        self
    }

    pub fn then_close(mut self) -> Self {
        self.close = true;
        self
    }

    pub fn into_stream(self) -> PodEventStream {
        let steps = stream::iter(self.steps).then(|(delay, item)| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });
        if self.close {
            steps.boxed()
        } else {
            steps.chain(stream::pending()).boxed()
        }
    }

    pub fn into_subscription(self) -> Subscription {
        Subscription::new("default", "app=test", self.into_stream())
    }
}

/// Hands out scripted sessions in order. Once the script runs out every
/// subscription stays open without events.
pub struct ScriptedEventSource {
    sessions: Mutex<VecDeque<Result<ScriptedSession, StreamError>>>,
    subscriptions: Arc<AtomicUsize>,
}

impl ScriptedEventSource {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(VecDeque::new()),
            subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn session(self, session: ScriptedSession) -> Self {
        self.push(Ok(session))
    }

    /// The next subscribe call fails with `error`.
    pub fn refuse(self, error: StreamError) -> Self {
        self.push(Err(error))
    }

    pub fn subscriptions(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.subscriptions)
    }

    fn push(self, entry: Result<ScriptedSession, StreamError>) -> Self {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(entry);
        self
    }
}

impl Default for ScriptedEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for ScriptedEventSource {
    fn subscribe<'a>(&'a self, namespace: &'a str, label_selector: &'a str) -> SubscribeFuture<'a> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let next = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(ScriptedSession::new()));
        Box::pin(async move {
            let session = next?;
            Ok(Subscription::new(
                namespace,
                label_selector,
                session.into_stream(),
            ))
        })
    }
}

/// Sink that keeps every report for later assertions.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<MetricsReport>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<MetricsReport> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ReportSink for RecordingReporter {
    fn emit(&self, report: &MetricsReport) -> Result<(), BoxError> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(report.clone());
        Ok(())
    }
}

pub fn pending(pod: &str) -> LifecycleEvent {
    LifecycleEvent::new(EventKind::Added, pod, PodPhase::Pending)
}

pub fn running(pod: &str) -> LifecycleEvent {
    LifecycleEvent::new(EventKind::Modified, pod, PodPhase::Running)
}
