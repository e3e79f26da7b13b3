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

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    AwaitingPodReady,
    AwaitingAppReady,
    Reporting,
}

/// Timestamps for one migration or deployment. Each field is written at
/// most once and in field order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeasurementCycle {
    pub tracked_pod_name: Option<String>,
    pub migration_start_ts: Option<Instant>,
    pub pod_ready_ts: Option<Instant>,
    /// When readiness polling began; the reference point for time to app ready.
    pub polling_started_ts: Option<Instant>,
    pub app_ready_ts: Option<Instant>,
    /// Set once the readiness wait returned, whether or not the app came up.
    pub readiness_settled: bool,
}

impl MeasurementCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CycleState {
        if self.readiness_settled {
            CycleState::Reporting
        } else if self.pod_ready_ts.is_some() {
            CycleState::AwaitingAppReady
        } else if self.migration_start_ts.is_some() {
            CycleState::AwaitingPodReady
        } else {
            CycleState::Idle
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state() == CycleState::Idle
    }

    pub fn is_tracking(&self, pod_name: &str) -> bool {
        self.tracked_pod_name.as_deref() == Some(pod_name)
    }

    /// Record the outcome of the readiness wait. `ready_at` is `None` when the
    /// deadline expired or the wait was cancelled.
    pub fn settle_readiness(&mut self, started: Instant, ready_at: Option<Instant>) {
        if self.readiness_settled {
            return;
        }
        self.polling_started_ts.get_or_insert(started);
        if self.app_ready_ts.is_none() {
            self.app_ready_ts = ready_at;
        }
        self.readiness_settled = true;
    }
}
