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

//! Pure transition function for [`MeasurementCycle`]. Rules, in order:
//!
//! 1. `ADDED`/`Pending` with nothing tracked starts a cycle.
//! 2. `ADDED`/`Pending` for a different pod before the tracked pod ran is a
//!    recreation: the start time and tracked pod are replaced.
//! 3. `MODIFIED`/`Running` for the tracked pod sets pod ready (first wins)
//!    and asks the caller to wait for application readiness.
//!
//! Everything else is inert.

use tokio::time::Instant;

use super::cycle::{CycleState, MeasurementCycle};
use crate::podtimer::watch::{EventKind, LifecycleEvent, PodPhase};

/// Work the caller performs after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    CycleStarted {
        pod: String,
    },
    PodRecreated {
        previous: String,
        pod: String,
    },
    AwaitReadiness {
        pod: String,
        node: Option<String>,
    },
    /// An `ERROR` event arrived; the stream is no longer trustworthy.
    StreamFailed {
        pod: String,
    },
}

pub fn advance(
    mut cycle: MeasurementCycle,
    event: &LifecycleEvent,
    now: Instant,
) -> (MeasurementCycle, Option<Effect>) {
    if event.kind == EventKind::Error {
        let pod = event.pod_name.clone();
        return (cycle, Some(Effect::StreamFailed { pod }));
    }
    if cycle.state() == CycleState::Reporting {
        return (cycle, None);
    }

    let effect = match (event.kind, event.phase) {
        (EventKind::Added, PodPhase::Pending) => match cycle.tracked_pod_name.take() {
            None if cycle.migration_start_ts.is_none() => {
                cycle.migration_start_ts = Some(now);
                cycle.tracked_pod_name = Some(event.pod_name.clone());
                Some(Effect::CycleStarted {
                    pod: event.pod_name.clone(),
                })
            }
            Some(previous) if previous != event.pod_name && cycle.pod_ready_ts.is_none() => {
                cycle.migration_start_ts = Some(now);
                cycle.tracked_pod_name = Some(event.pod_name.clone());
                Some(Effect::PodRecreated {
                    previous,
                    pod: event.pod_name.clone(),
                })
            }
            tracked => {
                cycle.tracked_pod_name = tracked;
                None
            }
        },
        (EventKind::Modified, PodPhase::Running) if cycle.is_tracking(&event.pod_name) => {
            match cycle.migration_start_ts {
                Some(start) => {
                    if cycle.pod_ready_ts.is_none() {
                        cycle.pod_ready_ts = Some(now.max(start));
                    }
                    Some(Effect::AwaitReadiness {
                        pod: event.pod_name.clone(),
                        node: event.node_name.clone(),
                    })
                }
                None => None,
            }
        }
        _ => None,
    };

    (cycle, effect)
}
