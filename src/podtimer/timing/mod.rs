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

//! The timing state machine: [`cycle`] holds one measurement, [`machine`]
//! advances it per event, [`poller`] waits for application readiness and
//! [`driver`] feeds a subscription through all three.

pub mod cycle;
pub mod driver;
pub mod machine;
pub mod poller;

pub use cycle::{CycleState, MeasurementCycle};
pub use driver::{CycleEnd, TimingStateMachine};
pub use machine::{advance, Effect};
pub use poller::{PollOutcome, ReadinessPoller};
