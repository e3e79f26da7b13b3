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

use std::io::{self, Write};

use serde::Serialize;
use tokio::time::Instant;

use crate::podtimer::timing::MeasurementCycle;
use crate::podtimer::util::error::{with_context, BoxError};

pub const METRICS_HEADER: &str = "=== Pod Event Timing Metrics ===";
pub const METRICS_FOOTER: &str = "================================";
pub const INCOMPLETE_NOTICE: &str = "Metrics incomplete: Some events did not occur.";

/// Outcome of one measurement cycle. Durations are milliseconds rounded to
/// two decimals.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MetricsReport {
    Complete {
        pod: Option<String>,
        pod_ready_ms: f64,
        /// Measured from the start of readiness polling, not from pod ready.
        app_ready_ms: f64,
        total_ms: f64,
    },
    Incomplete {
        pod: Option<String>,
        missing: Vec<&'static str>,
    },
}

impl MetricsReport {
    pub fn from_cycle(cycle: &MeasurementCycle) -> Self {
        let pod = cycle.tracked_pod_name.clone();
        let mut missing = Vec::new();
        if cycle.migration_start_ts.is_none() {
            missing.push("migration_start");
        }
        if cycle.pod_ready_ts.is_none() {
            missing.push("pod_ready");
        }
        if cycle.app_ready_ts.is_none() {
            missing.push("app_ready");
        }

        let durations = match (
            cycle.migration_start_ts,
            cycle.pod_ready_ts,
            cycle.polling_started_ts,
            cycle.app_ready_ts,
        ) {
            (Some(start), Some(pod_ready), Some(polling), Some(app_ready)) => Some((
                millis_between(start, pod_ready),
                millis_between(polling, app_ready),
                millis_between(start, app_ready),
            )),
            _ => None,
        };

        match durations {
            Some((Some(pod_ready_ms), Some(app_ready_ms), Some(total_ms))) => {
                MetricsReport::Complete {
                    pod,
                    pod_ready_ms,
                    app_ready_ms,
                    total_ms,
                }
            }
            Some(_) => MetricsReport::Incomplete {
                pod,
                missing: vec!["ordered_timestamps"],
            },
            None => {
                if missing.is_empty() {
                    missing.push("polling_start");
                }
                MetricsReport::Incomplete { pod, missing }
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, MetricsReport::Complete { .. })
    }

    pub fn text_lines(&self) -> Vec<String> {
        match self {
            MetricsReport::Complete {
                pod_ready_ms,
                app_ready_ms,
                total_ms,
                ..
            } => vec![
                METRICS_HEADER.to_string(),
                format!("Time to Pod Ready: {pod_ready_ms:.2} ms"),
                format!("Time to Application Ready: {app_ready_ms:.2} ms"),
                format!("Total time: {total_ms:.2}"),
                METRICS_FOOTER.to_string(),
            ],
            MetricsReport::Incomplete { .. } => vec![INCOMPLETE_NOTICE.to_string()],
        }
    }
}

fn millis_between(earlier: Instant, later: Instant) -> Option<f64> {
    let elapsed = later.checked_duration_since(earlier)?;
    Some((elapsed.as_secs_f64() * 100_000.0).round() / 100.0)
}

pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &MetricsReport) -> Result<(), BoxError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Writes reports to standard output.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutReporter {
    format: OutputFormat,
}

impl StdoutReporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn render(&self, report: &MetricsReport) -> Result<String, BoxError> {
        match self.format {
            OutputFormat::Text => {
                let mut rendered = String::from("\n");
                rendered.push_str(&report.text_lines().join("\n"));
                Ok(rendered)
            }
            OutputFormat::Json => serde_json::to_string(report)
                .map_err(|err| with_context(err, "Failed to encode metrics report")),
        }
    }
}

impl ReportSink for StdoutReporter {
    fn emit(&self, report: &MetricsReport) -> Result<(), BoxError> {
        let rendered = self.render(report)?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{rendered}")
            .and_then(|_| stdout.flush())
            .map_err(|err| with_context(err, "Failed to write metrics report"))
    }
}
