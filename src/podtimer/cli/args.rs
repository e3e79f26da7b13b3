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

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::podtimer::logger::LogFormat;
use crate::podtimer::probe::AppType;
use crate::podtimer::report::OutputFormat;

/// Parse a human readable duration such as `50ms`, `10m` or `0s`.
fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| format!("Invalid duration '{}': {}", s, e))
}

/// Measures pod migration and deployment latency through to application readiness.
#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct PodTimer {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch pods and report timing for every migration or deployment
    Watch(WatchArgs),

    /// Run a single readiness probe against the application
    Probe(ProbeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    /// Address the application listens on
    #[arg(long)]
    pub address: String,

    /// Port the application listens on
    #[arg(long)]
    pub port: u16,

    /// Protocol used to check readiness
    #[arg(long, value_enum, default_value_t = AppTypeArg::Http)]
    pub app_type: AppTypeArg,

    /// Timeout for each readiness probe
    #[arg(long, value_parser = parse_duration_arg, default_value = "100ms")]
    pub probe_timeout: Duration,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Namespace to watch
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Label selector identifying the pods to time (e.g. app=video)
    #[arg(short = 'l', long)]
    pub selector: String,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Delay between readiness probes; 0s probes back to back
    #[arg(long, value_parser = parse_duration_arg, default_value = "50ms")]
    pub poll_interval: Duration,

    /// Give up waiting for the application after this long
    #[arg(long, value_parser = parse_duration_arg, default_value = "10m")]
    pub max_wait: Duration,

    /// Backoff after a failed watch, doubled per failure up to 10s; 0s restarts immediately
    #[arg(long, value_parser = parse_duration_arg, default_value = "0s")]
    pub restart_backoff: Duration,

    /// API server URL, overriding PODTIMER_SERVER and the kubeconfig
    #[arg(long)]
    pub server: Option<String>,

    /// Format of the metrics report
    #[arg(long, value_enum, default_value_t = OutputFormatArg::Text)]
    pub output: OutputFormatArg,

    /// Format of log lines
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    /// Include debug diagnostics in the log output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AppTypeArg {
    Http,
    #[value(name = "keyvalue", alias = "redis")]
    KeyValue,
}

impl From<AppTypeArg> for AppType {
    fn from(value: AppTypeArg) -> Self {
        match value {
            AppTypeArg::Http => AppType::Http,
            AppTypeArg::KeyValue => AppType::KeyValue,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatArg {
    Text,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(value: OutputFormatArg) -> Self {
        match value {
            OutputFormatArg::Text => OutputFormat::Text,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
