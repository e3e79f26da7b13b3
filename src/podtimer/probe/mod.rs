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

//! Application readiness probes. A probe answers a single yes/no question
//! and never fails: every transport or protocol error reads as "not ready".
//! Retrying is the caller's job.

pub mod http;
pub mod keyvalue;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::podtimer::util::error::BoxError;

pub use http::HttpProbe;
pub use keyvalue::KeyValueProbe;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

pub trait ReadinessProbe: Send + Sync {
    fn name(&self) -> &'static str;

    fn probe<'a>(&'a self, address: &'a str, port: u16) -> ProbeFuture<'a>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppType {
    Http,
    KeyValue,
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppType::Http => f.write_str("http"),
            AppType::KeyValue => f.write_str("keyvalue"),
        }
    }
}

/// Build the probe that matches `app_type`.
pub fn probe_for(
    app_type: AppType,
    timeout: Duration,
) -> Result<Box<dyn ReadinessProbe>, BoxError> {
    Ok(match app_type {
        AppType::Http => Box::new(HttpProbe::new(timeout)?),
        AppType::KeyValue => Box::new(KeyValueProbe::new(timeout)),
    })
}

/// `host:port`, bracketing bare IPv6 literals.
pub(crate) fn authority(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}
