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

use reqwest::{Client, StatusCode};

use super::{authority, ProbeFuture, ReadinessProbe};
use crate::podtimer::logger::log_debug;
use crate::podtimer::util::error::{with_context, BoxError};

const COMPONENT: &str = "probe.http";

/// Ready when `GET /` answers 200.
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, BoxError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| with_context(err, "failed to construct HTTP probe client"))?;
        Ok(Self { client })
    }

    async fn check(&self, address: &str, port: u16) -> bool {
        let url = format!("http://{}/", authority(address, port));
        log_debug(COMPONENT, "Probing application", &[("url", &url)]);
        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                log_debug(
                    COMPONENT,
                    "Probe response",
                    &[("url", &url), ("status", status.as_str())],
                );
                status == StatusCode::OK
            }
            Err(err) => {
                log_debug(
                    COMPONENT,
                    "Probe failed",
                    &[("url", &url), ("error", &err.to_string())],
                );
                false
            }
        }
    }
}

impl ReadinessProbe for HttpProbe {
    fn name(&self) -> &'static str {
        "http"
    }

    fn probe<'a>(&'a self, address: &'a str, port: u16) -> ProbeFuture<'a> {
        Box::pin(self.check(address, port))
    }
}
