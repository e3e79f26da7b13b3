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

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisResult};
use tokio::time::timeout;

use super::{ProbeFuture, ReadinessProbe};
use crate::podtimer::logger::log_debug;
use crate::podtimer::util::error::{new_error, with_context, BoxError};

const COMPONENT: &str = "probe.keyvalue";

/// Ready when the store answers `PING` with `PONG`.
pub struct KeyValueProbe {
    timeout: Duration,
}

impl KeyValueProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn ping(&self, address: &str, port: u16) -> Result<bool, BoxError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(address.trim_matches(['[', ']']).to_string(), port),
            redis: RedisConnectionInfo::default(),
        };
        let client = redis::Client::open(info)
            .map_err(|err| with_context(err, "invalid key-value store address"))?;

        let mut connection = timeout(self.timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| new_error("connect timed out"))?
            .map_err(|err| with_context(err, "connect failed"))?;

        let command = redis::cmd("PING");
        let reply: RedisResult<String> = timeout(self.timeout, command.query_async(&mut connection))
            .await
            .map_err(|_| new_error("PING timed out"))?;
        let reply = reply.map_err(|err| with_context(err, "PING failed"))?;
        Ok(reply == "PONG")
    }
}

impl ReadinessProbe for KeyValueProbe {
    fn name(&self) -> &'static str {
        "keyvalue"
    }

    fn probe<'a>(&'a self, address: &'a str, port: u16) -> ProbeFuture<'a> {
        Box::pin(async move {
            log_debug(
                COMPONENT,
                "Pinging key-value store",
                &[("address", address), ("port", &port.to_string())],
            );
            match self.ping(address, port).await {
                Ok(ready) => ready,
                Err(err) => {
                    log_debug(
                        COMPONENT,
                        "Probe failed",
                        &[("address", address), ("error", &err.to_string())],
                    );
                    false
                }
            }
        })
    }
}
