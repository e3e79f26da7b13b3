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

use tokio_util::sync::CancellationToken;

use crate::podtimer::cli::args::WatchArgs;
use crate::podtimer::k8s::client::ApiClient;
use crate::podtimer::logger::log_info;
use crate::podtimer::probe::{probe_for, AppType};
use crate::podtimer::report::StdoutReporter;
use crate::podtimer::supervisor::{MonitorSettings, Supervisor};
use crate::podtimer::timing::ReadinessPoller;
use crate::podtimer::util::error::{new_error, BoxError};
use crate::podtimer::watch::kube::KubeEventSource;

pub(super) async fn handle_watch(args: &WatchArgs) -> Result<(), BoxError> {
    let namespace = args.namespace.trim();
    let selector = args.selector.trim();
    if namespace.is_empty() {
        return Err(new_error("--namespace must not be empty"));
    }
    if selector.is_empty() {
        return Err(new_error("--selector must not be empty"));
    }
    if args.target.port == 0 {
        return Err(new_error("--port must be between 1 and 65535"));
    }

    let client = ApiClient::from_environment(args.server.as_deref())?;
    let base_url = client.base_url().to_string();
    let source = KubeEventSource::new(client);

    let probe = probe_for(args.target.app_type.into(), args.target.probe_timeout)?;
    let poller = ReadinessPoller::new(probe, args.target.address.trim(), args.target.port)
        .with_poll_interval(args.poll_interval)
        .with_max_wait(args.max_wait);

    let settings =
        MonitorSettings::new(namespace, selector).with_restart_backoff(args.restart_backoff);
    let supervisor = Supervisor::new(
        Box::new(source),
        poller,
        Box::new(StdoutReporter::new(args.output.into())),
        settings,
    );

    let app_type = AppType::from(args.target.app_type).to_string();
    let port = args.target.port.to_string();
    log_info(
        "cli",
        "Starting pod timer",
        &[
            ("server", &base_url),
            ("namespace", namespace),
            ("selector", selector),
            ("address", args.target.address.trim()),
            ("port", &port),
            ("app_type", &app_type),
        ],
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_info("cli", "Interrupt received; shutting down", &[]);
            signal_token.cancel();
        }
    });

    supervisor.run(shutdown).await;
    Ok(())
}
