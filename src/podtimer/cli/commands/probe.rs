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

use crate::podtimer::cli::args::ProbeArgs;
use crate::podtimer::cli::Terminal;
use crate::podtimer::probe::probe_for;
use crate::podtimer::util::error::{new_error, BoxError};

pub(super) async fn handle_probe(args: &ProbeArgs) -> Result<bool, BoxError> {
    let target = &args.target;
    if target.address.trim().is_empty() {
        return Err(new_error("--address must not be empty"));
    }
    let probe = probe_for(target.app_type.into(), target.probe_timeout)?;
    let ready = probe.probe(target.address.trim(), target.port).await;
    let verdict = if ready { "ready" } else { "not ready" };
    Terminal::stdout(format_args!("{verdict}"));
    Ok(ready)
}
