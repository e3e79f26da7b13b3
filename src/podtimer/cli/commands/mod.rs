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

mod probe;
mod watch;

use crate::podtimer::logger::{self, LogLevel};
use crate::podtimer::observability::tracing;
use crate::podtimer::util::error::BoxError;

use super::args::Commands;

pub async fn run(command: &Commands) -> Result<(), BoxError> {
    match command {
        Commands::Watch(args) => {
            logger::set_log_format(args.log_format.into());
            logger::set_min_level(if args.verbose {
                LogLevel::Debug
            } else {
                LogLevel::Info
            });
            tracing::init();
            watch::handle_watch(args).await
        }
        Commands::Probe(args) => {
            let ready = probe::handle_probe(args).await?;
            if !ready {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
