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

use std::env;
use std::path::{Component, PathBuf};

use crate::podtimer::util::error::{new_error, BoxError};

const DEFAULT_KUBECONFIG: &str = "~/.kube/config";

/// Environment-provided settings for reaching the orchestrator API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Config {
    Server,
    Token,
    Kubeconfig,
    Insecure,
}

impl Config {
    /// Returns the associated environment variable for the config parameter.
    pub fn env_var(&self) -> &'static str {
        match self {
            Config::Server => "PODTIMER_SERVER",
            Config::Token => "PODTIMER_TOKEN",
            Config::Kubeconfig => "KUBECONFIG",
            Config::Insecure => "PODTIMER_INSECURE",
        }
    }

    /// The trimmed value of the variable, `None` when unset or blank.
    pub fn get(&self) -> Option<String> {
        env::var(self.env_var())
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn get_flag(&self) -> Result<bool, BoxError> {
        match self.get() {
            None => Ok(false),
            Some(value) => parse_flag(&value).ok_or_else(|| {
                new_error(format!(
                    "{} must be one of 1, 0, true, false, yes, no (got '{}')",
                    self.env_var(),
                    value
                ))
            }),
        }
    }

    /// Kubeconfig location: the first entry of `KUBECONFIG` or `~/.kube/config`.
    pub fn kubeconfig_path() -> PathBuf {
        let raw = Config::Kubeconfig
            .get()
            .and_then(|value| {
                // KUBECONFIG may hold a colon separated list; only the first is read.
                value
                    .split(':')
                    .map(str::trim)
                    .find(|entry| !entry.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_KUBECONFIG.to_string());
        normalize_path(&raw)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Expand a leading `~/`, make the path absolute and collapse `.`/`..`.
pub fn normalize_path(input: &str) -> PathBuf {
    let path: PathBuf = match input {
        _ if input.starts_with("~/") => env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(&input[2..])),
        _ if !input.starts_with('/') => env::current_dir().ok().map(|cwd| cwd.join(input)),
        _ => None,
    }
    .unwrap_or_else(|| PathBuf::from(input));

    path.components()
        .fold(PathBuf::new(), |mut normalized, component| {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                _ => normalized.push(component),
            }
            normalized
        })
}
