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

//! Kubeconfig loading for the current context: server URL, trust anchors
//! and the credentials the watch request presents.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use crate::podtimer::config::Config;
use crate::podtimer::util::error::{new_error, with_context, BoxError};

#[derive(Deserialize)]
struct KubeConfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    current_context: Option<String>,
}

#[derive(Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Deserialize)]
struct Cluster {
    server: String,
    #[serde(rename = "certificate-authority-data")]
    certificate_authority_data: Option<String>,
    #[serde(rename = "certificate-authority")]
    certificate_authority: Option<String>,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserEntry,
}

#[derive(Deserialize, Default)]
struct UserEntry {
    #[serde(rename = "client-certificate-data")]
    client_certificate_data: Option<String>,
    #[serde(rename = "client-certificate")]
    client_certificate: Option<String>,
    #[serde(rename = "client-key-data")]
    client_key_data: Option<String>,
    #[serde(rename = "client-key")]
    client_key: Option<String>,
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<String>,
}

#[derive(Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Deserialize)]
struct ContextEntry {
    cluster: String,
    user: String,
}

/// PEM client certificate and its private key.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

/// Resolved connection settings for one kubeconfig context.
#[derive(Debug, Clone)]
pub struct KubeAuth {
    pub kubeconfig_path: PathBuf,
    pub context: String,
    pub server: String,
    pub ca_pem: Option<Vec<u8>>,
    pub identity: Option<ClientIdentity>,
    pub token: Option<String>,
    pub insecure: bool,
}

/// Load the kubeconfig named by [`Config::kubeconfig_path`]. A missing file
/// is not an error: callers fall back to `PODTIMER_SERVER`.
pub fn load() -> Result<Option<KubeAuth>, BoxError> {
    let path = Config::kubeconfig_path();
    match fs::read_to_string(&path) {
        Ok(raw) => parse(&raw, &path).map(Some),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(read_failed(err, "kubeconfig", &path)),
    }
}

pub fn load_from_path(path: &Path) -> Result<KubeAuth, BoxError> {
    let raw = fs::read_to_string(path).map_err(|err| read_failed(err, "kubeconfig", path))?;
    parse(&raw, path)
}

fn read_failed(err: io::Error, what: &str, path: &Path) -> BoxError {
    with_context(err, format!("failed to read {what} {}", path.display()))
}

fn parse(raw: &str, path: &Path) -> Result<KubeAuth, BoxError> {
    let shown = path.display();
    let config: KubeConfig = serde_yaml::from_str(raw)
        .map_err(|err| with_context(err, format!("failed to parse kubeconfig {shown}")))?;

    let context_name = config
        .current_context
        .clone()
        .filter(|name| !name.is_empty())
        .or_else(|| config.contexts.first().map(|ctx| ctx.name.clone()))
        .ok_or_else(|| new_error("kubeconfig does not define any contexts"))?;

    let context = config
        .contexts
        .iter()
        .find(|ctx| ctx.name == context_name)
        .ok_or_else(|| new_error(format!("kubeconfig missing context '{}'", context_name)))?;

    let cluster = config
        .clusters
        .iter()
        .find(|cl| cl.name == context.context.cluster)
        .ok_or_else(|| {
            new_error(format!(
                "kubeconfig missing cluster '{}' referenced by context '{}'",
                context.context.cluster, context_name
            ))
        })?;

    let user = config
        .users
        .iter()
        .find(|usr| usr.name == context.context.user);

    let config_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let ca_pem = read_field(
        cluster.cluster.certificate_authority_data.as_deref(),
        cluster.cluster.certificate_authority.as_deref(),
        &config_dir,
        "certificate authority",
    )?;

    let (identity, token) = match user {
        Some(user) => {
            let cert = read_field(
                user.user.client_certificate_data.as_deref(),
                user.user.client_certificate.as_deref(),
                &config_dir,
                "client certificate",
            )?;
            let key = read_field(
                user.user.client_key_data.as_deref(),
                user.user.client_key.as_deref(),
                &config_dir,
                "client key",
            )?;
            let identity = match (cert, key) {
                (Some(cert), Some(key)) => Some(ClientIdentity {
                    cert_pem: cert,
                    key_pem: key,
                }),
                (None, None) => None,
                (Some(_), None) => {
                    return Err(new_error(format!(
                        "kubeconfig user '{}' has a client certificate but no client key",
                        user.name
                    )))
                }
                (None, Some(_)) => {
                    return Err(new_error(format!(
                        "kubeconfig user '{}' has a client key but no client certificate",
                        user.name
                    )))
                }
            };
            let token = read_token(&user.user, &config_dir)?;
            (identity, token)
        }
        None => (None, None),
    };

    Ok(KubeAuth {
        kubeconfig_path: path.to_path_buf(),
        context: context_name,
        server: cluster.cluster.server.clone(),
        ca_pem,
        identity,
        token,
        insecure: cluster.cluster.insecure_skip_tls_verify,
    })
}

fn read_token(user: &UserEntry, config_dir: &Path) -> Result<Option<String>, BoxError> {
    if let Some(token) = user.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(Some(token.to_string()));
    }
    match user.token_file.as_deref() {
        Some(file) => {
            let resolved = resolve_path(file, config_dir)?;
            let contents = fs::read_to_string(&resolved)
                .map_err(|err| read_failed(err, "token file", &resolved))?;
            Ok(Some(contents.trim().to_string()).filter(|t| !t.is_empty()))
        }
        None => Ok(None),
    }
}

fn resolve_path(path: &str, base_dir: &Path) -> Result<PathBuf, BoxError> {
    let trimmed = path.trim();
    let expanded = match trimmed.strip_prefix("~/") {
        Some(stripped) => {
            let home = env::var("HOME")
                .map_err(|_| new_error("HOME environment variable is not set"))?;
            PathBuf::from(home).join(stripped)
        }
        None => PathBuf::from(trimmed),
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn read_field(
    data_field: Option<&str>,
    path_field: Option<&str>,
    config_dir: &Path,
    field_name: &str,
) -> Result<Option<Vec<u8>>, BoxError> {
    if let Some(raw) = data_field.map(str::trim).filter(|raw| !raw.is_empty()) {
        let bytes = BASE64
            .decode(raw)
            .map_err(|err| with_context(err, format!("failed to decode base64 for {field_name}")))?;
        return Ok(Some(bytes));
    }

    if let Some(path) = path_field.filter(|path| !path.trim().is_empty()) {
        let resolved = resolve_path(path, config_dir)?;
        let bytes = fs::read(&resolved).map_err(|err| {
            with_context(
                err,
                format!("failed to read {} from {}", field_name, resolved.display()),
            )
        })?;
        return Ok(Some(bytes));
    }

    Ok(None)
}
