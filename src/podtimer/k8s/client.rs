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

use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::x509::X509;
use reqwest::tls::{Certificate, Identity};
use reqwest::{Client, StatusCode, Url};

use crate::podtimer::config::Config;
use crate::podtimer::k8s::kubeconfig::{self, ClientIdentity, KubeAuth};
use crate::podtimer::util::error::{new_error, with_context, BoxError};
use crate::podtimer::watch::StreamError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_MAX_LEN: usize = 240;

/// Orchestrator API client scoped to the pod watch endpoint.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Build a client from, in order of precedence, `server_override`,
    /// `PODTIMER_SERVER`, or the current kubeconfig context.
    pub fn from_environment(server_override: Option<&str>) -> Result<Self, BoxError> {
        let insecure = Config::Insecure.get_flag()?;
        let token = Config::Token.get();
        let explicit_server = server_override
            .map(str::trim)
            .filter(|server| !server.is_empty())
            .map(str::to_string)
            .or_else(|| Config::Server.get());

        if let Some(server) = explicit_server {
            return Self::with_endpoint(&server, token, insecure);
        }

        let auth = kubeconfig::load()?.ok_or_else(|| {
            new_error(format!(
                "no kubeconfig found at {} and {} is not set",
                Config::kubeconfig_path().display(),
                Config::Server.env_var()
            ))
        })?;
        Self::from_kube_auth(&auth, token, insecure)
    }

    pub fn with_endpoint(
        server: &str,
        token: Option<String>,
        insecure: bool,
    ) -> Result<Self, BoxError> {
        let base_url = parse_base_url(server)?;
        let builder = base_builder().danger_accept_invalid_certs(insecure);
        let client = builder
            .build()
            .map_err(|err| with_context(err, "failed to construct API client"))?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_kube_auth(
        auth: &KubeAuth,
        token_override: Option<String>,
        insecure: bool,
    ) -> Result<Self, BoxError> {
        let base_url = parse_base_url(&auth.server)?;
        let mut builder = base_builder().danger_accept_invalid_certs(insecure || auth.insecure);

        if let Some(ca) = auth.ca_pem.as_ref() {
            let certificate = Certificate::from_pem(ca)
                .map_err(|err| with_context(err, "kubeconfig certificate authority is invalid"))?;
            builder = builder.add_root_certificate(certificate);
        }

        if let Some(identity) = auth.identity.as_ref() {
            builder = builder.identity(build_identity(identity)?);
        }

        let client = builder
            .build()
            .map_err(|err| with_context(err, "failed to construct API client"))?;

        Ok(Self {
            client,
            base_url,
            token: token_override.or_else(|| auth.token.clone()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn pod_watch_url(&self, namespace: &str, label_selector: &str) -> Result<Url, BoxError> {
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| new_error("base URL cannot be base for segments"))?;
            parts.pop_if_empty();
            for segment in ["api", "v1", "namespaces", namespace, "pods"] {
                parts.push(segment);
            }
        }
        url.query_pairs_mut()
            .append_pair("watch", "true")
            .append_pair("labelSelector", label_selector);
        Ok(url)
    }

    /// Open a pod watch. The response body is the newline-delimited frame stream.
    pub async fn watch_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<reqwest::Response, StreamError> {
        let url = self
            .pod_watch_url(namespace, label_selector)
            .map_err(|err| StreamError::Connect(err.to_string()))?;
        let mut request = self.client.get(url);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| StreamError::Connect(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut message = response.text().await.unwrap_or_default();
        if message.len() > ERROR_BODY_MAX_LEN {
            let mut end = ERROR_BODY_MAX_LEN;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        if message.trim().is_empty() {
            message = status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string();
        }

        if status == StatusCode::GONE {
            Err(StreamError::Expired(message))
        } else {
            Err(StreamError::Status {
                code: status.as_u16(),
                message,
            })
        }
    }
}

fn base_builder() -> reqwest::ClientBuilder {
    // No request timeout: a watch stays open until the server closes it.
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(Duration::from_secs(30))
        .http1_only()
}

/// native-tls only accepts client identities as PKCS#12.
fn build_identity(identity: &ClientIdentity) -> Result<Identity, BoxError> {
    let cert = X509::from_pem(&identity.cert_pem)
        .map_err(|err| with_context(err, "failed to parse client certificate"))?;
    let key = PKey::private_key_from_pem(&identity.key_pem)
        .map_err(|err| with_context(err, "failed to parse client key"))?;
    let pkcs12 = Pkcs12::builder()
        .name("podtimer-client")
        .pkey(&key)
        .cert(&cert)
        .build2("")
        .map_err(|err| with_context(err, "failed to build client PKCS#12 bundle"))?;
    let der = pkcs12
        .to_der()
        .map_err(|err| with_context(err, "failed to encode client PKCS#12 bundle"))?;
    Identity::from_pkcs12_der(&der, "")
        .map_err(|err| with_context(err, "failed to load client identity"))
}

fn parse_base_url(server: &str) -> Result<Url, BoxError> {
    Url::parse(server.trim())
        .map_err(|err| with_context(err, format!("invalid API server URL '{}'", server)))
}
