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

//! Pod lifecycle event streams. An [`EventSource`] opens a fresh
//! [`Subscription`] per call; a subscription ends with `None` on a clean
//! close or with a single `Err` after which nothing else is yielded.

pub mod kube;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::podtimer::logger::log_debug;

const COMPONENT: &str = "watch";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

impl EventKind {
    /// Parses the upper-case watch frame type.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ADDED" => Some(EventKind::Added),
            "MODIFIED" => Some(EventKind::Modified),
            "DELETED" => Some(EventKind::Deleted),
            "ERROR" => Some(EventKind::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "ADDED",
            EventKind::Modified => "MODIFIED",
            EventKind::Deleted => "DELETED",
            EventKind::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Unrecognised or missing phases map to `Unknown`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub pod_name: String,
    pub phase: PodPhase,
    pub node_name: Option<String>,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind, pod_name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            kind,
            pod_name: pod_name.into(),
            phase,
            node_name: None,
        }
    }

    pub fn on_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The watch request could not be sent.
    Connect(String),
    /// The API server rejected the watch request.
    Status { code: u16, message: String },
    /// The connection failed while events were being read.
    Transport(String),
    /// A frame could not be decoded into a pod event.
    Malformed(String),
    /// The server expired the watch (HTTP 410 Gone).
    Expired(String),
    /// The server ended the watch with an `ERROR` frame.
    Remote { code: Option<u16>, message: String },
}

impl StreamError {
    pub fn is_expired(&self) -> bool {
        matches!(self, StreamError::Expired(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Connect(_) => "connect",
            StreamError::Status { .. } => "status",
            StreamError::Transport(_) => "transport",
            StreamError::Malformed(_) => "malformed",
            StreamError::Expired(_) => "expired",
            StreamError::Remote { .. } => "remote",
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Connect(message) => write!(f, "watch request failed: {message}"),
            StreamError::Status { code, message } => {
                write!(f, "watch rejected with HTTP {code}: {message}")
            }
            StreamError::Transport(message) => write!(f, "watch connection lost: {message}"),
            StreamError::Malformed(message) => write!(f, "malformed watch event: {message}"),
            StreamError::Expired(message) => write!(f, "watch expired: {message}"),
            StreamError::Remote { code, message } => match code {
                Some(code) => write!(f, "watch ended by server ({code}): {message}"),
                None => write!(f, "watch ended by server: {message}"),
            },
        }
    }
}

impl std::error::Error for StreamError {}

pub type PodEventStream = BoxStream<'static, Result<LifecycleEvent, StreamError>>;
pub type SubscribeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Subscription, StreamError>> + Send + 'a>>;

/// Opens pod event subscriptions filtered by namespace and label selector.
pub trait EventSource: Send + Sync {
    fn subscribe<'a>(&'a self, namespace: &'a str, label_selector: &'a str) -> SubscribeFuture<'a>;
}

/// A live watch. Dropping it releases the underlying connection.
pub struct Subscription {
    namespace: String,
    label_selector: String,
    stream: PodEventStream,
    finished: bool,
}

impl Subscription {
    pub fn new(
        namespace: impl Into<String>,
        label_selector: impl Into<String>,
        stream: PodEventStream,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            label_selector: label_selector.into(),
            stream,
            finished: false,
        }
    }

    /// Next event; `None` once the stream closed or after an error was returned.
    pub async fn next(&mut self) -> Option<Result<LifecycleEvent, StreamError>> {
        if self.finished {
            return None;
        }
        let item = self.stream.next().await;
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn label_selector(&self) -> &str {
        &self.label_selector
    }

    pub fn stop(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        log_debug(
            COMPONENT,
            "Watch subscription released",
            &[
                ("namespace", &self.namespace),
                ("selector", &self.label_selector),
            ],
        );
    }
}
