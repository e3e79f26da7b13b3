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

//! Event source backed by the Kubernetes pod watch API.

use std::fmt;

use futures_util::stream::{self, BoxStream, Stream};
use futures_util::StreamExt;
use serde_json::Value;

use super::{
    EventKind, EventSource, LifecycleEvent, PodEventStream, PodPhase, StreamError,
    SubscribeFuture, Subscription,
};
use crate::podtimer::k8s::client::ApiClient;
use crate::podtimer::k8s::pod::{Pod, Status, WatchEvent};
use crate::podtimer::logger::log_info;

const COMPONENT: &str = "watch";
/// Largest frame buffered while waiting for its terminating newline.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

pub struct KubeEventSource {
    client: ApiClient,
}

impl KubeEventSource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

impl EventSource for KubeEventSource {
    fn subscribe<'a>(&'a self, namespace: &'a str, label_selector: &'a str) -> SubscribeFuture<'a> {
        Box::pin(async move {
            let response = self.client.watch_pods(namespace, label_selector).await?;
            log_info(
                COMPONENT,
                "Watch established",
                &[
                    ("namespace", namespace),
                    ("selector", label_selector),
                    ("server", self.client.base_url().as_str()),
                ],
            );
            Ok(Subscription::new(
                namespace,
                label_selector,
                frames_to_events(response.bytes_stream()),
            ))
        })
    }
}

/// Decode one watch frame. Blank lines and bookmarks yield `Ok(None)`.
pub fn decode_frame(line: &[u8]) -> Result<Option<LifecycleEvent>, StreamError> {
    let text = std::str::from_utf8(line)
        .map_err(|err| StreamError::Malformed(format!("frame is not UTF-8: {err}")))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }

    let frame: WatchEvent<Value> =
        serde_json::from_str(text).map_err(|err| StreamError::Malformed(err.to_string()))?;
    if frame.event_type == "BOOKMARK" {
        return Ok(None);
    }

    let kind = EventKind::parse(&frame.event_type).ok_or_else(|| {
        StreamError::Malformed(format!("unknown watch event type '{}'", frame.event_type))
    })?;

    if kind == EventKind::Error {
        let status: Status = serde_json::from_value(frame.object).unwrap_or_default();
        let message = status
            .message
            .or(status.reason)
            .unwrap_or_else(|| "no message".to_string());
        return Err(match status.code {
            Some(410) => StreamError::Expired(message),
            code => StreamError::Remote { code, message },
        });
    }

    let pod: Pod = serde_json::from_value(frame.object)
        .map_err(|err| StreamError::Malformed(format!("invalid pod object: {err}")))?;
    let pod_name = pod
        .metadata
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StreamError::Malformed("pod event without metadata.name".to_string()))?;

    Ok(Some(LifecycleEvent {
        kind,
        pod_name,
        phase: PodPhase::parse(pod.phase()),
        node_name: pod.spec.node_name,
    }))
}

struct FrameReader<E> {
    body: BoxStream<'static, Result<Vec<u8>, E>>,
    buffer: Vec<u8>,
    /// Start of the unread region of `buffer`.
    start: usize,
    /// Unread bytes already searched for a newline.
    scanned: usize,
    max_frame: usize,
    done: bool,
}

impl<E> FrameReader<E> {
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let unread = &self.buffer[self.start..];
        match unread[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = self.start + self.scanned + offset + 1;
                let line = self.buffer[self.start..end].to_vec();
                self.start = end;
                self.scanned = 0;
                Some(line)
            }
            None => {
                self.scanned = unread.len();
                None
            }
        }
    }

    fn push_chunk(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
        self.buffer.extend_from_slice(chunk);
    }

    fn pending_len(&self) -> usize {
        self.buffer.len() - self.start
    }

    fn take_rest(&mut self) -> Vec<u8> {
        let rest = self.buffer.split_off(self.start);
        self.buffer.clear();
        self.start = 0;
        self.scanned = 0;
        rest
    }
}

/// Split a response body into frames and decode each one. The stream ends
/// after the first error; a trailing frame without newline is still decoded.
pub fn frames_to_events<S, B, E>(body: S) -> PodEventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    frames_with_limit(body, MAX_FRAME_BYTES)
}

fn frames_with_limit<S, B, E>(body: S, max_frame: usize) -> PodEventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let reader = FrameReader {
        body: body
            .map(|chunk| chunk.map(|bytes| bytes.as_ref().to_vec()))
            .boxed(),
        buffer: Vec::new(),
        start: 0,
        scanned: 0,
        max_frame,
        done: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if reader.done {
                return None;
            }

            if let Some(line) = reader.take_line() {
                match decode_frame(&line) {
                    Ok(Some(event)) => return Some((Ok(event), reader)),
                    Ok(None) => continue,
                    Err(err) => {
                        reader.done = true;
                        return Some((Err(err), reader));
                    }
                }
            }

            if reader.pending_len() > reader.max_frame {
                reader.done = true;
                let message = format!("watch frame exceeds {} bytes", reader.max_frame);
                return Some((Err(StreamError::Malformed(message)), reader));
            }

            match reader.body.next().await {
                Some(Ok(chunk)) => reader.push_chunk(&chunk),
                Some(Err(err)) => {
                    reader.done = true;
                    return Some((Err(StreamError::Transport(err.to_string())), reader));
                }
                None => {
                    reader.done = true;
                    let rest = reader.take_rest();
                    return match decode_frame(&rest) {
                        Ok(Some(event)) => Some((Ok(event), reader)),
                        Ok(None) => None,
                        Err(err) => Some((Err(err), reader)),
                    };
                }
            }
        }
    })
    .boxed()
}
