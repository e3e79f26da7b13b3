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

use std::net::SocketAddr;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use podtimer::podtimer::k8s::client::ApiClient;
use podtimer::podtimer::watch::kube::KubeEventSource;
use podtimer::podtimer::watch::{EventKind, EventSource, PodPhase, StreamError};

/// Serves exactly one HTTP response and returns the raw request head.
async fn serve_once(status: &'static str, body: String) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let read = socket.read(&mut buf).await.expect("read request");
            if read == 0 {
                break;
            }
            head.extend_from_slice(&buf[..read]);
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{body}"
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&head).into_owned()
    });
    (addr, handle)
}

fn pod_frame(kind: &str, name: &str, phase: &str) -> String {
    json!({
        "type": kind,
        "object": {
            "kind": "Pod",
            "metadata": { "name": name, "namespace": "media" },
            "spec": { "nodeName": "worker-2" },
            "status": { "phase": phase },
        },
    })
    .to_string()
}

fn source_for(addr: SocketAddr) -> KubeEventSource {
    let client = ApiClient::with_endpoint(&format!("http://{addr}"), Some("s3cr3t".into()), false)
        .expect("client");
    KubeEventSource::new(client)
}

#[tokio::test]
async fn decodes_events_until_server_closes() {
    let body = format!(
        "{}\n{}\n{}\n",
        pod_frame("ADDED", "video-7f9", "Pending"),
        r#"{"type":"BOOKMARK","object":{"metadata":{"resourceVersion":"12"}}}"#,
        pod_frame("MODIFIED", "video-7f9", "Running"),
    );
    let (addr, server) = serve_once("200 OK", body).await;
    let source = source_for(addr);

    let mut subscription = source
        .subscribe("media", "app=video")
        .await
        .expect("subscribe");
    let first = subscription.next().await.expect("first").expect("event");
    assert_eq!(first.kind, EventKind::Added);
    assert_eq!(first.pod_name, "video-7f9");
    assert_eq!(first.phase, PodPhase::Pending);
    assert_eq!(first.node_name.as_deref(), Some("worker-2"));

    let second = subscription.next().await.expect("second").expect("event");
    assert_eq!(second.kind, EventKind::Modified);
    assert_eq!(second.phase, PodPhase::Running);

    assert!(
        subscription.next().await.is_none(),
        "stream should end on close"
    );

    let request = server.await.expect("stub task");
    let request_line = request.lines().next().unwrap_or_default();
    assert_eq!(
        request_line,
        "GET /api/v1/namespaces/media/pods?watch=true&labelSelector=app%3Dvideo HTTP/1.1"
    );
    let lowered = request.to_ascii_lowercase();
    assert!(
        lowered.contains("authorization: bearer s3cr3t"),
        "missing bearer token: {request}"
    );
}

#[tokio::test]
async fn gone_status_maps_to_expired() {
    let body = r#"{"kind":"Status","code":410}"#.to_string();
    let (addr, _server) = serve_once("410 Gone", body).await;
    let err = match source_for(addr).subscribe("media", "app=video").await {
        Ok(_) => panic!("expected an expired watch"),
        Err(err) => err,
    };
    assert!(err.is_expired(), "unexpected error {err:?}");
}

#[tokio::test]
async fn forbidden_status_keeps_code() {
    let (addr, _server) = serve_once("403 Forbidden", "pods is forbidden".to_string()).await;
    match source_for(addr).subscribe("media", "app=video").await {
        Err(StreamError::Status { code, message }) => {
            assert_eq!(code, 403);
            assert_eq!(message, "pods is forbidden");
        }
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("expected a status error"),
    }
}

#[tokio::test]
async fn malformed_frame_ends_the_stream() {
    let body = format!(
        "{}\nthis is not json\n{}\n",
        pod_frame("ADDED", "video-7f9", "Pending"),
        pod_frame("MODIFIED", "video-7f9", "Running"),
    );
    let (addr, _server) = serve_once("200 OK", body).await;
    let mut subscription = source_for(addr)
        .subscribe("media", "app=video")
        .await
        .expect("subscribe");

    assert!(subscription.next().await.expect("first").is_ok());
    assert!(matches!(
        subscription.next().await,
        Some(Err(StreamError::Malformed(_)))
    ));
    assert!(subscription.next().await.is_none());
}

#[tokio::test]
async fn error_frame_with_gone_code_is_expired() {
    let body = format!(
        "{}\n{}\n",
        pod_frame("ADDED", "video-7f9", "Pending"),
        json!({
            "type": "ERROR",
            "object": {
                "kind": "Status",
                "code": 410,
                "reason": "Expired",
                "message": "too old resource version",
            },
        }),
    );
    let (addr, _server) = serve_once("200 OK", body).await;
    let mut subscription = source_for(addr)
        .subscribe("media", "app=video")
        .await
        .expect("subscribe");

    assert!(subscription.next().await.expect("first").is_ok());
    assert_eq!(
        subscription.next().await,
        Some(Err(StreamError::Expired("too old resource version".into())))
    );
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    match source_for(addr).subscribe("media", "app=video").await {
        Err(StreamError::Connect(_)) => {}
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("expected connection failure"),
    }
}
