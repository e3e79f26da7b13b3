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
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use podtimer::podtimer::probe::{probe_for, AppType, DEFAULT_PROBE_TIMEOUT};

async fn read_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(read) => head.extend_from_slice(&buf[..read]),
        }
    }
}

/// HTTP stub answering every request with `status` after `delay`.
async fn http_stub(status: &'static str, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_head(&mut socket).await;
                tokio::time::sleep(delay).await;
                let headers = "Content-Length: 0\r\nConnection: close";
                let response = format!("HTTP/1.1 {status}\r\n{headers}\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    addr
}

/// Pull one complete RESP array command off the front of `buf`.
fn take_command(buf: &mut Vec<u8>) -> Option<Vec<String>> {
    fn line(buf: &[u8], from: usize) -> Option<(&[u8], usize)> {
        let end = buf[from..].windows(2).position(|w| w == b"\r\n")? + from;
        Some((&buf[from..end], end + 2))
    }

    let (header, mut pos) = line(buf, 0)?;
    let count: usize = std::str::from_utf8(header.strip_prefix(b"*")?)
        .ok()?
        .parse()
        .ok()?;
    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        let (len_line, next) = line(buf, pos)?;
        let len: usize = std::str::from_utf8(len_line.strip_prefix(b"$")?)
            .ok()?
            .parse()
            .ok()?;
        if buf.len() < next + len + 2 {
            return None;
        }
        parts.push(String::from_utf8_lossy(&buf[next..next + len]).into_owned());
        pos = next + len + 2;
    }
    buf.drain(..pos);
    Some(parts)
}

/// RESP stub replying `ping_reply` to PING and `+OK` to anything else.
async fn resp_stub(ping_reply: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut buf = [0u8; 512];
                loop {
                    let read = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(read) => read,
                    };
                    pending.extend_from_slice(&buf[..read]);
                    while let Some(command) = take_command(&mut pending) {
                        let name = command
                            .first()
                            .map(|c| c.to_ascii_uppercase())
                            .unwrap_or_default();
                        let reply = if name == "PING" { ping_reply } else { "+OK\r\n" };
                        if socket.write_all(reply.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    addr
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}

#[tokio::test]
async fn http_ok_is_ready() {
    let addr = http_stub("200 OK", Duration::ZERO).await;
    let probe = probe_for(AppType::Http, DEFAULT_PROBE_TIMEOUT).expect("probe");
    assert!(probe.probe("127.0.0.1", addr.port()).await);
}

#[tokio::test]
async fn http_unavailable_is_not_ready() {
    let addr = http_stub("503 Service Unavailable", Duration::ZERO).await;
    let probe = probe_for(AppType::Http, DEFAULT_PROBE_TIMEOUT).expect("probe");
    assert!(!probe.probe("127.0.0.1", addr.port()).await);
}

#[tokio::test]
async fn http_redirect_is_not_followed() {
    let addr = http_stub("302 Found", Duration::ZERO).await;
    let probe = probe_for(AppType::Http, DEFAULT_PROBE_TIMEOUT).expect("probe");
    assert!(!probe.probe("127.0.0.1", addr.port()).await);
}

#[tokio::test]
async fn http_refused_is_not_ready() {
    let port = closed_port().await;
    let probe = probe_for(AppType::Http, DEFAULT_PROBE_TIMEOUT).expect("probe");
    assert!(!probe.probe("127.0.0.1", port).await);
}

#[tokio::test]
async fn slow_http_server_times_out() {
    let addr = http_stub("200 OK", Duration::from_secs(2)).await;
    let probe = probe_for(AppType::Http, DEFAULT_PROBE_TIMEOUT).expect("probe");
    let began = Instant::now();
    assert!(!probe.probe("127.0.0.1", addr.port()).await);
    assert!(
        began.elapsed() < Duration::from_secs(1),
        "probe ignored its timeout"
    );
}

#[tokio::test]
async fn keyvalue_pong_is_ready() {
    let addr = resp_stub("+PONG\r\n").await;
    let probe = probe_for(AppType::KeyValue, Duration::from_millis(500)).expect("probe");
    assert!(probe.probe("127.0.0.1", addr.port()).await);
}

#[tokio::test]
async fn keyvalue_error_reply_is_not_ready() {
    let addr = resp_stub("-LOADING dataset in memory\r\n").await;
    let probe = probe_for(AppType::KeyValue, Duration::from_millis(500)).expect("probe");
    assert!(!probe.probe("127.0.0.1", addr.port()).await);
}

#[tokio::test]
async fn keyvalue_refused_is_not_ready() {
    let port = closed_port().await;
    let probe = probe_for(AppType::KeyValue, DEFAULT_PROBE_TIMEOUT).expect("probe");
    assert!(!probe.probe("127.0.0.1", port).await);
}

#[test]
fn resp_parser_waits_for_complete_commands() {
    let mut buf = b"*1\r\n$4\r\nPI".to_vec();
    assert!(take_command(&mut buf).is_none());
    buf.extend_from_slice(b"NG\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
    assert_eq!(take_command(&mut buf), Some(vec!["PING".to_string()]));
    assert_eq!(
        take_command(&mut buf),
        Some(vec!["GET".to_string(), "k".to_string()])
    );
    assert!(buf.is_empty());
}
