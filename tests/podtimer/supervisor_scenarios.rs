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

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use podtimer::podtimer::report::MetricsReport;
use podtimer::podtimer::supervisor::{IterationOutcome, MonitorSettings, Supervisor};
use podtimer::podtimer::test_support::{
    pending, running, RecordingReporter, ScriptedEventSource, ScriptedProbe, ScriptedSession,
};
use podtimer::podtimer::timing::poller::DEFAULT_MAX_WAIT;
use podtimer::podtimer::timing::ReadinessPoller;
use podtimer::podtimer::watch::StreamError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn build(
    source: ScriptedEventSource,
    probe: ScriptedProbe,
    reporter: &RecordingReporter,
) -> Supervisor {
    let poller = ReadinessPoller::new(Box::new(probe), "10.1.0.7", 8080)
        .with_poll_interval(POLL_INTERVAL)
        .with_max_wait(DEFAULT_MAX_WAIT);
    Supervisor::new(
        Box::new(source),
        poller,
        Box::new(reporter.clone()),
        MonitorSettings::new("media", "app=video"),
    )
}

fn expect_complete(outcome: IterationOutcome) -> (Option<String>, f64, f64, f64) {
    match outcome {
        IterationOutcome::Reported(MetricsReport::Complete {
            pod,
            pod_ready_ms,
            app_ready_ms,
            total_ms,
        }) => (pod, pod_ready_ms, app_ready_ms, total_ms),
        other => panic!("expected a complete report, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn pending_then_running_reports_three_durations() {
    let reporter = RecordingReporter::new();
    let source = ScriptedEventSource::new().session(
        ScriptedSession::new()
            .event(Duration::ZERO, pending("p1"))
            .event(Duration::from_millis(250), running("p1")),
    );
    let probe = ScriptedProbe::ready_after(0).with_latency(Duration::from_millis(5));
    let supervisor = build(source, probe, &reporter);

    let outcome = supervisor.run_iteration(&CancellationToken::new()).await;
    let (pod, pod_ready, app_ready, total) = expect_complete(outcome);

    assert_eq!(pod.as_deref(), Some("p1"));
    assert_eq!(pod_ready, 250.0);
    assert_eq!(app_ready, 5.0);
    assert_eq!(total, 255.0);
    assert!(pod_ready >= 0.0 && app_ready >= 0.0 && total >= pod_ready);
    assert_eq!(reporter.reports().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn recreated_pod_restarts_the_clock() {
    let reporter = RecordingReporter::new();
    let source = ScriptedEventSource::new().session(
        ScriptedSession::new()
            .event(Duration::ZERO, pending("p1"))
            .event(Duration::from_millis(400), pending("p2"))
            .event(Duration::from_millis(1_000), running("p2")),
    );
    let probe = ScriptedProbe::ready_after(2);
    let calls = probe.calls();
    let supervisor = build(source, probe, &reporter);

    let outcome = supervisor.run_iteration(&CancellationToken::new()).await;
    let (pod, pod_ready, app_ready, total) = expect_complete(outcome);

    assert_eq!(pod.as_deref(), Some("p2"));
    assert_eq!(pod_ready, 1_000.0, "start must be p2's arrival");
    assert_eq!(app_ready, 100.0);
    assert_eq!(total, 1_100.0);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn running_event_for_another_pod_is_ignored() {
    let reporter = RecordingReporter::new();
    let source = ScriptedEventSource::new().session(
        ScriptedSession::new()
            .event(Duration::ZERO, pending("p1"))
            .event(Duration::from_millis(100), running("other"))
            .event(Duration::from_millis(200), running("p1")),
    );
    let supervisor = build(source, ScriptedProbe::ready_after(0), &reporter);

    let outcome = supervisor.run_iteration(&CancellationToken::new()).await;
    let (pod, pod_ready, _, _) = expect_complete(outcome);
    assert_eq!(pod.as_deref(), Some("p1"));
    assert_eq!(pod_ready, 300.0);
}

#[tokio::test(start_paused = true)]
async fn transport_error_discards_cycle_and_resubscribes() {
    let reporter = RecordingReporter::new();
    let source = ScriptedEventSource::new()
        .session(
            ScriptedSession::new()
                .event(Duration::ZERO, pending("p1"))
                .error(
                    Duration::from_millis(500),
                    StreamError::Transport("connection reset".into()),
                ),
        )
        .session(
            ScriptedSession::new()
                .event(Duration::from_millis(100), pending("p2"))
                .event(Duration::from_millis(700), running("p2")),
        );
    let subscriptions = source.subscriptions();
    let supervisor = build(source, ScriptedProbe::ready_after(0), &reporter);
    let shutdown = CancellationToken::new();

    let first = supervisor.run_iteration(&shutdown).await;
    assert_eq!(
        first,
        IterationOutcome::Failed(StreamError::Transport("connection reset".into()))
    );
    assert!(
        reporter.reports().is_empty(),
        "failed cycle must not be reported"
    );

    let second = supervisor.run_iteration(&shutdown).await;
    let (pod, pod_ready, _, _) = expect_complete(second);
    assert_eq!(pod.as_deref(), Some("p2"));
    assert_eq!(pod_ready, 700.0);
    assert_eq!(subscriptions.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(reporter.reports().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_watch_is_restarted_by_run() {
    let reporter = RecordingReporter::new();
    let source = ScriptedEventSource::new()
        .refuse(StreamError::Expired("too old resource version".into()))
        .session(
            ScriptedSession::new()
                .event(Duration::ZERO, pending("p1"))
                .event(Duration::from_millis(80), running("p1")),
        );
    let subscriptions = source.subscriptions();
    let supervisor = build(source, ScriptedProbe::ready_after(0), &reporter);

    let shutdown = CancellationToken::new();
    let stopper = shutdown.clone();
    tokio::join!(supervisor.run(shutdown), async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        stopper.cancel();
    });

    assert_eq!(reporter.reports().len(), 1);
    assert!(reporter.reports()[0].is_complete());
    assert_eq!(subscriptions.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn unreachable_application_reports_incomplete_at_deadline() {
    let reporter = RecordingReporter::new();
    let source = ScriptedEventSource::new().session(
        ScriptedSession::new()
            .event(Duration::ZERO, pending("p1"))
            .event(Duration::ZERO, running("p1")),
    );
    let supervisor = build(source, ScriptedProbe::never(), &reporter);

    let began = Instant::now();
    let outcome = supervisor.run_iteration(&CancellationToken::new()).await;
    let elapsed = began.elapsed();

    assert_eq!(
        outcome,
        IterationOutcome::Reported(MetricsReport::Incomplete {
            pod: Some("p1".into()),
            missing: vec!["app_ready"],
        })
    );
    assert!(
        elapsed >= DEFAULT_MAX_WAIT,
        "gave up early after {elapsed:?}"
    );
    assert!(
        elapsed <= DEFAULT_MAX_WAIT + Duration::from_millis(1),
        "overran deadline: {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_readiness_wait_skips_report() {
    let reporter = RecordingReporter::new();
    let source = ScriptedEventSource::new().session(
        ScriptedSession::new()
            .event(Duration::ZERO, pending("p1"))
            .event(Duration::ZERO, running("p1")),
    );
    let supervisor = build(source, ScriptedProbe::never(), &reporter);

    let shutdown = CancellationToken::new();
    let stopper = shutdown.clone();
    let (outcome, _) = tokio::join!(supervisor.run_iteration(&shutdown), async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        stopper.cancel();
    });

    assert_eq!(outcome, IterationOutcome::Shutdown);
    assert!(reporter.reports().is_empty());
}
