use std::sync::Arc;
use std::time::Duration;

use beacon::platform::{DomEvent, Vital};
use beacon::protocol::Payload;
use beacon::test::{
    with_captured_requests, with_captured_requests_options, FixedSampler, ManualPlatform,
    TestSink, TestTransport, TestVitalsSource,
};
use beacon::{
    Beacon, BeaconOptions, RawMetric, RumOptions, WebVitalsOptions, DEFAULT_ALERT_ENDPOINT,
    DEFAULT_RUM_ENDPOINT, DEFAULT_WEB_VITALS_ENDPOINT,
};

const WAIT: Duration = Duration::from_secs(5);

fn test_beacon(transport: &Arc<TestTransport>, rum: RumOptions) -> (Beacon, Arc<ManualPlatform>) {
    let platform = Arc::new(ManualPlatform::new("https://app.example.com/lists"));
    let beacon = Beacon::new(
        BeaconOptions::new()
            .with_transport(transport.clone())
            .with_platform(platform.clone())
            .with_sampler(Arc::new(FixedSampler::new(0.0)))
            .with_log_sink(TestSink::new())
            .with_rum(rum),
    );
    (beacon, platform)
}

#[test]
fn test_zero_sample_rate_sends_nothing() {
    let source = TestVitalsSource::new();
    let requests = with_captured_requests_options(
        |beacon| {
            for _ in 0..10 {
                beacon.web_vitals().track_custom_metric("foo", 1.0);
                beacon.rum().track_metric("bar", 1.0, None);
                source.emit(Vital::Lcp, RawMetric::new("LCP", 9000.0));
            }
        },
        BeaconOptions::new()
            .with_vitals_source(source.clone())
            .with_web_vitals(WebVitalsOptions::new().with_sample_rate(0.0))
            .with_rum(RumOptions::new().with_sample_rate(0.0).with_batch_size(1)),
    );
    assert!(requests.is_empty());
    assert_eq!(source.subscription_count(), 0);
}

#[test]
fn test_losing_draws_sends_nothing() {
    let source = TestVitalsSource::new();
    let requests = with_captured_requests_options(
        |beacon| {
            beacon.web_vitals().track_custom_metric("foo", 1.0);
            beacon.rum().track_metric("bar", 1.0, None);
            assert!(!beacon.web_vitals().is_sampled());
            assert!(!beacon.rum().is_sampled());
        },
        BeaconOptions::new()
            .with_vitals_source(source.clone())
            .with_sampler(Arc::new(FixedSampler::new(0.99)))
            .with_web_vitals(WebVitalsOptions::new().with_sample_rate(0.5))
            .with_rum(RumOptions::new().with_sample_rate(0.5).with_batch_size(1)),
    );
    assert!(requests.is_empty());
    assert_eq!(source.subscription_count(), 0);
}

#[test]
fn test_batch_size_flushes_exactly_once() {
    let transport = TestTransport::new();
    let (beacon, _platform) = test_beacon(&transport, RumOptions::new().with_batch_size(5));

    for idx in 0..5 {
        beacon.rum().track_metric("search", idx as f64, None);
    }
    assert!(beacon.rum().get_metrics().is_empty());

    assert!(beacon.rum().drain(WAIT));
    let requests = transport.fetch_and_clear_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].endpoint, DEFAULT_RUM_ENDPOINT);
    let values: Vec<f64> = requests[0].payload.metrics().iter().map(|m| m.value).collect();
    assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);

    beacon.close(None);
}

#[test]
fn test_failed_flush_keeps_batch_in_front() {
    let transport = TestTransport::new();
    let (beacon, _platform) = test_beacon(&transport, RumOptions::new().with_batch_size(100));

    beacon.rum().track_metric("a", 1.0, None);
    beacon.rum().track_metric("b", 2.0, None);

    transport.set_failing(true);
    let rum = beacon.rum().clone();
    transport.on_send(move |_| rum.track_metric("during", 3.0, None));
    beacon.rum().flush(false);
    assert!(beacon.rum().drain(WAIT));
    transport.clear_on_send();

    let names: Vec<String> = beacon
        .rum()
        .get_metrics()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["a", "b", "during"]);

    transport.set_failing(false);
    transport.fetch_and_clear_requests();
    beacon.rum().flush(false);
    assert!(beacon.rum().drain(WAIT));
    let requests = transport.fetch_and_clear_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].payload.metrics().len(), 3);

    beacon.close(None);
}

#[test]
fn test_failed_flush_is_logged() {
    let transport = TestTransport::new();
    let sink = TestSink::new();
    let beacon = Beacon::new(
        BeaconOptions::new()
            .with_transport(transport.clone())
            .with_platform(Arc::new(ManualPlatform::new("https://app.example.com/")))
            .with_sampler(Arc::new(FixedSampler::new(0.0)))
            .with_log_sink(sink.clone()),
    );
    transport.set_failing(true);
    beacon.rum().track_metric("a", 1.0, None);
    beacon.rum().flush(false);
    assert!(beacon.rum().drain(WAIT));

    let logs = sink.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].body, "Failed to send RUM batch, re-queueing");
    assert_eq!(logs[0].attributes["metrics"], 1);

    transport.set_failing(false);
    beacon.close(None);
}

#[test]
fn test_empty_flush_sends_nothing() {
    let transport = TestTransport::new();
    let (beacon, _platform) = test_beacon(&transport, RumOptions::new());

    beacon.rum().flush(false);
    beacon.rum().flush(true);
    beacon.rum().flush(false);
    assert!(beacon.rum().drain(WAIT));
    assert_eq!(transport.request_count(), 0);

    beacon.close(None);
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn test_threshold_alerts() {
    let source = TestVitalsSource::new();
    let requests = with_captured_requests_options(
        |beacon| {
            beacon.web_vitals();
            source.emit(Vital::Lcp, RawMetric::new("LCP", 3000.0));
            source.emit(Vital::Lcp, RawMetric::new("LCP", 2000.0));
        },
        BeaconOptions::new().with_vitals_source(source.clone()),
    );

    let alerts: Vec<_> = requests
        .iter()
        .filter(|r| r.endpoint == DEFAULT_ALERT_ENDPOINT)
        .collect();
    assert_eq!(alerts.len(), 1);
    match alerts[0].payload {
        Payload::Alert(ref alert) => {
            assert_eq!(alert.metric, "LCP");
            assert_eq!(alert.value, 3000.0);
            assert_eq!(alert.threshold, 2500.0);
            assert_eq!(alert.url, "https://beacon.invalid/");
        }
        ref other => panic!("unexpected payload {:?}", other),
    }

    let vitals = requests
        .iter()
        .filter(|r| r.endpoint == DEFAULT_WEB_VITALS_ENDPOINT)
        .count();
    assert_eq!(vitals, 2);
}

#[test]
fn test_custom_thresholds_override_defaults() {
    let requests = with_captured_requests_options(
        |beacon| {
            beacon.web_vitals().handle_metric(RawMetric::new("LCP", 3000.0));
            beacon.web_vitals().handle_metric(RawMetric::new("search", 750.0));
        },
        BeaconOptions::new().with_web_vitals(
            WebVitalsOptions::new()
                .with_threshold("LCP", 4000.0)
                .with_threshold("search", 500.0),
        ),
    );
    let alerts: Vec<_> = requests
        .iter()
        .filter_map(|r| match r.payload {
            Payload::Alert(ref alert) => Some(alert.metric.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(alerts, vec!["search"]);
}

#[test]
fn test_offline_suppresses_unforced_flush() {
    let transport = TestTransport::new();
    let (beacon, platform) = test_beacon(&transport, RumOptions::new());

    platform.dispatch(&DomEvent::Offline);
    assert!(!beacon.rum().is_online());
    beacon.rum().track_metric("a", 1.0, None);
    beacon.rum().flush(false);
    assert!(beacon.rum().drain(WAIT));
    assert_eq!(transport.request_count(), 0);

    beacon.rum().flush(true);
    assert!(beacon.rum().drain(WAIT));
    assert_eq!(transport.request_count(), 1);

    beacon.close(None);
}

#[test]
fn test_coming_back_online_flushes() {
    let transport = TestTransport::new();
    let (beacon, platform) = test_beacon(&transport, RumOptions::new());

    platform.dispatch(&DomEvent::Offline);
    beacon.rum().track_metric("a", 1.0, None);
    assert_eq!(transport.request_count(), 0);

    platform.dispatch(&DomEvent::Online);
    assert!(beacon.rum().drain(WAIT));
    let requests = transport.fetch_and_clear_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].payload.metrics()[0].name, "a");

    beacon.close(None);
}

#[test]
fn test_enrichment_and_user_id() {
    let transport = TestTransport::new();
    let (beacon, _platform) = test_beacon(&transport, RumOptions::new().with_batch_size(100));

    beacon.rum().track_metric("before", 1.0, None);
    beacon.set_user_id("user-42");
    beacon.rum().track_metric("after", 2.0, None);
    beacon.rum().flush(true);
    assert!(beacon.rum().drain(WAIT));

    let requests = transport.fetch_and_clear_requests();
    let metrics = requests[0].payload.metrics();
    for metric in metrics {
        assert_eq!(metric.context.url, "https://app.example.com/lists");
        assert_eq!(metric.context.session_id, beacon.rum().get_session_id());
        assert!(metric.context.timestamp > std::time::UNIX_EPOCH);
    }
    assert_eq!(metrics[0].context.user_id, None);
    assert_eq!(metrics[1].context.user_id.as_deref(), Some("user-42"));

    match requests[0].payload {
        Payload::Batch(ref batch) => {
            assert_eq!(batch.session.session_id, beacon.rum().get_session_id());
            assert_eq!(batch.session.user_id.as_deref(), Some("user-42"));
        }
        ref other => panic!("unexpected payload {:?}", other),
    }

    beacon.close(None);
}

#[test]
fn test_sessions_differ_between_collectors() {
    let requests = with_captured_requests(|beacon| {
        beacon.web_vitals().track_custom_metric("vital", 1.0);
        beacon.rum().track_metric("rum", 1.0, None);
    });
    assert_eq!(requests.len(), 2);
    let session_of = |endpoint: &str| {
        requests
            .iter()
            .find(|r| r.endpoint == endpoint)
            .map(|r| r.payload.metrics()[0].context.session_id)
    };
    let vital = session_of(DEFAULT_WEB_VITALS_ENDPOINT).unwrap();
    let rum = session_of(DEFAULT_RUM_ENDPOINT).unwrap();
    assert_ne!(vital, rum);
}

#[test]
fn test_custom_metric_reaches_transport() {
    let requests = with_captured_requests(|beacon| {
        beacon.web_vitals().track_custom_metric("foo", 42.0);
    });
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].endpoint, DEFAULT_WEB_VITALS_ENDPOINT);

    let json: serde_json::Value =
        serde_json::from_slice(&requests[0].payload.to_json_vec().unwrap()).unwrap();
    assert_eq!(json["name"], "foo");
    assert_eq!(json["value"], 42.0);
    assert_eq!(json["delta"], 0.0);
    assert_eq!(json["url"], "https://beacon.invalid/");
    assert!(json["sessionId"].is_string());
    assert!(json["timestamp"].is_number());
    assert!(json.get("userId").is_none());
}

#[test]
fn test_page_unload_posts_buffer() {
    let transport = TestTransport::new();
    let (beacon, platform) = test_beacon(&transport, RumOptions::new());

    platform.dispatch(&DomEvent::Offline);
    beacon.rum().track_metric("a", 1.0, None);
    platform.dispatch(&DomEvent::BeforeUnload);
    assert!(beacon.rum().drain(WAIT));

    let requests = transport.fetch_and_clear_requests();
    assert_eq!(requests.len(), 1);
    let names: Vec<&str> = requests[0]
        .payload
        .metrics()
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(names, vec!["a", "page_unload"]);

    beacon.close(None);
}

#[test]
fn test_tracking_returns_while_endpoint_is_slow() {
    let transport = TestTransport::new();
    let (beacon, _platform) = test_beacon(&transport, RumOptions::new().with_batch_size(1));
    transport.on_send(|_| std::thread::sleep(Duration::from_millis(300)));

    let started = std::time::Instant::now();
    beacon.rum().track_metric("search", 1.0, None);
    assert!(started.elapsed() < Duration::from_millis(100));

    assert!(beacon.close(None));
    transport.clear_on_send();
    let requests = transport.fetch_and_clear_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].payload.metrics()[0].name, "search");
}
