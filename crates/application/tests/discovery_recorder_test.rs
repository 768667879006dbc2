mod helpers;

use helpers::CallbackProbe;
use intercept_dns_application::{DiscoveryRecorder, RecordOutcome, ThrottledLogger};
use intercept_dns_domain::DiscoveryConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn client() -> Option<SocketAddr> {
    Some(SocketAddr::from(([192, 168, 1, 20], 40000)))
}

fn recorder() -> DiscoveryRecorder {
    DiscoveryRecorder::new(DiscoveryConfig::default())
}

#[tokio::test]
async fn test_repeated_records_count_every_query() {
    let recorder = recorder();

    for _ in 0..5 {
        recorder.record("example.com", false, client()).await;
    }

    let host = recorder.get("example.com").unwrap();
    assert_eq!(host.query_count, 5);
    assert!(host.last_seen >= host.first_seen);
    assert_eq!(recorder.len(), 1);
}

#[tokio::test]
async fn test_first_seen_is_stable_and_last_seen_advances() {
    let recorder = recorder();

    recorder.record("example.com", false, None).await;
    let first = recorder.get("example.com").unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    recorder.record("example.com", true, client()).await;
    let second = recorder.get("example.com").unwrap();

    assert_eq!(second.first_seen, first.first_seen);
    assert!(second.last_seen >= first.last_seen);
    assert!(second.is_intercepted);
    assert_eq!(second.remote_addr, client());
}

#[tokio::test]
async fn test_record_outcomes() {
    let recorder = recorder();

    assert_eq!(
        recorder.record("api.bose.io", true, None).await,
        RecordOutcome::Discovered
    );
    assert_eq!(
        recorder.record("api.bose.io", true, None).await,
        RecordOutcome::Updated
    );
    assert_eq!(recorder.record("", false, None).await, RecordOutcome::Ignored);
}

#[tokio::test]
async fn test_first_record_fires_exactly_one_callback() {
    let recorder = recorder();
    let probe = CallbackProbe::new();
    recorder.set_callback(probe.callback());

    recorder.record("streaming.bose.com", true, client()).await;
    recorder.record("streaming.bose.com", true, client()).await;
    recorder.record("streaming.bose.com", false, client()).await;

    assert_eq!(probe.wait_for(1, WAIT).await, 1);
    probe.settle().await;
    assert_eq!(probe.seen(), vec!["streaming.bose.com".to_string()]);
}

#[tokio::test]
async fn test_each_new_hostname_fires_in_order() {
    let recorder = recorder();
    let probe = CallbackProbe::new();
    recorder.set_callback(probe.callback());

    for name in ["a.example", "b.example", "a.example", "c.example"] {
        recorder.record(name, false, None).await;
    }

    assert_eq!(probe.wait_for(3, WAIT).await, 3);
    assert_eq!(probe.seen(), vec!["a.example", "b.example", "c.example"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_queries_create_one_entry() {
    let recorder = Arc::new(recorder());
    let probe = CallbackProbe::new();
    recorder.set_callback(probe.callback());

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let recorder = Arc::clone(&recorder);
        tasks.push(tokio::spawn(async move {
            recorder.record("race.example.com", false, None).await
        }));
    }

    let mut discovered = 0;
    for task in tasks {
        if task.await.unwrap() == RecordOutcome::Discovered {
            discovered += 1;
        }
    }

    assert_eq!(discovered, 1);
    assert_eq!(recorder.get("race.example.com").unwrap().query_count, 50);
    assert_eq!(probe.wait_for(1, WAIT).await, 1);
    probe.settle().await;
    assert_eq!(probe.count(), 1);
}

#[tokio::test]
async fn test_no_callback_registered_still_records() {
    let recorder = recorder();

    recorder.record("example.com", false, None).await;

    assert_eq!(recorder.len(), 1);
    assert_eq!(recorder.dropped_notifications(), 0);
}

#[tokio::test]
async fn test_panicking_callback_does_not_stop_dispatch() {
    let recorder = recorder();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    recorder.set_callback(Arc::new(move |hostname: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        if hostname == "boom.example" {
            panic!("callback failure");
        }
    }));

    recorder.record("boom.example", false, None).await;
    recorder.record("fine.example", false, None).await;

    let deadline = tokio::time::Instant::now() + WAIT;
    while calls.load(Ordering::SeqCst) < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_drops_notifications() {
    let config = DiscoveryConfig {
        callback_queue_capacity: 1,
        callback_send_timeout_ms: 10,
        ..DiscoveryConfig::default()
    };
    let recorder = DiscoveryRecorder::new(config)
        .with_throttle(Arc::new(ThrottledLogger::new(Duration::from_secs(10))));

    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let release_rx = std::sync::Mutex::new(release_rx);
    recorder.set_callback(Arc::new(move |_hostname: &str| {
        let _ = release_rx
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(2));
    }));

    for i in 0..5 {
        recorder.record(&format!("host{}.example", i), false, None).await;
    }

    assert!(recorder.dropped_notifications() >= 1);
    assert_eq!(recorder.len(), 5);

    for _ in 0..5 {
        let _ = release_tx.send(());
    }
}

#[tokio::test]
async fn test_replacing_callback_routes_new_discoveries() {
    let recorder = recorder();
    let first = CallbackProbe::new();
    let second = CallbackProbe::new();

    recorder.set_callback(first.callback());
    recorder.record("one.example", false, None).await;
    assert_eq!(first.wait_for(1, WAIT).await, 1);

    recorder.set_callback(second.callback());
    recorder.record("two.example", false, None).await;
    assert_eq!(second.wait_for(1, WAIT).await, 1);

    assert_eq!(first.seen(), vec!["one.example"]);
    assert_eq!(second.seen(), vec!["two.example"]);
}

#[tokio::test]
async fn test_snapshot_is_a_sorted_copy() {
    let recorder = recorder();
    recorder.record("zeta.example", false, None).await;
    recorder.record("alpha.example", false, None).await;

    let snapshot = recorder.hosts();
    recorder.record("alpha.example", false, None).await;

    let names: Vec<_> = snapshot.iter().map(|h| h.hostname.as_str()).collect();
    assert_eq!(names, vec!["alpha.example", "zeta.example"]);
    assert_eq!(snapshot[0].query_count, 1);
    assert_eq!(recorder.get("alpha.example").unwrap().query_count, 2);
}

#[tokio::test]
async fn test_known_service_hosts_filter() {
    let recorder = recorder();
    recorder.record("api.bose.io", true, None).await;
    recorder.record("example.com", false, None).await;
    recorder.record("BoseUpdates.example", false, None).await;

    let known: Vec<_> = recorder
        .known_service_hosts()
        .into_iter()
        .map(|h| h.hostname)
        .collect();

    assert_eq!(known, vec!["api.bose.io".to_string()]);
}
