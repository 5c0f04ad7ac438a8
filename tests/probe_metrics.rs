//! Probe accounting: every probe outcome reaches the probe counter, the
//! ones that never left the process included.

mod common;

use common::MockTransport;
use edge_relay::health::active::ClusterHealthRuntime;
use edge_relay::health::policy::PolicyRegistry;
use edge_relay::health::state::DestinationHealthState;
use edge_relay::health::system::DestinationEntry;
use metrics::{Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct TestCounter(AtomicU64);

impl CounterFn for TestCounter {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::SeqCst);
    }

    fn absolute(&self, value: u64) {
        self.0.store(value, Ordering::SeqCst);
    }
}

/// Recorder capturing counters keyed by metric name and `result` label;
/// gauges and histograms are ignored.
#[derive(Clone, Default)]
struct CountingRecorder {
    counters: Arc<Mutex<HashMap<String, Arc<TestCounter>>>>,
}

impl CountingRecorder {
    fn value(&self, name: &str, result: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(&format!("{}:{}", name, result))
            .map(|c| c.0.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let result = key
            .labels()
            .find(|label| label.key() == "result")
            .map(|label| label.value().to_string())
            .unwrap_or_default();
        let id = format!("{}:{}", key.name(), result);
        let counter = Arc::clone(
            self.counters
                .lock()
                .unwrap()
                .entry(id)
                .or_insert_with(|| Arc::new(TestCounter(AtomicU64::new(0)))),
        );
        Counter::from_arc(counter)
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

#[tokio::test]
async fn unbuildable_probe_is_counted_as_an_error() {
    let recorder = CountingRecorder::default();
    metrics::set_global_recorder(recorder.clone()).unwrap();

    let mut cluster = common::cluster("api", &[("d1", "http://localhost:8081/")]);
    cluster.health_check.active.enabled = true;
    cluster.health_check.active.interval_secs = 1;
    cluster.health_check.active.policy = "consecutive_failures".to_string();
    // Probe timeout left unset: the request cannot be built, so the loop
    // must account for the probe without ever reaching the transport.

    let registry = PolicyRegistry::default();
    let policy = registry.active("consecutive_failures").unwrap();
    let transport = Arc::new(MockTransport::new());
    let destinations = vec![DestinationEntry {
        id: "d1".to_string(),
        config: Arc::new(cluster.destinations["d1"].clone()),
        state: Arc::new(DestinationHealthState::new()),
    }];

    let handle = ClusterHealthRuntime::spawn(
        Arc::new(cluster),
        destinations,
        policy,
        transport.clone(),
    );
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.shutdown(Duration::from_secs(1)).await;

    assert_eq!(transport.probe_count(), 0);
    assert!(recorder.value("proxy_probe_total", "error") >= 1);
}
