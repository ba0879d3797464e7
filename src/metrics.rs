//! Observability hooks.
//!
//! With the `metrics` feature, counters are registered on the global
//! OpenTelemetry meter the first time [`METRICS`] is touched. The host
//! application installs whatever exporter it wants; without one the global
//! meter is a no-op. With the `tracing` feature, [`tracing_helpers`] builds
//! the spans entered around store calls and reconcile passes.

#[cfg(feature = "metrics")]
pub use self::counters::{DepotMetrics, METRICS};

#[cfg(feature = "metrics")]
mod counters {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
        KeyValue,
    };
    use std::time::Duration;

    pub static METRICS: Lazy<DepotMetrics> = Lazy::new(DepotMetrics::init);

    pub struct DepotMetrics {
        pub reconcile_total: Counter<u64>,
        pub reconcile_changes: Counter<u64>,
        pub gateway_failures: Counter<u64>,
        pub store_call_duration: Histogram<f64>,
        pub lock_denials: Counter<u64>,
        pub locks_swept: Counter<u64>,
    }

    impl DepotMetrics {
        pub fn init() -> Self {
            let meter = global::meter("depot");

            let reconcile_total = meter
                .u64_counter("depot_reconcile_total")
                .with_description("Reconcile passes run by list caches")
                .build();

            let reconcile_changes = meter
                .u64_counter("depot_reconcile_changes_total")
                .with_description("Records added or evicted by reconcile passes")
                .build();

            let gateway_failures = meter
                .u64_counter("depot_gateway_failures_total")
                .with_description("Failed store gateway operations")
                .build();

            let store_call_duration = meter
                .f64_histogram("depot_store_call_duration_seconds")
                .with_description("Duration of store calls")
                .build();

            let lock_denials = meter
                .u64_counter("depot_lock_denials_total")
                .with_description("Edit lock requests denied because another session holds the record")
                .build();

            let locks_swept = meter
                .u64_counter("depot_locks_swept_total")
                .with_description("Stale edit locks cleared by sweeps")
                .build();

            Self {
                reconcile_total,
                reconcile_changes,
                gateway_failures,
                store_call_duration,
                lock_denials,
                locks_swept,
            }
        }

        pub fn record_reconcile(&self, kind: &'static str, changes: u64) {
            let attrs = [KeyValue::new("kind", kind)];
            self.reconcile_total.add(1, &attrs);
            if changes > 0 {
                self.reconcile_changes.add(changes, &attrs);
            }
        }

        pub fn record_gateway_failure(&self, operation: &'static str) {
            self.gateway_failures
                .add(1, &[KeyValue::new("operation", operation)]);
        }

        pub fn record_store_call(&self, elapsed: Duration) {
            self.store_call_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_lock_denied(&self) {
            self.lock_denials.add(1, &[]);
        }

        pub fn record_locks_swept(&self, cleared: u64) {
            self.locks_swept.add(cleared, &[]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn reconcile_span(kind: &'static str, fetched: usize) -> Span {
        info_span!("depot.reconcile", kind, fetched)
    }

    pub fn store_call_span(operation: &'static str, table: &'static str) -> Span {
        info_span!("depot.store", operation, table)
    }

    pub fn save_span(kind: &'static str, id: i64) -> Span {
        info_span!("depot.save", kind, id)
    }

    pub fn lock_span(operation: &'static str, id: i64) -> Span {
        info_span!("depot.lock", operation, id)
    }

    pub fn connect_span() -> Span {
        info_span!("depot.connect")
    }
}
