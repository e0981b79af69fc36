use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Counters and gauges exported by the scheduler.
pub(crate) struct Metrics {
    /// Fetches issued to peers, first attempts and retries alike.
    pub(crate) requests_issued: Counter,
    /// Fetches issued after a previous attempt timed out.
    pub(crate) retries: Counter,
    /// Requests dropped because every announcer was tried without an answer.
    pub(crate) abandoned: Counter,
    /// Requests retired by a delivered payload.
    pub(crate) completed: Counter,
    /// Announces dropped by the per-peer outstanding-item bound.
    pub(crate) announces_dropped: Counter,
    /// Completions for items with no outstanding request.
    pub(crate) unknown_completes: Counter,
    /// Due queue entries whose request row was already gone.
    pub(crate) stale_entries: Counter,
    /// Items with an outstanding request.
    pub(crate) outstanding_requests: Gauge,
    /// Currently registered peers.
    pub(crate) connected_peers: Gauge,
}

impl Metrics {
    /// Create and register a new set of metrics.
    pub(crate) fn init(registry: &mut Registry) -> Self {
        let metrics = Self {
            requests_issued: Counter::default(),
            retries: Counter::default(),
            abandoned: Counter::default(),
            completed: Counter::default(),
            announces_dropped: Counter::default(),
            unknown_completes: Counter::default(),
            stale_entries: Counter::default(),
            outstanding_requests: Gauge::default(),
            connected_peers: Gauge::default(),
        };
        registry.register(
            "requests_issued",
            "Fetches issued to peers, first attempts and retries alike",
            metrics.requests_issued.clone(),
        );
        registry.register(
            "retries",
            "Fetches issued after a previous attempt timed out",
            metrics.retries.clone(),
        );
        registry.register(
            "abandoned",
            "Requests dropped because every announcer was tried without an answer",
            metrics.abandoned.clone(),
        );
        registry.register(
            "completed",
            "Requests retired by a delivered payload",
            metrics.completed.clone(),
        );
        registry.register(
            "announces_dropped",
            "Announces dropped by the per-peer outstanding-item bound",
            metrics.announces_dropped.clone(),
        );
        registry.register(
            "unknown_completes",
            "Completions for items with no outstanding request",
            metrics.unknown_completes.clone(),
        );
        registry.register(
            "stale_entries",
            "Due queue entries whose request row was already gone",
            metrics.stale_entries.clone(),
        );
        registry.register(
            "outstanding_requests",
            "Items with an outstanding request",
            metrics.outstanding_requests.clone(),
        );
        registry.register(
            "connected_peers",
            "Currently registered peers",
            metrics.connected_peers.clone(),
        );
        metrics
    }
}
