//! Metric names and recording helpers
//!
//! Uses the `metrics` facade; the embedder installs a Prometheus
//! recorder/exporter. Histogram bucket layouts are configured on the
//! exporter side against the names below.

use std::time::Duration;

/// Counter: batch-filter outcomes, labeled by `result`
/// (`filtered|passthrough|error|timeout|parse_fallback`)
pub const BATCH_FILTER_TOTAL: &str = "trace_batch_filter_total";

/// Histogram: invocations skipped per filtered batch (buckets 0,1,2,3,5,10)
pub const BATCH_FILTER_SKIPPED: &str = "trace_batch_filter_skipped";

/// Histogram: batch-filter round-trip seconds (buckets 0.05..2.0)
pub const BATCH_FILTER_DURATION: &str = "trace_batch_filter_duration_seconds";

/// Counter: symbol-resolution attempts, labeled by `strategy`
pub const SYMBOL_RESOLUTION_ATTEMPTS: &str = "trace_symbol_resolution_attempts_total";

/// Histogram: symbol-resolution seconds (buckets 1ms..100ms)
pub const SYMBOL_RESOLUTION_DURATION: &str = "trace_symbol_resolution_duration_seconds";

/// Histogram: resolution confidence (buckets 0.5..1.0)
pub const SYMBOL_RESOLUTION_CONFIDENCE: &str = "trace_symbol_resolution_confidence";

/// Counter: symbol-cache hits
pub const SYMBOL_CACHE_HITS: &str = "trace_symbol_cache_hits_total";

/// Counter: symbol-cache misses
pub const SYMBOL_CACHE_MISSES: &str = "trace_symbol_cache_misses_total";

/// Record one batch-filter outcome
pub fn record_batch_filter(result: &'static str) {
    metrics::counter!(BATCH_FILTER_TOTAL, "result" => result).increment(1);
}

/// Record how many invocations a filtered batch dropped
pub fn observe_batch_filter_skipped(skipped: usize) {
    metrics::histogram!(BATCH_FILTER_SKIPPED).record(skipped as f64);
}

/// Record batch-filter round-trip time
pub fn observe_batch_filter_duration(duration: Duration) {
    metrics::histogram!(BATCH_FILTER_DURATION).record(duration.as_secs_f64());
}

/// Record one symbol-resolution attempt
pub fn record_symbol_resolution(strategy: &'static str, confidence: f64, duration: Duration) {
    metrics::counter!(SYMBOL_RESOLUTION_ATTEMPTS, "strategy" => strategy).increment(1);
    metrics::histogram!(SYMBOL_RESOLUTION_CONFIDENCE).record(confidence);
    metrics::histogram!(SYMBOL_RESOLUTION_DURATION).record(duration.as_secs_f64());
}

/// Record a symbol-cache hit
pub fn record_symbol_cache_hit() {
    metrics::counter!(SYMBOL_CACHE_HITS).increment(1);
}

/// Record a symbol-cache miss
pub fn record_symbol_cache_miss() {
    metrics::counter!(SYMBOL_CACHE_MISSES).increment(1);
}

/// Describe all metrics to the installed recorder
///
/// Call once at startup, after the exporter is installed.
pub fn describe() {
    metrics::describe_counter!(
        BATCH_FILTER_TOTAL,
        "Batch filter outcomes by result kind"
    );
    metrics::describe_histogram!(
        BATCH_FILTER_SKIPPED,
        "Invocations skipped per filtered batch"
    );
    metrics::describe_histogram!(
        BATCH_FILTER_DURATION,
        metrics::Unit::Seconds,
        "Batch filter classifier round-trip time"
    );
    metrics::describe_counter!(
        SYMBOL_RESOLUTION_ATTEMPTS,
        "Symbol resolution attempts by strategy"
    );
    metrics::describe_histogram!(
        SYMBOL_RESOLUTION_DURATION,
        metrics::Unit::Seconds,
        "Symbol resolution latency"
    );
    metrics::describe_histogram!(
        SYMBOL_RESOLUTION_CONFIDENCE,
        "Symbol resolution confidence scores"
    );
    metrics::describe_counter!(SYMBOL_CACHE_HITS, "Symbol resolution cache hits");
    metrics::describe_counter!(SYMBOL_CACHE_MISSES, "Symbol resolution cache misses");
}
