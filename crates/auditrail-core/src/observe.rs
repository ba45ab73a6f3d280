//! Optional metrics instrumentation for auditrail.
//!
//! When the `observe` feature is enabled, the writer emits counters and
//! histograms via the [`metrics`] crate. A downstream application must install
//! a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a `log_json` batch.
///
/// - `auditrail.writer.batches_total` – counter with `outcome` label (`ok` / `fail`)
/// - `auditrail.writer.lines_total` – lines durably written
#[inline]
pub fn record_batch(lines: u64, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("auditrail.writer.batches_total", "outcome" => outcome).increment(1);
        if success {
            metrics::counter!("auditrail.writer.lines_total").increment(lines);
        }
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (lines, success);
    }
}

/// Record a stream open attempt.
///
/// - `auditrail.stream.opens_total` – counter with `mode` (`create` / `append`)
///   and `outcome` labels
#[inline]
pub fn record_stream_open(mode: &'static str, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("auditrail.stream.opens_total", "mode" => mode, "outcome" => outcome)
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (mode, success);
    }
}

/// Record a rollover.
///
/// - `auditrail.stream.rollovers_total` – counter with `trigger` label
///   (`scheduled` / `inline` / `explicit`)
#[inline]
pub fn record_rollover(trigger: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("auditrail.stream.rollovers_total", "trigger" => trigger).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = trigger;
    }
}

/// Record a columnar conversion.
///
/// - `auditrail.conversion.total` – counter with `outcome` label
/// - `auditrail.conversion.duration_seconds` – histogram
#[inline]
pub fn record_conversion(duration: std::time::Duration, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("auditrail.conversion.total", "outcome" => outcome).increment(1);
        metrics::histogram!("auditrail.conversion.duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, success);
    }
}
