/*!
 * Slot Tracing
 * Structured tracing for per-slot allocation using the tracing crate
 *
 * Features:
 * - JSON-formatted logs for structured parsing
 * - One span per (slot, carrier) allocation
 * - Deadline overrun warnings with the measured duration embedded
 */

use crate::core::{CcIdx, TtiPoint};
use std::time::{Duration, Instant};
use tracing::{debug, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - MAC_SCHED_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("MAC_SCHED_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    // try_init: a second initialization (tests, embedding process) is not an error
    let result = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::NONE)
                    .compact(),
            )
            .try_init()
    };

    if result.is_ok() {
        tracing::info!(json = use_json, "structured tracing initialized");
    }
}

/// Span covering one carrier's allocation for one slot
///
/// Logs a warning on drop if the allocation overran the deadline.
pub struct SlotSpan {
    span: tracing::Span,
    start: Instant,
    deadline: Duration,
    tti: TtiPoint,
    cc: CcIdx,
}

impl SlotSpan {
    pub fn new(tti: TtiPoint, cc: CcIdx, deadline: Duration) -> Self {
        let span = span!(
            Level::DEBUG,
            "slot",
            tti = tti.to_uint(),
            cc = cc,
            dl_grants = tracing::field::Empty,
            ul_grants = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            deadline,
            tti,
            cc,
        }
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn record_grants(&self, dl: usize, ul: usize) {
        self.span.record("dl_grants", dl);
        self.span.record("ul_grants", ul);
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for SlotSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        let _entered = self.span.enter();

        if duration > self.deadline {
            warn!(
                tti = self.tti.to_uint(),
                cc = self.cc,
                duration_us = duration.as_micros() as u64,
                deadline_us = self.deadline.as_micros() as u64,
                "slot deadline exceeded"
            );
        } else {
            debug!(
                tti = self.tti.to_uint(),
                cc = self.cc,
                duration_us = duration.as_micros() as u64,
                "slot allocated"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_tracing() {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("debug"))
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init();
    }

    #[test]
    fn test_slot_span_within_deadline() {
        init_test_tracing();
        let span = SlotSpan::new(TtiPoint::new(4), 0, Duration::from_secs(1));
        span.record_grants(1, 0);
        assert!(span.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_slot_span_overrun() {
        init_test_tracing();
        let span = SlotSpan::new(TtiPoint::new(5), 1, Duration::from_micros(1));
        std::thread::sleep(Duration::from_millis(2));
        assert!(span.elapsed() > Duration::from_micros(1));
        // Dropped here, logging the overrun warning
    }
}
