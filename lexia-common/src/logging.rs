//! Logging utilities for Lexia services.
//!
//! Provides structured JSON or human-readable logging plus per-request
//! trace identifiers.
//!
//! # Noise Filtering
//!
//! By default, noisy library modules (hyper, reqwest, h2, rustls, tokio_util)
//! are set to `warn` level to reduce log clutter while keeping business logs
//! at the specified level.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default noisy modules that should be filtered to warn level.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tokio_util",
    "tower_http",
];

/// Header used to propagate trace IDs between the webhook relay and the agent.
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Build the filter directive string for a base level plus extra exclusions.
fn build_directives(log_level: &str, excluded_targets: &[String]) -> String {
    let mut directives = String::from(log_level);

    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }
    for target in excluded_targets {
        directives.push_str(&format!(",{}=warn", target));
    }

    directives
}

/// Initialize logging.
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - "json" for structured JSON, anything else for human-readable
/// * `excluded_targets` - Extra module targets pinned to `warn`
///
/// `RUST_LOG`, when set, replaces the computed filter entirely.
pub fn init_logging_with_exclusions(
    log_level: &str,
    log_format: &str,
    excluded_targets: &[String],
) {
    let directives = build_directives(log_level, excluded_targets);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len() + excluded_targets.len(),
        "Logging initialized"
    );
}

/// Generate a new trace ID for request tracing.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Request Context
// ============================================================================

/// Per-request tracing context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Trace ID, reused from the caller when provided
    pub trace_id: String,
    /// Service name
    pub service: String,
}

impl RequestContext {
    /// Create context from HTTP headers, reusing `X-Trace-Id` when present.
    pub fn from_headers(headers: &http::HeaderMap, service: impl Into<String>) -> Self {
        let trace_id = headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from)
            .unwrap_or_else(generate_trace_id);

        Self {
            trace_id,
            service: service.into(),
        }
    }
}

/// Create a tracing span for an inbound chat message.
///
/// # Example
///
/// ```ignore
/// let span = chat_span!(ctx.trace_id, request.session_id, request.message_id);
/// async { /* handle */ }.instrument(span).await
/// ```
#[macro_export]
macro_rules! chat_span {
    ($trace_id:expr, $session_id:expr, $message_id:expr) => {
        tracing::info_span!(
            "chat_message",
            trace_id = %$trace_id,
            session_id = %$session_id,
            message_id = ?$message_id
        )
    };
}
