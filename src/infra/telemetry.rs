use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register units and help text for every metric the crate emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "freshline_view_served_total",
            Unit::Count,
            "Views served, labelled by policy and serve state."
        );
        describe_counter!(
            "freshline_view_redirect_total",
            Unit::Count,
            "Requests answered with a redirect before any lookup."
        );
        describe_counter!(
            "freshline_view_rejected_total",
            Unit::Count,
            "Requests rejected, labelled by policy and reason."
        );
        describe_counter!(
            "freshline_view_store_evicted_total",
            Unit::Count,
            "Stored views evicted due to capacity."
        );
        describe_counter!(
            "freshline_canonical_refresh_total",
            Unit::Count,
            "Fetches of the canonical post set, labelled by transport."
        );
        describe_histogram!(
            "freshline_aggregate_ms",
            Unit::Milliseconds,
            "Latency of building one aggregate view in milliseconds."
        );
    });
}
