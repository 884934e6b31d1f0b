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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "deckshelf_render_total",
            Unit::Count,
            "Deck renders by result (success|failure)."
        );
        describe_counter!(
            "deckshelf_render_backend_failures_total",
            Unit::Count,
            "Individual render backend failures, labelled by backend."
        );
        describe_histogram!(
            "deckshelf_render_ms",
            Unit::Milliseconds,
            "Time from marking a deck as rendering to its final state write."
        );
        describe_counter!(
            "deckshelf_shortid_widen_total",
            Unit::Count,
            "Shortid rounds where every candidate collided and the length grew."
        );
        describe_counter!(
            "deckshelf_image_poll_exhausted_total",
            Unit::Count,
            "Image reads that gave up waiting on a running render."
        );
    });
}
