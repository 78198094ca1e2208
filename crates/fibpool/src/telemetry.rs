//! # Telemetry Features
//!
//! Diagnostics always go through `tracing` and are printed to stderr by
//! `tracing_subscriber::fmt`. Stdout is reserved for the console itself
//! (prompts and rendered results) and, in worker child processes, for the wire
//! protocol, so nothing here may ever write to it except the stdout exporter.
//!
//! Optional OpenTelemetry export is controlled by cargo features.
//!
//! ## Feature matrix
//!
//! - `otel-tracing`: Export spans (one per execution unit) via OpenTelemetry.
//! - `metrics`: Export counters and histograms via OpenTelemetry.
//! - `stdout`: Use the OpenTelemetry stdout exporter.
//!
//! ## Feature constraints
//!
//! - `stdout` requires at least one of `otel-tracing` or `metrics`.
//!
//! ## Metrics behavior
//!
//! - Requests accepted, inputs rejected, results computed, domain errors,
//!   compute duration and live worker count are recorded when `metrics` is
//!   enabled. Each child process of the process backend exports its own.
//! - Without `metrics` every recording helper compiles to a no-op.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --features otel-tracing,metrics,stdout
//! ```

#[cfg(all(
    feature = "stdout",
    not(any(feature = "otel-tracing", feature = "metrics"))
))]
compile_error!(
    "The 'stdout' feature requires at least one of 'otel-tracing' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "otel-tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "otel-tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "otel-tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "otel-tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-tracing")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "otel-tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every exporter. Called once, after the pool has
    /// stopped.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Installs the global subscriber.
///
/// `exporters` controls whether OpenTelemetry exporters are attached. Child
/// processes pass `false` since their stdout carries frames or results.
#[cfg_attr(
    not(any(feature = "metrics", feature = "otel-tracing")),
    allow(unused_variables)
)]
pub fn init_telemetry(exporters: bool) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-tracing")]
    let tracer_provider = init_tracer(exporters);

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics(exporters);

    #[cfg(any(feature = "metrics", feature = "otel-tracing"))]
    let scope = InstrumentationScope::builder("fibpool")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .compact(),
        );

    #[cfg(feature = "otel-tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "otel-tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("fibpool")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics(_exporters: bool) -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = if _exporters {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    } else {
        builder
    };

    builder.build()
}

#[cfg(feature = "otel-tracing")]
fn init_tracer(_exporters: bool) -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = if _exporters {
        use opentelemetry_stdout::SpanExporter;
        let exporter = SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    } else {
        builder
    };

    builder.build()
}

#[cfg(feature = "metrics")]
static REQUESTS_ACCEPTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static INPUTS_REJECTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RESULTS_COMPUTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static DOMAIN_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static COMPUTE_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static WORKERS_LIVE: OnceLock<UpDownCounter<i64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REQUESTS_ACCEPTED.set(
        meter
            .u64_counter("requests_accepted")
            .with_description("Requests enqueued on the work channel")
            .build(),
    );

    let _ = INPUTS_REJECTED.set(
        meter
            .u64_counter("inputs_rejected")
            .with_description("Console lines rejected by validation")
            .build(),
    );

    let _ = RESULTS_COMPUTED.set(
        meter
            .u64_counter("results_computed")
            .with_description("Results pushed to the result channel")
            .build(),
    );

    let _ = DOMAIN_ERRORS.set(
        meter
            .u64_counter("domain_errors")
            .with_description("Requests a worker refused to compute")
            .build(),
    );

    let _ = COMPUTE_DURATION_MS.set(
        meter
            .f64_histogram("compute_duration")
            .with_unit("ms")
            .with_description("Wall-clock time of one computation")
            .build(),
    );

    let _ = WORKERS_LIVE.set(
        meter
            .i64_up_down_counter("workers_live")
            .with_description("Workers currently running")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_requests_accepted() {
    if let Some(counter) = REQUESTS_ACCEPTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests_accepted() {}

#[cfg(feature = "metrics")]
pub fn increment_inputs_rejected() {
    if let Some(counter) = INPUTS_REJECTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_inputs_rejected() {}

#[cfg(feature = "metrics")]
pub fn increment_results_computed() {
    if let Some(counter) = RESULTS_COMPUTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_results_computed() {}

#[cfg(feature = "metrics")]
pub fn increment_domain_errors() {
    if let Some(counter) = DOMAIN_ERRORS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_domain_errors() {}

#[cfg(feature = "metrics")]
pub fn record_compute_duration(duration_ms: f64) {
    if let Some(histogram) = COMPUTE_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_compute_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn increment_workers_live() {
    if let Some(counter) = WORKERS_LIVE.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_workers_live() {}

#[cfg(feature = "metrics")]
pub fn decrement_workers_live() {
    if let Some(counter) = WORKERS_LIVE.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_workers_live() {}
