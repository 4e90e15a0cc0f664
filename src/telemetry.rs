use anyhow::{Context, Result, anyhow};
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{TraceContextExt, Tracer};
use opentelemetry::{Context as OtelContext, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::load_trace::Verbosity;

const LOG_ENV: &str = "SEQRA_LOG";

/// Telemetry handle for OpenTelemetry tracing.
pub(crate) struct Telemetry {
    tracer: BoxedTracer,
    provider: SdkTracerProvider,
}

impl Telemetry {
    /// Initialize telemetry with an OTLP HTTP exporter.
    pub(crate) fn new(endpoint: &str) -> Result<Self> {
        let endpoint = normalize_otlp_http_endpoint(endpoint)?;
        let exporter = SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("build OTLP span exporter")?;
        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(Resource::builder().with_service_name("seqra").build())
            .build();
        global::set_tracer_provider(provider.clone());
        Ok(Self {
            tracer: global::tracer("seqra"),
            provider,
        })
    }

    /// Run a closure inside a span when telemetry is enabled.
    pub(crate) fn in_span<T, F>(&self, name: &str, attributes: &[KeyValue], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.tracer.in_span(name.to_string(), |cx| {
            let span = cx.span();
            for attribute in attributes {
                span.set_attribute(attribute.clone());
            }
            f()
        })
    }

    /// Flush spans and shut down the tracer provider.
    pub(crate) fn shutdown(&self) -> Result<()> {
        self.provider
            .shutdown()
            .map_err(|err| anyhow!("failed to shutdown tracer provider: {err}"))
    }
}

fn normalize_otlp_http_endpoint(endpoint: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(endpoint).context("parse OTLP endpoint")?;
    if url.path() == "/" {
        url.set_path("/v1/traces");
    }
    Ok(url.to_string())
}

/// Optional telemetry span helper.
pub(crate) fn with_span<T, F>(
    telemetry: Option<&Telemetry>,
    name: &str,
    attributes: &[KeyValue],
    f: F,
) -> T
where
    F: FnOnce() -> T,
{
    match telemetry {
        Some(telemetry) => telemetry.in_span(name, attributes, f),
        None => f(),
    }
}

/// Trace id of the active span, when one is recording.
pub(crate) fn current_trace_id() -> Option<String> {
    let cx = OtelContext::current();
    let span_context = cx.span().span_context().clone();
    span_context
        .is_valid()
        .then(|| span_context.trace_id().to_string())
}

/// Install the stderr log subscriber. `SEQRA_LOG` overrides `verbosity`.
pub(crate) fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_endpoint_gets_traces_path() {
        assert_eq!(
            normalize_otlp_http_endpoint("http://localhost:4318").expect("endpoint"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            normalize_otlp_http_endpoint("http://localhost:4318/").expect("endpoint"),
            "http://localhost:4318/v1/traces"
        );
    }

    #[test]
    fn explicit_endpoint_path_is_kept() {
        assert_eq!(
            normalize_otlp_http_endpoint("http://collector:4318/custom").expect("endpoint"),
            "http://collector:4318/custom"
        );
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(normalize_otlp_http_endpoint("not a url").is_err());
    }

    #[test]
    fn span_helper_runs_closure_without_telemetry() {
        let value = with_span(None, "noop", &[KeyValue::new("seqra.phase", "test")], || 42);

        assert_eq!(value, 42);
        assert_eq!(current_trace_id(), None);
    }
}
