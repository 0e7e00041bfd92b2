use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{ExportConfig, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{RandomIdGenerator, SdkTracerProvider};
use opentelemetry_semantic_conventions::SCHEMA_URL;
use opentelemetry_semantic_conventions::attribute::{
    DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_NAME, SERVICE_VERSION,
};
use std::env;
use std::net::SocketAddr;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info,h2=warn,hyper_util=warn,reqwest=warn,rustls=warn,tonic=warn";

/// Keeps the span exporter alive; flushes and shuts it down on drop.
pub struct TelemetryGuard(Option<SdkTracerProvider>);

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(err) = provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
    }
}

fn resource(pkg_name: &str) -> Resource {
    let attrs = [
        KeyValue::new(SERVICE_NAME, pkg_name.to_string()),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        KeyValue::new(
            DEPLOYMENT_ENVIRONMENT_NAME,
            if cfg!(debug_assertions) {
                "develop"
            } else {
                "production"
            },
        ),
    ];
    Resource::builder()
        .with_schema_url(attrs.clone(), SCHEMA_URL)
        .with_attributes(attrs)
        .build()
}

fn init_tracer_provider(pkg_name: &str, endpoint: String) -> anyhow::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_export_config(ExportConfig {
            endpoint: Some(endpoint),
            protocol: Protocol::Grpc,
            ..Default::default()
        })
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource(pkg_name))
        .with_batch_exporter(exporter)
        .build())
}

/// Installs the global tracing subscriber.
///
/// Spans are additionally exported over OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT`
/// is set; otherwise only the fmt layer is active.
pub fn init_tracing(pkg_name: &str) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt_layer = tracing_subscriber::fmt::layer();

    let tracer_provider = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|endpoint| !endpoint.trim().is_empty())
        .and_then(|endpoint| match init_tracer_provider(pkg_name, endpoint) {
            Ok(provider) => Some(provider),
            Err(err) => {
                eprintln!("Failed to initialize OTLP exporter, continuing without it: {err:?}");
                None
            }
        });
    let telemetry_layer = tracer_provider
        .as_ref()
        .map(|provider| OpenTelemetryLayer::new(provider.tracer("tracing-otel-subscriber")));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .with(telemetry_layer)
        .init();

    TelemetryGuard(tracer_provider)
}

pub fn init_metrics(listen_addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
}
