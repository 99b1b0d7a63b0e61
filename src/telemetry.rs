//! Logging and tracing setup
//!
//! - Console logging (compact, stderr so stdout stays clean for command output)
//! - JSON file logging, rolled daily
//! - OpenTelemetry export when an OTLP endpoint is configured

use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

const SERVICE_NAME: &str = "obsidian-council";

/// Keeps the log writer and span exporter alive. Drop flushes both.
pub struct Telemetry {
    pub session_id: Uuid,
    log_dir: PathBuf,
    _file_guard: WorkerGuard,
    otel_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Install the global subscriber. Safe to call more than once; only the
    /// first call wins.
    pub fn init(
        log_dir: impl Into<PathBuf>,
        verbose: bool,
        otel_endpoint: Option<&str>,
    ) -> anyhow::Result<Self> {
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)?;

        let session_id = Uuid::new_v4();

        let file_appender = tracing_appender::rolling::daily(&log_dir, "council.log");
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

        let otel_provider = match otel_endpoint {
            Some(endpoint) => {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .with_endpoint(endpoint)
                    .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                    .build()?;

                Some(
                    SdkTracerProvider::builder()
                        .with_batch_exporter(exporter)
                        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
                        .build(),
                )
            }
            None => None,
        };
        let otel_layer = otel_provider
            .as_ref()
            .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)));

        tracing_subscriber::registry()
            .with(env_filter(verbose))
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .with(fmt::layer().json().with_writer(non_blocking))
            .with(otel_layer)
            .try_init()
            .ok();

        tracing::info!(
            session_id = %session_id,
            log_dir = %log_dir.display(),
            otel_enabled = otel_endpoint.is_some(),
            "Telemetry initialized"
        );

        Ok(Telemetry {
            session_id,
            log_dir,
            _file_guard: file_guard,
            otel_provider,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn otel_enabled(&self) -> bool {
        self.otel_provider.is_some()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = self.otel_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("failed to flush spans: {e}");
            }
        }
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,hyper=info,reqwest=info,h2=info,rustls=info")
        } else {
            EnvFilter::new("info,hyper=warn,reqwest=warn,h2=warn,rustls=warn")
        }
    })
}
