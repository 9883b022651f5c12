//! Prometheus metrics for the compile service

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use relc_registry::Dialect;
use std::time::Duration;

/// Result label for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// Rejected with the given error kind.
    Rejected(&'static str),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Rejected(kind) => kind,
        }
    }
}

pub struct Metrics {
    registry: Registry,
    compilations: IntCounterVec,
    compile_seconds: HistogramVec,
    ddl_statements: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let compilations = IntCounterVec::new(
            Opts::new("relc_compilations_total", "Queries compiled, by dialect and outcome"),
            &["dialect", "outcome"],
        )?;
        let compile_seconds = HistogramVec::new(
            HistogramOpts::new("relc_compile_duration_seconds", "Time spent compiling a query")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["dialect"],
        )?;
        let ddl_statements = IntCounterVec::new(
            Opts::new("relc_ddl_statements_total", "DDL statements rendered, by dialect and outcome"),
            &["dialect", "outcome"],
        )?;

        registry.register(Box::new(compilations.clone()))?;
        registry.register(Box::new(compile_seconds.clone()))?;
        registry.register(Box::new(ddl_statements.clone()))?;

        Ok(Self {
            registry,
            compilations,
            compile_seconds,
            ddl_statements,
        })
    }

    pub fn record_compile(&self, dialect: Dialect, outcome: Outcome, elapsed: Duration) {
        self.compilations
            .with_label_values(&[dialect.name(), outcome.label()])
            .inc();
        self.compile_seconds
            .with_label_values(&[dialect.name()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_ddl(&self, dialect: Dialect, outcome: Outcome) {
        self.ddl_statements
            .with_label_values(&[dialect.name(), outcome.label()])
            .inc();
    }

    /// Text exposition format and its content type.
    pub fn render(&self) -> Result<(String, Vec<u8>), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
