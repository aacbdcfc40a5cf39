//! Pluggable instrumentation sinks: metrics, tracing spans, and an
//! execution-lifecycle listener. All three default to no-ops; a
//! `Constellation::builder()` installs `Tracing*` variants (or a caller's
//! own implementation) instead.
//!
//! Side-channel discipline: nothing in this module may affect the computed
//! result of an execution, and nothing here is ever awaited by the
//! scheduler — emission is fire-and-forget, and a panicking/erroring
//! backend must not take down a run.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::ConstellationError;

pub type Tags = BTreeMap<String, String>;

/// Counters, histograms, gauges. All three are fire-and-forget.
pub trait MetricsProvider: Send + Sync {
    fn counter(&self, name: &str, tags: &Tags);
    fn histogram(&self, name: &str, value: f64, tags: &Tags);
    fn gauge(&self, name: &str, value: f64, tags: &Tags);
}

/// Wraps a unit of work in a named span. `attributes` are attached when the
/// implementation supports it (the `tracing` backend does); the no-op
/// backend just runs `body`. Owned `name`/`attributes` keep this usable
/// across a spawned task boundary without fighting the borrow checker.
pub trait TracerProvider: Send + Sync {
    fn span(
        &self,
        name: String,
        attributes: Tags,
        body: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
}

/// Execution lifecycle hooks. Errors/panics inside a listener must never
/// propagate to the scheduler — callers of these methods swallow failures.
pub trait ExecutionListener: Send + Sync {
    fn on_execution_start(&self, dag_name: &str);
    fn on_module_start(&self, module_name: &str);
    fn on_module_complete(&self, module_name: &str, duration_ms: u64);
    fn on_module_failed(&self, module_name: &str, error: &ConstellationError);
    fn on_execution_complete(&self, dag_name: &str, succeeded: bool, duration_ms: u64);
}

#[derive(Default)]
pub struct NoopMetricsProvider;

impl MetricsProvider for NoopMetricsProvider {
    fn counter(&self, _name: &str, _tags: &Tags) {}
    fn histogram(&self, _name: &str, _value: f64, _tags: &Tags) {}
    fn gauge(&self, _name: &str, _value: f64, _tags: &Tags) {}
}

#[derive(Default)]
pub struct NoopTracerProvider;

impl TracerProvider for NoopTracerProvider {
    fn span(
        &self,
        _name: String,
        _attributes: Tags,
        body: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        body
    }
}

#[derive(Default)]
pub struct NoopExecutionListener;

impl ExecutionListener for NoopExecutionListener {
    fn on_execution_start(&self, _dag_name: &str) {}
    fn on_module_start(&self, _module_name: &str) {}
    fn on_module_complete(&self, _module_name: &str, _duration_ms: u64) {}
    fn on_module_failed(&self, _module_name: &str, _error: &ConstellationError) {}
    fn on_execution_complete(&self, _dag_name: &str, _succeeded: bool, _duration_ms: u64) {}
}

/// Emits `tracing` events for every metric — the default non-no-op
/// `MetricsProvider`, useful whenever a caller wants the numbers in their
/// existing log stream rather than a dedicated metrics backend.
#[derive(Default)]
pub struct TracingMetricsProvider;

impl MetricsProvider for TracingMetricsProvider {
    fn counter(&self, name: &str, tags: &Tags) {
        tracing::info!(metric.name = name, metric.kind = "counter", ?tags, "counter");
    }

    fn histogram(&self, name: &str, value: f64, tags: &Tags) {
        tracing::info!(metric.name = name, metric.kind = "histogram", value, ?tags, "histogram");
    }

    fn gauge(&self, name: &str, value: f64, tags: &Tags) {
        tracing::info!(metric.name = name, metric.kind = "gauge", value, ?tags, "gauge");
    }
}

/// Wraps `body` in a real `tracing::Span` — the `TracerProvider` (§4.K) and
/// the ambient logging stack collapse into a single mechanism rather than
/// two parallel ones.
#[derive(Default)]
pub struct TracingTracerProvider;

impl TracerProvider for TracingTracerProvider {
    fn span(
        &self,
        name: String,
        attributes: Tags,
        body: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        let span = tracing::info_span!("constellation.span", name, ?attributes);
        Box::pin(async move {
            let _entered = span.entered();
            body.await
        })
    }
}

#[derive(Default)]
pub struct TracingExecutionListener;

impl ExecutionListener for TracingExecutionListener {
    fn on_execution_start(&self, dag_name: &str) {
        tracing::info!(dag.name = dag_name, "execution start");
    }

    fn on_module_start(&self, module_name: &str) {
        tracing::debug!(module.name = module_name, "module start");
    }

    fn on_module_complete(&self, module_name: &str, duration_ms: u64) {
        tracing::debug!(module.name = module_name, duration_ms, "module complete");
    }

    fn on_module_failed(&self, module_name: &str, error: &ConstellationError) {
        tracing::warn!(module.name = module_name, %error, "module failed");
    }

    fn on_execution_complete(&self, dag_name: &str, succeeded: bool, duration_ms: u64) {
        tracing::info!(dag.name = dag_name, succeeded, duration_ms, "execution complete");
    }
}


/// A bundle of the three backends, installed together by
/// `Constellation::builder()` and passed down into the scheduler as one
/// unit rather than three separate parameters.
pub struct Backends {
    pub metrics: std::sync::Arc<dyn MetricsProvider>,
    pub tracer: std::sync::Arc<dyn TracerProvider>,
    pub listener: std::sync::Arc<dyn ExecutionListener>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            metrics: std::sync::Arc::new(NoopMetricsProvider),
            tracer: std::sync::Arc::new(NoopTracerProvider),
            listener: std::sync::Arc::new(NoopExecutionListener),
        }
    }
}
