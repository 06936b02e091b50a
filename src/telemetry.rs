//! Error telemetry: ships errors and panics to an external collector.
//!
//! Events are POSTed as JSON, fire-and-forget. Delivery problems are logged
//! at debug level and otherwise ignored so reporting can never take the UI
//! down with it.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{debug, Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;
use url::Url;

use crate::config::TelemetryConfig;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const IGNORED_TARGETS: [&str; 2] = ["hyper", "reqwest"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Fatal,
  Error,
  Warning,
  Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
  pub severity: Severity,
  pub message: String,
  /// Error type or event source, e.g. "panic" or a tracing target
  #[serde(skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub environment: Option<String>,
  pub release: &'static str,
  pub timestamp: DateTime<Utc>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub extra: BTreeMap<String, serde_json::Value>,
}

impl TelemetryEvent {
  pub fn new(severity: Severity, message: impl Into<String>) -> Self {
    Self {
      severity,
      message: message.into(),
      kind: None,
      environment: None,
      release: env!("CARGO_PKG_VERSION"),
      timestamp: Utc::now(),
      extra: BTreeMap::new(),
    }
  }

  pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
    self.kind = Some(kind.into());
    self
  }

  pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
    self.extra.insert(key.into(), value.into());
    self
  }
}

struct Collector {
  http: reqwest::Client,
  endpoint: Url,
  environment: Option<String>,
}

/// Handle used to capture errors. Disabled reporters drop everything.
#[derive(Clone, Default)]
pub struct ErrorReporter {
  collector: Option<Arc<Collector>>,
}

impl ErrorReporter {
  pub fn new(config: &TelemetryConfig) -> Result<Self> {
    let Some(endpoint) = config.endpoint.as_deref() else {
      return Ok(Self::disabled());
    };

    let endpoint =
      Url::parse(endpoint).map_err(|e| eyre!("Invalid telemetry endpoint {}: {}", endpoint, e))?;
    let http = reqwest::Client::builder()
      .timeout(SEND_TIMEOUT)
      .build()
      .map_err(|e| eyre!("Failed to build telemetry client: {}", e))?;

    Ok(Self {
      collector: Some(Arc::new(Collector {
        http,
        endpoint,
        environment: config.environment.clone(),
      })),
    })
  }

  pub fn disabled() -> Self {
    Self { collector: None }
  }

  pub fn is_enabled(&self) -> bool {
    self.collector.is_some()
  }

  /// Report an error together with its source chain.
  ///
  /// `kind` names where it happened, e.g. `property.update`.
  pub fn capture_error(&self, kind: &str, error: &(dyn std::error::Error + 'static)) {
    let mut event = TelemetryEvent::new(Severity::Error, error.to_string()).with_kind(kind);
    let chain: Vec<serde_json::Value> = std::iter::successors(error.source(), |e| e.source())
      .map(|e| e.to_string().into())
      .collect();
    if !chain.is_empty() {
      event = event.with_extra("causes", chain);
    }
    self.send(event);
  }

  /// Queue an event for delivery on the current runtime.
  ///
  /// Outside a runtime the event is dropped.
  pub fn send(&self, event: TelemetryEvent) {
    if self.collector.is_none() {
      return;
    }
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      return;
    };

    let reporter = self.clone();
    handle.spawn(async move {
      if let Err(e) = reporter.deliver(event).await {
        debug!(error = %e, "telemetry delivery failed");
      }
    });
  }

  /// Deliver an event and wait for the collector to accept it.
  pub async fn deliver(&self, mut event: TelemetryEvent) -> Result<()> {
    let Some(collector) = &self.collector else {
      return Ok(());
    };
    if event.environment.is_none() {
      event.environment = collector.environment.clone();
    }

    collector
      .http
      .post(collector.endpoint.clone())
      .json(&event)
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| eyre!("telemetry collector rejected event: {}", e))?;
    Ok(())
  }
}

impl fmt::Debug for ErrorReporter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ErrorReporter")
      .field("endpoint", &self.collector.as_ref().map(|c| c.endpoint.as_str()))
      .finish()
  }
}

/// Forward panics to the reporter, then run the previously installed hook.
pub fn install_panic_hook(reporter: ErrorReporter) {
  if !reporter.is_enabled() {
    return;
  }

  let previous = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    let payload = info
      .payload()
      .downcast_ref::<&str>()
      .map(|s| s.to_string())
      .or_else(|| info.payload().downcast_ref::<String>().cloned())
      .unwrap_or_else(|| "panic".to_string());

    let mut event = TelemetryEvent::new(Severity::Fatal, payload).with_kind("panic");
    if let Some(location) = info.location() {
      event = event.with_extra("location", location.to_string());
    }
    reporter.send(event);

    previous(info);
  }));
}

// ============================================================================
// tracing integration
// ============================================================================

/// Layer forwarding ERROR-level tracing events to the reporter.
#[derive(Debug, Clone)]
pub struct TelemetryLayer {
  reporter: ErrorReporter,
}

impl TelemetryLayer {
  pub fn new(reporter: ErrorReporter) -> Self {
    Self { reporter }
  }
}

impl<S: Subscriber> Layer<S> for TelemetryLayer {
  fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
    let metadata = event.metadata();
    if *metadata.level() != tracing::Level::ERROR || !self.reporter.is_enabled() {
      return;
    }
    // The HTTP stack used for delivery must not feed back into it
    if IGNORED_TARGETS
      .iter()
      .any(|t| metadata.target().starts_with(t))
    {
      return;
    }

    let mut visitor = FieldCollector::default();
    event.record(&mut visitor);

    let mut report = TelemetryEvent::new(Severity::Error, visitor.message.unwrap_or_default())
      .with_kind(metadata.target());
    report.extra = visitor.fields;
    self.reporter.send(report);
  }
}

#[derive(Default)]
struct FieldCollector {
  message: Option<String>,
  fields: BTreeMap<String, serde_json::Value>,
}

impl FieldCollector {
  fn insert(&mut self, field: &Field, value: serde_json::Value) {
    if field.name() == "message" {
      self.message = Some(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
      });
    } else {
      self.fields.insert(field.name().to_string(), value);
    }
  }
}

impl Visit for FieldCollector {
  fn record_str(&mut self, field: &Field, value: &str) {
    self.insert(field, value.into());
  }

  fn record_i64(&mut self, field: &Field, value: i64) {
    self.insert(field, value.into());
  }

  fn record_u64(&mut self, field: &Field, value: u64) {
    self.insert(field, value.into());
  }

  fn record_bool(&mut self, field: &Field, value: bool) {
    self.insert(field, value.into());
  }

  fn record_f64(&mut self, field: &Field, value: f64) {
    self.insert(field, value.into());
  }

  fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
    self.insert(field, format!("{:?}", value).into());
  }
}
