use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use rentdash::app::{App, RootView};
use rentdash::config::Config;
use rentdash::services::Services;
use rentdash::logging;
use rentdash::telemetry::{self, ErrorReporter, Severity, TelemetryEvent};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rentdash")]
#[command(about = "A terminal dashboard for rental property management")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./rentdash.yaml or $XDG_CONFIG_HOME/rentdash/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overriding the config file
  #[arg(long, env = "RENTDASH_API_URL")]
  api_url: Option<String>,

  /// Screen to open first
  #[arg(long, value_enum, default_value_t = RootView::Properties)]
  view: RootView,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.api.base_url = url;
  }

  let reporter = ErrorReporter::new(&config.telemetry)?;
  // Dropping the guard flushes the log file
  let _log_guard = logging::init(&config.log_dir(), reporter.clone())?;
  telemetry::install_panic_hook(reporter.clone());

  info!(
    api = %config.api.base_url,
    telemetry = reporter.is_enabled(),
    "starting rentdash"
  );

  let services = Services::new(&config, reporter.clone())
    .map_err(|e| eyre!("Invalid API configuration: {}", e))?;
  let mut app = App::new(services, args.view);
  let result = app.run().await;

  if let Err(e) = &result {
    // Sent inline: the runtime shuts down as soon as main returns
    let event = TelemetryEvent::new(Severity::Fatal, format!("{:#}", e)).with_kind("exit");
    if let Err(send_error) = reporter.deliver(event).await {
      tracing::debug!(error = %send_error, "could not report fatal error");
    }
  }
  result
}
