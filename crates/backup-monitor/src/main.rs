mod bootstrap;
mod report;

use anyhow::{Context, Result};
use backup_core::settings::Settings;
use backup_runtime::dashboard::{Dashboard, Providers, View};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<std::ffi::OsString> = std::env::args_os().collect();
    let settings = Settings::load_from_args(args.clone());

    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("backup-monitor v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = settings.config_path();
    let config = settings
        .resolve_config(args)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    let view: View = settings.view.parse()?;

    tracing::info!(
        "View: {}, Timezone: {}, Config: {}",
        settings.view,
        config.timezone,
        config_path.display()
    );

    let providers = Providers::production(&config);
    let dashboard = Dashboard::new(config, providers);
    let snapshot = dashboard.snapshot(view).await;

    match settings.format.as_str() {
        "text" => print!("{}", report::render_text(&snapshot)),
        _ if settings.pretty => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        _ => println!("{}", serde_json::to_string(&snapshot)?),
    }

    Ok(())
}
