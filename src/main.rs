use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use cfs_dashboard::{
    config::Settings,
    dashboard::{Dashboard, DashboardKind},
    preview,
    widgets::RecordingSurface,
};

#[derive(Debug, Parser)]
#[command(name = "cfs-dashboard", version)]
struct Cli {
    /// Override DASHBOARD_KIND (call_volume|officer_allocation|call_list)
    #[arg(long)]
    kind: Option<String>,

    /// URL fragment to restore on load, e.g. "#beat=3&time__gte=2024-01-01"
    #[arg(long, default_value = "")]
    fragment: String,

    /// Keep running and serve the preview UI (same as PREVIEW_ENABLED=1)
    #[arg(long)]
    serve: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(k) = cli.kind {
        let k = k.to_lowercase();
        settings.kind = DashboardKind::parse(&k).ok_or_else(|| {
            anyhow::anyhow!("--kind must be call_volume|officer_allocation|call_list (got {k})")
        })?;
    }
    settings.preview_enabled |= cli.serve;

    log::info!(
        "app.start kind={} api={} agency={} preview={}",
        settings.kind.as_str(),
        settings.api_base_url,
        settings.agency_code,
        settings.preview_enabled
    );

    let surface = Arc::new(RecordingSurface::default());
    let dashboard = Arc::new(Dashboard::connect(&settings, surface.clone())?);

    // With the preview up, a failed first load is only logged.
    match dashboard.load(&cli.fragment).await {
        Ok(outcome) => log::info!("app.loaded outcome={:?}", outcome),
        Err(e) if settings.preview_enabled => log::error!("app.load_error {}", e),
        Err(e) => return Err(e.into()),
    }

    if !settings.preview_enabled {
        println!("{}", serde_json::to_string_pretty(&dashboard.state_json())?);
        println!("{}", serde_json::to_string_pretty(&surface.frames())?);
        return Ok(());
    }

    let server = tokio::spawn(preview::serve_preview(
        settings.clone(),
        dashboard.clone(),
        surface.clone(),
    ));
    tokio::select! {
        res = server => {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("preview.error {}", e),
                Err(e) => log::error!("preview.join_error {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("app.shutdown signal=ctrl_c");
        }
    }
    Ok(())
}
