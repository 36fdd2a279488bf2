use anyhow::Context;
use pixxel8_lib::settings::SettingsManager;
use pixxel8_lib::utils::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = SettingsManager::settings_path().context("failed to locate settings file")?;
    let settings = SettingsManager::load_from(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;

    init_logging(settings.logging.filter.as_deref());
    tracing::info!(path = %path.display(), "Settings loaded");

    pixxel8_lib::run(settings, path)
        .await
        .context("kiosk stopped with an error")
}
