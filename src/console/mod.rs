mod app;
mod input;
mod screen;

use crate::core::settings::Settings;
use anyhow::Result;

pub async fn run(settings: Settings) -> Result<()> {
    tracing::info!("Starting brooklyn-console");
    app::run(settings).await
}
