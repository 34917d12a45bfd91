//! Operational harness: runs the capture pipeline over photo files on disk,
//! as if they had just been captured for the given user.

use anyhow::Context;
use bytes::Bytes;
use std::path::PathBuf;

use traylens::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "traylens=debug".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let mut args = std::env::args().skip(1);
    let user_id = args
        .next()
        .context("usage: traylens <user-id> <photo>...")?;
    let paths: Vec<PathBuf> = args.map(PathBuf::from).collect();
    anyhow::ensure!(!paths.is_empty(), "usage: traylens <user-id> <photo>...");

    let state = AppState::init().await?;
    let orchestrator = state.orchestrator();

    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        images.push(Bytes::from(raw));
    }

    tracing::info!(user_id = %user_id, count = images.len(), "processing batch");
    let report = orchestrator.process_batch(&user_id, images).await;

    for outcome in &report.outcomes {
        match (&outcome.error, &outcome.image_id) {
            (None, Some(id)) => tracing::info!(
                index = outcome.index,
                image_id = %id,
                meals = outcome.meals_attached,
                "image processed"
            ),
            (Some(err), _) => tracing::error!(
                index = outcome.index,
                error = %err,
                "image failed"
            ),
            _ => {}
        }
    }
    if let Some(summary) = report.error_summary() {
        tracing::warn!(%summary, "batch finished with errors");
        anyhow::bail!("{summary}");
    }
    Ok(())
}
