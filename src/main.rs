use std::path::PathBuf;

use anyhow::Context;
use pagecraft::env::{window_channel, BrowserHistory, MemoryHistory, MemoryStorage};
use pagecraft::{CustomProps, FrameHost, SyncConfig, WindowPlacement, ROOT_FRAME};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

const START_URL_ENV: &str = "PAGECRAFT_URL";

fn main() -> anyhow::Result<()> {
    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SyncConfig::load(config_path).context("failed to load configuration")?;

    let start_url = std::env::var(START_URL_ENV)
        .unwrap_or_else(|_| String::from("https://builder.local/"));
    let start_url = Url::parse(&start_url).with_context(|| format!("invalid start URL {start_url}"))?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    rt.block_on(simulate(config, start_url))
}

/// Drive a top window and one iframe through a short editing session and
/// print the URL the top window ends up with.
async fn simulate(config: SyncConfig, start_url: Url) -> anyhow::Result<()> {
    let storage = MemoryStorage::new();
    let history = MemoryHistory::new(start_url);
    let (top_port, mut top_mailbox) = window_channel("top");

    let mut top = FrameHost::top(
        config.clone(),
        Box::new(storage.clone()),
        Box::new(history.clone()),
    );
    top.boot();

    let iframe = top
        .add_element(ROOT_FRAME, "IFrame", true, CustomProps::new())?
        .context("top window did not assign an id")?;
    top.register_frame(&iframe)?;

    let (iframe_port, mut iframe_mailbox) = window_channel(iframe.clone());
    top.child_attached(&iframe, Box::new(iframe_port));

    let mut child = FrameHost::child(
        config,
        WindowPlacement::iframe(),
        iframe.clone(),
        None,
        Some(Box::new(top_port)),
    )?;
    child.boot();
    top.pump(&mut top_mailbox);
    top.child_loaded(&iframe);
    child.pump(&mut iframe_mailbox);
    info!(frame = %iframe, synced = child.is_synced(), "iframe received its first sync");

    let mut props = CustomProps::new();
    props.insert("title".into(), json!("Hello from the iframe"));
    child.add_element(&iframe, "Panel", false, props)?;
    top.pump(&mut top_mailbox);
    child.pump(&mut iframe_mailbox);

    let panel = child.elements_of(&iframe).first().map(|element| element.id.clone());
    if let Some(panel) = panel {
        child.move_element(&iframe, &panel, 25.0, 75.0)?;
        top.pump(&mut top_mailbox);
    }

    if let Some(report) = top.settle().await {
        info!(pages = ?report.pages_written, "frame state saved");
    }
    println!("{}", history.current_url());
    Ok(())
}
