//! One-shot commands that print JSON to stdout.

use chatmirror_cdp::{ConnectionPool, Discovery, SessionOptions};
use chatmirror_config::Config;
use chatmirror_sync::{Automation, Snapshot};
use serde_json::{Value, json};

/// Targets listed by a debug port and the one the relay would mirror.
pub(crate) async fn targets(config: &Config, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = port.unwrap_or(config.devtools.default_port);
    let discovery = Discovery::from_config(&config.devtools)?;
    let targets = discovery.list_targets(port).await?;
    let selected = discovery.select_target(port, &targets).ok();

    print_json(&json!({
        "port": port,
        "targets": targets,
        "selected": selected.map(|t| t.id),
    }))
}

/// Capture the chat view once.
pub(crate) async fn snapshot(config: &Config, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = port.unwrap_or(config.devtools.default_port);
    let pool = ConnectionPool::new(
        Discovery::from_config(&config.devtools)?,
        SessionOptions::from(&config.devtools),
    );
    let automation = Automation::from_config(&config.sync)?;

    let session = pool.get_or_open(port).await?;
    let captured = automation.capture(&session, None).await;
    pool.close_all().await;

    match captured? {
        Some((capture, _)) => print_json(&Snapshot::from_capture(port, capture).to_update()),
        None => Err(format!("no chat view found on port {}", port).into()),
    }
}

/// Running state of every configured port.
pub(crate) async fn slots(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let discovery = Discovery::from_config(&config.devtools)?;
    let slots = discovery.scan_slots(&config.devtools.ports).await;
    print_json(&json!({"slots": slots}))
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
