//! Live incident monitor
//!
//! Connects to an incident-manager GraphQL endpoint and tails two
//! subscriptions over one connection: critical incident alerts and the
//! rolling update feed. Reconnection, replay and keep-alive are handled by
//! the submux client; this binary only renders events.
//!
//! Configuration via environment (or a .env file):
//! - `WS_URL`     endpoint, e.g. ws://localhost:8080/graphql/ws
//! - `AUTH_TOKEN` bearer token sent with the handshake

use anyhow::Result;
use incident_stream::bin_common::{init_logging, require_env};
use serde_json::json;
use std::time::Duration;
use submux::{StaticToken, SubscriptionEvent, SubscriptionHandle};
use tracing::{error, info, warn};

const CRITICAL_INCIDENTS_QUERY: &str = r#"
    subscription {
      criticalIncidents {
        id
        title
        description
        severity
        state
        createdAt
        affectedResources
      }
    }
"#;

const INCIDENT_UPDATES_QUERY: &str = r#"
    subscription IncidentUpdates($severities: [Severity!]) {
      incidentUpdates(severities: $severities, activeOnly: true) {
        updateType
        incidentId
        timestamp
      }
    }
"#;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let url = require_env("WS_URL")?;
    let token = require_env("AUTH_TOKEN")?;

    info!("connecting to {}", url);
    let client = submux::builder()
        .url(url)
        .token(StaticToken::new(token))
        .keepalive(Duration::from_secs(15), Duration::from_secs(45))
        .build()
        .await?;

    let incidents = client.subscribe_with_key(
        "critical-incidents",
        CRITICAL_INCIDENTS_QUERY,
        None,
    )?;
    let updates = client.subscribe_with_key(
        "incident-updates",
        INCIDENT_UPDATES_QUERY,
        Some(json!({ "severities": ["P0", "P1"] })),
    )?;
    info!("subscribed, watching for incidents (Ctrl+C to stop)");

    let incidents_task = tokio::spawn(render_incidents(incidents));
    let updates_task = tokio::spawn(render_updates(updates));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    client.shutdown().await?;

    incidents_task.await?;
    updates_task.await?;
    Ok(())
}

async fn render_incidents(mut handle: SubscriptionHandle) {
    while let Some(event) = handle.next().await {
        match event {
            SubscriptionEvent::Next(payload) => {
                let Some(incident) = payload
                    .get("data")
                    .and_then(|d| d.get("criticalIncidents"))
                else {
                    warn!("unrecognized incident payload: {payload}");
                    continue;
                };
                info!(
                    id = incident["id"].as_str().unwrap_or("?"),
                    severity = incident["severity"].as_str().unwrap_or("?"),
                    state = incident["state"].as_str().unwrap_or("?"),
                    "CRITICAL INCIDENT: {}",
                    incident["title"].as_str().unwrap_or("(untitled)")
                );
                if let Some(resources) = incident["affectedResources"].as_array() {
                    for resource in resources {
                        info!("  affected: {}", resource.as_str().unwrap_or("?"));
                    }
                }
            }
            SubscriptionEvent::Failed(payload) => {
                error!("critical incident stream failed: {payload}");
            }
            SubscriptionEvent::Completed => {
                info!("critical incident stream completed");
            }
        }
    }
}

async fn render_updates(mut handle: SubscriptionHandle) {
    while let Some(event) = handle.next().await {
        match event {
            SubscriptionEvent::Next(payload) => {
                let Some(update) = payload
                    .get("data")
                    .and_then(|d| d.get("incidentUpdates"))
                else {
                    warn!("unrecognized update payload: {payload}");
                    continue;
                };
                info!(
                    incident = update["incidentId"].as_str().unwrap_or("?"),
                    at = update["timestamp"].as_str().unwrap_or("?"),
                    "update: {}",
                    update["updateType"].as_str().unwrap_or("?")
                );
            }
            SubscriptionEvent::Failed(payload) => {
                error!("incident update stream failed: {payload}");
            }
            SubscriptionEvent::Completed => {
                info!("incident update stream completed");
            }
        }
    }
}
