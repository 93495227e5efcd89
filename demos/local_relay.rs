//! Full relay round trip against a local controller server.
//!
//! Demonstrates:
//! - Bootstrapping a page runtime from a settings store
//! - Receiving playback commands relayed to the window channel
//! - Watching connection status from the popup side of the bus
//!
//! Usage:
//!   cargo run --example local_relay
//!   RUST_LOG=player_relay=debug cargo run --example local_relay

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

use player_relay::bootstrap::bootstrap_page;
use player_relay::messaging::{MessageTransport, RuntimeChannel, WindowChannel};
use player_relay::settings::{
    CONNECTION_ENABLED_KEY, MemorySettingsStore, SettingsStore, WS_SERVER_KEY,
    remember_connection_key,
};

// ============================================================================
// Constants
// ============================================================================

const PAGE_ORIGIN: &str = "https://music.example.com";

const COMMANDS: &[&str] = &[
    r#"{"type":"toggle-play-pause"}"#,
    r#"{"type":"set-volume","payload":0.4}"#,
    r#"{"type":"next-track"}"#,
];

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== Local Relay ===\n");

    // ========================================================================
    // Controller Server
    // ========================================================================

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://127.0.0.1:{}", listener.local_addr()?.port());
    println!("[Server] Listening on {url}");

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(mut ws) = accept_async(stream).await else {
                continue;
            };
            for command in COMMANDS {
                let _ = ws.send(Message::Text((*command).to_string().into())).await;
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
        }
    });

    // ========================================================================
    // Bootstrap
    // ========================================================================

    let settings = MemorySettingsStore::new();
    settings
        .set(&remember_connection_key(PAGE_ORIGIN), json!(true))
        .await?;
    settings.set(CONNECTION_ENABLED_KEY, json!(true)).await?;
    settings.set(WS_SERVER_KEY, json!(url)).await?;

    let window = WindowChannel::new(PAGE_ORIGIN);
    let bus = RuntimeChannel::new();

    // The main world prints every command relayed to the window.
    let main_world = window.endpoint(PAGE_ORIGIN);
    main_world.on_receive(Box::new(|inbound| {
        println!("[Player] Command: {}", inbound.data);
    }));

    // The popup side watches status updates on the bus.
    bus.on_receive(Box::new(|inbound| {
        println!("[Popup]  Status update: {}", inbound.data);
    }));

    let runtime = bootstrap_page(
        Arc::new(settings.clone()),
        window,
        bus.endpoint(),
    )
    .await?;
    println!("[Page]   Bootstrapped, status: {}", runtime.connection().connection_status());

    // Ask for the initial data the way the popup does on open.
    let initial = bus.request(json!({ "type": "request-initial-data" })).await?;
    println!("[Popup]  Initial data: {initial}");

    tokio::time::sleep(Duration::from_secs(1)).await;

    // ========================================================================
    // Shutdown
    // ========================================================================

    settings.set(CONNECTION_ENABLED_KEY, json!(false)).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("\n[Page]   Final status: {}", runtime.connection().connection_status());

    Ok(())
}
