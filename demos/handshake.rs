//! Two-window handshake on the simulated platform.
//!
//! Demonstrates:
//! - A host page opening an active channel to a frame at `B.html`
//! - The frame's page script opening a passive channel
//! - An emit issued before the frame exists being delivered once ready
//! - A channel with no peer failing after its connection timeout
//!
//! Usage:
//!   cargo run --example handshake
//!   cargo run --example handshake -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crosswindow::sim::{SimWindow, SimWorld};
use crosswindow::{Channel, ChannelOptions, ConnectionState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const HOST_URL: &str = "https://b.example/host.html";
const FRAME_URL: &str = "https://b.example/B.html";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct Greeting {
    msg: String,
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let debug = std::env::args().any(|arg| arg == "--debug");
    init_logging(debug);

    if let Err(e) = run() {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "crosswindow=trace"
    } else {
        "crosswindow=debug"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    println!("=== Handshake ===\n");

    let world = SimWorld::new();

    // ========================================================================
    // Frame Page
    // ========================================================================

    let frame: Arc<Mutex<Option<Channel>>> = Arc::new(Mutex::new(None));
    let parked = Arc::clone(&frame);
    world.register_page(FRAME_URL, move |window: &SimWindow| {
        let channel = Channel::new(window.platform(), ChannelOptions::new())?;
        channel.on_typed("greet", |greeting: Greeting| {
            println!("[B] greet: {}", greeting.msg);
        })?;
        channel.emit_value(
            "hello",
            &Greeting {
                msg: "hello from B".into(),
            },
        )?;
        *parked.lock() = Some(channel);
        Ok(())
    })?;

    // ========================================================================
    // Host Page
    // ========================================================================

    let host = world.open_window(HOST_URL)?;
    let channel = Channel::builder()
        .source("B.html")
        .origin("https://b.example")
        .connection_timeout(Duration::from_millis(50))
        .on_connection_fail(|err| eprintln!("[A] {err}"))
        .build(host.platform())?;

    channel.on_typed("hello", |greeting: Greeting| {
        println!("[A] hello: {}", greeting.msg);
    })?;
    channel.emit_value("greet", &Greeting { msg: "hi".into() })?;
    println!("[A] queued emits before load: {}", channel.pending_count());

    world.run_until_idle();

    let remote = frame.lock().clone().context("frame page never ran")?;
    println!("\n[A] state: {}", channel.state());
    println!("[B] state: {}", remote.state());
    println!("    virtual time: {:?}\n", world.now());

    if !channel.is_connected() || !remote.is_connected() {
        bail!("handshake did not complete");
    }

    // ========================================================================
    // Lonely Channel
    // ========================================================================

    let lonely_window = world.open_window("https://c.example/")?;
    let lonely = Channel::builder()
        .on_connection_fail(|err| println!("[C] {err}"))
        .build(lonely_window.platform())?;

    world.run_for(Duration::from_millis(100));

    if lonely.state() != ConnectionState::Failed {
        bail!("lonely channel should have failed");
    }

    println!("\n=== Done ===");
    Ok(())
}
