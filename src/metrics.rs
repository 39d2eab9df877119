// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Core sync metrics --------
pub static SIGNAL_LOADS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("signal_loads_total", "full signal reloads from persistence").unwrap());

pub static FEED_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("feed_events_total", "change-feed events applied (labels: table, kind)"),
        &["table", "kind"],
    )
    .unwrap()
});

pub static LIKE_TOGGLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("like_toggles_total", "optimistic like toggles (label: action)"),
        &["action"],
    )
    .unwrap()
});

pub static NOTIFICATIONS_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("notifications_sent_total", "notification rows inserted (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static ADMIN_REFUSALS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("admin_refusals_total", "mutations refused for missing admin role").unwrap());

pub static STORE_SIZE: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("store_signals", "signals held in the in-memory store").unwrap());

// -------- Realtime socket health (used by backend_rest) --------
pub static FEED_WS_CONNECTED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("feed_ws_connected", "1 if the realtime socket is connected, 0 otherwise"),
        &["table"],
    )
    .unwrap()
});

pub static FEED_WS_RECONNECTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("feed_ws_reconnects_total", "realtime socket reconnects"),
        &["table"],
    )
    .unwrap()
});

// ---- Config visibility ----
pub static CONFIG_BACKEND_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_backend_mode", "backend mode (label: mode)"),
        &["mode"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(SIGNAL_LOADS.clone())),
        REGISTRY.register(Box::new(FEED_EVENTS.clone())),
        REGISTRY.register(Box::new(LIKE_TOGGLES.clone())),
        REGISTRY.register(Box::new(NOTIFICATIONS_SENT.clone())),
        REGISTRY.register(Box::new(ADMIN_REFUSALS.clone())),
        REGISTRY.register(Box::new(STORE_SIZE.clone())),
        REGISTRY.register(Box::new(FEED_WS_CONNECTED.clone())),
        REGISTRY.register(Box::new(FEED_WS_RECONNECTS.clone())),
        REGISTRY.register(Box::new(CONFIG_BACKEND_MODE.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics) — tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                eprintln!("metrics bind {} failed: {}", addr, e);
                return;
            }
        };
        eprintln!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => eprintln!("metrics accept error: {}", e),
            }
        }
    });
}
