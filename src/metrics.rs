// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Core replication metrics --------
pub static FEED_EVENTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("feed_events_total", "trade events received from the terminal feed").unwrap());

pub static EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trade_events_total", "trade events seen by a replicator (label: direction)"),
        &["direction"],
    )
    .unwrap()
});

pub static REPLICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "replications_total",
            "replication outcomes (labels: effect, outcome, broker)",
        ),
        &["effect", "outcome", "broker"],
    )
    .unwrap()
});

// Attempt count per event (1..=10; 10 berarti retry budget habis)
pub static ATTEMPTS_PER_EVENT: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "replication_attempts_per_event",
            "remote call attempts spent per replicated event",
        )
        .buckets(prometheus::linear_buckets(1.0, 1.0, 10).unwrap()),
    )
    .unwrap()
});

pub static OPEN_POSITIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("open_positions_mapped", "entries in the local->remote position map"),
        &["broker"],
    )
    .unwrap()
});

// -------- Session keepers --------
pub static SESSION_KEEPALIVE_OK: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "session_keepalive_ok_total",
            "Successful session refresh/ping calls",
        ),
        &["broker"],
    )
    .unwrap()
});

pub static SESSION_KEEPALIVE_ERR: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "session_keepalive_err_total",
            "Failed session refresh/ping calls",
        ),
        &["broker"],
    )
    .unwrap()
});

// -------- Terminal bridge health (dipakai feed::run_bridge) --------
pub static BRIDGE_WS_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bridge_ws_connected",
        "1 if the terminal bridge WS is connected, 0 otherwise",
    )
    .unwrap()
});

pub static BRIDGE_WS_RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bridge_ws_reconnects_total",
        "Number of reconnects to the terminal bridge WS",
    )
    .unwrap()
});

// ---- Config visibility (feed / brokers / symbols) ----
pub static CONFIG_FEED_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_feed_mode", "feed mode (label: mode)"),
        &["mode"],
    )
    .unwrap()
});

pub static CONFIG_BROKER_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_broker_active", "configured brokers (label: broker)"),
        &["broker"],
    )
    .unwrap()
});

pub static CONFIG_SYMBOL: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_symbol", "configured mock-feed symbols (label: symbol)"),
        &["symbol"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(FEED_EVENTS.clone())),
        REGISTRY.register(Box::new(EVENTS.clone())),
        REGISTRY.register(Box::new(REPLICATIONS.clone())),
        REGISTRY.register(Box::new(ATTEMPTS_PER_EVENT.clone())),
        REGISTRY.register(Box::new(OPEN_POSITIONS.clone())),
        // Session keepers
        REGISTRY.register(Box::new(SESSION_KEEPALIVE_OK.clone())),
        REGISTRY.register(Box::new(SESSION_KEEPALIVE_ERR.clone())),
        // Bridge WS health
        REGISTRY.register(Box::new(BRIDGE_WS_CONNECTED.clone())),
        REGISTRY.register(Box::new(BRIDGE_WS_RECONNECTS.clone())),
        // Config visibility
        REGISTRY.register(Box::new(CONFIG_FEED_MODE.clone())),
        REGISTRY.register(Box::new(CONFIG_BROKER_ACTIVE.clone())),
        REGISTRY.register(Box::new(CONFIG_SYMBOL.clone())),
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
                tracing::error!(%addr, ?e, "metrics bind failed");
                return;
            }
        };
        eprintln!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => eprintln!("metrics accept error: {e}"),
            }
        }
    });
}
