// ===============================
// src/main.rs
// ===============================
/*
 # broker & feed yang aktif
curl -s localhost:9898/metrics | egrep '^config_(feed_mode|broker_active|symbol)'

# hasil replikasi per broker
curl -s localhost:9898/metrics | grep '^replications_total'
curl -s localhost:9898/metrics | grep '^open_positions_mapped'

*/
/*
=============================================================================
Project : copier_bot_rust — MT5-to-remote-broker trade replicator in Rust
Module  : <module_name>.rs
Version : 0.3.0

Summary : Watches the local trading terminal's deal feed (mock/WS bridge),
          replicates opened/closed positions onto remote brokers
          (TradeLocker, DXtrade) with a fixed retry budget, keeps a
          local->remote position map, exposes Prometheus metrics, and
          records JSONL events.
=============================================================================
*/
mod domain;
mod config;
mod metrics;
mod recorder;
mod feed;
mod positions;
mod replicator;
mod gateway;             // broker contract + mock venue
mod tradelocker;         // wire types TradeLocker
mod gateway_tradelocker; // real TradeLocker REST client
mod dxtrade;             // wire types + HMAC signer DXtrade
mod gateway_dxtrade;     // real DXtrade REST client

use std::sync::Arc;
use tokio::{
    select,
    sync::mpsc,
    time::Duration,
};
use tracing::{error, info};

use crate::config::{BrokerMode, FeedMode};
use crate::domain::{Event, TradeEvent};
use crate::gateway::{MockBroker, RemoteBroker};
use crate::gateway_dxtrade::DxTradeGateway;
use crate::gateway_tradelocker::TradeLockerGateway;
use crate::positions::PositionMap;
use crate::replicator::ReplicatorTask;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt().with_env_filter("info").init();

    // ---- Load config ----
    let args = config::load();

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(args.metrics_port));

    // ---- Human-friendly startup info + export config to metrics ----
    let feed_mode_str = match args.feed_mode {
        FeedMode::Mock => "mock",
        FeedMode::Bridge => "bridge",
    };
    let broker_names: Vec<&'static str> = args.brokers.iter().map(|b| b.label()).collect();

    info!(
        feed_mode = %feed_mode_str,
        brokers = ?broker_names,
        symbols = ?args.symbols,
        bridge_ws = %args.bridge_ws_url,
        copy_magic = ?args.copy_magic,
        map_file = ?args.map_file,
        "startup config"
    );

    crate::metrics::CONFIG_FEED_MODE
        .with_label_values(&[feed_mode_str])
        .set(1);
    for b in &broker_names {
        crate::metrics::CONFIG_BROKER_ACTIVE.with_label_values(&[b]).set(1);
    }
    for s in &args.symbols {
        crate::metrics::CONFIG_SYMBOL.with_label_values(&[s]).set(1);
    }

    // ---- Recorder (optional) ----
    let rec_tx = if let Some(path) = args.record_file.clone() {
        let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
        tokio::spawn(recorder::run(rec_rx, path));
        Some(rec_tx)
    } else {
        None
    };

    // ---- Replicator per broker ----
    // Satu task + satu channel per broker; kalau dua broker aktif, event
    // di-fanout dari dispatcher di bawah.
    let multi = args.brokers.len() > 1;
    let mut repl_txs: Vec<mpsc::Sender<TradeEvent>> = Vec::new();

    for mode in &args.brokers {
        let broker: Arc<dyn RemoteBroker> = match mode {
            BrokerMode::Mock => Arc::new(MockBroker::new("mock")),
            BrokerMode::TradeLocker => {
                let cfg = match &args.tradelocker {
                    Some(c) => c,
                    None => {
                        error!("TL_* env incomplete, tradelocker skipped");
                        continue;
                    }
                };
                match TradeLockerGateway::from_config(cfg) {
                    Ok(gw) => {
                        let gw = Arc::new(gw);
                        tokio::spawn(gw.clone().run_session_keeper());
                        gw
                    }
                    Err(e) => {
                        error!(?e, "tradelocker init failed, skipped");
                        continue;
                    }
                }
            }
            BrokerMode::DxTrade => {
                let cfg = match &args.dxtrade {
                    Some(c) => c,
                    None => {
                        error!("DX_* env incomplete, dxtrade skipped");
                        continue;
                    }
                };
                match DxTradeGateway::from_config(cfg) {
                    Ok(gw) => {
                        let gw = Arc::new(gw);
                        tokio::spawn(gw.clone().run_session_keeper());
                        gw
                    }
                    Err(e) => {
                        error!(?e, "dxtrade init failed, skipped");
                        continue;
                    }
                }
            }
        };

        // map per broker; file persistence diberi suffix nama broker kalau
        // lebih dari satu broker aktif agar tidak saling timpa
        let map = match &args.map_file {
            Some(path) if multi => PositionMap::with_file(format!("{path}.{}", broker.name())),
            Some(path) => PositionMap::with_file(path.clone()),
            None => PositionMap::new(),
        };

        let task = ReplicatorTask::new(broker, map, args.copy_magic);
        let (tx, rx) = mpsc::channel::<TradeEvent>(1024);
        repl_txs.push(tx);
        tokio::spawn(replicator::run(rx, task, rec_tx.clone()));
    }

    if repl_txs.is_empty() {
        error!("no usable broker configured, exiting");
        return;
    }

    // ---- FEED (terminal events) ----
    let (ev_tx, mut ev_rx) = mpsc::channel::<TradeEvent>(1024);
    match args.feed_mode {
        FeedMode::Mock => {
            // mock feed pakai magic yang dikonfigurasi supaya tidak kena filter
            let magic = args.copy_magic.unwrap_or(0);
            tokio::spawn(feed::run_mock(ev_tx, args.symbols.clone(), magic));
        }
        FeedMode::Bridge => {
            tokio::spawn(feed::run_bridge(ev_tx, args.bridge_ws_url.clone()));
        }
    }

    // ---- Dispatcher + heartbeat ----
    let mut event_count: u64 = 0;
    loop {
        select! {
            Some(ev) = ev_rx.recv() => {
                event_count += 1;
                if let Some(tx) = &rec_tx {
                    let _ = tx.try_send(Event::Trade(ev.clone()));
                }
                for tx in &repl_txs {
                    let _ = tx.send(ev.clone()).await;
                }
            },
            _ = tokio::time::sleep(Duration::from_secs(60)) => {
                info!(events = event_count, "heartbeat");
                event_count = 0;
            }
        }
    }
}
