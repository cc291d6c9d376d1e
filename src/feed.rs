// ===============================
// src/feed.rs
// ===============================
//
// Terminal event adapters:
// - run_mock   : synthetic deal generator (entry lalu exit per symbol)
// - run_bridge : WS ke bridge EA di terminal; satu frame teks = satu
//                trade-transaction JSON. Reconnect terus dengan backoff.
//
// Notes:
// - Hanya transaksi deal yang diteruskan; frame lain di-skip di sini dan
//   replicator tetap memverifikasi kind-nya sendiri.

use chrono::Utc;
use futures_util::StreamExt;
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::{Direction, Side, TradeEvent, TradeKind};
use crate::metrics::{BRIDGE_WS_CONNECTED, BRIDGE_WS_RECONNECTS, FEED_EVENTS};

/// Generator deal sintetis: buka posisi, tahan sebentar, tutup lagi.
/// Berguna untuk latihan lokal tanpa terminal (pasangkan dengan BROKERS=mock).
pub async fn run_mock(ev_tx: tokio::sync::mpsc::Sender<TradeEvent>, symbols: Vec<String>, magic: u64) {
    let mut local_id: u64 = 1;
    let mut deal_id: u64 = 1000;

    loop {
        for symbol in &symbols {
            let side = if rand::thread_rng().gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let volume = 0.01 * rand::thread_rng().gen_range(1..=10) as f64;

            let entry = TradeEvent {
                ts_ns: Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128,
                kind: TradeKind::DealAdded,
                local_id,
                deal_id,
                symbol: symbol.clone(),
                volume,
                side,
                direction: Direction::Entry,
                magic,
            };
            if ev_tx.send(entry).await.is_err() {
                return;
            }
            FEED_EVENTS.inc();
            sleep(Duration::from_secs(5)).await;

            // exit deal menutup posisi yang sama; side dibalik
            let exit = TradeEvent {
                ts_ns: Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128,
                kind: TradeKind::DealAdded,
                local_id,
                deal_id: deal_id + 1,
                symbol: symbol.clone(),
                volume,
                side: match side { Side::Buy => Side::Sell, Side::Sell => Side::Buy },
                direction: Direction::Exit,
                magic,
            };
            if ev_tx.send(exit).await.is_err() {
                return;
            }
            FEED_EVENTS.inc();

            local_id += 1;
            deal_id += 2;
            sleep(Duration::from_secs(5)).await;
        }
    }
}

/// Frame dari bridge EA. Contoh payload:
/// {"event":"deal","positionId":7,"dealId":123,"symbol":"EURUSD",
///  "volume":0.01,"side":"BUY","entry":"IN","magic":15}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeFrame {
    event: String,
    position_id: u64,
    deal_id: u64,
    symbol: String,
    volume: f64,
    side: String,
    entry: String,
    #[serde(default)]
    magic: u64,
}

fn parse_frame(txt: &str) -> Option<TradeEvent> {
    let frame: BridgeFrame = match serde_json::from_str(txt) {
        Ok(f) => f,
        Err(e) => {
            warn!(?e, "bridge frame decode failed, skipped");
            return None;
        }
    };
    if frame.event != "deal" {
        debug!(event = %frame.event, "non-deal frame skipped");
        return None;
    }

    let side = match frame.side.to_ascii_uppercase().as_str() {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        other => {
            warn!(side = %other, "unknown deal side, frame skipped");
            return None;
        }
    };
    // MT5 deal entry: IN buka exposure, OUT/INOUT menutup
    let direction = match frame.entry.to_ascii_uppercase().as_str() {
        "IN" => Direction::Entry,
        "OUT" | "INOUT" => Direction::Exit,
        other => {
            warn!(entry = %other, "unknown deal entry, frame skipped");
            return None;
        }
    };

    Some(TradeEvent {
        ts_ns: Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128,
        kind: TradeKind::DealAdded,
        local_id: frame.position_id,
        deal_id: frame.deal_id,
        symbol: frame.symbol,
        volume: frame.volume,
        side,
        direction,
        magic: frame.magic,
    })
}

/// Adapter ke bridge WS terminal; reconnect selamanya (terminal bisa
/// restart kapan saja) dengan exponential backoff + jitter.
pub async fn run_bridge(ev_tx: tokio::sync::mpsc::Sender<TradeEvent>, ws_url: String) {
    // Validasi awal supaya URL jelek tidak membuat loop reconnect sia-sia
    if let Err(e) = Url::parse(&ws_url) {
        error!(?e, %ws_url, "bad bridge ws url");
        return;
    }

    let mut attempt: u32 = 0;
    loop {
        info!(%ws_url, "connecting terminal bridge");
        match connect_async(ws_url.as_str()).await {
            Ok((mut ws, _resp)) => {
                info!("connected to terminal bridge");
                BRIDGE_WS_CONNECTED.set(1);
                attempt = 0; // reset backoff

                while let Some(frame) = ws.next().await {
                    match frame {
                        Ok(m) if m.is_text() => {
                            let txt = match m.into_text() {
                                Ok(t) => t,
                                Err(e) => {
                                    warn!(?e, "failed to read text frame");
                                    continue;
                                }
                            };
                            if let Some(ev) = parse_frame(&txt) {
                                FEED_EVENTS.inc();
                                if ev_tx.send(ev).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(_) => {
                            // ignore non-text frames
                        }
                        Err(e) => {
                            error!(?e, "bridge ws read error");
                            break;
                        }
                    }
                }
                BRIDGE_WS_CONNECTED.set(0);
                warn!("terminal bridge disconnected, will reconnect…");
            }
            Err(e) => {
                error!(?e, "connect bridge failed");
            }
        }

        // Exponential backoff + jitter
        BRIDGE_WS_RECONNECTS.inc();
        attempt = attempt.saturating_add(1);
        let shift = attempt.min(6);
        let factor = 1u64 << shift;                  // 1,2,4,...,64
        let base_ms = 500u64.saturating_mul(factor); // 0.5s..32s
        let jitter = rand::thread_rng().gen_range(0..=250);
        sleep(Duration::from_millis(base_ms + jitter)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entry_deal_frame() {
        let txt = r#"{"event":"deal","positionId":7,"dealId":123,"symbol":"EURUSD",
                      "volume":0.01,"side":"BUY","entry":"IN","magic":15}"#;
        let ev = parse_frame(txt).unwrap();
        assert_eq!(ev.kind, TradeKind::DealAdded);
        assert_eq!(ev.local_id, 7);
        assert_eq!(ev.deal_id, 123);
        assert_eq!(ev.side, Side::Buy);
        assert_eq!(ev.direction, Direction::Entry);
        assert_eq!(ev.magic, 15);
    }

    #[test]
    fn parses_exit_deal_frame() {
        let txt = r#"{"event":"deal","positionId":7,"dealId":124,"symbol":"EURUSD",
                      "volume":0.01,"side":"SELL","entry":"OUT"}"#;
        let ev = parse_frame(txt).unwrap();
        assert_eq!(ev.direction, Direction::Exit);
        assert_eq!(ev.magic, 0); // default saat bridge tidak mengirim magic
    }

    #[test]
    fn skips_non_deal_and_garbage_frames() {
        assert!(parse_frame(r#"{"event":"heartbeat"}"#).is_none());
        assert!(parse_frame("not json").is_none());
        let txt = r#"{"event":"deal","positionId":1,"dealId":2,"symbol":"X",
                      "volume":1.0,"side":"HOLD","entry":"IN"}"#;
        assert!(parse_frame(txt).is_none());
    }
}
