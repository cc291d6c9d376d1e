// ===============================
// src/replicator.rs (trade replication core)
// ===============================
//
// Konsumsi TradeEvent satu per satu: Entry -> OPEN protocol, Exit -> CLOSE
// protocol. Setiap protocol memanggil broker remote maksimal MAX_ATTEMPTS
// kali dengan payload identik, tanpa backoff. Kegagalan bersifat terminal
// untuk event itu saja; task terus jalan.
//
// State map:
// - OPEN sukses   -> insert local_id -> remote_id
// - OPEN exhausted-> tidak ada entry (posisi lokal jadi unmirrored; tercatat
//                    di log, tidak ada recovery otomatis)
// - CLOSE sukses  -> remove entry
// - CLOSE exhausted -> entry DIBIARKAN (posisi remote dianggap masih open,
//                    close berikutnya masih bisa menemukan mapping)

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::{
    Direction, Event, OrderRequest, PlaceAck, PositionEffect, ReplOutcome, TradeEvent, TradeKind,
};
use crate::gateway::RemoteBroker;
use crate::metrics::{ATTEMPTS_PER_EVENT, EVENTS, OPEN_POSITIONS, REPLICATIONS};
use crate::positions::PositionMap;

/// Total attempt per event, termasuk attempt pertama.
pub const MAX_ATTEMPTS: u32 = 10;

pub struct ReplicatorTask {
    broker: Arc<dyn RemoteBroker>,
    map: PositionMap,
    copy_magic: Option<u64>,
}

impl ReplicatorTask {
    pub fn new(broker: Arc<dyn RemoteBroker>, map: PositionMap, copy_magic: Option<u64>) -> Self {
        Self { broker, map, copy_magic }
    }

    pub fn map(&self) -> &PositionMap { &self.map }

    /// Proses satu event sampai tuntas (termasuk seluruh retry).
    /// None = event di luar scope replikasi (bukan deal, atau magic beda).
    pub async fn on_event(&mut self, ev: &TradeEvent) -> Option<ReplOutcome> {
        if ev.kind != TradeKind::DealAdded {
            debug!(local_id = ev.local_id, "non-deal transaction ignored");
            return None;
        }
        if let Some(magic) = self.copy_magic {
            if ev.magic != magic {
                debug!(local_id = ev.local_id, magic = ev.magic, "magic mismatch, skipped");
                return None;
            }
        }
        match ev.direction {
            Direction::Entry => Some(self.handle_open(ev).await),
            Direction::Exit => Some(self.handle_close(ev).await),
        }
    }

    async fn handle_open(&mut self, ev: &TradeEvent) -> ReplOutcome {
        let req = OrderRequest::from_event(ev, PositionEffect::Open, String::new());
        match self.place_with_retry(&req, ev.local_id).await {
            Some((ack, attempts)) => {
                self.map.put(ev.local_id, ack.remote_id.clone());
                info!(
                    broker = %self.broker.name(),
                    local_id = ev.local_id,
                    remote_id = %ack.remote_id,
                    attempts,
                    "position opened remotely"
                );
                self.outcome(ev, PositionEffect::Open, true, attempts, Some(ack.remote_id))
            }
            None => {
                // Titik data-loss yang disengaja: posisi lokal tidak punya
                // mirror remote dan tidak ada recovery otomatis.
                error!(
                    broker = %self.broker.name(),
                    local_id = ev.local_id,
                    attempts = MAX_ATTEMPTS,
                    "open replication abandoned, local position unmirrored"
                );
                self.outcome(ev, PositionEffect::Open, false, MAX_ATTEMPTS, None)
            }
        }
    }

    async fn handle_close(&mut self, ev: &TradeEvent) -> ReplOutcome {
        let remote_id = match self.map.get(ev.local_id) {
            Some(r) => r.to_string(),
            None => {
                // Tidak ada counterpart remote; tidak ada yang bisa di-retry.
                warn!(
                    broker = %self.broker.name(),
                    local_id = ev.local_id,
                    "no remote mapping for close, skipped"
                );
                return self.outcome(ev, PositionEffect::Close, false, 0, None);
            }
        };

        let req = OrderRequest::from_event(ev, PositionEffect::Close, remote_id.clone());
        match self.place_with_retry(&req, ev.local_id).await {
            Some((ack, attempts)) => {
                self.map.remove(ev.local_id);
                info!(
                    broker = %self.broker.name(),
                    local_id = ev.local_id,
                    remote_id = %remote_id,
                    attempts,
                    "position closed remotely"
                );
                self.outcome(ev, PositionEffect::Close, true, attempts, Some(ack.remote_id))
            }
            None => {
                // Mapping stale dibiarkan: posisi remote diasumsikan masih
                // open, attempt close berikutnya harus tetap menemukannya.
                error!(
                    broker = %self.broker.name(),
                    local_id = ev.local_id,
                    remote_id = %remote_id,
                    attempts = MAX_ATTEMPTS,
                    "close replication abandoned, mapping retained"
                );
                self.outcome(ev, PositionEffect::Close, false, MAX_ATTEMPTS, Some(remote_id))
            }
        }
    }

    /// Retry loop: payload identik, tanpa backoff, berhenti di sukses pertama.
    async fn place_with_retry(&self, req: &OrderRequest, local_id: u64) -> Option<(PlaceAck, u32)> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.broker.place_order(req).await {
                Ok(ack) => {
                    info!(
                        broker = %self.broker.name(),
                        local_id,
                        attempt,
                        status = ack.http_status,
                        "remote order accepted"
                    );
                    return Some((ack, attempt));
                }
                Err(e) => {
                    warn!(
                        broker = %self.broker.name(),
                        local_id,
                        attempt,
                        error = %e,
                        "remote order attempt failed"
                    );
                }
            }
        }
        None
    }

    fn outcome(
        &self,
        ev: &TradeEvent,
        effect: PositionEffect,
        success: bool,
        attempts: u32,
        remote_id: Option<String>,
    ) -> ReplOutcome {
        ReplOutcome {
            ts_ns: Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128,
            local_id: ev.local_id,
            broker: self.broker.name().to_string(),
            effect,
            success,
            attempts,
            remote_id,
        }
    }
}

/// Task loop: satu replicator per broker, event diproses serial sesuai
/// urutan feed (map tidak butuh lock).
pub async fn run(
    mut ev_rx: mpsc::Receiver<TradeEvent>,
    mut task: ReplicatorTask,
    rec_tx: Option<mpsc::Sender<Event>>,
) {
    info!(broker = %task.broker.name(), "replicator started");

    while let Some(ev) = ev_rx.recv().await {
        let dir_label = match (ev.kind, ev.direction) {
            (TradeKind::Other, _) => "other",
            (_, Direction::Entry) => "entry",
            (_, Direction::Exit) => "exit",
        };
        EVENTS.with_label_values(&[dir_label]).inc();

        if let Some(out) = task.on_event(&ev).await {
            let outcome_label = if out.success { "ok" } else { "failed" };
            REPLICATIONS
                .with_label_values(&[out.effect.as_str(), outcome_label, &out.broker])
                .inc();
            ATTEMPTS_PER_EVENT.observe(out.attempts as f64);
            OPEN_POSITIONS
                .with_label_values(&[&out.broker])
                .set(task.map().len() as i64);
            if let Some(tx) = &rec_tx {
                let _ = tx.try_send(Event::Repl(out));
            }
        }
    }

    info!(broker = %task.broker.name(), "replicator stopped, feed closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use crate::gateway::MockBroker;

    fn deal(local_id: u64, direction: Direction) -> TradeEvent {
        TradeEvent {
            ts_ns: 0,
            kind: TradeKind::DealAdded,
            local_id,
            deal_id: local_id * 100,
            symbol: "EURUSD".to_string(),
            volume: 0.01,
            side: Side::Buy,
            direction,
            magic: 15,
        }
    }

    fn task_with(broker: Arc<MockBroker>) -> ReplicatorTask {
        ReplicatorTask::new(broker, PositionMap::new(), None)
    }

    // Broker yang selalu gagal -> tepat 10 attempt, lalu berhenti.
    #[tokio::test]
    async fn open_exhausts_exactly_ten_attempts() {
        let broker = Arc::new(MockBroker::always_failing("mock"));
        let mut task = task_with(broker.clone());

        let out = task.on_event(&deal(1, Direction::Entry)).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.attempts, MAX_ATTEMPTS);
        assert_eq!(broker.calls(), 10);
        assert!(task.map().is_empty());
    }

    // Gagal 3x lalu sukses -> tepat 4 call, map terisi setelah call ke-4.
    #[tokio::test]
    async fn open_stops_on_first_success() {
        let broker = Arc::new(MockBroker::failing_first("mock", 3));
        let mut task = task_with(broker.clone());

        let out = task.on_event(&deal(1, Direction::Entry)).await.unwrap();
        assert!(out.success);
        assert_eq!(out.attempts, 4);
        assert_eq!(broker.calls(), 4);
        assert!(task.map().get(1).is_some());
    }

    // CLOSE tanpa mapping -> nol call remote, map tidak berubah.
    #[tokio::test]
    async fn close_without_mapping_makes_no_calls() {
        let broker = Arc::new(MockBroker::new("mock"));
        let mut task = task_with(broker.clone());

        let out = task.on_event(&deal(99, Direction::Exit)).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.attempts, 0);
        assert_eq!(broker.calls(), 0);
        assert!(task.map().is_empty());
    }

    // CLOSE yang exhausted membiarkan mapping lama di tempat.
    #[tokio::test]
    async fn failed_close_retains_mapping() {
        let broker = Arc::new(MockBroker::always_failing("mock"));
        let mut map = PositionMap::new();
        map.put(42, "900");
        let mut task = ReplicatorTask::new(broker.clone(), map, None);

        let out = task.on_event(&deal(42, Direction::Exit)).await.unwrap();
        assert!(!out.success);
        assert_eq!(broker.calls(), 10);
        assert_eq!(task.map().get(42), Some("900"));
    }

    // OPEN happy path: localId 7, EURUSD 0.01 BUY, sukses attempt 1
    // dengan remoteId 555 -> map[7]=555, 1 call, qty request 1000.
    #[tokio::test]
    async fn open_scenario() {
        let broker = Arc::new(MockBroker::new("mock"));
        broker.push_remote_id("555");
        let mut task = task_with(broker.clone());

        let out = task.on_event(&deal(7, Direction::Entry)).await.unwrap();
        assert!(out.success);
        assert_eq!(out.remote_id.as_deref(), Some("555"));
        assert_eq!(task.map().get(7), Some("555"));
        assert_eq!(broker.calls(), 1);

        let reqs = broker.recorded();
        assert_eq!(reqs[0].quantity, 1_000.0);
        assert_eq!(reqs[0].order_code, "700");
        assert!(reqs[0].position_code.is_empty());
    }

    // CLOSE happy path: map[7]=555, sukses attempt 1 -> key hilang,
    // request membawa positionCode "555".
    #[tokio::test]
    async fn close_scenario() {
        let broker = Arc::new(MockBroker::new("mock"));
        let mut map = PositionMap::new();
        map.put(7, "555");
        let mut task = ReplicatorTask::new(broker.clone(), map, None);

        let out = task.on_event(&deal(7, Direction::Exit)).await.unwrap();
        assert!(out.success);
        assert!(task.map().get(7).is_none());

        let reqs = broker.recorded();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].position_code, "555");
        assert_eq!(reqs[0].position_effect, PositionEffect::Close);
    }

    // Setelah rangkaian OPEN/CLOSE yang sukses total atau exhausted
    // total, map berisi tepat posisi yang OPEN-nya sukses dan belum
    // di-CLOSE sukses.
    #[tokio::test]
    async fn map_invariant_over_sequence() {
        // 10 kegagalan pertama menghabiskan OPEN pertama, sisanya sukses
        let broker = Arc::new(MockBroker::failing_first("mock", 10));
        let mut task = task_with(broker.clone());

        // OPEN #1 exhausted -> tanpa entry
        let out = task.on_event(&deal(1, Direction::Entry)).await.unwrap();
        assert!(!out.success);
        assert!(task.map().get(1).is_none());

        // OPEN #2 sukses -> entry masuk
        let out = task.on_event(&deal(2, Direction::Entry)).await.unwrap();
        assert!(out.success);
        assert!(task.map().get(2).is_some());
        assert_eq!(task.map().len(), 1);

        // CLOSE #1: open-nya dulu gagal, tidak ada mapping, nol call
        let calls_before = broker.calls();
        let out = task.on_event(&deal(1, Direction::Exit)).await.unwrap();
        assert!(!out.success);
        assert_eq!(broker.calls(), calls_before);

        // CLOSE #2 sukses -> map kosong lagi
        let out = task.on_event(&deal(2, Direction::Exit)).await.unwrap();
        assert!(out.success);
        assert!(task.map().is_empty());
    }

    // Filter magic number: event dengan magic lain tidak pernah sampai broker.
    #[tokio::test]
    async fn magic_mismatch_skipped() {
        let broker = Arc::new(MockBroker::new("mock"));
        let mut task = ReplicatorTask::new(broker.clone(), PositionMap::new(), Some(15));

        let mut ev = deal(1, Direction::Entry);
        ev.magic = 7;
        assert!(task.on_event(&ev).await.is_none());
        assert_eq!(broker.calls(), 0);

        // magic cocok tetap jalan
        let ev = deal(2, Direction::Entry);
        assert!(task.on_event(&ev).await.is_some());
        assert_eq!(broker.calls(), 1);
    }

    // Transaksi non-deal diabaikan.
    #[tokio::test]
    async fn non_deal_ignored() {
        let broker = Arc::new(MockBroker::new("mock"));
        let mut task = task_with(broker.clone());

        let mut ev = deal(1, Direction::Entry);
        ev.kind = TradeKind::Other;
        assert!(task.on_event(&ev).await.is_none());
        assert_eq!(broker.calls(), 0);
    }
}
