// ===============================
// src/gateway.rs (broker contract + mock venue)
// ===============================
//
// Satu kontrak untuk semua broker remote: place_order(OrderRequest).
// Retry loop di replicator memperlakukan SEMUA error di sini sama rata;
// tidak ada pembedaan transport vs application failure.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::domain::{OrderRequest, PlaceAck};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("decode: {0}")]
    Decode(String),
    #[error("session: {0}")]
    Session(String),
    #[error("instrument not found: {0}")]
    Instrument(String),
}

#[async_trait]
pub trait RemoteBroker: Send + Sync {
    fn name(&self) -> &str;
    async fn place_order(&self, req: &OrderRequest) -> Result<PlaceAck, GatewayError>;
}

// ===== Mock venue =====
//
// Dipakai untuk BROKERS=mock dan sebagai test double: bisa diskrip gagal
// N attempt pertama, lalu ACK dengan remote id berurutan (atau id yang
// di-push lewat push_remote_id).

pub struct MockBroker {
    name: String,
    fail_first: u32,
    calls: AtomicU32,
    next_id: AtomicU64,
    scripted_ids: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<OrderRequest>>,
}

impl MockBroker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_first: 0,
            calls: AtomicU32::new(0),
            next_id: AtomicU64::new(9_000),
            scripted_ids: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Gagalkan `n` attempt pertama (HTTP 503), sisanya sukses.
    pub fn failing_first(name: impl Into<String>, n: u32) -> Self {
        let mut b = Self::new(name);
        b.fail_first = n;
        b
    }

    /// Semua attempt gagal.
    pub fn always_failing(name: impl Into<String>) -> Self {
        Self::failing_first(name, u32::MAX)
    }

    /// Antrikan remote id untuk ACK berikutnya (FIFO).
    pub fn push_remote_id(&self, id: impl Into<String>) {
        self.scripted_ids.lock().unwrap().push_back(id.into());
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<OrderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteBroker for MockBroker {
    fn name(&self) -> &str { &self.name }

    async fn place_order(&self, req: &OrderRequest) -> Result<PlaceAck, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(req.clone());

        if n <= self.fail_first {
            return Err(GatewayError::Http { status: 503, body: "mock reject".to_string() });
        }

        let remote_id = self
            .scripted_ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::SeqCst).to_string());

        info!(
            broker = %self.name,
            order_code = %req.order_code,
            effect = %req.position_effect.as_str(),
            remote_id = %remote_id,
            "mock order accepted"
        );
        Ok(PlaceAck { remote_id, http_status: 200 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PositionEffect, Side};

    fn req() -> OrderRequest {
        OrderRequest {
            order_code: "1".to_string(),
            symbol: "EURUSD".to_string(),
            quantity: 1_000.0,
            position_effect: PositionEffect::Open,
            position_code: String::new(),
            side: Side::Buy,
        }
    }

    #[tokio::test]
    async fn mock_fails_then_acks() {
        let b = MockBroker::failing_first("mock", 2);
        assert!(b.place_order(&req()).await.is_err());
        assert!(b.place_order(&req()).await.is_err());
        let ack = b.place_order(&req()).await.unwrap();
        assert_eq!(ack.http_status, 200);
        assert_eq!(b.calls(), 3);
    }

    #[tokio::test]
    async fn mock_uses_scripted_ids() {
        let b = MockBroker::new("mock");
        b.push_remote_id("555");
        let ack = b.place_order(&req()).await.unwrap();
        assert_eq!(ack.remote_id, "555");
    }
}
