// ===============================
// src/gateway_dxtrade.rs
// ===============================
//
// Gateway DXtrade: login -> sessionToken, keepalive lewat POST /ping,
// order ke /accounts/{account}/orders dengan header X-Auth-Token.
// Kalau DX_HMAC_SECRET di-set, order ikut ditandatangani: X-Timestamp +
// X-Signature = HMAC-SHA256 atas canonical string
// "timestamp=<ts>&payload=<urlencoded body>".

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::config::DxTradeCfg;
use crate::domain::{OrderRequest, PlaceAck};
use crate::dxtrade::{sign_payload, timestamp_ms, DxLoginAck, DxLoginBody, DxOrderAck, DxOrderBody};
use crate::gateway::{GatewayError, RemoteBroker};
use crate::metrics::{SESSION_KEEPALIVE_ERR, SESSION_KEEPALIVE_OK};

const ORDER_TIMEOUT_SECS: u64 = 5;
const PING_INTERVAL_SECS: u64 = 45;

pub struct DxTradeGateway {
    http: reqwest::Client,
    base_url: String,
    account: String,
    username: String,
    domain: String,
    password: String,
    hmac_secret: Option<String>,
    session: RwLock<Option<String>>,
}

impl DxTradeGateway {
    pub fn from_config(cfg: &DxTradeCfg) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ORDER_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            account: cfg.account.clone(),
            username: cfg.username.clone(),
            domain: cfg.domain.clone(),
            password: cfg.password.clone(),
            hmac_secret: cfg.hmac_secret.clone(),
            session: RwLock::new(None),
        })
    }

    async fn ensure_session(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.session.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.login().await
    }

    async fn login(&self) -> Result<String, GatewayError> {
        let url = format!("{}/login", self.base_url);
        let body = DxLoginBody {
            username: &self.username,
            domain: &self.domain,
            password: &self.password,
        };
        let rsp = self.http.post(&url).json(&body).send().await?;
        let status = rsp.status();
        if !status.is_success() {
            let text = rsp.text().await.unwrap_or_default();
            return Err(GatewayError::Session(format!("login http {status}: {text}")));
        }
        let ack: DxLoginAck = rsp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("login response: {e}")))?;
        *self.session.write().await = Some(ack.session_token.clone());
        info!(broker = "dxtrade", "logged in");
        Ok(ack.session_token)
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        let token = match self.session.read().await.as_ref() {
            Some(t) => t.clone(),
            None => return Err(GatewayError::Session("no session to ping".to_string())),
        };
        let url = format!("{}/ping", self.base_url);
        let rsp = self.http.post(&url).header("X-Auth-Token", token).send().await?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(GatewayError::Session(format!("ping http {status}")));
        }
        Ok(())
    }

    /// Keepalive loop; ping gagal -> sesi dibuang, call berikut login ulang.
    pub async fn run_session_keeper(self: Arc<Self>) {
        loop {
            sleep(Duration::from_secs(PING_INTERVAL_SECS)).await;
            match self.ping().await {
                Ok(()) => {
                    SESSION_KEEPALIVE_OK.with_label_values(&["dxtrade"]).inc();
                }
                Err(e) => {
                    SESSION_KEEPALIVE_ERR.with_label_values(&["dxtrade"]).inc();
                    warn!(broker = "dxtrade", error = %e, "ping failed, dropping session");
                    *self.session.write().await = None;
                }
            }
        }
    }
}

#[async_trait]
impl RemoteBroker for DxTradeGateway {
    fn name(&self) -> &str { "dxtrade" }

    async fn place_order(&self, req: &OrderRequest) -> Result<PlaceAck, GatewayError> {
        let token = self.ensure_session().await?;

        let body = DxOrderBody {
            order_code: &req.order_code,
            order_type: "MARKET",
            instrument: &req.symbol,
            quantity: req.quantity,
            position_effect: req.position_effect.as_str(),
            position_code: &req.position_code,
            side: req.side.as_str(),
            tif: "GTC",
        };
        let body_json = serde_json::to_string(&body)
            .map_err(|e| GatewayError::Decode(format!("order body: {e}")))?;

        let url = format!("{}/accounts/{}/orders", self.base_url, self.account);
        let mut builder = self
            .http
            .post(&url)
            .header("X-Auth-Token", &token)
            .header("Content-Type", "application/json");

        if let Some(secret) = &self.hmac_secret {
            // canonical string gaya query: timestamp=...&payload=<urlencoded body>
            let ts = timestamp_ms();
            let canonical = format!("timestamp={}&payload={}", ts, urlencoding::encode(&body_json));
            let sig = sign_payload(secret, &canonical);
            builder = builder
                .header("X-Timestamp", ts.to_string())
                .header("X-Signature", sig);
        }

        let rsp = builder.body(body_json).send().await?;
        let status = rsp.status();
        if status.as_u16() == 401 {
            *self.session.write().await = None;
        }
        if !status.is_success() {
            let text = rsp.text().await.unwrap_or_default();
            error!(order_code = %req.order_code, status = status.as_u16(), body = %text, "dxtrade order rejected");
            return Err(GatewayError::Http { status: status.as_u16(), body: text });
        }

        let ack: DxOrderAck = rsp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("order response: {e}")))?;
        Ok(PlaceAck { remote_id: ack.order_id, http_status: status.as_u16() })
    }
}
