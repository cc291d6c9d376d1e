// ===============================
// src/gateway_tradelocker.rs
// ===============================
//
// Gateway TradeLocker: JWT login + refresh loop (session keeper), resolve
// symbol -> tradableInstrumentId (di-cache), lalu POST order ke
// /trade/accounts/{id}/orders dengan bearer token + header accNum.
//
// Sukses = HTTP 2xx dan envelope "s":"ok" dengan d.orderId. Semua bentuk
// kegagalan lain dilempar sebagai GatewayError; retry-nya urusan replicator.

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::config::TradeLockerCfg;
use crate::domain::{OrderRequest, PlaceAck, PositionEffect, Side};
use crate::gateway::{GatewayError, RemoteBroker};
use crate::metrics::{SESSION_KEEPALIVE_ERR, SESSION_KEEPALIVE_OK};
use crate::tradelocker::{
    TlAuth, TlEnvelope, TlInstrumentsPage, TlLoginBody, TlOrderAck, TlOrderBody, TlRefreshBody,
};

const ORDER_TIMEOUT_SECS: u64 = 5;
const REFRESH_INTERVAL_SECS: u64 = 15 * 60;

pub struct TradeLockerGateway {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    acc_num: String,
    email: String,
    password: String,
    server: String,
    session: RwLock<Option<TlAuth>>,
    instruments: RwLock<HashMap<String, i64>>,
}

impl TradeLockerGateway {
    pub fn from_config(cfg: &TradeLockerCfg) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ORDER_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            account_id: cfg.account_id.clone(),
            acc_num: cfg.acc_num.clone(),
            email: cfg.email.clone(),
            password: cfg.password.clone(),
            server: cfg.server.clone(),
            session: RwLock::new(None),
            instruments: RwLock::new(HashMap::new()),
        })
    }

    /// Token valid, login dulu kalau belum pegang sesi.
    async fn ensure_session(&self) -> Result<String, GatewayError> {
        if let Some(auth) = self.session.read().await.as_ref() {
            return Ok(auth.access_token.clone());
        }
        self.login().await
    }

    async fn login(&self) -> Result<String, GatewayError> {
        let url = format!("{}/auth/jwt/token", self.base_url);
        let body = TlLoginBody { email: &self.email, password: &self.password, server: &self.server };
        let rsp = self.http.post(&url).json(&body).send().await?;
        let status = rsp.status();
        if !status.is_success() {
            let text = rsp.text().await.unwrap_or_default();
            return Err(GatewayError::Session(format!("login http {status}: {text}")));
        }
        let auth: TlAuth = rsp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("login response: {e}")))?;
        let token = auth.access_token.clone();
        *self.session.write().await = Some(auth);
        info!(broker = "tradelocker", "logged in");
        Ok(token)
    }

    async fn refresh(&self) -> Result<(), GatewayError> {
        let refresh_token = match self.session.read().await.as_ref() {
            Some(auth) => auth.refresh_token.clone(),
            None => return Err(GatewayError::Session("no session to refresh".to_string())),
        };
        let url = format!("{}/auth/jwt/refresh", self.base_url);
        let body = TlRefreshBody { refresh_token: &refresh_token };
        let rsp = self.http.post(&url).json(&body).send().await?;
        let status = rsp.status();
        if !status.is_success() {
            let text = rsp.text().await.unwrap_or_default();
            return Err(GatewayError::Session(format!("refresh http {status}: {text}")));
        }
        let auth: TlAuth = rsp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("refresh response: {e}")))?;
        *self.session.write().await = Some(auth);
        Ok(())
    }

    /// Refresh loop; kalau refresh gagal, sesi dibuang supaya call berikut
    /// login ulang dari awal.
    pub async fn run_session_keeper(self: Arc<Self>) {
        loop {
            sleep(Duration::from_secs(REFRESH_INTERVAL_SECS)).await;
            match self.refresh().await {
                Ok(()) => {
                    SESSION_KEEPALIVE_OK.with_label_values(&["tradelocker"]).inc();
                    info!(broker = "tradelocker", "session refreshed");
                }
                Err(e) => {
                    SESSION_KEEPALIVE_ERR.with_label_values(&["tradelocker"]).inc();
                    warn!(broker = "tradelocker", error = %e, "session refresh failed, dropping session");
                    *self.session.write().await = None;
                }
            }
        }
    }

    async fn instrument_id(&self, token: &str, symbol: &str) -> Result<i64, GatewayError> {
        if let Some(id) = self.instruments.read().await.get(symbol) {
            return Ok(*id);
        }

        let url = format!("{}/trade/accounts/{}/instruments", self.base_url, self.account_id);
        let rsp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("accNum", &self.acc_num)
            .send()
            .await?;
        let status = rsp.status();
        if !status.is_success() {
            let text = rsp.text().await.unwrap_or_default();
            return Err(GatewayError::Http { status: status.as_u16(), body: text });
        }
        let env: TlEnvelope<TlInstrumentsPage> = rsp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("instruments response: {e}")))?;
        let page = match env.d {
            Some(p) if env.is_ok() => p,
            _ => return Err(GatewayError::Decode("instruments envelope not ok".to_string())),
        };

        let mut cache = self.instruments.write().await;
        for ins in page.instruments {
            cache.insert(ins.name, ins.tradable_instrument_id);
        }
        cache
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::Instrument(symbol.to_string()))
    }
}

#[async_trait]
impl RemoteBroker for TradeLockerGateway {
    fn name(&self) -> &str { "tradelocker" }

    async fn place_order(&self, req: &OrderRequest) -> Result<PlaceAck, GatewayError> {
        let token = self.ensure_session().await?;
        let instrument_id = self.instrument_id(&token, &req.symbol).await?;

        let side = match req.side { Side::Buy => "buy", Side::Sell => "sell" };
        let position_id = match req.position_effect {
            PositionEffect::Open => None,
            PositionEffect::Close => Some(req.position_code.as_str()),
        };
        let body = TlOrderBody {
            tradable_instrument_id: instrument_id,
            qty: req.quantity,
            side,
            order_type: "market",
            validity: "IOC",
            client_order_id: &req.order_code,
            position_id,
        };

        let url = format!("{}/trade/accounts/{}/orders", self.base_url, self.account_id);
        let rsp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("accNum", &self.acc_num)
            .json(&body)
            .send()
            .await?;

        let status = rsp.status();
        if status.as_u16() == 401 {
            // token kadaluarsa di tengah jalan; buang supaya attempt berikut login lagi
            *self.session.write().await = None;
        }
        if !status.is_success() {
            let text = rsp.text().await.unwrap_or_default();
            error!(order_code = %req.order_code, status = status.as_u16(), body = %text, "tradelocker order rejected");
            return Err(GatewayError::Http { status: status.as_u16(), body: text });
        }

        let env: TlEnvelope<TlOrderAck> = rsp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("order response: {e}")))?;
        match env.d {
            Some(ack) if env.is_ok() => Ok(PlaceAck {
                remote_id: ack.order_id.to_string(),
                http_status: status.as_u16(),
            }),
            _ => Err(GatewayError::Decode("order envelope not ok".to_string())),
        }
    }
}
