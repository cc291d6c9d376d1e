// ===============================
// src/config.rs
// ===============================
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
use dotenvy::dotenv;
use std::env;

/// Sumber event terminal
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedMode {
    Mock,
    Bridge,
}

impl FeedMode {
    pub fn from_env(key: &str, default_mode: FeedMode) -> FeedMode {
        match env::var(key).unwrap_or_default().to_ascii_lowercase().as_str() {
            "mock"   => FeedMode::Mock,
            "bridge" => FeedMode::Bridge,
            _ => default_mode,
        }
    }
}

// ===== Broker tujuan =====
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerMode {
    Mock,
    TradeLocker,
    DxTrade,
}

impl BrokerMode {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock"                          => Some(BrokerMode::Mock),
            "tradelocker" | "tl"            => Some(BrokerMode::TradeLocker),
            "dxtrade" | "dx"                => Some(BrokerMode::DxTrade),
            _ => None,
        }
    }

    /// Baca daftar broker dari `BROKERS` (comma separated) atau fallback
    /// `BROKER` (single).
    pub fn parse_many(env_key_list: &str, env_key_single: &str, default_list: Vec<Self>) -> Vec<Self> {
        // BROKERS=tradelocker,dxtrade
        if let Ok(val) = env::var(env_key_list) {
            let mut out: Vec<Self> = val
                .split(',')
                .filter_map(|t| Self::parse_one(t))
                .collect();
            out.dedup();
            if !out.is_empty() {
                return out;
            }
        }
        // Fallback BROKER=tradelocker
        if let Ok(one) = env::var(env_key_single) {
            if let Some(mode) = Self::parse_one(&one) {
                return vec![mode];
            }
        }
        default_list
    }

    pub fn label(&self) -> &'static str {
        match self {
            BrokerMode::Mock => "mock",
            BrokerMode::TradeLocker => "tradelocker",
            BrokerMode::DxTrade => "dxtrade",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TradeLockerCfg {
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub server: String,
    pub account_id: String,
    pub acc_num: String,
}

#[derive(Clone, Debug)]
pub struct DxTradeCfg {
    pub base_url: String,
    pub username: String,
    pub domain: String,
    pub password: String,
    pub account: String,
    pub hmac_secret: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Args {
    // feed
    pub feed_mode: FeedMode,
    pub bridge_ws_url: String,
    pub symbols: Vec<String>, // dipakai mock feed

    // replikasi
    pub brokers: Vec<BrokerMode>,
    pub copy_magic: Option<u64>,
    pub map_file: Option<String>,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,

    // kredensial broker (None jika env belum lengkap)
    pub tradelocker: Option<TradeLockerCfg>,
    pub dxtrade: Option<DxTradeCfg>,
}

fn tradelocker_from_env() -> Option<TradeLockerCfg> {
    let email = env::var("TL_EMAIL").ok()?;
    let password = env::var("TL_PASSWORD").ok()?;
    let server = env::var("TL_SERVER").ok()?;
    let account_id = env::var("TL_ACCOUNT_ID").ok()?;
    Some(TradeLockerCfg {
        base_url: env::var("TL_BASE_URL")
            .unwrap_or_else(|_| "https://demo.tradelocker.com/backend-api".to_string()),
        acc_num: env::var("TL_ACC_NUM").unwrap_or_else(|_| "1".to_string()),
        email,
        password,
        server,
        account_id,
    })
}

fn dxtrade_from_env() -> Option<DxTradeCfg> {
    let username = env::var("DX_USERNAME").ok()?;
    let password = env::var("DX_PASSWORD").ok()?;
    let account = env::var("DX_ACCOUNT").ok()?;
    Some(DxTradeCfg {
        base_url: env::var("DX_BASE_URL")
            .unwrap_or_else(|_| "https://demo.dx.trade/dxsca-web".to_string()),
        domain: env::var("DX_DOMAIN").unwrap_or_else(|_| "default".to_string()),
        hmac_secret: env::var("DX_HMAC_SECRET").ok(),
        username,
        password,
        account,
    })
}

pub fn load() -> Args {
    // Pastikan .env dibaca (kredensial, BROKERS, dll)
    let _ = dotenv();

    // ===== Feed =====
    let feed_mode = FeedMode::from_env("FEED_MODE", FeedMode::Mock);
    let bridge_ws_url = env::var("BRIDGE_WS_URL")
        .unwrap_or_else(|_| "ws://127.0.0.1:8765/deals".to_string());

    // Mock feed: SYMBOLS=EURUSD,GBPUSD
    let symbols: Vec<String> = env::var("SYMBOLS")
        .ok()
        .map(|s| {
            s.split(',')
                .map(|x| x.trim())
                .filter(|x| !x.is_empty())
                .map(|x| x.to_ascii_uppercase())
                .collect()
        })
        .filter(|v: &Vec<String>| !v.is_empty())
        .unwrap_or_else(|| vec!["EURUSD".to_string()]);

    // ===== Replikasi =====
    let brokers = BrokerMode::parse_many("BROKERS", "BROKER", vec![BrokerMode::Mock]);

    // COPY_MAGIC kosong = salin semua deal
    let copy_magic = env::var("COPY_MAGIC").ok().and_then(|s| s.parse().ok());
    let map_file = env::var("MAP_FILE").ok();

    // ===== Files / metrics =====
    let record_file = env::var("RECORD_FILE").ok();
    let metrics_port = env::var("METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);

    Args {
        feed_mode,
        bridge_ws_url,
        symbols,
        brokers,
        copy_magic,
        map_file,
        record_file,
        metrics_port,
        tradelocker: tradelocker_from_env(),
        dxtrade: dxtrade_from_env(),
    }
}
