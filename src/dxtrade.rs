// ===============================
// src/dxtrade.rs
// ===============================
//
// Wire types DXtrade (dxsca-web REST) + HMAC signer. Auth utama pakai
// session token; kalau secret dikonfigurasi, request order juga
// ditandatangani HMAC-SHA256 (lihat gateway_dxtrade untuk canonical string).

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

pub fn sign_payload(secret: &str, payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC key");
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    hex::encode(sig)
}

// ---- Auth ----

#[derive(Debug, Serialize)]
pub struct DxLoginBody<'a> {
    pub username: &'a str,
    pub domain: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DxLoginAck {
    pub session_token: String,
}

// ---- Orders ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DxOrderBody<'a> {
    pub order_code: &'a str,
    #[serde(rename = "type")]
    pub order_type: &'a str,      // "MARKET"
    pub instrument: &'a str,
    pub quantity: f64,
    pub position_effect: &'a str, // "OPEN" | "CLOSE"
    #[serde(skip_serializing_if = "str::is_empty")]
    pub position_code: &'a str,
    pub side: &'a str,            // "BUY" | "SELL"
    pub tif: &'a str,             // "GTC"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DxOrderAck {
    pub order_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_matches_known_vector() {
        // RFC-style test vector untuk HMAC-SHA256
        let sig = sign_payload("key", "The quick brown fox jumps over the lazy dog");
        assert_eq!(
            sig,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn open_order_body_omits_empty_position_code() {
        let body = DxOrderBody {
            order_code: "123",
            order_type: "MARKET",
            instrument: "EURUSD",
            quantity: 1_000.0,
            position_effect: "OPEN",
            position_code: "",
            side: "BUY",
            tif: "GTC",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"orderCode\":\"123\""));
        assert!(json.contains("\"positionEffect\":\"OPEN\""));
        assert!(!json.contains("positionCode"));
    }

    #[test]
    fn close_order_body_carries_position_code() {
        let body = DxOrderBody {
            order_code: "124",
            order_type: "MARKET",
            instrument: "EURUSD",
            quantity: 1_000.0,
            position_effect: "CLOSE",
            position_code: "900",
            side: "SELL",
            tif: "GTC",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"positionCode\":\"900\""));
    }

    #[test]
    fn decodes_order_ack() {
        let raw = r#"{"orderId":"A-77001","updateTime":"2026-01-05T10:00:00Z"}"#;
        let ack: DxOrderAck = serde_json::from_str(raw).unwrap();
        assert_eq!(ack.order_id, "A-77001");
    }
}
