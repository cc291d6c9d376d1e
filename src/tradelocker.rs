// ===============================
// src/tradelocker.rs
// ===============================
//
// Wire types TradeLocker (REST backend-api). Response dibungkus envelope
// {"s":"ok","d":{...}}; decode selalu terstruktur, tidak ada string search.

use serde::{Deserialize, Serialize};

// ---- Auth ----

#[derive(Debug, Serialize)]
pub struct TlLoginBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub server: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlRefreshBody<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlAuth {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expire_date: Option<String>,
}

// ---- Envelope ----

#[derive(Debug, Deserialize)]
pub struct TlEnvelope<T> {
    pub s: String,
    #[serde(default)]
    pub d: Option<T>,
}

impl<T> TlEnvelope<T> {
    pub fn is_ok(&self) -> bool { self.s == "ok" }
}

// ---- Instruments ----

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlInstrument {
    pub tradable_instrument_id: i64,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlInstrumentsPage {
    pub instruments: Vec<TlInstrument>,
}

// ---- Orders ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlOrderBody<'a> {
    pub tradable_instrument_id: i64,
    pub qty: f64,
    pub side: &'a str,          // "buy" | "sell"
    #[serde(rename = "type")]
    pub order_type: &'a str,    // market only
    pub validity: &'a str,      // "IOC"
    pub client_order_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlOrderAck {
    pub order_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_order_ack_envelope() {
        let raw = r#"{"s":"ok","d":{"orderId":987654}}"#;
        let env: TlEnvelope<TlOrderAck> = serde_json::from_str(raw).unwrap();
        assert!(env.is_ok());
        assert_eq!(env.d.unwrap().order_id, 987_654);
    }

    #[test]
    fn rejected_envelope_keeps_status() {
        let raw = r#"{"s":"error","errmsg":"insufficient funds"}"#;
        let env: TlEnvelope<TlOrderAck> = serde_json::from_str(raw).unwrap();
        assert!(!env.is_ok());
        assert!(env.d.is_none());
    }

    #[test]
    fn decodes_instruments_page() {
        let raw = r#"{"s":"ok","d":{"instruments":[
            {"tradableInstrumentId":278,"name":"EURUSD"},
            {"tradableInstrumentId":280,"name":"GBPUSD"}
        ]}}"#;
        let env: TlEnvelope<TlInstrumentsPage> = serde_json::from_str(raw).unwrap();
        let page = env.d.unwrap();
        assert_eq!(page.instruments.len(), 2);
        assert_eq!(page.instruments[0].name, "EURUSD");
        assert_eq!(page.instruments[0].tradable_instrument_id, 278);
    }

    #[test]
    fn open_order_body_omits_position_id() {
        let body = TlOrderBody {
            tradable_instrument_id: 278,
            qty: 1_000.0,
            side: "buy",
            order_type: "market",
            validity: "IOC",
            client_order_id: "123",
            position_id: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"tradableInstrumentId\":278"));
        assert!(json.contains("\"clientOrderId\":\"123\""));
        assert!(!json.contains("positionId"));
    }

    #[test]
    fn close_order_body_carries_position_id() {
        let body = TlOrderBody {
            tradable_instrument_id: 278,
            qty: 1_000.0,
            side: "sell",
            order_type: "market",
            validity: "IOC",
            client_order_id: "124",
            position_id: Some("555"),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"positionId\":\"555\""));
    }
}
