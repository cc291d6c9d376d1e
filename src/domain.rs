// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side { Buy, Sell }
impl Side { pub fn as_str(&self) -> &'static str { match self { Side::Buy => "BUY", Side::Sell => "SELL" } } }

/// Entry membuka exposure, Exit menutupnya (deal direction dari terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction { Entry, Exit }

/// Jenis transaksi terminal; hanya DealAdded yang direplikasi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind { DealAdded, Other }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionEffect { Open, Close }
impl PositionEffect { pub fn as_str(&self) -> &'static str { match self { PositionEffect::Open => "OPEN", PositionEffect::Close => "CLOSE" } } }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub ts_ns: i128,
    pub kind: TradeKind,
    pub local_id: u64,
    pub deal_id: u64,
    pub symbol: String,
    pub volume: f64,
    pub side: Side,
    pub direction: Direction,
    pub magic: u64,
}

/// Bentuk order netral; setiap gateway memetakan ke wire format masing-masing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_code: String,
    pub symbol: String,
    pub quantity: f64,
    pub position_effect: PositionEffect,
    pub position_code: String,
    pub side: Side,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceAck { pub remote_id: String, pub http_status: u16 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplOutcome {
    pub ts_ns: i128,
    pub local_id: u64,
    pub broker: String,
    pub effect: PositionEffect,
    pub success: bool,
    pub attempts: u32,
    pub remote_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event { Trade(TradeEvent), Repl(ReplOutcome), Note(String) }

// ===== Quantity normalization =====
//
// Broker remote menerima quantity dalam unit, bukan lot. Pasangan FX di-skala
// dengan contract size tetap; simbol lain diteruskan apa adanya.

pub const FOREX_CONTRACT_SIZE: f64 = 100_000.0;

const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "AUD", "NZD", "CAD",
    "SGD", "HKD", "NOK", "SEK", "DKK", "PLN", "CZK", "HUF",
    "TRY", "ZAR", "MXN", "CNH",
];

/// True jika 6 huruf pertama adalah dua kode mata uang ("EURUSD", "GBPJPY.m", ...)
pub fn is_forex_symbol(symbol: &str) -> bool {
    let s: String = symbol.chars().take(6).collect::<String>().to_ascii_uppercase();
    if !s.is_ascii() || s.len() != 6 { return false; }
    let (base, quote) = s.split_at(3);
    CURRENCY_CODES.contains(&base) && CURRENCY_CODES.contains(&quote)
}

/// Lot -> unit untuk FX (dibulatkan ke unit terdekat); pass-through untuk lainnya
pub fn normalize_quantity(symbol: &str, volume: f64) -> f64 {
    if is_forex_symbol(symbol) {
        (volume * FOREX_CONTRACT_SIZE).round()
    } else {
        volume
    }
}

impl OrderRequest {
    /// Susun request dari event terminal. `position_code` kosong untuk OPEN,
    /// berisi remote id untuk CLOSE.
    pub fn from_event(ev: &TradeEvent, effect: PositionEffect, position_code: String) -> Self {
        Self {
            order_code: ev.deal_id.to_string(),
            symbol: ev.symbol.clone(),
            quantity: normalize_quantity(&ev.symbol, ev.volume),
            position_effect: effect,
            position_code,
            side: ev.side,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(symbol: &str, volume: f64) -> TradeEvent {
        TradeEvent {
            ts_ns: 0,
            kind: TradeKind::DealAdded,
            local_id: 7,
            deal_id: 123,
            symbol: symbol.to_string(),
            volume,
            side: Side::Buy,
            direction: Direction::Entry,
            magic: 0,
        }
    }

    #[test]
    fn forex_symbols_detected() {
        assert!(is_forex_symbol("EURUSD"));
        assert!(is_forex_symbol("gbpjpy"));
        assert!(is_forex_symbol("EURUSD.m"));
        assert!(!is_forex_symbol("BTCUSDT"));
        assert!(!is_forex_symbol("TSLA"));
        assert!(!is_forex_symbol("US30"));
    }

    #[test]
    fn forex_lots_scale_to_units() {
        assert_eq!(normalize_quantity("EURUSD", 0.10), 10_000.0);
        assert_eq!(normalize_quantity("EURUSD", 0.01), 1_000.0);
        assert_eq!(normalize_quantity("GBPJPY", 1.0), 100_000.0);
    }

    #[test]
    fn non_forex_passes_through() {
        assert_eq!(normalize_quantity("TSLA", 5.0), 5.0);
        assert_eq!(normalize_quantity("US30", 0.5), 0.5);
    }

    #[test]
    fn open_request_from_event() {
        let ev = event("EURUSD", 0.01);
        let req = OrderRequest::from_event(&ev, PositionEffect::Open, String::new());
        assert_eq!(req.order_code, "123");
        assert_eq!(req.quantity, 1_000.0);
        assert_eq!(req.position_effect, PositionEffect::Open);
        assert!(req.position_code.is_empty());
    }
}
