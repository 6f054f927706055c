//! Строки таблиц, которые сохраняются в CSV.

use serde::{Deserialize, Serialize};

use tdx_core::Market;
use tdx_core::response::{StockBaseItem, StockBonusItem, StockDayItem, StockMinsItem};

use crate::charset::gbk_to_utf8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StockBaseRow {
    pub(crate) code: String,
    pub(crate) name: String,
    /// 0 - Шэньчжэнь, 1 - Шанхай
    pub(crate) market: u8,
    pub(crate) unknown1: u16,
    pub(crate) unknown2: u32,
    pub(crate) unknown3: u8,
    pub(crate) price: f64,
    pub(crate) bonus1: u16,
    pub(crate) bonus2: u16,
}

impl StockBaseRow {
    pub(crate) const HEADERS: [&'static str; 9] = [
        "code", "name", "market", "unknown1", "unknown2", "unknown3", "price", "bonus1", "bonus2",
    ];

    pub(crate) fn from_item(market: Market, item: &StockBaseItem) -> Self {
        Self {
            code: gbk_to_utf8(&item.code),
            name: gbk_to_utf8(&item.name),
            market: market.as_u8(),
            unknown1: item.unknown1,
            unknown2: item.unknown2,
            unknown3: item.unknown3,
            price: item.price as f64,
            bonus1: item.bonus1,
            bonus2: item.bonus2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StockBonusRow {
    pub(crate) code: String,
    pub(crate) date: i32,
    pub(crate) market: u8,
    #[serde(rename = "type")]
    pub(crate) kind: u8,
    pub(crate) money: f64,
    pub(crate) price: f64,
    pub(crate) count: f64,
    pub(crate) rate: f64,
}

impl StockBonusRow {
    pub(crate) const HEADERS: [&'static str; 8] =
        ["code", "date", "market", "type", "money", "price", "count", "rate"];
}

impl From<&StockBonusItem> for StockBonusRow {
    fn from(item: &StockBonusItem) -> Self {
        Self {
            code: gbk_to_utf8(&item.code),
            date: item.date,
            market: item.market.as_u8(),
            kind: item.kind.as_u8(),
            money: item.money as f64,
            price: item.price as f64,
            count: item.count as f64,
            rate: item.rate as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DayRow {
    pub(crate) date: u32,
    pub(crate) open: f64,
    pub(crate) low: f64,
    pub(crate) high: f64,
    pub(crate) close: f64,
    pub(crate) volume: u32,
    pub(crate) amount: f64,
}

impl DayRow {
    pub(crate) const HEADERS: [&'static str; 7] =
        ["date", "open", "low", "high", "close", "volume", "amount"];
}

impl From<&StockDayItem> for DayRow {
    fn from(item: &StockDayItem) -> Self {
        Self {
            date: item.date,
            open: item.open,
            low: item.low,
            high: item.high,
            close: item.close,
            volume: item.volume,
            amount: item.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MinuteRow {
    pub(crate) date: u32,
    /// HH:MM:00
    pub(crate) time: String,
    pub(crate) open: f64,
    pub(crate) low: f64,
    pub(crate) high: f64,
    pub(crate) close: f64,
    pub(crate) volume: u32,
    pub(crate) amount: f64,
}

impl MinuteRow {
    pub(crate) const HEADERS: [&'static str; 8] =
        ["date", "time", "open", "low", "high", "close", "volume", "amount"];
}

impl From<&StockMinsItem> for MinuteRow {
    fn from(item: &StockMinsItem) -> Self {
        Self {
            date: item.date,
            time: item.time_text(),
            open: item.open,
            low: item.low,
            high: item.high,
            close: item.close,
            volume: item.volume,
            amount: item.amount,
        }
    }
}
