//! Единая точка разбора: (event id, cmd id) -> типизированный вариант ответа.

use crate::constants::{cmd, event};
use crate::error::DecodeError;
use crate::response::{
    Batch, BonusReply, MarketInitInfo, StockBaseItem, StockDayItem, StockMinsItem,
    decode_day_bars, decode_minute_bars, decode_notice, decode_stock_base, decode_stock_bonus,
    decode_stock_count,
};
use crate::types::Market;
use crate::wire::{Response, ResponseHeader};

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Сервер принял регистрацию устройства
    DeviceRegistered,
    MarketInit(MarketInitInfo),
    StockCount { market: Market, count: u16 },
    /// Текст объявления брокера (GBK)
    Notice(Vec<u8>),
    StockBase {
        market: Market,
        batch: Batch<StockBaseItem>,
    },
    StockBonus(BonusReply),
    DayBars(Batch<StockDayItem>),
    MinuteBars(Batch<StockMinsItem>),
    /// Пара (event, cmd), которую клиент не знает; тело как есть
    Unknown(Vec<u8>),
    /// Тело не разобралось; заголовок (индекс) в пакете сохранён
    Malformed(DecodeError),
}

/// Разобранный пакет, который получает обработчик
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: ResponseHeader,
    pub reply: Reply,
}

impl Packet {
    pub fn event_id(&self) -> u16 {
        self.header.event_id
    }

    pub fn index(&self) -> u16 {
        self.header.index
    }
}

impl Reply {
    /// Разбирает тело по (event, cmd). Ошибка разбора не теряет пакет:
    /// он приходит как `Reply::Malformed` с исходным заголовком.
    pub fn decode(resp: Response) -> Packet {
        let header = resp.header;
        let reply = Self::decode_body(&header, resp.body).unwrap_or_else(Reply::Malformed);
        Packet { header, reply }
    }

    fn decode_body(header: &ResponseHeader, body: Vec<u8>) -> Result<Reply, DecodeError> {
        let reply = match (header.event_id, header.cmd_id) {
            (event::DEVICE, _) => Reply::DeviceRegistered,
            (event::MARKET_INIT, _) => Reply::MarketInit(MarketInitInfo::decode(&body)?),
            (event::STOCK_COUNT, c) => Reply::StockCount {
                market: market_of(c, cmd::STOCK_COUNT_SZ, cmd::STOCK_COUNT_SH)?,
                count: decode_stock_count(&body)?,
            },
            (event::NOTICE, _) => Reply::Notice(decode_notice(&body)?),
            (event::STOCK_BASE, c) => Reply::StockBase {
                market: market_of(c, cmd::STOCK_BASE_SZ, cmd::STOCK_BASE_SH)?,
                batch: decode_stock_base(&body)?,
            },
            (event::STOCK_BONUS, cmd::STOCK_BONUS) => Reply::StockBonus(decode_stock_bonus(&body)?),
            (event::BARS, cmd::DAY_BARS) => Reply::DayBars(decode_day_bars(&body)?),
            (event::BARS, cmd::MINUTE_BARS) => Reply::MinuteBars(decode_minute_bars(&body)?),
            _ => Reply::Unknown(body),
        };
        Ok(reply)
    }
}

fn market_of(cmd_id: u16, sz: u16, sh: u16) -> Result<Market, DecodeError> {
    match cmd_id {
        c if c == sz => Ok(Market::Sz),
        c if c == sh => Ok(Market::Sh),
        other => Err(DecodeError::BadValue {
            field: "cmd id",
            value: other as u32,
        }),
    }
}
