//! Фабрики запросов. Все функции чистые, кроме случайного MAC в регистрации
//! устройства и текущей даты в запросе количества инструментов.

use blowfish::Blowfish;
use blowfish::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};
use rand::Rng;

use crate::constants::{BONUS_BATCH_SIZE, NOTICE_PAYLOAD, cmd, event};
use crate::error::BuildError;
use crate::types::{Market, Symbol};

/// Запрос до сборки в пакет
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestNode {
    pub event_id: u16,
    pub cmd_id: u16,
    pub is_raw: u8,
    /// Индекс пагинации; 0 - будет заменён случайным
    pub index: u16,
    pub raw_data: Vec<u8>,
}

impl RequestNode {
    fn new(event_id: u16, cmd_id: u16, is_raw: u8) -> Self {
        Self {
            event_id,
            cmd_id,
            is_raw,
            index: 0,
            raw_data: Vec::new(),
        }
    }

    fn with_index(mut self, index: u16) -> Self {
        self.index = index;
        self
    }

    fn with_data(mut self, raw_data: Vec<u8>) -> Self {
        self.raw_data = raw_data;
        self
    }
}

/// Регистрация устройства: фиксированная структура, зашифрованная Blowfish (ECB)
pub fn device_node(main_version: f32, core_version: f32, key: &[u8]) -> Result<RequestNode, BuildError> {
    let mac = random_mac();
    let mut body = device_info(main_version, core_version, &mac);

    // шифр блочный: добиваем нулями до кратного 8
    let padded = body.len().div_ceil(8) * 8;
    body.resize(padded, 0);

    let cipher: Blowfish = Blowfish::new_from_slice(key).map_err(|_| BuildError::BadKeyLength(key.len()))?;
    for block in body.chunks_exact_mut(8) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }

    Ok(RequestNode::new(event::DEVICE, cmd::DEVICE, 0).with_data(body))
}

fn device_info(main_version: f32, core_version: f32, mac: &[u8; 12]) -> Vec<u8> {
    let mut out = Vec::with_capacity(280);
    out.extend_from_slice(&[0u8; 110]);
    out.extend_from_slice(&0x0104_0000u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&main_version.to_le_bytes());
    out.extend_from_slice(&core_version.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&[0u8; 47]);
    out.extend_from_slice(mac);
    out.extend_from_slice(&[0u8; 89]);
    out
}

/// MAC-подобная строка: 12 hex-символов в верхнем регистре
fn random_mac() -> [u8; 12] {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut rng = rand::rng();
    let mut out = [0u8; 12];
    for c in out.iter_mut() {
        *c = HEX[rng.random_range(0..16)];
    }
    out
}

/// Последние торговые даты бирж
pub fn market_init_info() -> RequestNode {
    RequestNode::new(event::MARKET_INIT, cmd::MARKET_INIT, 1).with_data(vec![0x01])
}

/// Количество инструментов на бирже на дату `yyyymmdd`
pub fn market_stock_count(market: Market, yyyymmdd: u32) -> RequestNode {
    let cmd_id = match market {
        Market::Sz => cmd::STOCK_COUNT_SZ,
        Market::Sh => cmd::STOCK_COUNT_SH,
    };
    let mut data = Vec::with_capacity(6);
    data.extend_from_slice(&(market.as_u8() as u16).to_le_bytes());
    data.extend_from_slice(&yyyymmdd.to_le_bytes());
    RequestNode::new(event::STOCK_COUNT, cmd_id, 1).with_data(data)
}

/// Объявление брокера
pub fn notice() -> RequestNode {
    RequestNode::new(event::NOTICE, cmd::NOTICE, 1).with_data(NOTICE_PAYLOAD.to_vec())
}

/// Страница списка инструментов начиная с `offset`
pub fn market_stock_base(market: Market, offset: u16) -> RequestNode {
    let cmd_id = match market {
        Market::Sz => cmd::STOCK_BASE_SZ,
        Market::Sh => cmd::STOCK_BASE_SH,
    };
    let mut data = Vec::with_capacity(4);
    data.extend_from_slice(&(market.as_u8() as u16).to_le_bytes());
    data.extend_from_slice(&offset.to_le_bytes());
    RequestNode::new(event::STOCK_BASE, cmd_id, 1).with_data(data)
}

/// Пакет корпоративных событий для не более чем 200 инструментов
pub fn stock_bonus(symbols: &[Symbol], index: u16) -> Result<RequestNode, BuildError> {
    if symbols.len() > BONUS_BATCH_SIZE {
        return Err(BuildError::BatchTooLarge(symbols.len()));
    }
    let mut data = Vec::with_capacity(2 + symbols.len() * 7);
    data.extend_from_slice(&(symbols.len() as u16).to_le_bytes());
    for s in symbols {
        data.push(s.market.as_u8());
        data.extend_from_slice(&s.code);
    }
    Ok(RequestNode::new(event::STOCK_BONUS, cmd::STOCK_BONUS, 1)
        .with_index(index)
        .with_data(data))
}

/// Дневные бары за [start, end] (yyyymmdd)
pub fn stock_day_bars(symbol: &Symbol, start: u32, end: u32, index: u16) -> RequestNode {
    RequestNode::new(event::BARS, cmd::DAY_BARS, 1)
        .with_index(index)
        .with_data(bar_range(symbol, start, end, 0x0004))
}

/// Минутные бары за [start, end] (yyyymmdd)
pub fn stock_minute_bars(symbol: &Symbol, start: u32, end: u32, index: u16) -> RequestNode {
    RequestNode::new(event::BARS, cmd::MINUTE_BARS, 1)
        .with_index(index)
        .with_data(bar_range(symbol, start, end, 0))
}

fn bar_range(symbol: &Symbol, start: u32, end: u32, tail: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(18);
    data.extend_from_slice(&(symbol.market.as_u8() as u16).to_le_bytes());
    data.extend_from_slice(&symbol.code);
    data.extend_from_slice(&start.to_le_bytes());
    data.extend_from_slice(&end.to_le_bytes());
    data.extend_from_slice(&tail.to_le_bytes());
    data
}
