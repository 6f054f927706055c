//! Фиксированные бинарные раскладки ответов (little-endian, без выравнивания).
//!
//! Списки начинаются со счётчика, дальше идут записи фиксированного размера.
//! Ошибка в середине списка не теряет уже разобранные записи: они возвращаются
//! в [`Batch`] вместе с описанием сбоя.

use crate::constants::{BAR_RECORD_SIZE, NOTICE_TEXT_OFFSET};
use crate::error::DecodeError;
use crate::types::Market;

/// Последовательное чтение полей с проверкой границ
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, pos: 0, what }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                what: self.what,
                offset: self.pos,
                need: n,
                have: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.array()?))
    }
}

/// Результат разбора списка: записи до сбоя + сам сбой, если был
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub fault: Option<DecodeError>,
}

impl<T> Batch<T> {
    fn with_capacity(n: usize) -> Self {
        Self {
            items: Vec::with_capacity(n),
            fault: None,
        }
    }
}

fn record_fault(what: &'static str, index: usize, e: DecodeError) -> DecodeError {
    DecodeError::Record {
        what,
        index,
        reason: e.to_string(),
    }
}

/// Последние торговые даты обеих бирж и имя сервера
#[derive(Debug, Clone, PartialEq)]
pub struct MarketInitInfo {
    pub sz_date: u32,
    pub sz_flag: u32,
    pub sh_date: u32,
    pub sh_flag: u32,
    /// GBK, с нулями в конце
    pub server_name: [u8; 21],
    pub domain: [u8; 18],
}

impl MarketInitInfo {
    pub const SIZE: usize = 107;

    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(body, "market init info");
        r.take(10 * 4 + 2)?;
        let sz_date = r.u32()?;
        let sz_flag = r.u32()?;
        let sh_date = r.u32()?;
        let sh_flag = r.u32()?;
        r.take(4 + 2 + 4)?;
        Ok(Self {
            sz_date,
            sz_flag,
            sh_date,
            sh_flag,
            server_name: r.array()?,
            domain: r.array()?,
        })
    }
}

/// Запись справочника инструментов (29 байт)
#[derive(Debug, Clone, PartialEq)]
pub struct StockBaseItem {
    pub code: [u8; 6],
    pub unknown1: u16,
    /// GBK, с нулями в конце
    pub name: [u8; 8],
    pub unknown2: u32,
    pub unknown3: u8,
    /// Вчерашнее закрытие
    pub price: f32,
    pub bonus1: u16,
    /// Количество ожидающих корпоративных событий
    pub bonus2: u16,
}

impl StockBaseItem {
    pub const SIZE: usize = 29;

    fn read(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            code: r.array()?,
            unknown1: r.u16()?,
            name: r.array()?,
            unknown2: r.u32()?,
            unknown3: r.u8()?,
            price: r.f32()?,
            bonus1: r.u16()?,
            bonus2: r.u16()?,
        })
    }
}

/// Вид корпоративного события
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusKind {
    /// Выплата дивидендов / исключение прав
    ExRights = 1,
    /// Листинг распределённых акций
    DistributionListing = 2,
    /// Листинг неторгуемых акций
    NonTradableListing = 3,
    UnknownEquityChange = 4,
    EquityChange = 5,
    SecondaryOffering = 6,
    Buyback = 7,
    SecondaryOfferingListing = 8,
    ReallocationListing = 9,
}

impl BonusKind {
    pub fn from_u8(v: u8) -> Result<Self, DecodeError> {
        Ok(match v {
            1 => Self::ExRights,
            2 => Self::DistributionListing,
            3 => Self::NonTradableListing,
            4 => Self::UnknownEquityChange,
            5 => Self::EquityChange,
            6 => Self::SecondaryOffering,
            7 => Self::Buyback,
            8 => Self::SecondaryOfferingListing,
            9 => Self::ReallocationListing,
            other => {
                return Err(DecodeError::BadValue {
                    field: "bonus type",
                    value: other as u32,
                });
            }
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Запись корпоративного события (29 байт)
#[derive(Debug, Clone, PartialEq)]
pub struct StockBonusItem {
    pub market: Market,
    pub code: [u8; 6],
    pub date: i32,
    pub kind: BonusKind,
    /// Денежная выплата
    pub money: f32,
    /// Цена размещения
    pub price: f32,
    /// Количество бонусных акций
    pub count: f32,
    /// Коэффициент размещения
    pub rate: f32,
}

impl StockBonusItem {
    pub const SIZE: usize = 29;

    fn read(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let market = Market::from_u8(r.u8()?)?;
        let code = r.array()?;
        r.u8()?; // нулевой терминатор кода
        let date = r.i32()?;
        let kind = BonusKind::from_u8(r.u8()?)?;
        Ok(Self {
            market,
            code,
            date,
            kind,
            money: r.f32()?,
            price: r.f32()?,
            count: r.f32()?,
            rate: r.f32()?,
        })
    }
}

/// Дневной бар
#[derive(Debug, Clone, PartialEq)]
pub struct StockDayItem {
    /// yyyymmdd
    pub date: u32,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub amount: f64,
    pub volume: u32,
}

impl StockDayItem {
    fn read(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let date = r.u32()?;
        let open = r.u32()? as f64 / 100.0;
        let high = r.u32()? as f64 / 100.0;
        let low = r.u32()? as f64 / 100.0;
        let close = r.u32()? as f64 / 100.0;
        let amount = r.f32()? as f64;
        let volume = r.u32()?;
        r.u32()?;
        Ok(Self {
            date,
            open,
            high,
            low,
            close,
            amount,
            volume,
        })
    }
}

/// Минутный бар
#[derive(Debug, Clone, PartialEq)]
pub struct StockMinsItem {
    /// yyyymmdd
    pub date: u32,
    /// Минуты от полуночи
    pub minutes: u16,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub amount: f64,
    pub volume: u32,
}

impl StockMinsItem {
    fn read(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let date = unpack_minute_date(r.u16()?);
        let minutes = r.u16()?;
        let open = r.f32()? as f64;
        let high = r.f32()? as f64;
        let low = r.f32()? as f64;
        let close = r.f32()? as f64;
        let amount = r.f32()? as f64;
        let volume = r.u32()?;
        r.u32()?;
        Ok(Self {
            date,
            minutes,
            open,
            high,
            low,
            close,
            amount,
            volume,
        })
    }

    /// Время в виде `HH:MM:00`
    pub fn time_text(&self) -> String {
        let (h, m) = unpack_minute_time(self.minutes);
        format!("{h:02}:{m:02}:00")
    }
}

/// Упакованная дата минутного бара -> yyyymmdd
pub fn unpack_minute_date(raw: u16) -> u32 {
    let raw = raw as u32;
    let year = raw / 2048 + 2004;
    let month = raw % 2048 / 100;
    let day = raw % 2048 % 100;
    year * 10000 + month * 100 + day
}

/// yyyymmdd -> упакованная дата минутного бара (годы 2004..=2035)
pub fn pack_minute_date(yyyymmdd: u32) -> Result<u16, DecodeError> {
    let year = yyyymmdd / 10000;
    let month = yyyymmdd / 100 % 100;
    let day = yyyymmdd % 100;
    if !(2004..=2035).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(DecodeError::BadValue {
            field: "minute date",
            value: yyyymmdd,
        });
    }
    Ok(((year - 2004) * 2048 + month * 100 + day) as u16)
}

/// Упакованное время -> (часы, минуты)
pub fn unpack_minute_time(raw: u16) -> (u16, u16) {
    (raw / 60, raw % 60)
}

/// (часы, минуты) -> упакованное время
pub fn pack_minute_time(hour: u16, minute: u16) -> Result<u16, DecodeError> {
    if hour > 23 || minute > 59 {
        return Err(DecodeError::BadValue {
            field: "minute time",
            value: (hour * 100 + minute) as u32,
        });
    }
    Ok(hour * 60 + minute)
}

/// Количество инструментов на бирже
pub fn decode_stock_count(body: &[u8]) -> Result<u16, DecodeError> {
    Reader::new(body, "stock count").u16()
}

/// Страница справочника инструментов
pub fn decode_stock_base(body: &[u8]) -> Result<Batch<StockBaseItem>, DecodeError> {
    let mut r = Reader::new(body, "stock base");
    let count = r.u16()? as usize;
    let mut batch = Batch::with_capacity(count);
    for index in 0..count {
        match StockBaseItem::read(&mut r) {
            Ok(item) => batch.items.push(item),
            Err(e) => {
                batch.fault = Some(record_fault("stock base", index, e));
                break;
            }
        }
    }
    Ok(batch)
}

/// Ответ на пакет корпоративных событий
#[derive(Debug, Clone, PartialEq)]
pub struct BonusReply {
    /// Сколько инструментов сервер обработал в этом пакете
    pub symbol_count: u16,
    pub records: Batch<StockBonusItem>,
}

pub fn decode_stock_bonus(body: &[u8]) -> Result<BonusReply, DecodeError> {
    let mut r = Reader::new(body, "stock bonus");
    let symbol_count = r.u16()?;
    let mut records = Batch::with_capacity(symbol_count as usize);
    let mut index = 0;

    'symbols: for _ in 0..symbol_count {
        let sub_count = match r.take(7).and_then(|_| r.u16()) {
            Ok(n) => n,
            Err(e) => {
                records.fault = Some(record_fault("stock bonus", index, e));
                break;
            }
        };
        for _ in 0..sub_count {
            match StockBonusItem::read(&mut r) {
                Ok(item) => records.items.push(item),
                Err(e) => {
                    records.fault = Some(record_fault("stock bonus", index, e));
                    break 'symbols;
                }
            }
            index += 1;
        }
    }

    Ok(BonusReply {
        symbol_count,
        records,
    })
}

fn decode_bars<T>(
    body: &[u8],
    what: &'static str,
    read: fn(&mut Reader<'_>) -> Result<T, DecodeError>,
) -> Result<Batch<T>, DecodeError> {
    let mut r = Reader::new(body, what);
    r.u16()?;
    let length = r.u32()? as usize;
    let count = length / BAR_RECORD_SIZE;
    let mut batch = Batch::with_capacity(count);
    for index in 0..count {
        match read(&mut r) {
            Ok(item) => batch.items.push(item),
            Err(e) => {
                batch.fault = Some(record_fault(what, index, e));
                break;
            }
        }
    }
    Ok(batch)
}

pub fn decode_day_bars(body: &[u8]) -> Result<Batch<StockDayItem>, DecodeError> {
    decode_bars(body, "day bars", StockDayItem::read)
}

pub fn decode_minute_bars(body: &[u8]) -> Result<Batch<StockMinsItem>, DecodeError> {
    decode_bars(body, "minute bars", StockMinsItem::read)
}

/// Сырой текст объявления (GBK) без хвостовых нулей
pub fn decode_notice(body: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let text = body.get(NOTICE_TEXT_OFFSET..).ok_or(DecodeError::Truncated {
        what: "notice",
        offset: 0,
        need: NOTICE_TEXT_OFFSET,
        have: body.len(),
    })?;
    let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
    Ok(text[..end].to_vec())
}
