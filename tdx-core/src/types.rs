use std::fmt;

use crate::error::{BuildError, DecodeError};

/// Биржа: 0 - Шэньчжэнь, 1 - Шанхай
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Market {
    Sz = 0,
    Sh = 1,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Sz, Market::Sh];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Result<Self, DecodeError> {
        match v {
            0 => Ok(Market::Sz),
            1 => Ok(Market::Sh),
            other => Err(DecodeError::BadValue {
                field: "market",
                value: other as u32,
            }),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Инструмент: (биржа, 6-символьный код)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    pub market: Market,
    pub code: [u8; 6],
}

impl Symbol {
    pub fn new(market: Market, code: &str) -> Result<Self, BuildError> {
        let raw = code.as_bytes();
        if raw.len() != 6 || !raw.is_ascii() {
            return Err(BuildError::BadCode(code.to_string()));
        }
        let mut buf = [0u8; 6];
        buf.copy_from_slice(raw);
        Ok(Self { market, code: buf })
    }

    pub fn code_str(&self) -> &str {
        std::str::from_utf8(&self.code).unwrap_or("??????")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.market, self.code_str())
    }
}
