//! # tdx-core
//!
//! Бинарный протокол рыночных данных TDX: всё, что не требует потоков и сокетов.
//!
//! Этот крейт содержит:
//!
//! - [`wire`] - заголовки пакетов, сборка запросов и [`wire::Framer`], который
//!   собирает ответы из потокового сокета (частичные чтения, zlib)
//! - [`request`] - фабрики запросов для каждой команды
//! - [`response`] - фиксированные раскладки ответов и разбор списков
//! - [`reply`] - разбор ответа в типизированный вариант по (event id, cmd id)
//! - [`varfloat`] - старый формат цен переменной длины
//! - [`types`] - биржа и инструмент
//! - [`error`] - типы ошибок
//!
//! ## Пример: запрос и его разбор обратно
//!
//! ```rust
//! use tdx_core::{request, wire, Market};
//!
//! let mut req = request::market_stock_base(Market::Sz, 1000);
//! req.index = 42;
//!
//! let bytes = wire::build_packet(&req).unwrap();
//! let (header, payload) = wire::parse_packet(&bytes).unwrap();
//! assert_eq!(header.event_id, 0x0450);
//! assert_eq!(header.index, 42);
//! assert_eq!(payload, req.raw_data.as_slice());
//! ```
//!
//! ## Пример: старый формат цен
//!
//! ```rust
//! use tdx_core::varfloat::decode_price;
//!
//! let (used, value) = decode_price(&[0xAC, 0x0E]).unwrap();
//! assert_eq!((used, value), (2, 940.0));
//! ```
//!
//! ## Пример: чтение пакета из потока
//!
//! ```rust
//! use std::io::Cursor;
//! use tdx_core::wire::{Framer, Response, ResponseHeader};
//! use tdx_core::{Packet, Reply};
//!
//! let resp = Response {
//!     header: ResponseHeader { event_id: 0x044E, cmd_id: 0x006B, ..Default::default() },
//!     body: 2500u16.to_le_bytes().to_vec(),
//! };
//!
//! let mut framer = Framer::new(Cursor::new(resp.encode().unwrap()));
//! let packet: Packet = Reply::decode(framer.read_packet().unwrap());
//! assert!(matches!(packet.reply, Reply::StockCount { count: 2500, .. }));
//! ```

#![forbid(unsafe_code)]

/// Сборка/разбор пакетов и приём из потока.
pub mod wire;

/// Фабрики запросов.
pub mod request;

/// Раскладки ответов.
pub mod response;

/// Типизированный ответ.
pub mod reply;

/// Старый формат цен.
pub mod varfloat;

/// Доменные типы.
pub mod types;

/// Ошибки `tdx-core`.
pub mod error;

/// Идентификаторы команд и событий, размеры, маркеры.
pub mod constants;

// --- Re-exports (публичный фасад API) ---

pub use crate::error::{BuildError, CoreError, DecodeError, WireError};
pub use crate::reply::{Packet, Reply};
pub use crate::request::RequestNode;
pub use crate::types::{Market, Symbol};
pub use crate::wire::{Framer, Response, ResponseHeader};
