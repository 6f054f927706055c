use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};

use tdx_core::{Packet, Reply};

use crate::charset::gbk_to_utf8;

/// Что делать с обработчиком после вызова
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// Снять регистрацию (работа завершена)
    Unregister,
}

pub(crate) type Handler = Arc<dyn Fn(&Packet) -> Flow + Send + Sync>;

/// Таблица обработчиков: event id -> обработчик.
/// Не более одного обработчика на event id, новая регистрация заменяет старую.
pub(crate) struct Dispatcher {
    handlers: RwLock<HashMap<u16, Handler>>,
    fallback: Handler,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::with_fallback(unknown_packet)
    }

    pub(crate) fn with_fallback<F>(fallback: F) -> Self
    where
        F: Fn(&Packet) -> Flow + Send + Sync + 'static,
    {
        Self {
            handlers: RwLock::new(HashMap::new()),
            fallback: Arc::new(fallback),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<u16, Handler>> {
        match self.handlers.read() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("handler table lock poisoned, continuing");
                poisoned.into_inner() // продолжаем, несмотря на poison
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u16, Handler>> {
        match self.handlers.write() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("handler table lock poisoned, continuing");
                poisoned.into_inner()
            }
        }
    }

    pub(crate) fn add_handler<F>(&self, event_id: u16, handler: F)
    where
        F: Fn(&Packet) -> Flow + Send + Sync + 'static,
    {
        if self.write().insert(event_id, Arc::new(handler)).is_some() {
            debug!("handler for event {event_id:#06x} replaced");
        }
    }

    pub(crate) fn del_handler(&self, event_id: u16) -> bool {
        self.write().remove(&event_id).is_some()
    }

    #[cfg(test)]
    pub(crate) fn has_handler(&self, event_id: u16) -> bool {
        self.read().contains_key(&event_id)
    }

    /// Вызывается только из потока чтения.
    /// Обработчик работает без удержания блокировки, поэтому может сам
    /// регистрировать и снимать обработчики.
    pub(crate) fn dispatch(&self, packet: &Packet) {
        let event_id = packet.event_id();
        if event_id == 0 {
            return;
        }

        let handler = self.read().get(&event_id).cloned();

        match handler {
            Some(h) => {
                if h(packet) == Flow::Unregister {
                    let mut handlers = self.write();
                    // снимаем только если за это время не зарегистрировали новый
                    if handlers.get(&event_id).is_some_and(|cur| Arc::ptr_eq(cur, &h)) {
                        handlers.remove(&event_id);
                    }
                }
            }
            None => {
                (self.fallback)(packet);
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Обработчик пакетов, на которые никто не подписан
pub(crate) fn unknown_packet(packet: &Packet) -> Flow {
    match &packet.reply {
        Reply::DeviceRegistered => info!("device registered"),
        Reply::Notice(text) => {
            let text = gbk_to_utf8(text);
            let head: String = text.chars().take(70).collect();
            info!("notice: {head}");
        }
        Reply::Unknown(body) => {
            debug!(
                "unhandled packet: event={:#06x} cmd={:#06x} index={} body={}",
                packet.event_id(),
                packet.header.cmd_id,
                packet.index(),
                hex_dump(body, 64)
            );
        }
        other => {
            debug!(
                "no handler for event {:#06x} (index={}): {}",
                packet.event_id(),
                packet.index(),
                reply_name(other)
            );
        }
    }
    Flow::Continue
}

fn reply_name(reply: &Reply) -> &'static str {
    match reply {
        Reply::DeviceRegistered => "device",
        Reply::MarketInit(_) => "market init",
        Reply::StockCount { .. } => "stock count",
        Reply::Notice(_) => "notice",
        Reply::StockBase { .. } => "stock base",
        Reply::StockBonus(_) => "stock bonus",
        Reply::DayBars(_) => "day bars",
        Reply::MinuteBars(_) => "minute bars",
        Reply::Unknown(_) => "unknown",
        Reply::Malformed(_) => "malformed",
    }
}

fn hex_dump(body: &[u8], limit: usize) -> String {
    let mut out: String = body.iter().take(limit).map(|b| format!("{b:02X}")).collect();
    if body.len() > limit {
        out.push_str(&format!("..(+{})", body.len() - limit));
    }
    out
}
