//! Многошаговые загрузки поверх одной сессии.
//!
//! Каждая загрузка регистрирует обработчик своего event id, отправляет
//! запросы и ждёт сигнал завершения через bounded(1) канал. Ожидание
//! прерывается, если сессия закрылась или вышел таймаут; в этих случаях
//! обработчик снимается, чтобы поздние ответы ушли в обработчик по умолчанию.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, select};
use thiserror::Error;

use tdx_core::BuildError;

use crate::calendar::CalendarError;
use crate::dispatcher::Dispatcher;
use crate::session::{PacketSink, SessionError};
use crate::storage::StorageError;

pub(crate) mod bars;
pub(crate) mod bonus;
pub(crate) mod stock_base;

#[derive(Debug, Error)]
pub(crate) enum WorkflowError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("session closed while waiting for {0}")]
    SessionClosed(&'static str),

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: &'static str, after: Duration },

    #[error("server made no progress on {0}")]
    NoProgress(&'static str),

    #[error("too many instruments for one session: {0}")]
    TooManyInstruments(usize),
}

/// Всё, что нужно загрузке от сессии
pub(crate) struct Ctx<'a> {
    pub(crate) sink: &'a dyn PacketSink,
    pub(crate) dispatcher: &'a Arc<Dispatcher>,
    pub(crate) closed: &'a Receiver<()>,
    pub(crate) completion_timeout: Duration,
    pub(crate) ack_timeout: Duration,
}

impl Ctx<'_> {
    /// Ждёт сообщение, закрытие сессии или таймаут - что раньше
    pub(crate) fn wait<T>(&self, rx: &Receiver<T>, what: &'static str, timeout: Duration) -> Result<T, WorkflowError> {
        select! {
            recv(rx) -> msg => msg.map_err(|_| WorkflowError::SessionClosed(what)),
            recv(self.closed) -> _ => Err(WorkflowError::SessionClosed(what)),
            default(timeout) => Err(WorkflowError::Timeout { what, after: timeout }),
        }
    }

    /// Снимает обработчик, если загрузка прервалась до его завершения
    pub(crate) fn abort<T>(&self, event_id: u16, err: impl Into<WorkflowError>) -> Result<T, WorkflowError> {
        self.dispatcher.del_handler(event_id);
        Err(err.into())
    }
}
