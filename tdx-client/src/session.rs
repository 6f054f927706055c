//! TCP-сессия с сервером TDX.
//!
//! Один поток читает сокет, собирает пакеты и отдаёт их диспетчеру.
//! Запись идёт из любого потока через общий `Mutex<TcpStream>`.
//! Когда поток чтения завершается (EOF, ошибка сокета, Ctrl+C), канал
//! `closed` разрывается и все ожидающие загрузки сразу получают ошибку.

use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, info, warn};
use thiserror::Error;

use tdx_core::{BuildError, Framer, Reply, RequestNode, WireError, wire};

use crate::dispatcher::Dispatcher;

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("cannot resolve server address: {0}")]
    Resolve(String),

    #[error("failed to connect to {addr}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("session is closed")]
    Closed,
}

/// Куда уходят запросы. Загрузки знают только этот интерфейс.
pub(crate) trait PacketSink: Send + Sync {
    fn send(&self, req: &RequestNode) -> Result<(), SessionError>;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionOptions {
    /// Период проверки флага остановки в потоке чтения
    pub(crate) read_tick: Duration,
    pub(crate) connect_timeout: Duration,
}

pub(crate) struct Session {
    peer: SocketAddr,
    writer: Mutex<TcpStream>,
    closed: Receiver<()>,
    reader: Option<JoinHandle<Result<(), SessionError>>>,
}

pub(crate) fn resolve(host: &str) -> Result<SocketAddr, SessionError> {
    host.to_socket_addrs()
        .map_err(|e| SessionError::Resolve(format!("{host}: {e}")))?
        .next()
        .ok_or_else(|| SessionError::Resolve(format!("{host}: no addresses")))
}

impl Session {
    pub(crate) fn connect(
        host: &str,
        dispatcher: Arc<Dispatcher>,
        opts: SessionOptions,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, SessionError> {
        let addr = resolve(host)?;
        let stream = TcpStream::connect_timeout(&addr, opts.connect_timeout)
            .map_err(|source| SessionError::Connect { addr, source })?;

        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(opts.read_tick)).ok();
        stream.set_write_timeout(Some(opts.connect_timeout)).ok();

        let read_half = stream.try_clone().map_err(WireError::from)?;
        let (closed_tx, closed_rx) = crossbeam_channel::bounded::<()>(1);

        let reader = thread::Builder::new()
            .name("tdx-reader".to_string())
            .spawn(move || run_reader(Framer::new(read_half), dispatcher, shutdown, closed_tx))
            .map_err(WireError::from)?;

        info!("connected to {addr}");

        Ok(Self {
            peer: addr,
            writer: Mutex::new(stream),
            closed: closed_rx,
            reader: Some(reader),
        })
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Канал без сообщений: разрывается, когда поток чтения завершился
    pub(crate) fn closed(&self) -> Receiver<()> {
        self.closed.clone()
    }

    /// Закрывает сокет и ждёт поток чтения
    pub(crate) fn close(&mut self) -> Result<(), SessionError> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };

        {
            let writer = match self.writer.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            // NotConnected здесь означает, что сервер уже закрыл соединение
            let _ = writer.shutdown(Shutdown::Both);
        }

        match reader.join() {
            // EOF после нашего shutdown - штатное закрытие
            Ok(Err(SessionError::Closed)) => Ok(()),
            Ok(result) => result,
            Err(_) => {
                warn!("reader thread panicked");
                Err(SessionError::Closed)
            }
        }
    }
}

impl PacketSink for Session {
    fn send(&self, req: &RequestNode) -> Result<(), SessionError> {
        if self.reader.is_none() || matches!(self.closed.try_recv(), Err(TryRecvError::Disconnected)) {
            return Err(SessionError::Closed);
        }

        let bytes = wire::build_packet(req)?;
        let mut writer = match self.writer.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        wire::send_packet(&mut *writer, &bytes)?;

        debug!(
            "sent event={:#06x} cmd={:#06x} index={} len={}",
            req.event_id,
            req.cmd_id,
            req.index,
            bytes.len()
        );
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("session closed with error: {e}");
        }
    }
}

fn run_reader(
    mut framer: Framer<TcpStream>,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<AtomicBool>,
    closed_tx: Sender<()>,
) -> Result<(), SessionError> {
    let result = loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("reader: shutting down...");
            break Ok(());
        }

        match framer.read_packet() {
            Ok(resp) => {
                let packet = Reply::decode(resp);
                if let Reply::Malformed(e) = &packet.reply {
                    warn!(
                        "undecodable reply: event={:#06x} index={}: {e}",
                        packet.event_id(),
                        packet.index()
                    );
                }
                dispatcher.dispatch(&packet);
            }
            Err(e) if e.is_timeout() => {
                // просто "тик" цикла, частичный пакет остаётся в буфере
                continue;
            }
            Err(e @ (WireError::Inflate(_) | WireError::InflatedTooLarge { .. })) => {
                warn!("dropping packet: {e}");
            }
            Err(WireError::Eof) => {
                info!("server closed connection");
                break Err(SessionError::Closed);
            }
            Err(e) => break Err(e.into()),
        }
    };

    if let Err(e) = &result {
        if !shutdown.load(Ordering::Relaxed) {
            warn!("reader stopped: {e}");
        }
    }

    drop(closed_tx);
    result
}
