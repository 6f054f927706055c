//! Общие помощники для тестов: фальшивый получатель запросов и сборка ответов.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::ZlibEncoder;

use tdx_core::constants::{COMPRESSED_BIT, REQUEST_HEADER_SIZE};
use tdx_core::response::{Batch, StockBaseItem};
use tdx_core::wire::{RequestHeader, Response, ResponseHeader};
use tdx_core::{Packet, Reply, RequestNode};

use crate::dispatcher::Dispatcher;
use crate::session::{PacketSink, SessionError};

type Responder = Box<dyn Fn(&RequestNode) -> Vec<Packet> + Send + Sync>;

/// Запоминает запросы; при наличии ответчика сразу раздаёт его ответы
/// через диспетчер, как это делал бы поток чтения.
pub(crate) struct RecordingSink {
    pub(crate) sent: Mutex<Vec<RequestNode>>,
    respond: Option<(Arc<Dispatcher>, Responder)>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            respond: None,
        }
    }

    pub(crate) fn responding<F>(dispatcher: Arc<Dispatcher>, responder: F) -> Self
    where
        F: Fn(&RequestNode) -> Vec<Packet> + Send + Sync + 'static,
    {
        Self {
            sent: Mutex::new(Vec::new()),
            respond: Some((dispatcher, Box::new(responder))),
        }
    }

    pub(crate) fn sent(&self) -> Vec<RequestNode> {
        self.sent.lock().unwrap().clone()
    }
}

impl PacketSink for RecordingSink {
    fn send(&self, req: &RequestNode) -> Result<(), SessionError> {
        self.sent.lock().unwrap().push(req.clone());
        if let Some((dispatcher, responder)) = &self.respond {
            for packet in responder(req) {
                dispatcher.dispatch(&packet);
            }
        }
        Ok(())
    }
}

pub(crate) fn packet(event_id: u16, cmd_id: u16, index: u16, reply: Reply) -> Packet {
    Packet {
        header: ResponseHeader {
            event_id,
            cmd_id,
            index,
            ..Default::default()
        },
        reply,
    }
}

pub(crate) fn stock_base_item(code: &str, bonus2: u16) -> StockBaseItem {
    let mut c = [0u8; 6];
    c.copy_from_slice(code.as_bytes());
    let mut name = [0u8; 8];
    name[..4].copy_from_slice(b"TEST");
    StockBaseItem {
        code: c,
        unknown1: 100,
        name,
        unknown2: 0,
        unknown3: 2,
        price: 10.5,
        bonus1: 0,
        bonus2,
    }
}

pub(crate) fn batch<T>(items: Vec<T>) -> Batch<T> {
    Batch { items, fault: None }
}

pub(crate) fn response_bytes(event_id: u16, cmd_id: u16, index: u16, body: &[u8]) -> Vec<u8> {
    Response {
        header: ResponseHeader {
            event_id,
            cmd_id,
            index,
            ..Default::default()
        },
        body: body.to_vec(),
    }
    .encode()
    .unwrap()
}

pub(crate) fn compressed_response_bytes(event_id: u16, cmd_id: u16, index: u16, body: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(body).unwrap();
    let packed = enc.finish().unwrap();

    Response {
        header: ResponseHeader {
            compress_flag: COMPRESSED_BIT,
            event_id,
            cmd_id,
            index,
            body_max_length: body.len() as u16,
            ..Default::default()
        },
        body: packed,
    }
    .encode()
    .unwrap()
}

/// Читает один запрос из сокета (сторона фальшивого сервера)
pub(crate) fn read_request(s: &mut TcpStream) -> (RequestHeader, Vec<u8>) {
    let mut head = [0u8; REQUEST_HEADER_SIZE];
    s.read_exact(&mut head).unwrap();
    let header = RequestHeader::decode(&head).unwrap();
    let mut payload = vec![0u8; header.body_length as usize - 2];
    s.read_exact(&mut payload).unwrap();
    (header, payload)
}
