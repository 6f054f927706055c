use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use rand::Rng;

use crate::constants::{
    BONUS_TERMINAL_INDEX, COMPRESSED_BIT, RECV_BUFFER_CAPACITY, RECV_CHUNK_SIZE, REQUEST_FLAG,
    REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
use crate::error::WireError;
use crate::request::RequestNode;

/// Заголовок исходящего пакета (12 байт, little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub index: u16,
    pub cmd_id: u16,
    pub is_raw: u8,
    pub body_length: u16,
    pub body_max_length: u16,
    pub event_id: u16,
}

impl RequestHeader {
    pub fn encode(&self) -> [u8; REQUEST_HEADER_SIZE] {
        let mut out = [0u8; REQUEST_HEADER_SIZE];
        out[0] = REQUEST_FLAG;
        out[1..3].copy_from_slice(&self.index.to_le_bytes());
        out[3..5].copy_from_slice(&self.cmd_id.to_le_bytes());
        out[5] = self.is_raw;
        out[6..8].copy_from_slice(&self.body_length.to_le_bytes());
        out[8..10].copy_from_slice(&self.body_max_length.to_le_bytes());
        out[10..12].copy_from_slice(&self.event_id.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < REQUEST_HEADER_SIZE {
            return Err(WireError::PacketTooShort {
                got: buf.len(),
                need: REQUEST_HEADER_SIZE,
            });
        }
        Ok(Self {
            index: le16(buf, 1),
            cmd_id: le16(buf, 3),
            is_raw: buf[5],
            body_length: le16(buf, 6),
            body_max_length: le16(buf, 8),
            event_id: le16(buf, 10),
        })
    }
}

/// Заголовок входящего пакета (16 байт, little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseHeader {
    pub packet_flag: u32,
    pub compress_flag: u8,
    pub index: u16,
    pub cmd_id: u16,
    pub reserved: u8,
    pub event_id: u16,
    pub body_length: u16,
    pub body_max_length: u16,
}

impl ResponseHeader {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < RESPONSE_HEADER_SIZE {
            return Err(WireError::PacketTooShort {
                got: buf.len(),
                need: RESPONSE_HEADER_SIZE,
            });
        }
        Ok(Self {
            packet_flag: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            compress_flag: buf[4],
            index: le16(buf, 5),
            cmd_id: le16(buf, 7),
            reserved: buf[9],
            event_id: le16(buf, 10),
            body_length: le16(buf, 12),
            body_max_length: le16(buf, 14),
        })
    }

    pub fn encode(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let mut out = [0u8; RESPONSE_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.packet_flag.to_le_bytes());
        out[4] = self.compress_flag;
        out[5..7].copy_from_slice(&self.index.to_le_bytes());
        out[7..9].copy_from_slice(&self.cmd_id.to_le_bytes());
        out[9] = self.reserved;
        out[10..12].copy_from_slice(&self.event_id.to_le_bytes());
        out[12..14].copy_from_slice(&self.body_length.to_le_bytes());
        out[14..16].copy_from_slice(&self.body_max_length.to_le_bytes());
        out
    }

    pub fn is_compressed(&self) -> bool {
        self.compress_flag & COMPRESSED_BIT != 0
    }
}

/// Принятый пакет: заголовок + тело (уже распакованное)
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub header: ResponseHeader,
    pub body: Vec<u8>,
}

impl Response {
    /// Сериализация ответа в байты провода (для тестовых серверов).
    /// Длины в заголовке берутся из `body` как есть.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let len =
            u16::try_from(self.body.len()).map_err(|_| WireError::PayloadTooLarge(self.body.len()))?;
        let mut header = self.header;
        header.body_length = len;
        if header.body_max_length == 0 {
            header.body_max_length = len;
        }
        let mut out = Vec::with_capacity(RESPONSE_HEADER_SIZE + self.body.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&self.body);
        Ok(out)
    }
}

/// Собирает пакет запроса: заголовок + тело как есть, без сжатия.
/// Нулевой индекс заменяется случайным 15-битным.
pub fn build_packet(req: &RequestNode) -> Result<Vec<u8>, WireError> {
    let len = u16::try_from(req.raw_data.len() + 2)
        .map_err(|_| WireError::PayloadTooLarge(req.raw_data.len()))?;

    let index = if req.index == 0 {
        random_index()
    } else {
        req.index
    };

    let header = RequestHeader {
        index,
        cmd_id: req.cmd_id,
        is_raw: req.is_raw,
        body_length: len,
        body_max_length: len,
        event_id: req.event_id,
    };

    let mut out = Vec::with_capacity(REQUEST_HEADER_SIZE + req.raw_data.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&req.raw_data);
    Ok(out)
}

/// Случайный индекс никогда не совпадает с маркером последнего пакета событий
fn random_index() -> u16 {
    let mut rng = rand::rng();
    loop {
        let index = rng.random_range(1..0x7FFF);
        if index != BONUS_TERMINAL_INDEX {
            return index;
        }
    }
}

/// Разбирает собранный пакет запроса обратно на заголовок и тело
pub fn parse_packet(buf: &[u8]) -> Result<(RequestHeader, &[u8]), WireError> {
    let header = RequestHeader::decode(buf)?;
    let body_len = (header.body_length as usize).saturating_sub(2);
    let end = REQUEST_HEADER_SIZE + body_len;
    if buf.len() < end {
        return Err(WireError::PacketTooShort {
            got: buf.len(),
            need: end,
        });
    }
    Ok((header, &buf[REQUEST_HEADER_SIZE..end]))
}

/// Пишет пакет целиком, без повторов
pub fn send_packet<W: Write>(w: &mut W, buf: &[u8]) -> Result<(), WireError> {
    w.write_all(buf)?;
    w.flush()?;
    Ok(())
}

/// Собирает пакеты из потокового сокета.
///
/// Данные копятся в буфере; пакет забирается только целиком, поэтому таймаут
/// чтения посреди пакета ничего не теряет и вызов можно повторить.
pub struct Framer<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: Read> Framer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(RECV_BUFFER_CAPACITY),
        }
    }

    /// Сколько байт лежит в буфере
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn fill(&mut self) -> Result<usize, WireError> {
        let mut chunk = [0u8; RECV_CHUNK_SIZE];
        let n = self.reader.read(&mut chunk)?;
        if n == 0 {
            return Err(WireError::Eof);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Читает следующий полный пакет.
    ///
    /// Ошибки ввода-вывода (кроме таймаута) и EOF означают потерю соединения.
    /// Ошибка распаковки касается только этого пакета: его байты уже сняты с
    /// буфера и следующий вызов продолжит с начала следующего пакета.
    pub fn read_packet(&mut self) -> Result<Response, WireError> {
        while self.buf.len() < RESPONSE_HEADER_SIZE {
            self.fill()?;
        }

        // заголовок только подсматриваем, снимаем вместе с телом
        let header = ResponseHeader::decode(&self.buf[..RESPONSE_HEADER_SIZE])?;
        let total = RESPONSE_HEADER_SIZE + header.body_length as usize;

        while self.buf.len() < total {
            self.fill()?;
        }

        let raw: Vec<u8> = self.buf.drain(..total).skip(RESPONSE_HEADER_SIZE).collect();

        let body = if header.is_compressed() {
            inflate(&raw, header.body_max_length as usize)?
        } else {
            raw
        };

        Ok(Response { header, body })
    }
}

fn inflate(raw: &[u8], max_len: usize) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::with_capacity(max_len);
    ZlibDecoder::new(raw)
        .take(max_len as u64 + 1)
        .read_to_end(&mut out)
        .map_err(WireError::Inflate)?;
    if out.len() > max_len {
        return Err(WireError::InflatedTooLarge { declared: max_len });
    }
    Ok(out)
}

fn le16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}
