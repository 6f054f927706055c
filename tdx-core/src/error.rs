use thiserror::Error;

/// Верхнеуровневый тип ошибок крейта.
///
/// Функции крейта возвращают узкие ошибки; `CoreError` собирает их для
/// вызывающего кода, которому достаточно одного типа и `?`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Ошибки фрейминга и транспорта
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Ошибки разбора ответов
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Ошибки сборки запросов
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Ошибки фрейминга
#[derive(Debug, Error)]
pub enum WireError {
    /// Сокет вернул 0 байт
    #[error("connection closed by peer")]
    Eof,

    /// Ошибка ввода-вывода
    #[error("socket i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Пакет короче заголовка
    #[error("packet too short: {got} bytes, header needs {need}")]
    PacketTooShort { got: usize, need: usize },

    /// Тело не распаковывается
    #[error("inflate failed: {0}")]
    Inflate(std::io::Error),

    /// Распакованное тело длиннее заявленного
    #[error("inflated body exceeds declared size {declared}")]
    InflatedTooLarge { declared: usize },

    /// Тело не помещается в поле длины
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

impl WireError {
    /// Таймаут чтения: данных пока нет, буфер не тронут
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            WireError::Io(e) if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut
        )
    }
}

/// Ошибки разбора тела ответа
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Тело закончилось раньше, чем поле
    #[error("truncated {what}: need {need} bytes at offset {offset}, have {have}")]
    Truncated {
        what: &'static str,
        offset: usize,
        need: usize,
        have: usize,
    },

    /// Запись в списке не разобрана
    #[error("record {index} of {what}: {reason}")]
    Record {
        what: &'static str,
        index: usize,
        reason: String,
    },

    /// Неизвестное значение поля
    #[error("unexpected {field} value {value:#x}")]
    BadValue { field: &'static str, value: u32 },
}

/// Ошибки сборки запросов
#[derive(Debug, Error)]
pub enum BuildError {
    /// Неверная длина ключа шифра
    #[error("invalid device cipher key length: {0}")]
    BadKeyLength(usize),

    /// Слишком много инструментов в пакете
    #[error("too many symbols in one batch: {0}")]
    BatchTooLarge(usize),

    /// Код инструмента не 6 символов ASCII
    #[error("invalid symbol code: {0:?}")]
    BadCode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reply::Reply, request, wire};

    fn read_count(bytes: &[u8]) -> Result<u16, CoreError> {
        let mut framer = wire::Framer::new(std::io::Cursor::new(bytes.to_vec()));
        let packet = Reply::decode(framer.read_packet()?);
        match packet.reply {
            Reply::StockCount { count, .. } => Ok(count),
            Reply::Malformed(e) => Err(e.into()),
            _ => Err(DecodeError::BadValue {
                field: "event id",
                value: packet.event_id() as u32,
            }
            .into()),
        }
    }

    #[test]
    fn narrow_errors_convert_with_question_mark() {
        assert!(matches!(read_count(&[]), Err(CoreError::Wire(WireError::Eof))));

        let build = request::stock_bonus(&vec![crate::Symbol::new(crate::Market::Sz, "000001").unwrap(); 201], 0)
            .map_err(CoreError::from)
            .unwrap_err();
        assert!(matches!(build, CoreError::Build(BuildError::BatchTooLarge(201))));
    }
}
