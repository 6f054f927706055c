/// Флаг, с которого начинается каждый исходящий заголовок
pub const REQUEST_FLAG: u8 = 0x0C;

/// Размер заголовка запроса
pub const REQUEST_HEADER_SIZE: usize = 12;

/// Размер заголовка ответа
pub const RESPONSE_HEADER_SIZE: usize = 16;

/// Бит сжатия в байте флагов ответа
pub const COMPRESSED_BIT: u8 = 0x10;

/// Начальная ёмкость приёмного буфера
pub const RECV_BUFFER_CAPACITY: usize = 5 * 1024 * 1024;

/// Размер одного чтения из сокета
pub const RECV_CHUNK_SIZE: usize = 5 * 1024;

/// Идентификаторы событий (по ним диспетчер выбирает обработчик)
pub mod event {
    pub const DEVICE: u16 = 0x000B;
    pub const MARKET_INIT: u16 = 0x000D;
    pub const STOCK_BONUS: u16 = 0x000F;
    pub const STOCK_COUNT: u16 = 0x044E;
    pub const STOCK_BASE: u16 = 0x0450;
    pub const BARS: u16 = 0x0FCD;
    pub const NOTICE: u16 = 0x0FDB;
}

/// Идентификаторы команд
pub mod cmd {
    pub const DEVICE: u16 = 0x007B;
    pub const MARKET_INIT: u16 = 0x0094;
    pub const NOTICE: u16 = 0x0099;
    pub const STOCK_COUNT_SZ: u16 = 0x006B;
    pub const STOCK_COUNT_SH: u16 = 0x006C;
    pub const STOCK_BASE_SZ: u16 = 0x006D;
    pub const STOCK_BASE_SH: u16 = 0x006E;
    pub const STOCK_BONUS: u16 = 0x0076;
    pub const DAY_BARS: u16 = 0x0087;
    pub const MINUTE_BARS: u16 = 0x008D;
}

/// Шаг пагинации списка инструментов
pub const STOCK_BASE_PAGE: u16 = 1000;

/// Максимум инструментов в одном запросе по корпоративным событиям
pub const BONUS_BATCH_SIZE: usize = 200;

/// Индекс последнего пакета запросов по корпоративным событиям
pub const BONUS_TERMINAL_INDEX: u16 = 0x1100;

/// Индекс запроса-маркера, завершающего загрузку баров
pub const BARS_SENTINEL_INDEX: u16 = 0xFFFF;

/// Размер одной записи бара (дневного и минутного)
pub const BAR_RECORD_SIZE: usize = 32;

/// Смещение текста объявления брокера в ответе
pub const NOTICE_TEXT_OFFSET: usize = 0xB2;

/// Тело запроса объявления (фиксированное)
pub const NOTICE_PAYLOAD: [u8; 30] = [
    0x74, 0x64, 0x78, 0x6C, 0x65, 0x76, 0x65, 0x6C, 0x32, 0x00, 0x00, 0xAE, 0x47, 0xE9, 0x40, 0x04,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03,
];

/// Ключ Blowfish для регистрации устройства по умолчанию
pub const DEFAULT_DEVICE_KEY: &[u8] = b"tdxlevel2";

/// Версия клиентского ПО, которую сообщаем серверу
pub const DEFAULT_MAIN_VERSION: f32 = 7.29;

/// Версия движка данных
pub const DEFAULT_CORE_VERSION: f32 = 5.895;
