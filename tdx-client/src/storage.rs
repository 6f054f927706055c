//! CSV-хранилище: справочник, события и по файлу баров на инструмент.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use tdx_core::Symbol;

use crate::config::Config;
use crate::models::{DayRow, MinuteRow, StockBaseRow, StockBonusRow};

#[derive(Debug, Error)]
pub(crate) enum StorageError {
    #[error("i/o error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error on {path:?}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("bad row in {path:?}: {reason}")]
    BadRow { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BarKind {
    Day,
    Minute,
}

impl BarKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            BarKind::Day => "day",
            BarKind::Minute => "minute",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CsvStore {
    stock_list: PathBuf,
    stock_bonus: PathBuf,
    day_dir: PathBuf,
    min_dir: PathBuf,
}

impl CsvStore {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            stock_list: config.stock_list_path(),
            stock_bonus: config.stock_bonus_path(),
            day_dir: config.stock_day_dir(),
            min_dir: config.stock_min_dir(),
        }
    }

    #[cfg(test)]
    pub(crate) fn in_dir(root: &Path) -> Self {
        Self {
            stock_list: root.join("stock_list.csv"),
            stock_bonus: root.join("stock_bonus.csv"),
            day_dir: root.join("days"),
            min_dir: root.join("mins"),
        }
    }

    pub(crate) fn stock_list_path(&self) -> &Path {
        &self.stock_list
    }

    pub(crate) fn stock_bonus_path(&self) -> &Path {
        &self.stock_bonus
    }

    pub(crate) fn bar_path(&self, kind: BarKind, symbol: &Symbol) -> PathBuf {
        let dir = match kind {
            BarKind::Day => &self.day_dir,
            BarKind::Minute => &self.min_dir,
        };
        dir.join(format!("{symbol}.csv"))
    }

    /// Перезаписывает справочник целиком
    pub(crate) fn write_stock_list(&self, rows: &[StockBaseRow]) -> Result<(), StorageError> {
        write_table(&self.stock_list, &StockBaseRow::HEADERS, rows)
    }

    pub(crate) fn read_stock_list(&self) -> Result<Vec<StockBaseRow>, StorageError> {
        read_table(&self.stock_list)
    }

    /// Перезаписывает таблицу событий целиком
    pub(crate) fn write_stock_bonus(&self, rows: &[StockBonusRow]) -> Result<(), StorageError> {
        write_table(&self.stock_bonus, &StockBonusRow::HEADERS, rows)
    }

    #[cfg(test)]
    pub(crate) fn read_stock_bonus(&self) -> Result<Vec<StockBonusRow>, StorageError> {
        read_table(&self.stock_bonus)
    }

    pub(crate) fn append_day_bars(&self, symbol: &Symbol, rows: &[DayRow]) -> Result<(), StorageError> {
        append_table(&self.bar_path(BarKind::Day, symbol), &DayRow::HEADERS, rows)
    }

    pub(crate) fn append_minute_bars(&self, symbol: &Symbol, rows: &[MinuteRow]) -> Result<(), StorageError> {
        append_table(&self.bar_path(BarKind::Minute, symbol), &MinuteRow::HEADERS, rows)
    }

    /// Дата последнего сохранённого бара; `None`, если данных ещё нет
    pub(crate) fn last_bar_date(&self, kind: BarKind, symbol: &Symbol) -> Result<Option<u32>, StorageError> {
        let path = self.bar_path(kind, symbol);
        if !path.exists() {
            return Ok(None);
        }

        let csv_err = |source| StorageError::Csv {
            path: path.clone(),
            source,
        };
        let mut rdr = csv::Reader::from_path(&path).map_err(csv_err)?;

        // первая колонка обеих таблиц баров - date
        let mut last = None;
        for record in rdr.records() {
            let record = record.map_err(csv_err)?;
            if let Some(date) = record.get(0) {
                let date = date.trim().parse::<u32>().map_err(|e| StorageError::BadRow {
                    path: path.clone(),
                    reason: format!("bad date {date:?}: {e}"),
                })?;
                last = Some(date);
            }
        }
        Ok(last)
    }
}

fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn write_table<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<(), StorageError> {
    ensure_parent(path)?;
    let file = fs::File::create(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_rows(path, file, true, headers, rows)?;
    debug!("wrote {} rows to {path:?}", rows.len());
    Ok(())
}

fn append_table<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<(), StorageError> {
    ensure_parent(path)?;
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    write_rows(path, file, is_new, headers, rows)
}

fn write_rows<T: Serialize>(
    path: &Path,
    file: fs::File,
    with_header: bool,
    headers: &[&str],
    rows: &[T],
) -> Result<(), StorageError> {
    let csv_err = |source| StorageError::Csv {
        path: path.to_path_buf(),
        source,
    };

    // заголовок пишем сами, чтобы он был и у пустой таблицы
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if with_header {
        wtr.write_record(headers).map_err(csv_err)?;
    }
    for row in rows {
        wtr.serialize(row).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    let csv_err = |source| StorageError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::Reader::from_path(path).map_err(csv_err)?;
    rdr.deserialize().collect::<Result<Vec<T>, _>>().map_err(csv_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tdx_core::Market;

    fn base_row(code: &str) -> StockBaseRow {
        StockBaseRow {
            code: code.to_string(),
            name: "平安银行".to_string(),
            market: 0,
            unknown1: 100,
            unknown2: 0,
            unknown3: 2,
            price: 10.5,
            bonus1: 1,
            bonus2: 2,
        }
    }

    fn day(date: u32) -> DayRow {
        DayRow {
            date,
            open: 10.0,
            low: 9.5,
            high: 10.5,
            close: 10.2,
            volume: 1000,
            amount: 10200.0,
        }
    }

    #[test]
    fn stock_list_is_rewritten_not_appended() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());

        store.write_stock_list(&[base_row("000001"), base_row("000002")]).unwrap();
        store.write_stock_list(&[base_row("000003")]).unwrap();

        let rows = store.read_stock_list().unwrap();
        assert_eq!(rows, vec![base_row("000003")]);
    }

    #[test]
    fn empty_table_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());

        store.write_stock_bonus(&[]).unwrap();
        let text = fs::read_to_string(store.stock_bonus_path()).unwrap();
        assert_eq!(text.trim_end(), "code,date,market,type,money,price,count,rate");
        assert!(store.read_stock_bonus().unwrap().is_empty());
    }

    #[test]
    fn bars_append_with_single_header_and_report_last_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());
        let sym = Symbol::new(Market::Sh, "600000").unwrap();

        assert_eq!(store.last_bar_date(BarKind::Day, &sym).unwrap(), None);

        store.append_day_bars(&sym, &[day(20240102), day(20240103)]).unwrap();
        store.append_day_bars(&sym, &[day(20240104)]).unwrap();

        let path = store.bar_path(BarKind::Day, &sym);
        assert!(path.ends_with("days/1600000.csv"));
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("date,open").count(), 1);
        assert_eq!(store.last_bar_date(BarKind::Day, &sym).unwrap(), Some(20240104));
        assert_eq!(store.last_bar_date(BarKind::Minute, &sym).unwrap(), None);
    }

    #[test]
    fn corrupt_bar_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());
        let sym = Symbol::new(Market::Sz, "000001").unwrap();

        let path = store.bar_path(BarKind::Minute, &sym);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "date,time\nyesterday,09:31:00\n").unwrap();

        assert!(matches!(
            store.last_bar_date(BarKind::Minute, &sym),
            Err(StorageError::BadRow { .. })
        ));
    }
}
