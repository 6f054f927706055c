use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum CalendarError {
    #[error("failed to read trading calendar: {path:?}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("bad calendar row in {path:?}: {reason}")]
    BadRow { path: PathBuf, reason: String },
}

#[derive(Debug, Deserialize)]
struct CalendarRow {
    #[serde(rename = "calendarDate")]
    calendar_date: String,
    #[serde(rename = "isOpen")]
    is_open: String,
}

/// Торговый календарь: дата -> открыта ли биржа
#[derive(Debug, Clone, Default)]
pub(crate) struct TradingCalendar {
    days: BTreeMap<u32, bool>,
}

impl TradingCalendar {
    pub(crate) fn from_days<I>(days: I) -> Self
    where
        I: IntoIterator<Item = (u32, bool)>,
    {
        Self {
            days: days.into_iter().collect(),
        }
    }

    /// CSV с колонками `calendarDate` (yyyy-mm-dd или yyyymmdd) и `isOpen`
    pub(crate) fn load(path: &Path) -> Result<Self, CalendarError> {
        let csv_err = |source| CalendarError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut rdr = csv::Reader::from_path(path).map_err(csv_err)?;

        let mut days = BTreeMap::new();
        for row in rdr.deserialize::<CalendarRow>() {
            let row = row.map_err(csv_err)?;
            let date = parse_date(&row.calendar_date).ok_or_else(|| CalendarError::BadRow {
                path: path.to_path_buf(),
                reason: format!("bad date {:?}", row.calendar_date),
            })?;
            let open = parse_flag(&row.is_open).ok_or_else(|| CalendarError::BadRow {
                path: path.to_path_buf(),
                reason: format!("bad isOpen {:?}", row.is_open),
            })?;
            days.insert(date, open);
        }

        info!("trading calendar loaded: {} days from {path:?}", days.len());
        Ok(Self::from_days(days))
    }

    /// Загружает календарь один раз; дальше отдаёт уже загруженный
    pub(crate) fn load_or_reuse(slot: &mut Option<Arc<Self>>, path: &Path) -> Result<Arc<Self>, CalendarError> {
        if let Some(cal) = slot {
            return Ok(cal.clone());
        }
        let cal = Arc::new(Self::load(path)?);
        *slot = Some(cal.clone());
        Ok(cal)
    }

    /// Первый торговый день строго после даты
    pub(crate) fn next_day(&self, yyyymmdd: u32) -> Option<u32> {
        self.days
            .range(yyyymmdd.saturating_add(1)..)
            .find(|(_, open)| **open)
            .map(|(d, _)| *d)
    }

    /// Последний торговый день строго до даты
    pub(crate) fn prev_day(&self, yyyymmdd: u32) -> Option<u32> {
        self.days
            .range(..yyyymmdd)
            .rev()
            .find(|(_, open)| **open)
            .map(|(d, _)| *d)
    }
}

fn parse_date(raw: &str) -> Option<u32> {
    let digits: String = raw.trim().chars().filter(|c| *c != '-').collect();
    if digits.len() != 8 {
        return None;
    }
    let v = digits.parse::<u32>().ok()?;
    crate::dates::to_date(v).map(|_| v)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}
