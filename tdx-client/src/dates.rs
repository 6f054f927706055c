//! Даты в формате yyyymmdd (u32), как их передаёт сервер.

use chrono::{Datelike, Days, Local, NaiveDate, Weekday};

pub(crate) fn today() -> u32 {
    from_date(Local::now().date_naive())
}

pub(crate) fn to_date(yyyymmdd: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        (yyyymmdd / 10000) as i32,
        yyyymmdd / 100 % 100,
        yyyymmdd % 100,
    )
}

pub(crate) fn from_date(d: NaiveDate) -> u32 {
    d.year() as u32 * 10000 + d.month() * 100 + d.day()
}

pub(crate) fn add_days(yyyymmdd: u32, days: i64) -> Option<u32> {
    let d = to_date(yyyymmdd)?;
    let d = if days >= 0 {
        d.checked_add_days(Days::new(days as u64))?
    } else {
        d.checked_sub_days(Days::new(days.unsigned_abs()))?
    };
    Some(from_date(d))
}

/// Сдвиг на `n` рабочих дней (пн-пт), выходные не считаются
pub(crate) fn add_weekdays(yyyymmdd: u32, n: u32) -> Option<u32> {
    let mut d = to_date(yyyymmdd)?;
    let mut left = n;
    while left > 0 {
        d = d.succ_opt()?;
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            left -= 1;
        }
    }
    Some(from_date(d))
}
