//! Дневные и минутные бары по всему списку инструментов.
//!
//! Индекс каждого запроса = позиция инструмента в списке + 1, по нему
//! обработчик находит, в чей файл дописать ответ. Запрос-маркер с индексом
//! 0xFFFF уходит последним, и его ответ завершает загрузку. Строгий порядок
//! ответов сервер не обещает: ответ, пришедший после маркера, попадает в
//! обработчик по умолчанию и теряется.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};

use tdx_core::constants::{BARS_SENTINEL_INDEX, event};
use tdx_core::{Market, RequestNode, Reply, Symbol, request};

use super::{Ctx, WorkflowError};
use crate::calendar::TradingCalendar;
use crate::dates;
use crate::dispatcher::Flow;
use crate::models::{DayRow, MinuteRow};
use crate::storage::{BarKind, CsvStore};

/// Начало истории дневных баров
pub(crate) const DAY_HISTORY_START: u32 = 19901219;

/// Сколько дней минутной истории брать для нового инструмента
pub(crate) const MINUTE_HISTORY_DAYS: i64 = 100;

/// Ширина запроса дневных баров в единицах yyyymmdd (4 года)
const DAY_CHUNK_SPAN: u32 = 40000;

/// Ширина окна минутных баров в рабочих днях
const MINUTE_CHUNK_WEEKDAYS: u32 = 15;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BarSummary {
    pub(crate) requests: usize,
    pub(crate) rows: usize,
    pub(crate) skipped: usize,
}

pub(crate) fn update_bars(
    ctx: &Ctx<'_>,
    kind: BarKind,
    universe: Arc<Vec<Symbol>>,
    store: &CsvStore,
    calendar: &TradingCalendar,
    today: u32,
) -> Result<BarSummary, WorkflowError> {
    if universe.len() >= BARS_SENTINEL_INDEX as usize {
        return Err(WorkflowError::TooManyInstruments(universe.len()));
    }

    let (done_tx, done_rx) = crossbeam_channel::bounded::<usize>(1);
    let saved = AtomicUsize::new(0);

    {
        let universe = universe.clone();
        let store = store.clone();
        ctx.dispatcher.add_handler(event::BARS, move |p| {
            if p.index() == BARS_SENTINEL_INDEX {
                let _ = done_tx.try_send(saved.load(Ordering::Relaxed));
                return Flow::Unregister;
            }

            let Some(symbol) = (p.index() as usize).checked_sub(1).and_then(|i| universe.get(i)) else {
                warn!("{} bars: reply index {} matches no instrument", kind.name(), p.index());
                return Flow::Continue;
            };

            match save_reply(&store, kind, symbol, &p.reply) {
                Ok(n) => {
                    saved.fetch_add(n, Ordering::Relaxed);
                }
                Err(e) => warn!("{} bars: dropping reply for {symbol}: {e}", kind.name()),
            }
            Flow::Continue
        });
    }

    let mut summary = BarSummary::default();
    for (pos, symbol) in universe.iter().enumerate() {
        let index = (pos + 1) as u16;

        let start = match resume_date(store, kind, symbol, today) {
            Ok(Some(start)) => start,
            Ok(None) => {
                debug!("{} bars: {symbol} is up to date", kind.name());
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!("{} bars: skipping {symbol}: {e}", kind.name());
                summary.skipped += 1;
                continue;
            }
        };

        let chunks = match kind {
            BarKind::Day => day_chunks(start, today),
            BarKind::Minute => minute_chunks(start, today, calendar),
        };
        info!(
            "{} bars: {symbol} from {start} ({}/{}, {} requests)",
            kind.name(),
            pos + 1,
            universe.len(),
            chunks.len()
        );

        for (from, to) in chunks {
            if let Err(e) = ctx.sink.send(&bar_request(kind, symbol, from, to, index)) {
                return ctx.abort(event::BARS, e);
            }
            summary.requests += 1;
        }
    }

    // маркер отправляется всегда, даже если запросов не было
    let sentinel = Symbol {
        market: Market::Sz,
        code: *b"000001",
    };
    if let Err(e) = ctx.sink.send(&bar_request(kind, &sentinel, today, today, BARS_SENTINEL_INDEX)) {
        return ctx.abort(event::BARS, e);
    }

    summary.rows = match ctx.wait(&done_rx, "bars sentinel", ctx.completion_timeout) {
        Ok(rows) => rows,
        Err(e) => return ctx.abort(event::BARS, e),
    };

    info!(
        "{} bars: done, {} requests, {} rows saved, {} instruments skipped",
        kind.name(),
        summary.requests,
        summary.rows,
        summary.skipped
    );
    Ok(summary)
}

fn bar_request(kind: BarKind, symbol: &Symbol, start: u32, end: u32, index: u16) -> RequestNode {
    match kind {
        BarKind::Day => request::stock_day_bars(symbol, start, end, index),
        BarKind::Minute => request::stock_minute_bars(symbol, start, end, index),
    }
}

fn save_reply(
    store: &CsvStore,
    kind: BarKind,
    symbol: &Symbol,
    reply: &Reply,
) -> Result<usize, WorkflowError> {
    match (kind, reply) {
        (BarKind::Day, Reply::DayBars(batch)) => {
            if let Some(fault) = &batch.fault {
                warn!("day bars: {symbol} reply cut short: {fault}");
            }
            let rows: Vec<DayRow> = batch.items.iter().map(DayRow::from).collect();
            if !rows.is_empty() {
                store.append_day_bars(symbol, &rows)?;
            }
            Ok(rows.len())
        }
        (BarKind::Minute, Reply::MinuteBars(batch)) => {
            if let Some(fault) = &batch.fault {
                warn!("minute bars: {symbol} reply cut short: {fault}");
            }
            let rows: Vec<MinuteRow> = batch.items.iter().map(MinuteRow::from).collect();
            if !rows.is_empty() {
                store.append_minute_bars(symbol, &rows)?;
            }
            Ok(rows.len())
        }
        (_, Reply::Malformed(e)) => {
            warn!("{} bars: undecodable reply for {symbol}: {e}", kind.name());
            Ok(0)
        }
        _ => {
            warn!("{} bars: unexpected reply for {symbol}", kind.name());
            Ok(0)
        }
    }
}

/// С какой даты запрашивать; `None` - данные уже по сегодня
fn resume_date(
    store: &CsvStore,
    kind: BarKind,
    symbol: &Symbol,
    today: u32,
) -> Result<Option<u32>, WorkflowError> {
    let start = match store.last_bar_date(kind, symbol)? {
        Some(last) => dates::add_days(last, 1).unwrap_or(last + 1),
        None => match kind {
            BarKind::Day => DAY_HISTORY_START,
            BarKind::Minute => dates::add_days(today, -MINUTE_HISTORY_DAYS).unwrap_or(today),
        },
    };
    Ok((start <= today).then_some(start))
}

/// [start, today] кусками не шире 40000 единиц yyyymmdd
pub(crate) fn day_chunks(start: u32, today: u32) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    let mut from = start;
    while from <= today {
        let to = (from + DAY_CHUNK_SPAN).min(today);
        out.push((from, to));
        from = match dates::add_days(to, 1) {
            Some(next) => next,
            None => break,
        };
    }
    out
}

/// [start, today] окнами по 15 рабочих дней; следующее окно начинается
/// со следующего торгового дня
pub(crate) fn minute_chunks(start: u32, today: u32, calendar: &TradingCalendar) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    let mut from = start;
    while from <= today {
        let to = dates::add_weekdays(from, MINUTE_CHUNK_WEEKDAYS)
            .unwrap_or(today)
            .min(today);
        out.push((from, to));
        from = match calendar.next_day(to).or_else(|| dates::add_days(to, 1)) {
            Some(next) => next,
            None => break,
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::{Duration, Instant};

    use tdx_core::DecodeError;
    use tdx_core::constants::cmd;
    use tdx_core::response::{Batch, StockDayItem, StockMinsItem};

    use crate::dispatcher::Dispatcher;
    use crate::testkit::{RecordingSink, batch, packet};
    use crate::workflows::test_ctx;

    fn sym(market: Market, code: &str) -> Symbol {
        Symbol::new(market, code).unwrap()
    }

    fn day_item(date: u32) -> StockDayItem {
        StockDayItem {
            date,
            open: 10.0,
            high: 10.5,
            low: 9.5,
            close: 10.1,
            amount: 1000.0,
            volume: 100,
        }
    }

    fn day_reply(index: u16, items: Vec<StockDayItem>) -> tdx_core::Packet {
        packet(event::BARS, cmd::DAY_BARS, index, Reply::DayBars(batch(items)))
    }

    fn range_of(req: &RequestNode) -> (u32, u32) {
        let d = &req.raw_data;
        (
            u32::from_le_bytes([d[8], d[9], d[10], d[11]]),
            u32::from_le_bytes([d[12], d[13], d[14], d[15]]),
        )
    }

    #[test]
    fn day_chunks_cover_range_without_gaps() {
        assert_eq!(
            day_chunks(19901219, 20240105),
            vec![
                (19901219, 19941219),
                (19941220, 19981220),
                (19981221, 20021221),
                (20021222, 20061222),
                (20061223, 20101223),
                (20101224, 20141224),
                (20141225, 20181225),
                (20181226, 20221226),
                (20221227, 20240105),
            ]
        );
        assert_eq!(day_chunks(20240105, 20240105), vec![(20240105, 20240105)]);
        assert!(day_chunks(20240106, 20240105).is_empty());
    }

    #[test]
    fn minute_chunks_jump_to_next_trading_day() {
        let cal = TradingCalendar::from_days([(20240123, true), (20240124, true), (20240125, true)]);
        // 20240102 + 15 рабочих дней = 20240123; следующий торговый - 24-е
        assert_eq!(
            minute_chunks(20240102, 20240131, &cal),
            vec![(20240102, 20240123), (20240124, 20240131)]
        );
        // без календаря - следующий календарный день
        let empty = TradingCalendar::default();
        assert_eq!(
            minute_chunks(20240102, 20240125, &empty),
            vec![(20240102, 20240123), (20240124, 20240125)]
        );
    }

    #[test]
    fn requests_are_tagged_by_position_and_end_with_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());
        let universe = Arc::new(vec![sym(Market::Sz, "000001"), sym(Market::Sh, "600000")]);

        // у второго инструмента уже есть данные по 20240103
        store.append_day_bars(&universe[1], &[DayRow::from(&day_item(20240103))]).unwrap();

        let sink = RecordingSink::new();
        let dispatcher = Arc::new(Dispatcher::with_fallback(|_| Flow::Continue));
        let (_closed_tx, closed_rx) = crossbeam_channel::bounded::<()>(1);
        let ctx = test_ctx::ctx(&sink, &dispatcher, &closed_rx);
        let cal = TradingCalendar::default();

        let summary = thread::scope(|s| {
            let worker = s.spawn(|| update_bars(&ctx, BarKind::Day, universe.clone(), &store, &cal, 20240105));

            let started = Instant::now();
            while !sink.sent().iter().any(|r| r.index == BARS_SENTINEL_INDEX) {
                assert!(started.elapsed() < Duration::from_secs(5), "sentinel was not sent");
                thread::sleep(Duration::from_millis(5));
            }

            dispatcher.dispatch(&day_reply(1, vec![day_item(19901219), day_item(19901220)]));
            dispatcher.dispatch(&day_reply(2, vec![day_item(20240104), day_item(20240105)]));
            dispatcher.dispatch(&day_reply(9, vec![day_item(20240105)]));
            dispatcher.dispatch(&day_reply(BARS_SENTINEL_INDEX, vec![day_item(20240105)]));

            worker.join().unwrap().unwrap()
        });

        let sent = sink.sent();
        let tags: Vec<u16> = sent.iter().map(|r| r.index).collect();
        assert_eq!(tags.iter().filter(|t| **t == 1).count(), 9);
        assert_eq!(&tags[9..], &[2, BARS_SENTINEL_INDEX]);
        assert_eq!(range_of(&sent[9]), (20240104, 20240105));
        assert!(sent.iter().all(|r| r.cmd_id == cmd::DAY_BARS));

        let last = sent.last().unwrap();
        assert_eq!(&last.raw_data[2..8], b"000001");
        assert_eq!(range_of(last), (20240105, 20240105));

        assert_eq!(summary, BarSummary { requests: 10, rows: 4, skipped: 0 });
        assert!(!dispatcher.has_handler(event::BARS));
        assert_eq!(store.last_bar_date(BarKind::Day, &universe[0]).unwrap(), Some(19901220));
        assert_eq!(store.last_bar_date(BarKind::Day, &universe[1]).unwrap(), Some(20240105));
    }

    #[test]
    fn up_to_date_and_unreadable_instruments_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());
        let fresh = sym(Market::Sz, "000002");
        let broken = sym(Market::Sz, "000003");
        let universe = Arc::new(vec![fresh, broken]);

        let minute = MinuteRow {
            date: 20240105,
            time: "15:00:00".to_string(),
            open: 1.0,
            low: 1.0,
            high: 1.0,
            close: 1.0,
            volume: 1,
            amount: 1.0,
        };
        store.append_minute_bars(&fresh, &[minute]).unwrap();
        let path = store.bar_path(BarKind::Minute, &broken);
        fs::write(&path, "date,time\nnot-a-date,09:31:00\n").unwrap();

        let dispatcher = Arc::new(Dispatcher::with_fallback(|_| Flow::Continue));
        let sink = RecordingSink::responding(dispatcher.clone(), |req: &RequestNode| {
            vec![packet(
                event::BARS,
                cmd::MINUTE_BARS,
                req.index,
                Reply::MinuteBars(Batch::<StockMinsItem> {
                    items: Vec::new(),
                    fault: None,
                }),
            )]
        });
        let (_closed_tx, closed_rx) = crossbeam_channel::bounded::<()>(1);
        let ctx = test_ctx::ctx(&sink, &dispatcher, &closed_rx);

        let summary = update_bars(
            &ctx,
            BarKind::Minute,
            universe,
            &store,
            &TradingCalendar::default(),
            20240105,
        )
        .unwrap();

        assert_eq!(summary, BarSummary { requests: 0, rows: 0, skipped: 2 });
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].index, BARS_SENTINEL_INDEX);
        assert_eq!(sent[0].cmd_id, cmd::MINUTE_BARS);
    }

    #[test]
    fn undecodable_sentinel_reply_still_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());
        let universe = Arc::new(vec![sym(Market::Sh, "600000")]);

        // короткое тело на каждый запрос, включая маркер
        let dispatcher = Arc::new(Dispatcher::with_fallback(|_| Flow::Continue));
        let sink = RecordingSink::responding(dispatcher.clone(), |req: &RequestNode| {
            vec![packet(
                event::BARS,
                cmd::DAY_BARS,
                req.index,
                Reply::Malformed(DecodeError::Truncated {
                    what: "day bars",
                    offset: 0,
                    need: 2,
                    have: 0,
                }),
            )]
        });
        let (_closed_tx, closed_rx) = crossbeam_channel::bounded::<()>(1);
        let ctx = test_ctx::ctx(&sink, &dispatcher, &closed_rx);

        let summary = update_bars(&ctx, BarKind::Day, universe.clone(), &store, &TradingCalendar::default(), 20240105)
            .unwrap();

        assert_eq!(summary, BarSummary { requests: 9, rows: 0, skipped: 0 });
        assert!(!dispatcher.has_handler(event::BARS));
        assert_eq!(store.last_bar_date(BarKind::Day, &universe[0]).unwrap(), None);
    }

    #[test]
    fn universe_larger_than_tag_space_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());
        let sink = RecordingSink::new();
        let dispatcher = Arc::new(Dispatcher::with_fallback(|_| Flow::Continue));
        let (_closed_tx, closed_rx) = crossbeam_channel::bounded::<()>(1);
        let ctx = test_ctx::ctx(&sink, &dispatcher, &closed_rx);

        let universe = Arc::new(vec![sym(Market::Sz, "000001"); 0xFFFF]);
        let err = update_bars(&ctx, BarKind::Day, universe, &store, &TradingCalendar::default(), 20240105)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::TooManyInstruments(0xFFFF)));
        assert!(sink.sent().is_empty());
        assert!(!dispatcher.has_handler(event::BARS));
    }
}
