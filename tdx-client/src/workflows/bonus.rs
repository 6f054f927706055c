use std::sync::Mutex;

use log::{debug, info, warn};

use tdx_core::constants::{BONUS_BATCH_SIZE, BONUS_TERMINAL_INDEX, event};
use tdx_core::{Reply, Symbol, request};

use super::{Ctx, WorkflowError};
use crate::dispatcher::Flow;
use crate::models::StockBonusRow;
use crate::storage::CsvStore;

/// Корпоративные события для списка инструментов.
///
/// Пакеты по 200 инструментов уходят строго по одному: следующий только после
/// подтверждения предыдущего. Подтверждение - сколько инструментов сервер
/// обработал; на столько и сдвигается курсор. Последний пакет (не больше 200)
/// уходит с индексом 0x1100, его ответ завершает загрузку.
pub(crate) fn update_stock_bonus(
    ctx: &Ctx<'_>,
    symbols: &[Symbol],
    store: &CsvStore,
) -> Result<usize, WorkflowError> {
    if symbols.is_empty() {
        info!("stock bonus: no instruments with pending events");
        store.write_stock_bonus(&[])?;
        return Ok(0);
    }

    let (ack_tx, ack_rx) = crossbeam_channel::bounded::<u16>(1);
    let (done_tx, done_rx) = crossbeam_channel::bounded::<Vec<StockBonusRow>>(1);
    let rows = Mutex::new(Vec::new());

    ctx.dispatcher.add_handler(event::STOCK_BONUS, move |p| {
        // завершение определяется по индексу, даже если тело не разобралось
        let terminal = p.index() == BONUS_TERMINAL_INDEX;
        let mut rows = match rows.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        match &p.reply {
            Reply::StockBonus(reply) => {
                if let Some(fault) = &reply.records.fault {
                    warn!("stock bonus: batch cut short: {fault}");
                }
                rows.extend(reply.records.items.iter().map(StockBonusRow::from));
                if !terminal && ack_tx.try_send(reply.symbol_count).is_err() {
                    warn!("stock bonus: unexpected acknowledgement ({} symbols)", reply.symbol_count);
                }
            }
            Reply::Malformed(e) => warn!("stock bonus: undecodable reply (index {:#06x}): {e}", p.index()),
            _ => warn!("stock bonus: unexpected reply on event {:#06x}", p.event_id()),
        }

        if terminal {
            let _ = done_tx.try_send(std::mem::take(&mut *rows));
            return Flow::Unregister;
        }
        Flow::Continue
    });

    let mut cursor = 0;
    while symbols.len() - cursor > BONUS_BATCH_SIZE {
        let batch = &symbols[cursor..cursor + BONUS_BATCH_SIZE];
        let req = match request::stock_bonus(batch, 0) {
            Ok(req) => req,
            Err(e) => return ctx.abort(event::STOCK_BONUS, e),
        };
        if let Err(e) = ctx.sink.send(&req) {
            return ctx.abort(event::STOCK_BONUS, e);
        }

        let done = match ctx.wait(&ack_rx, "stock bonus ack", ctx.ack_timeout) {
            Ok(n) => n as usize,
            Err(e) => return ctx.abort(event::STOCK_BONUS, e),
        };
        if done == 0 {
            return ctx.abort(event::STOCK_BONUS, WorkflowError::NoProgress("stock bonus"));
        }
        cursor += done.min(BONUS_BATCH_SIZE);
        debug!("stock bonus: {cursor} of {} symbols", symbols.len());
    }

    let last = match request::stock_bonus(&symbols[cursor..], BONUS_TERMINAL_INDEX) {
        Ok(req) => req,
        Err(e) => return ctx.abort(event::STOCK_BONUS, e),
    };
    if let Err(e) = ctx.sink.send(&last) {
        return ctx.abort(event::STOCK_BONUS, e);
    }

    let rows = match ctx.wait(&done_rx, "stock bonus", ctx.completion_timeout) {
        Ok(rows) => rows,
        Err(e) => return ctx.abort(event::STOCK_BONUS, e),
    };

    store.write_stock_bonus(&rows)?;
    info!("stock bonus: {} events saved to {:?}", rows.len(), store.stock_bonus_path());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tdx_core::constants::cmd;
    use tdx_core::response::{BonusKind, BonusReply, StockBonusItem};
    use tdx_core::{DecodeError, Market, Packet, RequestNode};

    use crate::dispatcher::Dispatcher;
    use crate::testkit::{RecordingSink, batch, packet};
    use crate::workflows::test_ctx;

    fn universe(n: usize) -> Vec<Symbol> {
        (0..n)
            .map(|i| Symbol::new(Market::Sz, &format!("{:06}", i)).unwrap())
            .collect()
    }

    fn batch_len(req: &RequestNode) -> usize {
        u16::from_le_bytes([req.raw_data[0], req.raw_data[1]]) as usize
    }

    fn first_code(req: &RequestNode) -> String {
        String::from_utf8(req.raw_data[3..9].to_vec()).unwrap()
    }

    fn event_item(code: &[u8; 6]) -> StockBonusItem {
        StockBonusItem {
            market: Market::Sz,
            code: *code,
            date: 20240105,
            kind: BonusKind::from_u8(1).unwrap(),
            money: 1.5,
            price: 0.0,
            count: 0.0,
            rate: 0.0,
        }
    }

    /// Сервер: подтверждает `ack(n)` из n символов пакета, на последний
    /// пакет отвечает по событию на каждый символ.
    fn server(dispatcher: &Arc<Dispatcher>, ack: fn(usize) -> u16) -> RecordingSink {
        RecordingSink::responding(dispatcher.clone(), move |req: &RequestNode| -> Vec<Packet> {
            let n = batch_len(req);
            let items = if req.index == BONUS_TERMINAL_INDEX {
                req.raw_data[2..]
                    .chunks(7)
                    .map(|c| event_item(&[c[1], c[2], c[3], c[4], c[5], c[6]]))
                    .collect()
            } else {
                Vec::new()
            };
            vec![packet(
                event::STOCK_BONUS,
                cmd::STOCK_BONUS,
                req.index,
                Reply::StockBonus(BonusReply {
                    symbol_count: ack(n),
                    records: batch(items),
                }),
            )]
        })
    }

    type Outcome = (
        Result<usize, WorkflowError>,
        Vec<RequestNode>,
        CsvStore,
        Arc<Dispatcher>,
        tempfile::TempDir,
    );

    fn run(symbols: &[Symbol], ack: fn(usize) -> u16) -> Outcome {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());
        let dispatcher = Arc::new(Dispatcher::with_fallback(|_| Flow::Continue));
        let sink = server(&dispatcher, ack);
        let (_closed_tx, closed_rx) = crossbeam_channel::bounded::<()>(1);
        let ctx = test_ctx::ctx(&sink, &dispatcher, &closed_rx);

        let res = update_stock_bonus(&ctx, symbols, &store);
        let sent = sink.sent();
        (res, sent, store, dispatcher, dir)
    }

    #[test]
    fn batches_of_200_with_terminal_last() {
        let symbols = universe(450);
        let (res, sent, store, dispatcher, _dir) = run(&symbols, |n| n as u16);

        assert_eq!(res.unwrap(), 50);
        let sizes: Vec<usize> = sent.iter().map(batch_len).collect();
        assert_eq!(sizes, vec![200, 200, 50]);
        let firsts: Vec<String> = sent.iter().map(first_code).collect();
        assert_eq!(firsts, vec!["000000", "000200", "000400"]);

        let indexes: Vec<u16> = sent.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![0, 0, BONUS_TERMINAL_INDEX]);

        assert!(!dispatcher.has_handler(event::STOCK_BONUS));
        let rows = store.read_stock_bonus().unwrap();
        assert_eq!(rows.len(), 50);
        assert_eq!(rows[0].code, "000400");
        assert_eq!(rows[0].kind, 1);
    }

    #[test]
    fn partial_ack_moves_cursor_by_ack() {
        let symbols = universe(450);
        let (res, sent, _store, _d, _dir) = run(&symbols, |n| (n / 2) as u16);

        assert!(res.is_ok());
        let firsts: Vec<String> = sent.iter().map(first_code).collect();
        // каждый пакет сдвигает курсор на 100; с 300 осталось 150 - последний пакет
        assert_eq!(firsts, vec!["000000", "000100", "000200", "000300"]);
        assert_eq!(batch_len(sent.last().unwrap()), 150);
        assert_eq!(sent.last().unwrap().index, BONUS_TERMINAL_INDEX);
    }

    #[test]
    fn small_universe_is_a_single_terminal_batch() {
        let symbols = universe(200);
        let (res, sent, _store, _d, _dir) = run(&symbols, |n| n as u16);

        assert_eq!(res.unwrap(), 200);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].index, BONUS_TERMINAL_INDEX);
    }

    #[test]
    fn zero_ack_aborts() {
        let symbols = universe(300);
        let (res, sent, _store, dispatcher, _dir) = run(&symbols, |_| 0);

        assert!(matches!(res, Err(WorkflowError::NoProgress(_))));
        assert_eq!(sent.len(), 1);
        assert!(!dispatcher.has_handler(event::STOCK_BONUS));
    }

    #[test]
    fn undecodable_terminal_reply_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::in_dir(dir.path());
        let dispatcher = Arc::new(Dispatcher::with_fallback(|_| Flow::Continue));
        let sink = RecordingSink::responding(dispatcher.clone(), |req: &RequestNode| {
            let reply = if req.index == BONUS_TERMINAL_INDEX {
                Reply::Malformed(DecodeError::Truncated {
                    what: "stock bonus",
                    offset: 0,
                    need: 2,
                    have: 0,
                })
            } else {
                Reply::StockBonus(BonusReply {
                    symbol_count: batch_len(req) as u16,
                    records: batch(vec![event_item(b"000001")]),
                })
            };
            vec![packet(event::STOCK_BONUS, cmd::STOCK_BONUS, req.index, reply)]
        });
        let (_closed_tx, closed_rx) = crossbeam_channel::bounded::<()>(1);
        let ctx = test_ctx::ctx(&sink, &dispatcher, &closed_rx);

        let res = update_stock_bonus(&ctx, &universe(250), &store);

        assert_eq!(res.unwrap(), 1);
        assert_eq!(sink.sent().len(), 2);
        assert!(!dispatcher.has_handler(event::STOCK_BONUS));
        assert_eq!(store.read_stock_bonus().unwrap().len(), 1);
    }

    #[test]
    fn empty_universe_writes_empty_table() {
        let (res, sent, store, _d, _dir) = run(&[], |n| n as u16);
        assert_eq!(res.unwrap(), 0);
        assert!(sent.is_empty());
        assert!(store.read_stock_bonus().unwrap().is_empty());
    }
}
