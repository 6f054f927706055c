use std::sync::Mutex;

use log::{debug, info, warn};

use tdx_core::constants::{STOCK_BASE_PAGE, event};
use tdx_core::{Market, Reply, request};

use super::{Ctx, WorkflowError};
use crate::dispatcher::Flow;
use crate::models::StockBaseRow;
use crate::storage::CsvStore;

/// Справочник инструментов обеих бирж.
///
/// Страницы запрашиваются все сразу (по 1000 с шагом смещения), ответы
/// копятся в обработчике; завершение - когда записей не меньше, чем сумма
/// количеств, полученных при подключении. Возвращает число записей.
pub(crate) fn update_stock_base(
    ctx: &Ctx<'_>,
    counts: [(Market, u16); 2],
    store: &CsvStore,
) -> Result<usize, WorkflowError> {
    let expected: usize = counts.iter().map(|(_, c)| *c as usize).sum();
    if expected == 0 {
        info!("stock base: server reports no instruments");
        store.write_stock_list(&[])?;
        return Ok(0);
    }

    let (done_tx, done_rx) = crossbeam_channel::bounded::<Vec<StockBaseRow>>(1);
    let rows = Mutex::new(Vec::with_capacity(expected));

    ctx.dispatcher.add_handler(event::STOCK_BASE, move |p| {
        let Reply::StockBase { market, batch } = &p.reply else {
            warn!("stock base: unexpected reply on event {:#06x}", p.event_id());
            return Flow::Continue;
        };
        if let Some(fault) = &batch.fault {
            warn!("stock base: page {} cut short: {fault}", p.index());
        }

        let mut rows = match rows.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        rows.extend(batch.items.iter().map(|item| StockBaseRow::from_item(*market, item)));
        debug!("stock base: {} of {expected}", rows.len());

        if rows.len() < expected {
            return Flow::Continue;
        }
        let _ = done_tx.try_send(std::mem::take(&mut *rows));
        Flow::Unregister
    });

    for (market, count) in counts {
        for offset in (0..count).step_by(STOCK_BASE_PAGE as usize) {
            if let Err(e) = ctx.sink.send(&request::market_stock_base(market, offset)) {
                return ctx.abort(event::STOCK_BASE, e);
            }
        }
    }

    let rows = match ctx.wait(&done_rx, "stock base", ctx.completion_timeout) {
        Ok(rows) => rows,
        Err(e) => return ctx.abort(event::STOCK_BASE, e),
    };

    store.write_stock_list(&rows)?;
    info!("stock base: {} instruments saved to {:?}", rows.len(), store.stock_list_path());
    Ok(rows.len())
}
