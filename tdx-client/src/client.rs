//! Клиент: одна сессия, диспетчер, общее состояние рынка и загрузки поверх них.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, select};
use log::{info, warn};

use tdx_core::constants::event;
use tdx_core::response::MarketInitInfo;
use tdx_core::{Market, Reply, Symbol, request};

use crate::calendar::TradingCalendar;
use crate::charset::gbk_to_utf8;
use crate::config::Config;
use crate::dates;
use crate::dispatcher::{Dispatcher, Flow};
use crate::session::{PacketSink, Session, SessionOptions};
use crate::storage::{BarKind, CsvStore};
use crate::universe::{self, Category};
use crate::workflows::bars::{self, BarSummary};
use crate::workflows::{Ctx, WorkflowError, bonus, stock_base};

/// Что клиент знает о рынке после подключения
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MarketState {
    pub(crate) server_name: String,
    pub(crate) domain: String,
    pub(crate) sz_date: u32,
    pub(crate) sz_flag: u32,
    pub(crate) sh_date: u32,
    pub(crate) sh_flag: u32,
    pub(crate) sz_count: u16,
    pub(crate) sh_count: u16,
}

impl MarketState {
    fn apply_init(&mut self, info: &MarketInitInfo) {
        self.server_name = gbk_to_utf8(&info.server_name);
        self.domain = gbk_to_utf8(&info.domain);
        self.sz_date = info.sz_date;
        self.sz_flag = info.sz_flag;
        self.sh_date = info.sh_date;
        self.sh_flag = info.sh_flag;
    }

    pub(crate) fn count(&self, market: Market) -> u16 {
        match market {
            Market::Sz => self.sz_count,
            Market::Sh => self.sh_count,
        }
    }

    fn set_count(&mut self, market: Market, count: u16) {
        match market {
            Market::Sz => self.sz_count = count,
            Market::Sh => self.sh_count = count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ready {
    Init,
    Count(Market),
}

pub(crate) type SharedState = Arc<RwLock<MarketState>>;

pub(crate) struct TdxClient {
    config: Config,
    session: Session,
    dispatcher: Arc<Dispatcher>,
    closed: Receiver<()>,
    state: SharedState,
    store: CsvStore,
    calendar: Option<Arc<TradingCalendar>>,
}

fn read_state(state: &SharedState) -> MarketState {
    match state.read() {
        Ok(g) => g.clone(),
        Err(poisoned) => {
            warn!("market state lock poisoned; continuing");
            poisoned.into_inner().clone()
        }
    }
}

fn update_state(state: &SharedState, f: impl FnOnce(&mut MarketState)) {
    match state.write() {
        Ok(mut g) => f(&mut g),
        Err(poisoned) => {
            warn!("market state lock poisoned; continuing");
            f(&mut poisoned.into_inner())
        }
    }
}

impl TdxClient {
    /// Подключение и рукопожатие: регистрация устройства, даты рынков,
    /// количество инструментов на обеих биржах, объявление брокера.
    /// Возвращается, когда даты и оба количества получены.
    pub(crate) fn connect(config: Config, shutdown: Arc<AtomicBool>) -> Result<Self, WorkflowError> {
        let client_cfg = &config.tdx.client;
        let dispatcher = Arc::new(Dispatcher::new());
        let session = Session::connect(
            &config.tdx.server.data_host,
            dispatcher.clone(),
            SessionOptions {
                read_tick: client_cfg.read_tick(),
                connect_timeout: client_cfg.connect_timeout(),
            },
            shutdown,
        )?;
        let closed = session.closed();
        let state: SharedState = Arc::new(RwLock::new(MarketState::default()));

        handshake(
            &session,
            &dispatcher,
            &closed,
            &state,
            &config,
            dates::today(),
        )?;

        let snapshot = read_state(&state);
        info!(
            "server {:?} ({}) sz: date={} count={}, sh: date={} count={}",
            snapshot.server_name,
            session.peer(),
            snapshot.sz_date,
            snapshot.sz_count,
            snapshot.sh_date,
            snapshot.sh_count
        );

        Ok(Self {
            store: CsvStore::new(&config),
            config,
            session,
            dispatcher,
            closed,
            state,
            calendar: None,
        })
    }

    pub(crate) fn state(&self) -> MarketState {
        read_state(&self.state)
    }

    fn ctx(&self) -> Ctx<'_> {
        Ctx {
            sink: &self.session,
            dispatcher: &self.dispatcher,
            closed: &self.closed,
            completion_timeout: self.config.tdx.client.completion_timeout(),
            ack_timeout: self.config.tdx.client.ack_timeout(),
        }
    }

    /// Календарь загружается при первом обращении
    pub(crate) fn calendar(&mut self) -> Result<Arc<TradingCalendar>, WorkflowError> {
        let path = self.config.calendar_path();
        Ok(TradingCalendar::load_or_reuse(&mut self.calendar, &path)?)
    }

    pub(crate) fn update_stock_base(&self) -> Result<usize, WorkflowError> {
        let st = self.state();
        info!("stock base: expecting {} + {} instruments", st.sz_count, st.sh_count);
        stock_base::update_stock_base(
            &self.ctx(),
            Market::ALL.map(|m| (m, st.count(m))),
            &self.store,
        )
    }

    pub(crate) fn update_stock_bonus(&self) -> Result<usize, WorkflowError> {
        let rows = self.store.read_stock_list()?;
        let traded = universe::select(&rows, &Category::TRADED);
        let symbols = universe::symbols(&universe::pending_bonus(&traded));
        info!("stock bonus: {} of {} instruments have pending events", symbols.len(), rows.len());
        bonus::update_stock_bonus(&self.ctx(), &symbols, &self.store)
    }

    pub(crate) fn update_days(&mut self) -> Result<BarSummary, WorkflowError> {
        self.update_bars(BarKind::Day)
    }

    pub(crate) fn update_mins(&mut self) -> Result<BarSummary, WorkflowError> {
        self.update_bars(BarKind::Minute)
    }

    fn update_bars(&mut self, kind: BarKind) -> Result<BarSummary, WorkflowError> {
        let calendar = bar_calendar(kind, || self.calendar())?;
        let rows = self.store.read_stock_list()?;
        let symbols: Arc<Vec<Symbol>> =
            Arc::new(universe::symbols(&universe::select(&rows, &Category::TRADED)));
        info!("{} bars: {} instruments", kind.name(), symbols.len());
        bars::update_bars(&self.ctx(), kind, symbols, &self.store, &calendar, dates::today())
    }

    pub(crate) fn close(mut self) {
        match self.session.close() {
            Ok(()) => info!("session closed"),
            Err(e) => warn!("session closed with error: {e}"),
        }
    }
}

/// Календарь нужен только минутным окнам; дневным барам он не нужен,
/// и отсутствие файла их не останавливает
fn bar_calendar<F>(kind: BarKind, load: F) -> Result<Arc<TradingCalendar>, WorkflowError>
where
    F: FnOnce() -> Result<Arc<TradingCalendar>, WorkflowError>,
{
    match kind {
        BarKind::Day => Ok(Arc::default()),
        BarKind::Minute => {
            let calendar = load()?;
            let last_session = dates::add_days(dates::today(), 1).and_then(|d| calendar.prev_day(d));
            info!("minute bars: last trading day {last_session:?}");
            Ok(calendar)
        }
    }
}

fn handshake(
    sink: &dyn PacketSink,
    dispatcher: &Arc<Dispatcher>,
    closed: &Receiver<()>,
    state: &SharedState,
    config: &Config,
    today: u32,
) -> Result<(), WorkflowError> {
    let client_cfg = &config.tdx.client;
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Ready>(3);

    {
        let state = state.clone();
        let ready_tx = ready_tx.clone();
        dispatcher.add_handler(event::MARKET_INIT, move |p| {
            let Reply::MarketInit(info) = &p.reply else {
                return Flow::Continue;
            };
            update_state(&state, |st| st.apply_init(info));
            let _ = ready_tx.try_send(Ready::Init);
            Flow::Unregister
        });
    }
    {
        let state = state.clone();
        dispatcher.add_handler(event::STOCK_COUNT, move |p| {
            let Reply::StockCount { market, count } = &p.reply else {
                return Flow::Continue;
            };
            update_state(&state, |st| st.set_count(*market, *count));
            let _ = ready_tx.try_send(Ready::Count(*market));
            Flow::Continue
        });
    }

    let sent = (|| {
        sink.send(&request::device_node(
            client_cfg.main_version,
            client_cfg.core_version,
            client_cfg.device_key.as_bytes(),
        )?)?;
        sink.send(&request::market_init_info())?;
        for market in Market::ALL {
            sink.send(&request::market_stock_count(market, today))?;
        }
        sink.send(&request::notice())
    })();

    let result = match sent {
        Ok(()) => wait_ready(&ready_rx, closed, client_cfg.connect_timeout()),
        Err(e) => Err(e.into()),
    };

    dispatcher.del_handler(event::STOCK_COUNT);
    if result.is_err() {
        dispatcher.del_handler(event::MARKET_INIT);
    }
    result
}

fn wait_ready(ready: &Receiver<Ready>, closed: &Receiver<()>, timeout: Duration) -> Result<(), WorkflowError> {
    let deadline = Instant::now() + timeout;
    let mut init = false;
    let mut counts = [false; 2];

    while !(init && counts.iter().all(|c| *c)) {
        let left = deadline.saturating_duration_since(Instant::now());
        select! {
            recv(ready) -> msg => match msg {
                Ok(Ready::Init) => init = true,
                Ok(Ready::Count(m)) => counts[m.as_u8() as usize] = true,
                Err(_) => return Err(WorkflowError::SessionClosed("connect")),
            },
            recv(closed) -> _ => return Err(WorkflowError::SessionClosed("connect")),
            default(left) => return Err(WorkflowError::Timeout { what: "connect", after: timeout }),
        }
    }
    Ok(())
}
