//! Точка входа `tdx-client`.
//!
//! Жизненный цикл:
//! - парсинг CLI и загрузка конфигурации
//! - подключение: регистрация устройства, даты рынков, количество инструментов
//! - выбранная загрузка (или все по очереди)
//! - корректная остановка по `Ctrl+C`

mod calendar;
mod charset;
mod cli;
mod client;
mod config;
mod dates;
mod dispatcher;
mod models;
mod session;
mod storage;
#[cfg(test)]
mod testkit;
mod universe;
mod workflows;

use std::sync::{Arc, atomic::AtomicBool, atomic::Ordering};

use anyhow::Context;
use clap::Parser;
use log::info;

use crate::cli::Command;
use crate::client::TdxClient;

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    args.validate()?;

    let mut config = config::Config::load(&args.config)
        .with_context(|| format!("cannot load configuration from {:?}", args.config))?;
    if let Some(server) = &args.server {
        config.tdx.server.data_host = server.clone();
    }

    // RUST_LOG важнее уровня из конфигурации
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.app.logger.level))
        .init();

    let shutdown = Arc::new(AtomicBool::new(false));

    // Ctrl+C => ставим shutdown=true
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
            info!("shutting down...");
        })?;
    }

    info!(
        "Starting tdx-client: server={}, data_path={:?}, command={:?}",
        config.tdx.server.data_host, config.app.data_path, args.command
    );

    let mut client = TdxClient::connect(config, shutdown)
        .context("cannot connect to market data server")?;

    let result = run(&mut client, args.command);
    client.close();
    result
}

fn run(client: &mut TdxClient, command: Command) -> anyhow::Result<()> {
    if matches!(command, Command::Base | Command::All) {
        let n = client.update_stock_base().context("stock base update failed")?;
        info!("stock base: {n} instruments");
    }
    if matches!(command, Command::Bonus | Command::All) {
        let n = client.update_stock_bonus().context("stock bonus update failed")?;
        info!("stock bonus: {n} events");
    }
    if matches!(command, Command::Days | Command::All) {
        let s = client.update_days().context("day bars update failed")?;
        info!("day bars: {} rows in {} requests", s.rows, s.requests);
    }
    if matches!(command, Command::Mins | Command::All) {
        let s = client.update_mins().context("minute bars update failed")?;
        info!("minute bars: {} rows in {} requests", s.rows, s.requests);
    }
    Ok(())
}
