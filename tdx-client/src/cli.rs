use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config;

/// TDX Client - загрузка справочников и истории котировок с сервера TDX.
///
/// Одно TCP-соединение на запуск: регистрация устройства, чтение последних
/// торговых дат и количества инструментов, затем выбранная загрузка.
#[derive(Parser, Debug, Clone)]
#[command(name = "tdx-client", version, about)]
pub(crate) struct Args {
    /// Файл конфигурации (TOML). Если файла нет - значения по умолчанию
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    pub(crate) config: PathBuf,

    /// Адрес сервера HOST:PORT, перекрывает tdx.server.data_host
    #[arg(long)]
    pub(crate) server: Option<String>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Справочник инструментов обеих бирж
    Base,
    /// Корпоративные события (дивиденды, сплиты, размещения)
    Bonus,
    /// Дневные бары
    Days,
    /// Минутные бары
    Mins,
    /// Всё по порядку: base, bonus, days, mins
    All,
}

impl Args {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if let Some(server) = &self.server {
            if server.trim().is_empty() {
                anyhow::bail!("--server is empty");
            }
            if !server.contains(':') {
                anyhow::bail!("--server must look like HOST:PORT (got: {server})");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommand_and_overrides() {
        let args = Args::try_parse_from(["tdx-client", "--server", "127.0.0.1:7709", "days"]).unwrap();
        assert_eq!(args.command, Command::Days);
        assert_eq!(args.server.as_deref(), Some("127.0.0.1:7709"));
        assert_eq!(args.config, PathBuf::from(config::DEFAULT_CONFIG_PATH));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn server_without_port_is_rejected() {
        let args = Args::try_parse_from(["tdx-client", "--server", "localhost", "base"]).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Args::try_parse_from(["tdx-client"]).is_err());
    }
}
