//! Выборка инструментов из справочника по префиксу кода.

use log::warn;

use tdx_core::{Market, Symbol};

use crate::models::StockBaseRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Category {
    StockA,
    StockB,
    Funds,
    Index,
    Bond,
    Industry,
}

impl Category {
    /// Набор для загрузки событий и баров
    pub(crate) const TRADED: [Category; 4] =
        [Category::StockA, Category::StockB, Category::Index, Category::Funds];

    fn prefixes(self, market: Market) -> &'static [&'static str] {
        match (self, market) {
            (Category::StockA, Market::Sz) => &["00", "30"],
            (Category::StockA, Market::Sh) => &["6"],
            (Category::StockB, Market::Sz) => &["200"],
            (Category::StockB, Market::Sh) => &["900"],
            (Category::Funds, Market::Sz) => &["15", "16", "18"],
            (Category::Funds, Market::Sh) => &["50", "51"],
            (Category::Index, Market::Sz) => &["399"],
            (Category::Index, Market::Sh) => &["000"],
            (Category::Bond, Market::Sz) => &["111", "120"],
            (Category::Bond, Market::Sh) => &["019", "11", "12", "13", "14", "52"],
            (Category::Industry, _) => &["88"],
        }
    }

    pub(crate) fn matches(self, market: Market, code: &str) -> bool {
        self.prefixes(market).iter().any(|p| code.starts_with(p))
    }
}

/// Строки справочника, попавшие хотя бы в одну категорию (порядок сохраняется)
pub(crate) fn select<'a>(rows: &'a [StockBaseRow], categories: &[Category]) -> Vec<&'a StockBaseRow> {
    rows.iter()
        .filter(|row| match Market::from_u8(row.market) {
            Ok(m) => categories.iter().any(|c| c.matches(m, &row.code)),
            Err(_) => false,
        })
        .collect()
}

/// Только инструменты с ожидающими корпоративными событиями
pub(crate) fn pending_bonus<'a>(rows: &[&'a StockBaseRow]) -> Vec<&'a StockBaseRow> {
    rows.iter().copied().filter(|row| row.bonus2 > 0).collect()
}

pub(crate) fn symbols(rows: &[&StockBaseRow]) -> Vec<Symbol> {
    rows.iter()
        .filter_map(|row| {
            let market = Market::from_u8(row.market).ok()?;
            match Symbol::new(market, &row.code) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("skipping instrument {:?}: {e}", row.code);
                    None
                }
            }
        })
        .collect()
}
