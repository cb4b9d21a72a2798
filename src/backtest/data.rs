//! Historical daily bar loading for backtesting.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One instrument's OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// All bars sharing one trading date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBars {
    pub date: NaiveDate,
    pub bars: Vec<Bar>,
}

impl DailyBars {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            bars: Vec::new(),
        }
    }

    /// Closing prices keyed by symbol, for marking the broker.
    pub fn closes(&self) -> HashMap<String, Decimal> {
        self.bars
            .iter()
            .map(|b| (b.symbol.clone(), b.close))
            .collect()
    }

    pub fn get(&self, symbol: &str) -> Option<&Bar> {
        self.bars.iter().find(|b| b.symbol == symbol)
    }
}

/// Trait for loading historical bars.
pub trait DataLoader: Send + Sync {
    /// Load every trading day in `[start, end]`, oldest first.
    fn load_bars(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyBars>>;

    /// First and last date present in the data.
    fn available_range(&self) -> Option<(NaiveDate, NaiveDate)>;

    /// All symbols present in the data, sorted.
    fn available_symbols(&self) -> Vec<String>;
}

/// CSV bar loader.
///
/// Expected CSV format:
/// ```csv
/// date,symbol,open,high,low,close,volume
/// 2024-01-02,510300,3.501,3.530,3.490,3.522,812345600
/// ```
#[derive(Debug, Clone)]
pub struct CsvBarLoader {
    days: Vec<DailyBars>,
    symbols: Vec<String>,
}

impl CsvBarLoader {
    /// Load bars from a CSV file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

        Self::from_csv_content(&content)
    }

    /// Load bars from CSV content.
    pub fn from_csv_content(content: &str) -> Result<Self> {
        let mut by_date: BTreeMap<NaiveDate, Vec<Bar>> = BTreeMap::new();
        let mut row_count = 0usize;

        for (line_num, line) in content.lines().enumerate() {
            if line_num == 0 && line.starts_with("date") {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            let (date, bar) = parse_row(line)
                .with_context(|| format!("Failed to parse line {}: {}", line_num + 1, line))?;

            let day = by_date.entry(date).or_default();
            if day.iter().any(|b| b.symbol == bar.symbol) {
                anyhow::bail!("Duplicate bar for {} on {} (line {})", bar.symbol, date, line_num + 1);
            }
            day.push(bar);
            row_count += 1;
        }

        if row_count == 0 {
            anyhow::bail!("CSV file contains no data rows");
        }

        let days = by_date
            .into_iter()
            .map(|(date, bars)| DailyBars { date, bars })
            .collect();

        Ok(Self::from_days(days))
    }

    /// Create a loader from in-memory days. Days are sorted by date.
    pub fn from_days(mut days: Vec<DailyBars>) -> Self {
        days.sort_by_key(|d| d.date);

        let symbols: BTreeSet<String> = days
            .iter()
            .flat_map(|d| d.bars.iter().map(|b| b.symbol.clone()))
            .collect();

        Self {
            days,
            symbols: symbols.into_iter().collect(),
        }
    }

    /// Number of trading days loaded.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl DataLoader for CsvBarLoader {
    fn load_bars(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyBars>> {
        Ok(self
            .days
            .iter()
            .filter(|d| d.date >= start && d.date <= end)
            .cloned()
            .collect())
    }

    fn available_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.days.first()?;
        let last = self.days.last()?;
        Some((first.date, last.date))
    }

    fn available_symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }
}

fn parse_row(line: &str) -> Result<(NaiveDate, Bar)> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 7 {
        anyhow::bail!(
            "Expected 7 columns (date,symbol,open,high,low,close,volume), got {}",
            parts.len()
        );
    }

    let date = NaiveDate::parse_from_str(parts[0], DATE_FORMAT)
        .with_context(|| format!("Invalid date: {}", parts[0]))?;
    if parts[1].is_empty() {
        anyhow::bail!("Empty symbol");
    }

    let field = |idx: usize, name: &str| -> Result<Decimal> {
        parts[idx]
            .parse()
            .with_context(|| format!("Invalid {}: {}", name, parts[idx]))
    };

    let bar = Bar {
        symbol: parts[1].to_string(),
        open: field(2, "open")?,
        high: field(3, "high")?,
        low: field(4, "low")?,
        close: field(5, "close")?,
        volume: field(6, "volume")?,
    };

    Ok((date, bar))
}
