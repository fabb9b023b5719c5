//! Ingestion of the provincial "retenciones y percepciones" spreadsheet.
//!
//! A row is a perception when the rate column is filled, a withholding when the
//! coefficient column is filled, and anything else otherwise. Totals are summed
//! per category.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

pub const RATE_COLUMN: &str = "ALÍC.";
pub const COEFFICIENT_COLUMN: &str = "COEF.";
pub const TOTAL_COLUMN: &str = "TOTAL";

#[derive(thiserror::Error, Debug)]
pub enum SheetError {
    #[error("cannot open spreadsheet {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: calamine::Error,
    },
    #[error("spreadsheet {0} has no worksheets")]
    NoSheet(String),
    #[error("missing column '{0}'")]
    MissingColumn(&'static str),
    #[error("row {row}: '{value}' is not a number")]
    InvalidNumber { row: usize, value: String },
    #[error("no rows to aggregate")]
    NoData,
}

impl SheetError {
    /// An empty spreadsheet is an expected outcome, not a parse failure.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

pub type Result<T> = std::result::Result<T, SheetError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Percepcion,
    Retencion,
    Otro,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Self::Percepcion => "PERCEPCIÓN",
            Self::Retencion => "RETENCIÓN",
            Self::Otro => "OTRO",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_filled(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Number(n) => !n.is_nan(),
            Self::Text(t) => !t.trim().is_empty(),
        }
    }

    fn amount(&self, row: usize) -> Result<f64> {
        match self {
            Self::Empty => Ok(0.0),
            Self::Number(n) if n.is_nan() => Ok(0.0),
            Self::Number(n) => Ok(*n),
            Self::Text(t) => parse_amount(t).ok_or_else(|| SheetError::InvalidNumber {
                row,
                value: t.clone(),
            }),
        }
    }
}

impl From<&Data> for Cell {
    fn from(d: &Data) -> Self {
        match d {
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::Empty | Data::Error(_) => Cell::Empty,
            other => Cell::Text(other.to_string()),
        }
    }
}

/// A header row plus data rows.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Headers are trimmed so `" TOTAL "` matches `TOTAL`.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            headers: headers.into_iter().map(|h| h.trim().to_string()).collect(),
            rows,
        }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    }

    fn require(&self, name: &'static str) -> Result<usize> {
        self.column(name).ok_or(SheetError::MissingColumn(name))
    }
}

/// Per-category totals. Both declared categories are always present.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    totals: BTreeMap<Category, f64>,
    rows: usize,
}

impl Default for Aggregate {
    fn default() -> Self {
        let mut totals = BTreeMap::new();
        totals.insert(Category::Percepcion, 0.0);
        totals.insert(Category::Retencion, 0.0);
        Self { totals, rows: 0 }
    }
}

impl Aggregate {
    pub fn get(&self, category: Category) -> f64 {
        self.totals.get(&category).copied().unwrap_or(0.0)
    }

    pub fn percepcion(&self) -> f64 {
        self.get(Category::Percepcion)
    }

    pub fn retencion(&self) -> f64 {
        self.get(Category::Retencion)
    }

    /// Declared categories only; `OTRO` rows are counted but never summed here.
    pub fn declared(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        self.totals
            .iter()
            .filter(|(c, _)| **c != Category::Otro)
            .map(|(c, v)| (*c, *v))
    }

    /// Number of rows that went into the grouping.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

pub fn classify(row: &[Cell], rate: usize, coefficient: usize) -> Category {
    let filled = |i: usize| row.get(i).is_some_and(Cell::is_filled);
    if filled(rate) {
        Category::Percepcion
    } else if filled(coefficient) {
        Category::Retencion
    } else {
        Category::Otro
    }
}

/// Group rows by category and sum the total column.
///
/// A table without rows yields an empty aggregate with zeroed totals. A table
/// with rows must carry all three expected columns.
pub fn aggregate(table: &Table) -> Result<Aggregate> {
    let mut agg = Aggregate::default();
    if table.rows.is_empty() {
        return Ok(agg);
    }

    let rate = table.require(RATE_COLUMN)?;
    let coefficient = table.require(COEFFICIENT_COLUMN)?;
    let total = table.require(TOTAL_COLUMN)?;

    for (i, row) in table.rows.iter().enumerate() {
        let category = classify(row, rate, coefficient);
        let amount = row.get(total).unwrap_or(&Cell::Empty).amount(i + 2)?;
        debug!("row {}: {} {:.2}", i + 2, category, amount);
        if category != Category::Otro {
            *agg.totals.entry(category).or_insert(0.0) += amount;
        }
        agg.rows += 1;
    }

    Ok(agg)
}

/// Read the first worksheet. The first non-empty row is the header row.
pub fn read_table(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let mut workbook = open_workbook_auto(path).map_err(|source| SheetError::Open {
        path: display.clone(),
        source,
    })?;

    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SheetError::NoSheet(display.clone()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|source| SheetError::Open {
            path: display,
            source,
        })?;

    let mut rows = range
        .rows()
        .map(|r| r.iter().map(Cell::from).collect::<Vec<_>>())
        .skip_while(|r| !r.iter().any(Cell::is_filled));

    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let headers = header
        .into_iter()
        .map(|c| match c {
            Cell::Text(t) => t,
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        })
        .collect();
    let body = rows.filter(|r| r.iter().any(Cell::is_filled)).collect();

    Ok(Table::new(headers, body))
}

/// Read and aggregate a spreadsheet. Zero rows is reported as [`SheetError::NoData`].
pub fn ingest(path: impl AsRef<Path>) -> Result<Aggregate> {
    let table = read_table(path)?;
    let agg = aggregate(&table)?;
    if agg.is_empty() {
        return Err(SheetError::NoData);
    }
    Ok(agg)
}

/// Parse text amounts the way the portal exports them: `.` groups
/// thousands and `,` marks decimals, so `1.500` is fifteen hundred.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$' && *c != '.')
        .collect();
    if s.is_empty() {
        return Some(0.0);
    }
    s.replace(',', ".").parse().ok()
}
