use chrono::{Datelike, NaiveDate};
use std::fmt;

use crate::config::Params;

/// The fiscal month being declared: the calendar month before today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn previous_month(today: NaiveDate) -> Self {
        if today.month() == 1 {
            Self {
                year: today.year() - 1,
                month: 12,
            }
        } else {
            Self {
                year: today.year(),
                month: today.month() - 1,
            }
        }
    }

    /// `MM`
    pub fn month(&self) -> String {
        format!("{:02}", self.month)
    }

    /// `YYYY`
    pub fn year(&self) -> String {
        format!("{:04}", self.year)
    }

    /// `YYYY-MM`, safe for file names.
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.year(), self.month())
    }

    /// Adds `period`, `period_month`, `period_year` and `period_file`.
    pub fn insert_into(&self, params: &mut Params) {
        params.insert("period", self.to_string());
        params.insert("period_month", self.month());
        params.insert("period_year", self.year());
        params.insert("period_file", self.file_stem());
    }
}

/// `YYYY/MM`, the form the portals expect.
impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}", self.year, self.month)
    }
}
