//! Service frequencies.
//!
//! A frequency is written as comma-separated `<count> <unit>` terms, e.g.
//! `"1 day"`, `"6 months"` or `"1 year, 2 weeks"`. Month and year terms are
//! calendar-aware; everything else is a fixed span.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frequency {
    months: u32,
    span: Duration,
    source: String,
}

impl Frequency {
    pub fn parse(value: &str) -> Result<Self> {
        let source = value.trim();
        if source.is_empty() {
            return Err(ModelError::invalid_frequency(value, "empty frequency"));
        }

        let mut months: u32 = 0;
        let mut span = Duration::zero();

        for term in source.split(',') {
            let mut parts = term.split_whitespace();
            let (Some(count), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(ModelError::invalid_frequency(
                    value,
                    format!("expected '<count> <unit>', got '{}'", term.trim()),
                ));
            };

            let count: u32 = count.parse().map_err(|_| {
                ModelError::invalid_frequency(value, format!("invalid count '{}'", count))
            })?;

            let unit = unit.to_ascii_lowercase();
            let unit = unit.strip_suffix('s').unwrap_or(&unit);
            let overflow = || ModelError::invalid_frequency(value, "frequency is too large");

            match unit {
                "month" => months = months.checked_add(count).ok_or_else(overflow)?,
                "year" => {
                    let term_months = count.checked_mul(12).ok_or_else(overflow)?;
                    months = months.checked_add(term_months).ok_or_else(overflow)?;
                }
                _ => {
                    let seconds_per_unit: i64 = match unit {
                        "second" => 1,
                        "minute" => 60,
                        "hour" => 3_600,
                        "day" => 86_400,
                        "week" => 604_800,
                        other => {
                            return Err(ModelError::invalid_frequency(
                                value,
                                format!("unknown unit '{}'", other),
                            ))
                        }
                    };
                    let term = Duration::try_seconds(i64::from(count) * seconds_per_unit)
                        .ok_or_else(overflow)?;
                    span = span.checked_add(&term).ok_or_else(overflow)?;
                }
            }
        }

        if months == 0 && span <= Duration::zero() {
            return Err(ModelError::invalid_frequency(value, "frequency must be positive"));
        }

        Ok(Self {
            months,
            span,
            source: source.to_string(),
        })
    }

    /// The timestamp one period after `ts`, or `None` if it is not representable.
    pub fn after(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        ts.checked_add_months(Months::new(self.months))?
            .checked_add_signed(self.span)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Frequency {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
