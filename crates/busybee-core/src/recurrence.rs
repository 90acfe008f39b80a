//! Recurrence expansion for repeating tasks and events.
//!
//! A series is folded from a single anchor date: each step takes the
//! previously produced occurrence plus the untouched anchor, so a monthly
//! series anchored on the 31st returns to the 31st after passing through a
//! shorter month.

use std::fmt;
use std::str::FromStr;

use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime
};
use serde::{
  Deserialize,
  Serialize
};
use thiserror::Error;

const FREQUENCY_OPTIONS: [&str; 5] = [
  "Never Repeats",
  "Daily",
  "Weekly",
  "Monthly",
  "Yearly"
];

const SERIES_PREALLOC_LIMIT: u32 = 1024;

#[derive(
  Debug, Clone, PartialEq, Eq, Error,
)]
pub enum RecurrenceError {
  #[error("invalid frequency: {0:?}")]
  InvalidFrequency(String),
  #[error("invalid recurrence: {reason}")]
  InvalidRecurrence { reason: String }
}

impl RecurrenceError {
  fn invalid(
    reason: impl Into<String>
  ) -> Self {
    Self::InvalidRecurrence {
      reason: reason.into()
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
  #[default]
  None,
  Daily,
  Weekly,
  Monthly,
  Yearly
}

impl Frequency {
  pub const ALL: [Frequency; 5] = [
    Frequency::None,
    Frequency::Daily,
    Frequency::Weekly,
    Frequency::Monthly,
    Frequency::Yearly
  ];

  /// Display strings in the same
  /// order as [`Frequency::ALL`].
  pub fn options()
  -> [&'static str; 5] {
    FREQUENCY_OPTIONS
  }

  pub fn as_str(self) -> &'static str {
    FREQUENCY_OPTIONS[self.index()]
  }

  pub fn index(self) -> usize {
    match self {
      | Frequency::None => 0,
      | Frequency::Daily => 1,
      | Frequency::Weekly => 2,
      | Frequency::Monthly => 3,
      | Frequency::Yearly => 4
    }
  }

  pub fn is_no_repeat(self) -> bool {
    self == Frequency::None
  }

  pub fn next_date(
    self,
    current: NaiveDateTime,
    anchor: NaiveDateTime
  ) -> Result<NaiveDateTime, RecurrenceError>
  {
    next_date(self, current, anchor)
  }
}

impl fmt::Display for Frequency {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Frequency {
  type Err = RecurrenceError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if let Some(pos) = FREQUENCY_OPTIONS
      .iter()
      .position(|opt| *opt == s)
    {
      return Ok(Self::ALL[pos]);
    }

    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "none" | "never" => {
        Ok(Frequency::None)
      }
      | "daily" => Ok(Frequency::Daily),
      | "weekly" => Ok(Frequency::Weekly),
      | "monthly" => {
        Ok(Frequency::Monthly)
      }
      | "yearly" => Ok(Frequency::Yearly),
      | _ => {
        Err(
          RecurrenceError::InvalidFrequency(
            s.to_string()
          )
        )
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct RecurrenceRule {
  pub frequency:        Frequency,
  pub occurrence_count: u32
}

impl RecurrenceRule {
  pub fn new(
    frequency: Frequency,
    occurrence_count: u32
  ) -> Result<Self, RecurrenceError> {
    if occurrence_count < 1 {
      return Err(
        RecurrenceError::invalid(
          "occurrence count must be at \
           least 1"
        )
      );
    }
    Ok(Self {
      frequency,
      occurrence_count
    })
  }

  /// The rule of an item that does
  /// not repeat.
  pub fn single() -> Self {
    Self {
      frequency:        Frequency::None,
      occurrence_count: 1
    }
  }

  pub fn is_series(&self) -> bool {
    !self.frequency.is_no_repeat()
      && self.occurrence_count > 1
  }
}

impl Default for RecurrenceRule {
  fn default() -> Self {
    Self::single()
  }
}

impl fmt::Display for RecurrenceRule {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    if self.frequency.is_no_repeat() {
      f.write_str(self.frequency.as_str())
    } else {
      write!(
        f,
        "Repeats {} {} times",
        self.frequency,
        self.occurrence_count
      )
    }
  }
}

/// Computes the occurrence after
/// `current`. The time of day is
/// carried over from `current`;
/// `anchor` supplies the day of month
/// for monthly series.
pub fn next_date(
  frequency: Frequency,
  current: NaiveDateTime,
  anchor: NaiveDateTime
) -> Result<NaiveDateTime, RecurrenceError>
{
  match frequency {
    | Frequency::None => {
      Err(RecurrenceError::invalid(
        "a non-repeating frequency has \
         no next occurrence"
      ))
    }
    | Frequency::Daily => {
      add_days(current, 1)
    }
    | Frequency::Weekly => {
      add_days(current, 7)
    }
    | Frequency::Monthly => {
      let (year, month) =
        if current.month() == 12 {
          (
            current
              .year()
              .checked_add(1)
              .ok_or_else(|| {
                out_of_range(current)
              })?,
            1
          )
        } else {
          (
            current.year(),
            current.month() + 1
          )
        };
      let day = anchor
        .day()
        .min(days_in_month(year, month));
      if day == 0 {
        return Err(
          RecurrenceError::invalid(
            format!(
              "no valid anchor day for \
               {year}-{month:02}"
            )
          )
        );
      }
      with_date(
        current, year, month, day
      )
    }
    | Frequency::Yearly => {
      let year = current
        .year()
        .checked_add(1)
        .ok_or_else(|| {
          out_of_range(current)
        })?;
      let day = if current.month() == 2
        && current.day() == 29
      {
        28
      } else {
        current.day()
      };
      with_date(
        current,
        year,
        current.month(),
        day
      )
    }
  }
}

/// Expands `anchor` into
/// `occurrence_count` occurrences. The
/// first element is always `anchor`.
#[tracing::instrument(level = "debug")]
pub fn generate_series(
  anchor: NaiveDateTime,
  frequency: Frequency,
  occurrence_count: u32
) -> Result<
  Vec<NaiveDateTime>,
  RecurrenceError
> {
  if occurrence_count < 1 {
    return Err(
      RecurrenceError::invalid(
        "occurrence count must be at \
         least 1"
      )
    );
  }

  if frequency.is_no_repeat()
    || occurrence_count == 1
  {
    return Ok(vec![anchor]);
  }

  // Capped: a huge count has to fail
  // on the date range, not on the
  // allocation.
  let mut series = Vec::with_capacity(
    occurrence_count.min(
      SERIES_PREALLOC_LIMIT
    ) as usize
  );
  series.push(anchor);

  let mut current = anchor;
  for _ in 1..occurrence_count {
    current = frequency
      .next_date(current, anchor)?;
    series.push(current);
  }

  tracing::trace!(
    count = series.len(),
    "generated series"
  );
  Ok(series)
}

/// Whether an existing series must be
/// replaced after an edit.
pub fn rule_changed(
  old_rule: &RecurrenceRule,
  new_rule: &RecurrenceRule
) -> bool {
  old_rule.frequency
    != new_rule.frequency
    || old_rule.occurrence_count
      != new_rule.occurrence_count
}

/// Number of days in `month` of
/// `year`; zero for a month outside
/// 1..=12.
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  match month {
    | 1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
    | 4 | 6 | 9 | 11 => 30,
    | 2 => {
      if is_leap_year(year) {
        29
      } else {
        28
      }
    }
    | _ => 0
  }
}

pub fn is_leap_year(year: i32) -> bool {
  (year % 4 == 0 && year % 100 != 0)
    || year % 400 == 0
}

fn add_days(
  current: NaiveDateTime,
  days: i64
) -> Result<NaiveDateTime, RecurrenceError>
{
  current
    .checked_add_signed(Duration::days(
      days
    ))
    .ok_or_else(|| out_of_range(current))
}

fn with_date(
  current: NaiveDateTime,
  year: i32,
  month: u32,
  day: u32
) -> Result<NaiveDateTime, RecurrenceError>
{
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .map(|date| date.and_time(current.time()))
  .ok_or_else(|| {
    RecurrenceError::invalid(format!(
      "{year}-{month:02}-{day:02} is \
       not a valid date"
    ))
  })
}

fn out_of_range(
  current: NaiveDateTime
) -> RecurrenceError {
  RecurrenceError::invalid(format!(
    "next occurrence after {current} \
     is out of range"
  ))
}
