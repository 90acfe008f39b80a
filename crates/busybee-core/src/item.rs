use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::datetime::item_date_serde;
use crate::recurrence::{Frequency, RecurrenceRule};

pub const MAX_NOTES_LEN: usize = 255;
pub const MAX_PLACE_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("invalid priority: {0:?} (expected Low, Medium or High)")]
    InvalidPriority(String),
    #[error("invalid item kind: {0:?} (expected task or event)")]
    InvalidKind(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Task,
    Event,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Task => "task",
            ItemKind::Event => "event",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "task" | "tasks" => Ok(ItemKind::Task),
            "event" | "events" => Ok(ItemKind::Event),
            _ => Err(ItemError::InvalidKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    /// RGB color used when rendering the priority.
    pub fn color(self) -> (u8, u8, u8) {
        match self {
            Priority::Low => (16, 111, 16),
            Priority::Medium => (171, 113, 18),
            Priority::High => (114, 11, 11),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            _ => Err(ItemError::InvalidPriority(s.to_string())),
        }
    }
}

/// Shared record of one recurrence group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recurrence {
    pub id: Uuid,
    pub times: u32,
    pub frequency: Frequency,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Recurrence {
    pub fn new(rule: RecurrenceRule, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            times: rule.occurrence_count,
            frequency: rule.frequency,
            created: now,
            last_updated: now,
        }
    }

    pub fn rule(&self) -> RecurrenceRule {
        RecurrenceRule {
            frequency: self.frequency,
            occurrence_count: self.times,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: u64,

    pub uuid: Uuid,

    pub kind: ItemKind,

    pub name: String,

    #[serde(default)]
    pub notes: Option<String>,

    /// Due date of a task, start time of an event.
    #[serde(default, with = "item_date_serde::option")]
    pub when: Option<NaiveDateTime>,

    #[serde(default)]
    pub place: Option<String>,

    #[serde(default)]
    pub priority: Option<Priority>,

    #[serde(default)]
    pub complete: bool,

    #[serde(default)]
    pub categories: BTreeSet<String>,

    #[serde(default)]
    pub recurrence_id: Option<Uuid>,

    pub created: DateTime<Utc>,

    pub last_updated: DateTime<Utc>,
}

impl Item {
    pub fn new(kind: ItemKind, name: String, now: DateTime<Utc>, id: u64) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4(),
            kind,
            name,
            notes: None,
            when: None,
            place: None,
            priority: None,
            complete: false,
            categories: BTreeSet::new(),
            recurrence_id: None,
            created: now,
            last_updated: now,
        }
    }

    pub fn is_task(&self) -> bool {
        self.kind == ItemKind::Task
    }

    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        self.is_task() && !self.complete && self.when.map(|w| w < now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{Item, ItemKind, Priority};

    #[test]
    fn priority_accepts_short_forms() {
        assert_eq!("h".parse::<Priority>().expect("high"), Priority::High);
        assert_eq!(" Medium ".parse::<Priority>().expect("medium"), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
        assert!(Priority::Low < Priority::High);
    }

    #[test]
    fn kind_accepts_plural() {
        assert_eq!("Events".parse::<ItemKind>().expect("event"), ItemKind::Event);
        assert!("meeting".parse::<ItemKind>().is_err());
    }

    #[test]
    fn item_dates_serialize_as_plain_local_time() {
        let mut item = Item::new(ItemKind::Task, "Pay rent".to_string(), Utc::now(), 4);
        item.when = NaiveDate::from_ymd_opt(2024, 1, 31).and_then(|d| d.and_hms_opt(9, 0, 0));

        let line = serde_json::to_string(&item).expect("serialize");
        assert!(line.contains(r#""when":"2024-01-31 09:00:00""#));

        let back: Item = serde_json::from_str(&line).expect("deserialize");
        assert_eq!(back, item);
    }

    #[test]
    fn only_open_tasks_are_overdue() {
        let now = NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("now");
        let mut task = Item::new(ItemKind::Task, "File taxes".to_string(), Utc::now(), 1);
        task.when = NaiveDate::from_ymd_opt(2024, 5, 31).and_then(|d| d.and_hms_opt(9, 0, 0));
        assert!(task.is_overdue(now));

        task.complete = true;
        assert!(!task.is_overdue(now));

        let mut event = task.clone();
        event.kind = ItemKind::Event;
        event.complete = false;
        assert!(!event.is_overdue(now));
    }
}
