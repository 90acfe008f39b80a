use anyhow::{
  anyhow,
  bail
};
use chrono::NaiveDateTime;
use tracing::{
  instrument,
  warn
};

use crate::datetime::parse_date_expr;
use crate::item::{
  ItemKind,
  Priority
};
use crate::recurrence::{
  Frequency,
  RecurrenceRule
};
use crate::series::{
  ItemChanges,
  ItemDraft
};

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Mod {
  CategoryAdd(String),
  CategoryRemove(String),
  When(NaiveDateTime),
  Priority(Priority),
  Place(String),
  Notes(String),
  Name(String),
  Repeat(Frequency),
  Times(u32)
}

/// Splits `args` into the free-text
/// part and the recognised modifiers.
/// Everything after `--` is text.
#[instrument(skip(args, now))]
pub(super) fn parse_text_and_mods(
  args: &[String],
  now: NaiveDateTime
) -> anyhow::Result<(String, Vec<Mod>)>
{
  let mut text_parts = Vec::new();
  let mut mods = Vec::new();

  let mut literal = false;
  for arg in args {
    if arg == "--" {
      literal = true;
      continue;
    }

    if !literal
      && let Some(one_mod) =
        parse_one_mod(arg, now)?
    {
      mods.push(one_mod);
      continue;
    }

    text_parts.push(arg.clone());
  }

  Ok((text_parts.join(" "), mods))
}

#[instrument(skip(args, now))]
pub(super) fn parse_mods(
  args: &[String],
  now: NaiveDateTime
) -> anyhow::Result<Vec<Mod>> {
  let mut mods = Vec::new();
  for arg in args {
    if let Some(one_mod) =
      parse_one_mod(arg, now)?
    {
      mods.push(one_mod);
    } else {
      warn!(arg = %arg, "unrecognized modifier token ignored");
    }
  }
  Ok(mods)
}

fn parse_one_mod(
  tok: &str,
  now: NaiveDateTime
) -> anyhow::Result<Option<Mod>> {
  if let Some(category) =
    tok.strip_prefix('+')
    && !category.is_empty()
  {
    return Ok(Some(Mod::CategoryAdd(
      category.to_string()
    )));
  }
  if let Some(category) =
    tok.strip_prefix('-')
    && !category.is_empty()
  {
    return Ok(Some(
      Mod::CategoryRemove(
        category.to_string()
      )
    ));
  }

  let (key, value) =
    if let Some((k, v)) =
      tok.split_once(':')
    {
      (k, v)
    } else if let Some((k, v)) =
      tok.split_once('=')
    {
      (k, v)
    } else {
      return Ok(None);
    };

  let key = key.to_ascii_lowercase();

  match key.as_str() {
    | "due" | "at" | "when"
    | "start" => {
      Ok(Some(Mod::When(
        parse_date_expr(value, now)?
      )))
    }
    | "pri" | "priority" => {
      Ok(Some(Mod::Priority(
        value.parse::<Priority>()?
      )))
    }
    | "place" | "where" => {
      Ok(Some(Mod::Place(
        value.to_string()
      )))
    }
    | "notes" | "note" => {
      Ok(Some(Mod::Notes(
        value.to_string()
      )))
    }
    | "name" => {
      Ok(Some(Mod::Name(
        value.to_string()
      )))
    }
    | "repeat" | "freq"
    | "frequency" => {
      Ok(Some(Mod::Repeat(
        value.parse::<Frequency>()?
      )))
    }
    | "times" | "count" => {
      let times =
        value.parse::<u32>().map_err(
          |e| {
            anyhow!(
              "times must be a \
               positive integer, got \
               {value:?}: {e}"
            )
          }
        )?;
      Ok(Some(Mod::Times(times)))
    }
    | _ => Ok(None)
  }
}

/// Works out the recurrence rule the
/// modifiers ask for, starting from
/// `current`. `None` when no modifier
/// touches the rule.
pub(super) fn resolve_rule(
  mods: &[Mod],
  current: RecurrenceRule,
  limit: u32
) -> anyhow::Result<Option<RecurrenceRule>>
{
  let frequency =
    mods.iter().rev().find_map(|m| {
      match m {
        | Mod::Repeat(f) => Some(*f),
        | _ => None
      }
    });
  let times =
    mods.iter().rev().find_map(|m| {
      match m {
        | Mod::Times(t) => Some(*t),
        | _ => None
      }
    });

  if frequency.is_none()
    && times.is_none()
  {
    return Ok(None);
  }

  let frequency = frequency
    .unwrap_or(current.frequency);
  if frequency.is_no_repeat() {
    if times.is_some_and(|t| t > 1) {
      bail!(
        "times: needs a repeat \
         frequency (daily, weekly, \
         monthly or yearly)"
      );
    }
    return Ok(Some(
      RecurrenceRule::single()
    ));
  }

  let Some(times) = times.or_else(|| {
    (current.occurrence_count > 1)
      .then_some(current.occurrence_count)
  }) else {
    bail!(
      "repeat:{} needs times:N to say \
       how many occurrences to create",
      frequency.as_str().to_ascii_lowercase()
    );
  };

  if times > limit {
    bail!(
      "times:{times} exceeds \
       recurrence.limit ({limit})"
    );
  }

  let rule =
    RecurrenceRule::new(frequency, times)?;
  if rule.is_series() {
    Ok(Some(rule))
  } else {
    Ok(Some(RecurrenceRule::single()))
  }
}

pub(super) fn draft_from(
  kind: ItemKind,
  name: String,
  mods: &[Mod]
) -> ItemDraft {
  let mut draft =
    ItemDraft::new(kind, name);
  for one_mod in mods {
    match one_mod {
      | Mod::CategoryAdd(category) => {
        draft
          .categories
          .insert(category.clone());
      }
      | Mod::CategoryRemove(category) => {
        draft.categories.remove(category);
      }
      | Mod::When(when) => {
        draft.when = Some(*when);
      }
      | Mod::Priority(priority) => {
        draft.priority = Some(*priority);
      }
      | Mod::Place(place) => {
        draft.place = non_empty(place);
      }
      | Mod::Notes(notes) => {
        draft.notes = non_empty(notes);
      }
      | Mod::Name(name) => {
        draft.name = name.clone();
      }
      | Mod::Repeat(_)
      | Mod::Times(_) => {}
    }
  }
  draft
}

pub(super) fn changes_from(
  mods: &[Mod],
  rule: Option<RecurrenceRule>
) -> ItemChanges {
  let mut changes = ItemChanges {
    rule,
    ..ItemChanges::default()
  };
  for one_mod in mods {
    match one_mod {
      | Mod::CategoryAdd(category) => {
        changes
          .add_categories
          .push(category.clone());
      }
      | Mod::CategoryRemove(category) => {
        changes
          .remove_categories
          .push(category.clone());
      }
      | Mod::When(when) => {
        changes.when = Some(*when);
      }
      | Mod::Priority(priority) => {
        changes.priority = Some(*priority);
      }
      | Mod::Place(place) => {
        changes.place =
          Some(place.clone());
      }
      | Mod::Notes(notes) => {
        changes.notes =
          Some(notes.clone());
      }
      | Mod::Name(name) => {
        changes.name = Some(name.clone());
      }
      | Mod::Repeat(_)
      | Mod::Times(_) => {}
    }
  }
  changes
}

fn non_empty(
  value: &str
) -> Option<String> {
  let trimmed = value.trim();
  (!trimmed.is_empty())
    .then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveDateTime
  };

  use super::{
    Mod,
    parse_text_and_mods,
    resolve_rule
  };
  use crate::recurrence::{
    Frequency,
    RecurrenceRule
  };

  fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
      .and_then(|d| {
        d.and_hms_opt(8, 0, 0)
      })
      .expect("valid now")
  }

  fn args(raw: &[&str]) -> Vec<String> {
    raw
      .iter()
      .map(|t| t.to_string())
      .collect()
  }

  #[test]
  fn separates_name_from_modifiers() {
    let (name, mods) =
      parse_text_and_mods(
        &args(&[
          "Pay",
          "rent",
          "due:2024-01-31",
          "repeat:monthly",
          "times:12",
          "+bills",
          "--",
          "+literally"
        ]),
        now()
      )
      .expect("parse");

    assert_eq!(name, "Pay rent +literally");
    assert!(mods.contains(&Mod::Repeat(
      Frequency::Monthly
    )));
    assert!(mods.contains(&Mod::Times(12)));
    assert!(mods.contains(
      &Mod::CategoryAdd(
        "bills".to_string()
      )
    ));
  }

  #[test]
  fn bad_frequency_is_an_error() {
    assert!(
      parse_text_and_mods(
        &args(&["x", "repeat:hourly"]),
        now()
      )
      .is_err()
    );
  }

  #[test]
  fn rule_needs_times_for_a_new_series()
  {
    let mods =
      vec![Mod::Repeat(Frequency::Weekly)];
    assert!(
      resolve_rule(
        &mods,
        RecurrenceRule::single(),
        500
      )
      .is_err()
    );

    let current = RecurrenceRule::new(
      Frequency::Daily,
      4
    )
    .expect("rule");
    assert_eq!(
      resolve_rule(&mods, current, 500)
        .expect("resolve"),
      Some(
        RecurrenceRule::new(
          Frequency::Weekly,
          4
        )
        .expect("rule")
      )
    );
  }

  #[test]
  fn rule_resolution_limits_and_none() {
    assert!(
      resolve_rule(
        &[
          Mod::Repeat(Frequency::Daily),
          Mod::Times(501)
        ],
        RecurrenceRule::single(),
        500
      )
      .is_err()
    );
    assert!(
      resolve_rule(
        &[
          Mod::Repeat(Frequency::Daily),
          Mod::Times(0)
        ],
        RecurrenceRule::single(),
        500
      )
      .is_err()
    );
    assert_eq!(
      resolve_rule(
        &[Mod::Repeat(Frequency::None)],
        RecurrenceRule::new(
          Frequency::Weekly,
          3
        )
        .expect("rule"),
        500
      )
      .expect("resolve"),
      Some(RecurrenceRule::single())
    );
    assert_eq!(
      resolve_rule(
        &[],
        RecurrenceRule::single(),
        500
      )
      .expect("resolve"),
      None
    );
  }
}
