use std::collections::BTreeMap;

use anyhow::{
  anyhow,
  bail
};
use chrono::{
  DateTime,
  NaiveDateTime,
  Utc
};
use tracing::{
  debug,
  info,
  instrument
};

use super::modifiers::{
  Mod,
  changes_from,
  draft_from,
  parse_mods,
  parse_text_and_mods,
  resolve_rule
};
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::parse_date_expr;
use crate::filter::Filter;
use crate::item::{
  Item,
  ItemKind
};
use crate::recurrence::{
  Frequency,
  RecurrenceRule,
  generate_series
};
use crate::render::Renderer;
use crate::series::{
  SeriesChange,
  create_item,
  delete_item,
  delete_series,
  edit_item,
  rule_for,
  set_complete
};

pub(super) const DEFAULT_RECURRENCE_LIMIT:
  u32 = 500;

fn recurrence_limit(
  cfg: &Config
) -> anyhow::Result<u32> {
  Ok(
    cfg
      .get_u32("recurrence.limit")?
      .unwrap_or(DEFAULT_RECURRENCE_LIMIT)
  )
}

/// The item id comes either from a
/// bare numeric filter term
/// (`busybee 3 done`) or from the first
/// command argument
/// (`busybee done 3`).
fn resolve_target<'a>(
  filter_terms: &[String],
  args: &'a [String]
) -> anyhow::Result<(u64, &'a [String])>
{
  if let [only] = filter_terms
    && let Ok(id) = only.parse::<u64>()
  {
    return Ok((id, args));
  }
  if !filter_terms.is_empty() {
    bail!(
      "expected a single item id \
       before the command, got {}",
      filter_terms.join(" ")
    );
  }

  let Some((first, rest)) =
    args.split_first()
  else {
    bail!("an item id is required");
  };
  let id =
    first.parse::<u64>().map_err(|_| {
      anyhow!(
        "expected an item id, got \
         {first:?}"
      )
    })?;
  Ok((id, rest))
}

#[instrument(skip(
  store, cfg, args, now, now_utc
))]
pub(super) fn cmd_add(
  store: &DataStore,
  cfg: &Config,
  args: &[String],
  now: NaiveDateTime,
  now_utc: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command add");

  let Some((kind_token, rest)) =
    args.split_first()
  else {
    bail!(
      "usage: add task|event <name> \
       [modifiers]"
    );
  };
  let kind =
    kind_token.parse::<ItemKind>()?;

  let (name, mods) =
    parse_text_and_mods(rest, now)?;
  let draft =
    draft_from(kind, name, &mods);
  let rule = resolve_rule(
    &mods,
    RecurrenceRule::single(),
    recurrence_limit(cfg)?
  )?
  .unwrap_or_default();

  let created = create_item(
    store, &draft, rule, now_utc
  )?;

  match created.as_slice() {
    | [] => {}
    | [one] => {
      println!(
        "Created {} {}.",
        one.kind, one.id
      );
    }
    | [first, .., last] => {
      println!(
        "Created {} {}s {}-{} ({}).",
        created.len(),
        first.kind,
        first.id,
        last.id,
        rule
      );
    }
  }
  Ok(())
}

#[instrument(skip(
  store, renderer, filter_terms,
  args, now
))]
pub(super) fn cmd_list(
  store: &DataStore,
  renderer: &mut Renderer,
  filter_terms: &[String],
  args: &[String],
  now: NaiveDateTime
) -> anyhow::Result<()> {
  info!("command list");

  let terms: Vec<String> = filter_terms
    .iter()
    .chain(args.iter())
    .cloned()
    .collect();
  let filter =
    Filter::parse(&terms, now)?;

  let mut items: Vec<Item> = store
    .load_items()?
    .into_iter()
    .filter(|item| filter.matches(item))
    .collect();
  items.sort_by(|a, b| {
    match (a.when, b.when) {
      | (Some(x), Some(y)) => x.cmp(&y),
      | (Some(_), None) => {
        std::cmp::Ordering::Less
      }
      | (None, Some(_)) => {
        std::cmp::Ordering::Greater
      }
      | (None, None) => {
        std::cmp::Ordering::Equal
      }
    }
    .then(a.id.cmp(&b.id))
  });

  debug!(
    matched = items.len(),
    "filtered items"
  );

  if items.is_empty() {
    println!("No matches.");
    return Ok(());
  }

  renderer
    .print_item_table(&items, now)?;
  println!();
  println!(
    "{} item{}",
    items.len(),
    if items.len() == 1 { "" } else { "s" }
  );
  Ok(())
}

#[instrument(skip(
  store, renderer, filter_terms, args
))]
pub(super) fn cmd_info(
  store: &DataStore,
  renderer: &mut Renderer,
  filter_terms: &[String],
  args: &[String]
) -> anyhow::Result<()> {
  info!("command info");

  let (id, _) =
    resolve_target(filter_terms, args)?;
  let item =
    store.get_item(id)?.ok_or_else(
      || anyhow!("item not found: {id}")
    )?;
  let recurrences =
    store.load_recurrences()?;
  let rule =
    rule_for(&item, &recurrences);
  let recurrence =
    item.recurrence_id.and_then(
      |group| {
        recurrences
          .iter()
          .find(|r| r.id == group)
      }
    );

  renderer.print_item_info(
    &item, rule, recurrence
  )
}

#[instrument(skip(
  store, cfg, filter_terms, args, now,
  now_utc
))]
pub(super) fn cmd_modify(
  store: &DataStore,
  cfg: &Config,
  filter_terms: &[String],
  args: &[String],
  now: NaiveDateTime,
  now_utc: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command modify");

  let (id, rest) =
    resolve_target(filter_terms, args)?;
  let item =
    store.get_item(id)?.ok_or_else(
      || anyhow!("item not found: {id}")
    )?;

  let mods = parse_mods(rest, now)?;
  let current = rule_for(
    &item,
    &store.load_recurrences()?
  );
  let rule = resolve_rule(
    &mods,
    current,
    recurrence_limit(cfg)?
  )?;
  let changes =
    changes_from(&mods, rule);
  if changes.is_empty() {
    bail!("nothing to modify for {id}");
  }

  let outcome = edit_item(
    store, id, &changes, now_utc
  )?;

  match outcome.series {
    | SeriesChange::Unchanged => {
      println!(
        "Modified {} {}.",
        outcome.item.kind, id
      );
    }
    | SeriesChange::Replaced {
      removed,
      created,
      new_group,
      ..
    } => {
      println!(
        "Modified {} {}; removed {} \
         other occurrence{}, created {}.",
        outcome.item.kind,
        id,
        removed,
        if removed == 1 { "" } else { "s" },
        created
      );
      if new_group.is_none() {
        println!(
          "{} {} no longer repeats.",
          outcome.item.kind, id
        );
      }
    }
  }
  Ok(())
}

#[instrument(skip(
  store, filter_terms, args, now_utc
))]
pub(super) fn cmd_set_complete(
  store: &DataStore,
  filter_terms: &[String],
  args: &[String],
  complete: bool,
  now_utc: DateTime<Utc>
) -> anyhow::Result<()> {
  info!(complete, "command done/undone");

  let (id, _) =
    resolve_target(filter_terms, args)?;
  let item = set_complete(
    store, id, complete, now_utc
  )?;
  if item.complete {
    println!(
      "Completed task {} '{}'.",
      item.id, item.name
    );
  } else {
    println!(
      "Reopened task {} '{}'.",
      item.id, item.name
    );
  }
  Ok(())
}

#[instrument(skip(
  store, filter_terms, args
))]
pub(super) fn cmd_delete(
  store: &DataStore,
  filter_terms: &[String],
  args: &[String]
) -> anyhow::Result<()> {
  info!("command delete");

  let (id, rest) =
    resolve_target(filter_terms, args)?;
  let whole_series = match rest {
    | [] => false,
    | [word]
      if word.eq_ignore_ascii_case(
        "series"
      ) =>
    {
      true
    }
    | _ => {
      bail!(
        "usage: delete <id> [series]"
      )
    }
  };

  let item =
    store.get_item(id)?.ok_or_else(
      || anyhow!("item not found: {id}")
    )?;

  if whole_series
    && let Some(group) = item.recurrence_id
  {
    let removed =
      delete_series(store, group)?;
    println!(
      "Deleted {} item{}.",
      removed.len(),
      if removed.len() == 1 {
        ""
      } else {
        "s"
      }
    );
  } else {
    let removed = delete_item(store, id)?;
    println!(
      "Deleted {} {} '{}'.",
      removed.kind, removed.id,
      removed.name
    );
  }
  Ok(())
}

#[instrument(skip(
  cfg, renderer, args, now
))]
pub(super) fn cmd_preview(
  cfg: &Config,
  renderer: &mut Renderer,
  args: &[String],
  now: NaiveDateTime
) -> anyhow::Result<()> {
  info!("command preview");

  let (date_text, mods) =
    parse_text_and_mods(args, now)?;
  let explicit =
    mods.iter().rev().find_map(|m| {
      match m {
        | Mod::When(when) => Some(*when),
        | _ => None
      }
    });
  let anchor = match explicit {
    | Some(when) => when,
    | None if date_text.is_empty() => {
      bail!(
        "usage: preview <date> \
         repeat:FREQ times:N"
      )
    }
    | None => {
      parse_date_expr(&date_text, now)?
    }
  };

  let rule = resolve_rule(
    &mods,
    RecurrenceRule::single(),
    recurrence_limit(cfg)?
  )?
  .unwrap_or_default();
  let occurrences = generate_series(
    anchor,
    rule.frequency,
    rule.occurrence_count
  )?;

  renderer
    .print_series(rule, &occurrences)
}

pub(super) fn cmd_frequencies()
-> anyhow::Result<()> {
  for label in Frequency::options() {
    println!("{label}");
  }
  Ok(())
}

#[instrument(skip(store))]
pub(super) fn cmd_categories(
  store: &DataStore
) -> anyhow::Result<()> {
  let mut counts: BTreeMap<String, usize> =
    BTreeMap::new();
  for item in store.load_items()? {
    for category in item.categories {
      *counts.entry(category).or_default() +=
        1;
    }
  }

  for (category, count) in counts {
    println!("{category} {count}");
  }
  Ok(())
}
