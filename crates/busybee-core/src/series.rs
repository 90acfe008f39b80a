//! Save, edit and delete flows for items and the recurrence groups that link them.
//!
//! Every save calls the recurrence engine once and persists one item per
//! occurrence; all items of a series share the id of a single
//! [`Recurrence`] record.

use std::collections::BTreeSet;

use anyhow::{anyhow, bail};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::datastore::DataStore;
use crate::item::{Item, ItemKind, MAX_NOTES_LEN, MAX_PLACE_LEN, Priority, Recurrence};
use crate::recurrence::{RecurrenceRule, generate_series, rule_changed};

/// User-entered fields of a new item.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub kind: ItemKind,
    pub name: String,
    pub notes: Option<String>,
    pub when: Option<NaiveDateTime>,
    pub place: Option<String>,
    pub priority: Option<Priority>,
    pub categories: BTreeSet<String>,
}

impl ItemDraft {
    pub fn new(kind: ItemKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            notes: None,
            when: None,
            place: None,
            priority: None,
            categories: BTreeSet::new(),
        }
    }

    fn to_item(
        &self,
        id: u64,
        when: Option<NaiveDateTime>,
        recurrence_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Item {
        let mut item = Item::new(self.kind, self.name.trim().to_string(), now, id);
        item.notes = self.notes.clone();
        item.when = when;
        item.place = self.place.clone();
        item.priority = self.priority;
        item.categories = self.categories.clone();
        item.recurrence_id = recurrence_id;
        item
    }
}

/// Field changes for an existing item. `None` leaves a field as it is; an
/// empty `notes`/`place` string clears it.
#[derive(Debug, Clone, Default)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub when: Option<NaiveDateTime>,
    pub place: Option<String>,
    pub priority: Option<Priority>,
    pub add_categories: Vec<String>,
    pub remove_categories: Vec<String>,
    pub rule: Option<RecurrenceRule>,
}

impl ItemChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.notes.is_none()
            && self.when.is_none()
            && self.place.is_none()
            && self.priority.is_none()
            && self.add_categories.is_empty()
            && self.remove_categories.is_empty()
            && self.rule.is_none()
    }

    fn apply(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.trim().to_string();
        }
        if let Some(notes) = &self.notes {
            item.notes = non_empty(notes);
        }
        if let Some(when) = self.when {
            item.when = Some(when);
        }
        if let Some(place) = &self.place {
            item.place = non_empty(place);
        }
        if let Some(priority) = self.priority {
            item.priority = Some(priority);
        }
        for category in &self.add_categories {
            item.categories.insert(category.clone());
        }
        for category in &self.remove_categories {
            item.categories.remove(category);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesChange {
    Unchanged,
    Replaced {
        old_group: Option<Uuid>,
        new_group: Option<Uuid>,
        removed: usize,
        created: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub item: Item,
    pub series: SeriesChange,
}

/// Rule of the series `item` belongs to; a single occurrence when it is not linked.
pub fn rule_for(item: &Item, recurrences: &[Recurrence]) -> RecurrenceRule {
    let Some(group) = item.recurrence_id else {
        return RecurrenceRule::single();
    };
    match recurrences.iter().find(|recurrence| recurrence.id == group) {
        Some(recurrence) => recurrence.rule(),
        None => {
            warn!(id = item.id, recurrence_id = %group, "item points at a missing recurrence");
            RecurrenceRule::single()
        }
    }
}

#[instrument(skip(store, draft, rule, now), fields(kind = %draft.kind, rule = %rule))]
pub fn create_item(
    store: &DataStore,
    draft: &ItemDraft,
    rule: RecurrenceRule,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Item>> {
    validate_fields(
        draft.kind,
        &draft.name,
        draft.notes.as_deref(),
        draft.place.as_deref(),
        draft.priority,
        draft.when,
    )?;
    if rule.is_series() && draft.when.is_none() {
        bail!("a date is required for recurring items");
    }

    let occurrences: Vec<Option<NaiveDateTime>> = match draft.when {
        Some(anchor) => generate_series(anchor, rule.frequency, rule.occurrence_count)?
            .into_iter()
            .map(Some)
            .collect(),
        None => vec![None],
    };

    let mut items = store.load_items()?;
    let recurrence = rule.is_series().then(|| Recurrence::new(rule, now));
    let group = recurrence.as_ref().map(|recurrence| recurrence.id);

    let mut next_id = store.next_id(&items);
    let mut created = Vec::with_capacity(occurrences.len());
    for when in occurrences {
        created.push(draft.to_item(next_id, when, group, now));
        next_id += 1;
    }

    if let Some(recurrence) = recurrence {
        store.create_recurrence(recurrence)?;
    }
    items.extend(created.iter().cloned());
    store.save_items(&items)?;

    info!(
        count = created.len(),
        recurrence_id = ?group,
        "created items"
    );
    Ok(created)
}

/// Applies `changes` to one item. When the recurrence rule differs from the
/// item's current one, the rest of the old series is discarded and a fresh
/// series is generated from the item's date under a new group id.
#[instrument(skip(store, changes, now))]
pub fn edit_item(
    store: &DataStore,
    id: u64,
    changes: &ItemChanges,
    now: DateTime<Utc>,
) -> anyhow::Result<EditOutcome> {
    let mut items = store.load_items()?;
    let mut recurrences = store.load_recurrences()?;

    let idx = items
        .iter()
        .position(|item| item.id == id)
        .ok_or_else(|| anyhow!("item not found: {id}"))?;

    let mut edited = items[idx].clone();
    if let Some(group) = edited.recurrence_id
        && !recurrences.iter().any(|recurrence| recurrence.id == group)
    {
        warn!(id, recurrence_id = %group, "unlinking item from a missing recurrence");
        edited.recurrence_id = None;
    }
    changes.apply(&mut edited);
    validate_fields(
        edited.kind,
        &edited.name,
        edited.notes.as_deref(),
        edited.place.as_deref(),
        edited.priority,
        edited.when,
    )?;
    edited.last_updated = now;

    let old_rule = rule_for(&items[idx], &recurrences);
    let new_rule = changes.rule.unwrap_or(old_rule);

    if !rule_changed(&old_rule, &new_rule) {
        debug!(rule = %old_rule, "recurrence rule unchanged; keeping series");
        items[idx] = edited.clone();
        store.save_items(&items)?;
        return Ok(EditOutcome {
            item: edited,
            series: SeriesChange::Unchanged,
        });
    }

    if new_rule.is_series() && edited.when.is_none() {
        bail!("a date is required for recurring items");
    }

    let old_group = edited.recurrence_id;
    let before = items.len();
    if let Some(group) = old_group {
        items.retain(|item| item.id == id || item.recurrence_id != Some(group));
    }
    let removed = before - items.len();

    let mut created = 0;
    let new_group = match (new_rule.is_series(), edited.when) {
        (true, Some(anchor)) => {
            let series = generate_series(anchor, new_rule.frequency, new_rule.occurrence_count)?;
            let recurrence = Recurrence::new(new_rule, now);
            let group = recurrence.id;
            recurrences.push(recurrence);

            edited.recurrence_id = Some(group);
            let mut next_id = store.next_id(&items);
            for when in series.into_iter().skip(1) {
                let mut occurrence = edited.clone();
                occurrence.id = next_id;
                occurrence.uuid = Uuid::new_v4();
                occurrence.when = Some(when);
                occurrence.complete = false;
                occurrence.created = now;
                items.push(occurrence);
                next_id += 1;
                created += 1;
            }
            Some(group)
        }
        _ => {
            edited.recurrence_id = None;
            None
        }
    };

    if let Some(slot) = items.iter_mut().find(|item| item.id == id) {
        *slot = edited.clone();
    }

    if let Some(group) = old_group {
        recurrences.retain(|recurrence| recurrence.id != group);
    }

    store.save_recurrences(&recurrences)?;
    store.save_items(&items)?;

    info!(
        id,
        old_rule = %old_rule,
        new_rule = %new_rule,
        removed,
        created,
        "replaced series"
    );
    Ok(EditOutcome {
        item: edited,
        series: SeriesChange::Replaced {
            old_group,
            new_group,
            removed,
            created,
        },
    })
}

/// Deletes one occurrence; its recurrence record goes with the last item.
#[instrument(skip(store))]
pub fn delete_item(store: &DataStore, id: u64) -> anyhow::Result<Item> {
    let removed = store.delete_item(id)?;
    if let Some(group) = removed.recurrence_id {
        let still_linked = store
            .load_items()?
            .iter()
            .any(|item| item.recurrence_id == Some(group));
        if !still_linked {
            store.delete_recurrence(group)?;
            debug!(recurrence_id = %group, "deleted recurrence with its last item");
        }
    }
    info!(id, "deleted item");
    Ok(removed)
}

/// Deletes every item of recurrence group `group` and the group record,
/// returning the removed items.
#[instrument(skip(store), fields(recurrence_id = %group))]
pub fn delete_series(store: &DataStore, group: Uuid) -> anyhow::Result<Vec<Item>> {
    let (removed, kept): (Vec<Item>, Vec<Item>) = store
        .load_items()?
        .into_iter()
        .partition(|item| item.recurrence_id == Some(group));
    let had_record = store.delete_recurrence(group)?;
    if removed.is_empty() && !had_record {
        bail!("recurrence not found: {group}");
    }
    store.save_items(&kept)?;

    info!(count = removed.len(), "deleted series");
    Ok(removed)
}

#[instrument(skip(store, now))]
pub fn set_complete(
    store: &DataStore,
    id: u64,
    complete: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<Item> {
    let mut item = store
        .get_item(id)?
        .ok_or_else(|| anyhow!("item not found: {id}"))?;
    if !item.is_task() {
        bail!("item {id} is an event; only tasks can be completed");
    }
    item.complete = complete;
    item.last_updated = now;
    store.update_item(&item)?;
    Ok(item)
}

fn validate_fields(
    kind: ItemKind,
    name: &str,
    notes: Option<&str>,
    place: Option<&str>,
    priority: Option<Priority>,
    when: Option<NaiveDateTime>,
) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        bail!("{kind} name is required");
    }
    if let Some(notes) = notes
        && notes.chars().count() > MAX_NOTES_LEN
    {
        bail!("notes are limited to {MAX_NOTES_LEN} characters");
    }
    match kind {
        ItemKind::Event => {
            if when.is_none() {
                bail!("events require a start time");
            }
            if priority.is_some() {
                bail!("events do not have a priority");
            }
            if let Some(place) = place
                && place.chars().count() > MAX_PLACE_LEN
            {
                bail!("place is limited to {MAX_PLACE_LEN} characters");
            }
        }
        ItemKind::Task => {
            if place.is_some() {
                bail!("tasks do not have a place");
            }
        }
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
