use chrono::{NaiveDate, NaiveDateTime, Utc};
use busybee_core::datastore::DataStore;
use busybee_core::filter::Filter;
use busybee_core::item::{ItemKind, Priority};
use busybee_core::recurrence::{Frequency, RecurrenceRule};
use busybee_core::series::{
    ItemChanges, ItemDraft, SeriesChange, create_item, delete_item, delete_series, edit_item,
    set_complete,
};
use tempfile::tempdir;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, 0))
        .expect("valid date")
}

#[test]
fn recurring_task_is_stored_as_linked_occurrences() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let mut draft = ItemDraft::new(ItemKind::Task, "Pay rent");
    draft.when = Some(at(2024, 1, 31, 9, 0));
    draft.priority = Some(Priority::High);
    draft.categories.insert("bills".to_string());
    let rule = RecurrenceRule::new(Frequency::Monthly, 3).expect("rule");

    let created = create_item(&store, &draft, rule, Utc::now()).expect("create series");
    assert_eq!(created.len(), 3);

    let items = store.load_items().expect("load items");
    let whens: Vec<_> = items.iter().filter_map(|item| item.when).collect();
    assert_eq!(
        whens,
        vec![
            at(2024, 1, 31, 9, 0),
            at(2024, 2, 29, 9, 0),
            at(2024, 3, 31, 9, 0)
        ]
    );

    let group = items[0].recurrence_id.expect("linked to a recurrence");
    assert!(items.iter().all(|item| item.recurrence_id == Some(group)));
    assert!(items.iter().all(|item| item.priority == Some(Priority::High)));

    let recurrence = store
        .get_recurrence(group)
        .expect("get recurrence")
        .expect("recurrence stored");
    assert_eq!(recurrence.times, 3);
    assert_eq!(recurrence.frequency, Frequency::Monthly);

    let ids: Vec<u64> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn changing_the_rule_replaces_the_series() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let mut draft = ItemDraft::new(ItemKind::Event, "Standup");
    draft.when = Some(at(2024, 6, 3, 9, 30));
    draft.place = Some("Room 4".to_string());
    let weekly = RecurrenceRule::new(Frequency::Weekly, 4).expect("rule");
    let created = create_item(&store, &draft, weekly, Utc::now()).expect("create series");
    let old_group = created[0].recurrence_id.expect("old group");

    let changes = ItemChanges {
        rule: Some(RecurrenceRule::new(Frequency::Daily, 2).expect("rule")),
        ..ItemChanges::default()
    };
    let outcome = edit_item(&store, created[0].id, &changes, Utc::now()).expect("edit");

    let SeriesChange::Replaced {
        old_group: replaced,
        new_group: Some(new_group),
        removed,
        created: added,
    } = outcome.series
    else {
        panic!("series should be replaced: {:?}", outcome.series);
    };
    assert_eq!(replaced, Some(old_group));
    assert_ne!(new_group, old_group);
    assert_eq!(removed, 3);
    assert_eq!(added, 1);

    let items = store.load_items().expect("load items");
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.recurrence_id == Some(new_group)));
    assert_eq!(items[0].id, created[0].id);
    assert_eq!(items[1].when, Some(at(2024, 6, 4, 9, 30)));
    assert_eq!(items[1].place.as_deref(), Some("Room 4"));

    assert!(store.get_recurrence(old_group).expect("get").is_none());
    assert!(store.get_recurrence(new_group).expect("get").is_some());
}

#[test]
fn dropping_the_rule_unlinks_the_item() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let mut draft = ItemDraft::new(ItemKind::Task, "Stretch");
    draft.when = Some(at(2024, 6, 3, 7, 0));
    let daily = RecurrenceRule::new(Frequency::Daily, 5).expect("rule");
    let created = create_item(&store, &draft, daily, Utc::now()).expect("create series");

    let changes = ItemChanges {
        rule: Some(RecurrenceRule::single()),
        ..ItemChanges::default()
    };
    let outcome = edit_item(&store, created[2].id, &changes, Utc::now()).expect("edit");
    assert_eq!(outcome.item.recurrence_id, None);

    let items = store.load_items().expect("load items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].when, Some(at(2024, 6, 5, 7, 0)));
    assert!(store.load_recurrences().expect("load").is_empty());
}

#[test]
fn deleting_the_last_occurrence_removes_the_recurrence() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let mut draft = ItemDraft::new(ItemKind::Task, "Backup");
    draft.when = Some(at(2024, 2, 29, 22, 0));
    let yearly = RecurrenceRule::new(Frequency::Yearly, 2).expect("rule");
    let created = create_item(&store, &draft, yearly, Utc::now()).expect("create series");
    assert_eq!(created[1].when, Some(at(2025, 2, 28, 22, 0)));
    let group = created[0].recurrence_id.expect("group");

    delete_item(&store, created[0].id).expect("delete first");
    assert!(store.get_recurrence(group).expect("get").is_some());

    delete_item(&store, created[1].id).expect("delete second");
    assert!(store.get_recurrence(group).expect("get").is_none());
}

#[test]
fn delete_series_leaves_other_items() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let loose = ItemDraft::new(ItemKind::Task, "Read a book");
    create_item(&store, &loose, RecurrenceRule::single(), Utc::now()).expect("create loose");

    let mut draft = ItemDraft::new(ItemKind::Task, "Water plants");
    draft.when = Some(at(2024, 6, 3, 8, 0));
    let weekly = RecurrenceRule::new(Frequency::Weekly, 3).expect("rule");
    let created = create_item(&store, &draft, weekly, Utc::now()).expect("create series");

    let group = created[1].recurrence_id.expect("group");
    let removed = delete_series(&store, group).expect("delete series");
    assert_eq!(removed.len(), 3);

    let items = store.load_items().expect("load items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Read a book");
    assert!(store.load_recurrences().expect("load").is_empty());

    assert!(delete_series(&store, group).is_err());
}

#[test]
fn filters_select_by_day_and_status() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let now = at(2024, 6, 1, 12, 0);

    let mut draft = ItemDraft::new(ItemKind::Task, "Laundry");
    draft.when = Some(at(2024, 6, 3, 9, 0));
    draft.categories.insert("home".to_string());
    let weekly = RecurrenceRule::new(Frequency::Weekly, 3).expect("rule");
    let created = create_item(&store, &draft, weekly, Utc::now()).expect("create series");
    set_complete(&store, created[0].id, true, Utc::now()).expect("complete");

    let items = store.load_items().expect("load items");

    let on_day = Filter::parse(&["on:2024-06-10".to_string()], now).expect("parse filter");
    let matched: Vec<_> = items.iter().filter(|item| on_day.matches(item)).collect();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, created[1].id);

    let pending = Filter::parse(
        &["status:pending".to_string(), "+home".to_string()],
        now,
    )
    .expect("parse filter");
    assert_eq!(items.iter().filter(|item| pending.matches(item)).count(), 2);
}
