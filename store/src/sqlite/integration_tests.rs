use crate::calendar::DateFilter;
use crate::config::StoreConfig;
use crate::entities::{
    ScheduleFields, UnavailabilityLinkFields, VolunteerFields, VolunteerLinkFields,
    WeekdayLinkFields,
};
use crate::{Database, Store, StoreError};

async fn test_store() -> (Database, Store) {
    let db = Database::new_in_memory().await.unwrap();
    let store = Store::new(&db);
    (db, store)
}

/// A schedule for September 2024 with Tim and Bill on Mondays and Fridays.
async fn september_rota(store: &Store, owner: &str) -> i64 {
    let start = store.calendar.request_date(&DateFilter::ymd(2024, 9, 1)).await.unwrap();
    let end = store.calendar.request_date(&DateFilter::ymd(2024, 9, 30)).await.unwrap();
    let schedule = store
        .schedules
        .create(owner, &[ScheduleFields::new("september", 1, 1, start.id, end.id)])
        .await
        .unwrap()
        .remove(0);

    let volunteers = store
        .volunteers
        .create(owner, &[VolunteerFields::named("Tim"), VolunteerFields::named("Bill")])
        .await
        .unwrap();
    let links: Vec<_> = volunteers
        .iter()
        .map(|v| VolunteerLinkFields::new(schedule.id, v.id))
        .collect();
    store.volunteer_links.create(owner, &links).await.unwrap();
    store
        .weekday_links
        .create(
            owner,
            &[
                WeekdayLinkFields::new("Monday", schedule.id),
                WeekdayLinkFields::new("Friday", schedule.id),
            ],
        )
        .await
        .unwrap();
    schedule.id
}

#[tokio::test]
async fn test_volunteer_lifecycle() {
    let (_db, store) = test_store().await;

    let tim = store
        .volunteers
        .create("Seth", &[VolunteerFields::named("Tim")])
        .await
        .unwrap();
    assert_eq!(tim[0].id, 1);
    assert_eq!(tim[0].owner, "Seth");

    let again = store
        .volunteers
        .create("Seth", &[VolunteerFields::named("Tim")])
        .await;
    assert!(
        matches!(again, Err(StoreError::DuplicateExists { .. })),
        "expected DuplicateExists, got {:?}",
        again
    );

    // Another owner may reuse the name
    store
        .volunteers
        .create("Ann", &[VolunteerFields::named("Tim")])
        .await
        .unwrap();

    let renamed = store
        .volunteers
        .update(
            "Seth",
            &[VolunteerFields {
                id: Some(1),
                name: Some("Timothy".into()),
            }],
        )
        .await
        .unwrap();
    assert_eq!(renamed[0].name, "Timothy");

    let removed = store
        .volunteers
        .delete("Seth", &[VolunteerFields::named("Timothy")])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(store.volunteers.request("Seth", &[]).await.unwrap().is_empty());
    assert_eq!(store.volunteers.request("Ann", &[]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_schedule_rename_keeps_links() {
    let (_db, store) = test_store().await;
    let schedule_id = september_rota(&store, "Seth").await;

    store
        .schedules
        .update(
            "Seth",
            &[ScheduleFields {
                id: Some(schedule_id),
                name: Some("september-a".into()),
                ..Default::default()
            }],
        )
        .await
        .unwrap();

    assert_eq!(store.schedules.names("Seth").await.unwrap(), vec!["september-a"]);
    let links = store
        .weekday_links
        .request("Seth", &[WeekdayLinkFields::for_schedule(schedule_id)])
        .await
        .unwrap();
    assert_eq!(links.len(), 2);
}

#[tokio::test]
async fn test_schedule_delete_cascades_to_links() {
    let (_db, store) = test_store().await;
    let schedule_id = september_rota(&store, "Seth").await;

    let link = store.volunteer_links.request("Seth", &[]).await.unwrap().remove(0);
    let sept_9 = store.calendar.request_date(&DateFilter::ymd(2024, 9, 9)).await.unwrap();
    store
        .unavailability_links
        .create("Seth", &[UnavailabilityLinkFields::new(link.id, sept_9.id)])
        .await
        .unwrap();

    let removed = store
        .schedules
        .delete("Seth", &[ScheduleFields::with_id(schedule_id)])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    assert!(store.weekday_links.request("Seth", &[]).await.unwrap().is_empty());
    assert!(store.volunteer_links.request("Seth", &[]).await.unwrap().is_empty());
    assert!(store.unavailability_links.request("Seth", &[]).await.unwrap().is_empty());
    // Volunteers outlive their schedules
    assert_eq!(store.volunteers.request("Seth", &[]).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_prune_unassigned_volunteers() {
    let (_db, store) = test_store().await;
    september_rota(&store, "Seth").await;
    store
        .volunteers
        .create("Seth", &[VolunteerFields::named("Jack")])
        .await
        .unwrap();
    store
        .volunteers
        .create("Ann", &[VolunteerFields::named("Lance")])
        .await
        .unwrap();

    let removed = store.volunteers.delete_unassigned("Seth").await.unwrap();
    assert_eq!(removed, 1);

    let names: Vec<String> = store
        .volunteers
        .request("Seth", &[])
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(names, vec!["Tim", "Bill"]);
    assert_eq!(store.volunteers.request("Ann", &[]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reconcile_after_edit() {
    let (_db, store) = test_store().await;
    let schedule_id = september_rota(&store, "Seth").await;

    // The edited schedule keeps Tim and moves to Mondays only
    let snapshot = [(ScheduleFields::with_id(schedule_id), vec!["Tim".to_string()])];
    let removed = store
        .reconciler
        .reconcile_volunteer_links("Seth", &snapshot)
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let snapshot = [(ScheduleFields::with_id(schedule_id), vec!["Monday".to_string()])];
    let removed = store
        .reconciler
        .reconcile_weekday_links("Seth", &snapshot)
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let days: Vec<String> = store
        .weekday_links
        .request("Seth", &[])
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.weekday)
        .collect();
    assert_eq!(days, vec!["Monday"]);

    // Bill lost his last link and can now be pruned
    assert_eq!(store.volunteers.delete_unassigned("Seth").await.unwrap(), 1);
}

#[tokio::test]
async fn test_links_reject_unknown_references() {
    let (_db, store) = test_store().await;
    let schedule_id = september_rota(&store, "Seth").await;

    let result = store
        .volunteer_links
        .create("Seth", &[VolunteerLinkFields::new(schedule_id, 99)])
        .await;
    assert!(
        matches!(result, Err(StoreError::UnknownReference { .. })),
        "expected UnknownReference, got {:?}",
        result
    );

    let result = store
        .schedules
        .create("Seth", &[ScheduleFields::new("past the end", 1, 1, 1, 100_000)])
        .await;
    assert!(matches!(result, Err(StoreError::UnknownReference { .. })));
}

#[tokio::test]
async fn test_links_stay_within_owner() {
    let (_db, store) = test_store().await;
    let seth_schedule = september_rota(&store, "Seth").await;
    let solo = store
        .volunteers
        .create("Seth", &[VolunteerFields::named("Solo")])
        .await
        .unwrap()
        .remove(0);

    let result = store
        .volunteer_links
        .create("Ann", &[VolunteerLinkFields::new(seth_schedule, solo.id)])
        .await;
    assert!(
        matches!(result, Err(StoreError::UnknownReference { entity: "volunteer link", .. })),
        "expected UnknownReference, got {:?}",
        result
    );
    let result = store
        .weekday_links
        .create("Ann", &[WeekdayLinkFields::new("Sunday", seth_schedule)])
        .await;
    assert!(matches!(result, Err(StoreError::UnknownReference { .. })));

    let seth_link = store.volunteer_links.request("Seth", &[]).await.unwrap().remove(0);
    let result = store
        .unavailability_links
        .create("Ann", &[UnavailabilityLinkFields::new(seth_link.id, 618)])
        .await;
    assert!(matches!(result, Err(StoreError::UnknownReference { .. })));

    // Repointing an own link at another owner's row fails the same way
    let ann_schedule = store
        .schedules
        .create("Ann", &[ScheduleFields::new("ann", 1, 1, 610, 639)])
        .await
        .unwrap()
        .remove(0);
    let ann_volunteer = store
        .volunteers
        .create("Ann", &[VolunteerFields::named("Lance")])
        .await
        .unwrap()
        .remove(0);
    let ann_link = store
        .volunteer_links
        .create("Ann", &[VolunteerLinkFields::new(ann_schedule.id, ann_volunteer.id)])
        .await
        .unwrap()
        .remove(0);
    let result = store
        .volunteer_links
        .update(
            "Ann",
            &[VolunteerLinkFields {
                id: Some(ann_link.id),
                volunteer_id: Some(solo.id),
                ..Default::default()
            }],
        )
        .await;
    assert!(matches!(result, Err(StoreError::UnknownReference { .. })));

    // Solo is still unassigned for Seth, and Seth's cascade leaves Ann alone
    assert_eq!(store.volunteers.delete_unassigned("Seth").await.unwrap(), 1);
    store
        .schedules
        .delete("Seth", &[ScheduleFields::with_id(seth_schedule)])
        .await
        .unwrap();
    assert_eq!(store.volunteer_links.request("Ann", &[]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_owner_isolation() {
    let (_db, store) = test_store().await;
    let schedule_id = september_rota(&store, "Seth").await;

    assert!(store.schedules.request("Ann", &[]).await.unwrap().is_empty());

    let result = store
        .schedules
        .update(
            "Ann",
            &[ScheduleFields {
                id: Some(schedule_id),
                shifts_off: Some(2),
                ..Default::default()
            }],
        )
        .await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));

    let removed = store
        .schedules
        .delete("Ann", &[ScheduleFields::with_id(schedule_id)])
        .await
        .unwrap();
    assert_eq!(removed, 0);
    assert_eq!(store.schedules.request("Seth", &[]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_zero_shifts_off_from_config() {
    let config = StoreConfig::default()
        .with_calendar_days(40)
        .with_zero_shifts_off(true);
    let db = Database::open_in_memory(&config).await.unwrap();
    let store = Store::new(&db);

    let created = store
        .schedules
        .create("Seth", &[ScheduleFields::new("no rest", 0, 1, 1, 7)])
        .await
        .unwrap();
    assert_eq!(created[0].shifts_off, 0);

    let strict = Store::new(&Database::new_in_memory().await.unwrap());
    let result = strict
        .schedules
        .create("Seth", &[ScheduleFields::new("no rest", 0, 1, 1, 7)])
        .await;
    assert!(matches!(
        result,
        Err(StoreError::MissingRequiredField { field: "shifts_off", .. })
    ));
}

#[tokio::test]
async fn test_file_database_persists_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rota.db");
    let config = StoreConfig::default().with_calendar_days(60);

    let db = Database::open(&path, &config).await.unwrap();
    september_like(&Store::new(&db)).await;
    db.pool().close().await;

    let db = Database::open(&path, &config).await.unwrap();
    let store = Store::new(&db);
    let volunteers = store.volunteers.request("Seth", &[]).await.unwrap();
    assert_eq!(volunteers.len(), 1);
    assert_eq!(store.weekday_links.request("Seth", &[]).await.unwrap().len(), 1);
}

async fn september_like(store: &Store) {
    let schedule = store
        .schedules
        .create("Seth", &[ScheduleFields::new("short", 1, 1, 1, 30)])
        .await
        .unwrap()
        .remove(0);
    store
        .volunteers
        .create("Seth", &[VolunteerFields::named("Tim")])
        .await
        .unwrap();
    store
        .weekday_links
        .create("Seth", &[WeekdayLinkFields::new("Sunday", schedule.id)])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_records_serialize_as_json() {
    let (_db, store) = test_store().await;
    let schedule_id = september_rota(&store, "Seth").await;

    let schedule = store
        .schedules
        .request_single("Seth", &ScheduleFields::with_id(schedule_id))
        .await
        .unwrap();
    let json = serde_json::to_value(&schedule).unwrap();
    assert_eq!(json["name"], "september");
    assert_eq!(json["owner"], "Seth");
    assert_eq!(json["volunteers_per_shift"], 1);

    let date = store.calendar.request_date(&DateFilter::with_id(schedule.start_date)).await.unwrap();
    let json = serde_json::to_value(&date).unwrap();
    assert_eq!(json["weekday"], "Sunday");
}
