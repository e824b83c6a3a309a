use chrono::{Duration, TimeZone, Utc};
use netpulse_store::{LocalStore, StorageError, DEFAULT_STALENESS_WINDOW};
use netpulse_types::{FieldValue, MetricKind, NewRecord, RecordId};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn ping(site: &str) -> NewRecord {
    NewRecord::new().site_id(site).field("google_up", 1.0)
}

fn ids(records: &[netpulse_types::MetricRecord]) -> Vec<i64> {
    records.iter().map(|r| r.id.get()).collect()
}

// ── Insert ───────────────────────────────────────────────────────

#[test]
fn insert_assigns_increasing_ids() {
    let store = LocalStore::open_in_memory().unwrap();
    let a = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    let b = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    let c = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    assert!(a < b && b < c);
}

#[test]
fn insert_defaults_timestamp_to_now() {
    let store = LocalStore::open_in_memory().unwrap();
    let before = Utc::now();
    store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    let after = Utc::now();

    let records = store.all_records(MetricKind::Ping).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].captured_at >= before - Duration::milliseconds(1));
    assert!(records[0].captured_at <= after + Duration::milliseconds(1));
}

#[test]
fn insert_keeps_caller_timestamp_and_tags() {
    let store = LocalStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
    let record = NewRecord::new()
        .captured_at(t0)
        .site_id("s1")
        .location("lab")
        .ip_address("192.168.1.4")
        .field("download_mbps", 87.5)
        .field("jitter_ms", "n/a");
    store.insert(MetricKind::Speed, &record).unwrap();

    let stored = &store.all_records(MetricKind::Speed).unwrap()[0];
    assert_eq!(stored.captured_at, t0);
    assert_eq!(stored.site_id.as_deref(), Some("s1"));
    assert_eq!(stored.location.as_deref(), Some("lab"));
    assert_eq!(stored.ip_address.as_deref(), Some("192.168.1.4"));
    assert_eq!(stored.field("download_mbps"), Some(&FieldValue::Number(87.5)));
    assert_eq!(stored.field("jitter_ms"), Some(&FieldValue::Text("n/a".into())));
    assert_eq!(stored.field("upload_mbps"), None);
    assert!(!stored.synced);
}

#[test]
fn numeric_looking_text_field_reads_back_as_text() {
    let store = LocalStore::open_in_memory().unwrap();
    let record = NewRecord::new()
        .field("ping_ms", "1.5")
        .field("jitter_ms", 2.0);
    store.insert(MetricKind::Speed, &record).unwrap();

    let stored = &store.all_records(MetricKind::Speed).unwrap()[0];
    assert_eq!(stored.field("ping_ms"), Some(&FieldValue::Text("1.5".into())));
    assert_eq!(stored.field("jitter_ms"), Some(&FieldValue::Number(2.0)));
}

#[test]
fn insert_rejects_capture_time_past_9999() {
    let store = LocalStore::open_in_memory().unwrap();
    store.insert(MetricKind::Ping, &ping("s1")).unwrap();

    let beyond = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap() + Duration::seconds(1);
    let err = store
        .insert(MetricKind::Ping, &ping("s1").captured_at(beyond))
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)));

    // a millisecond epoch passed as seconds never reaches the table
    let sample = serde_json::json!({"timestamp": 253_402_300_800u64, "google_up": 1});
    assert!(NewRecord::from_sample(MetricKind::Ping, sample.as_object().unwrap()).is_err());

    assert_eq!(ids(&store.records_to_sync(MetricKind::Ping).unwrap()), vec![1]);
    assert_eq!(store.all_records(MetricKind::Ping).unwrap().len(), 1);
}

#[test]
fn insert_with_missing_optional_fields_succeeds() {
    let store = LocalStore::open_in_memory().unwrap();
    let id = store.insert(MetricKind::Ping, &NewRecord::new()).unwrap();
    let stored = &store.all_records(MetricKind::Ping).unwrap()[0];
    assert_eq!(stored.id, id);
    assert!(stored.site_id.is_none());
    assert!(stored.fields.is_empty());
}

#[test]
fn insert_rejects_foreign_field() {
    let store = LocalStore::open_in_memory().unwrap();
    let record = NewRecord::new().field("download_mbps", 10.0);
    let err = store.insert(MetricKind::Ping, &record).unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)));
    assert!(store.all_records(MetricKind::Ping).unwrap().is_empty());
}

#[test]
fn kinds_are_independent_tables() {
    let store = LocalStore::open_in_memory().unwrap();
    store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    store
        .insert(MetricKind::Speed, &NewRecord::new().field("ping_ms", 12.0))
        .unwrap();
    assert_eq!(store.all_records(MetricKind::Ping).unwrap().len(), 1);
    assert_eq!(store.all_records(MetricKind::Speed).unwrap().len(), 1);

    store.clear(MetricKind::Ping).unwrap();
    assert!(store.all_records(MetricKind::Ping).unwrap().is_empty());
    assert_eq!(store.all_records(MetricKind::Speed).unwrap().len(), 1);
}

// ── Durability ───────────────────────────────────────────────────

#[test]
fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.db");

    let id = {
        let store = LocalStore::open(&path).unwrap();
        store.insert(MetricKind::Ping, &ping("s1")).unwrap()
    };

    let store = LocalStore::open(&path).unwrap();
    let records = store.records_to_sync(MetricKind::Ping).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert!(!records[0].synced);
}

#[test]
fn synced_flag_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.db");

    {
        let store = LocalStore::open(&path).unwrap();
        let id = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
        store.mark_synced(MetricKind::Ping, &[id]).unwrap();
    }

    let store = LocalStore::open(&path).unwrap();
    assert!(store.all_records(MetricKind::Ping).unwrap()[0].synced);
    assert!(store.records_to_sync(MetricKind::Ping).unwrap().is_empty());
}

#[test]
fn open_creates_missing_parent_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/deeper/metrics.db");
    LocalStore::open(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn ids_are_not_reused_after_clear() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.db");
    let store = LocalStore::open(&path).unwrap();

    let first = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    store.clear(MetricKind::Ping).unwrap();
    let second = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    assert!(second > first);
}

// ── mark_synced ──────────────────────────────────────────────────

#[test]
fn mark_synced_empty_is_noop() {
    let store = LocalStore::open_in_memory().unwrap();
    store.insert(MetricKind::Ping, &ping("s1")).unwrap();

    assert_eq!(store.mark_synced(MetricKind::Ping, &[]).unwrap(), 0);
    assert!(!store.all_records(MetricKind::Ping).unwrap()[0].synced);
}

#[test]
fn mark_synced_ignores_unknown_ids() {
    let store = LocalStore::open_in_memory().unwrap();
    let id = store.insert(MetricKind::Ping, &ping("s1")).unwrap();

    let changed = store
        .mark_synced(MetricKind::Ping, &[id, RecordId::new(999)])
        .unwrap();
    assert_eq!(changed, 1);
}

#[test]
fn mark_synced_overlapping_sets() {
    let store = LocalStore::open_in_memory().unwrap();
    let r1 = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    let r2 = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    let r3 = store.insert(MetricKind::Ping, &ping("s1")).unwrap();

    assert_eq!(store.mark_synced(MetricKind::Ping, &[r1, r2]).unwrap(), 2);
    // r2 is already synced and must not be counted again
    assert_eq!(store.mark_synced(MetricKind::Ping, &[r2, r3]).unwrap(), 1);

    let records = store.all_records(MetricKind::Ping).unwrap();
    assert!(records.iter().all(|r| r.synced));
}

#[test]
fn mark_synced_only_touches_given_kind() {
    let store = LocalStore::open_in_memory().unwrap();
    let ping_id = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    store
        .insert(MetricKind::Speed, &NewRecord::new().field("ping_ms", 3.0))
        .unwrap();

    store.mark_synced(MetricKind::Speed, &[ping_id]).unwrap();
    assert!(!store.all_records(MetricKind::Ping).unwrap()[0].synced);
}

// ── records_to_sync ──────────────────────────────────────────────

#[test]
fn records_to_sync_orders_by_id() {
    let store = LocalStore::open_in_memory().unwrap();
    let late = Utc.with_ymd_and_hms(2026, 6, 2, 0, 0, 0).unwrap();
    let early = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    let a = store
        .insert(MetricKind::Ping, &ping("s1").captured_at(late))
        .unwrap();
    let b = store
        .insert(MetricKind::Ping, &ping("s1").captured_at(early))
        .unwrap();

    let records = store.records_to_sync_as_of(MetricKind::Ping, late).unwrap();
    assert_eq!(ids(&records), vec![a.get(), b.get()]);
}

#[test]
fn records_to_sync_is_repeatable() {
    let store = LocalStore::open_in_memory().unwrap();
    store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    store.insert(MetricKind::Ping, &ping("s2")).unwrap();

    let first = store.records_to_sync(MetricKind::Ping).unwrap();
    let second = store.records_to_sync(MetricKind::Ping).unwrap();
    assert_eq!(first, second);
}

#[test]
fn stale_synced_record_is_reincluded() {
    let store = LocalStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let id = store
        .insert(MetricKind::Speed, &NewRecord::new().captured_at(t0).field("ping_ms", 9.0))
        .unwrap();
    store.mark_synced(MetricKind::Speed, &[id]).unwrap();

    let within = store
        .records_to_sync_as_of(MetricKind::Speed, t0 + Duration::days(6))
        .unwrap();
    assert!(within.is_empty());

    let stale = store
        .records_to_sync_as_of(MetricKind::Speed, t0 + Duration::days(8))
        .unwrap();
    assert_eq!(ids(&stale), vec![id.get()]);
    assert!(stale[0].synced);
}

#[test]
fn custom_staleness_window_applies_to_both_kinds() {
    let store = LocalStore::open_in_memory()
        .unwrap()
        .with_staleness_window(std::time::Duration::from_secs(3600));
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

    for kind in MetricKind::ALL {
        let id = store
            .insert(kind, &NewRecord::new().captured_at(t0))
            .unwrap();
        store.mark_synced(kind, &[id]).unwrap();
        let later = store
            .records_to_sync_as_of(kind, t0 + Duration::hours(2))
            .unwrap();
        assert_eq!(later.len(), 1, "{kind} should be stale after two hours");
    }
}

#[test]
fn oversized_staleness_window_never_marks_records_stale() {
    let store = LocalStore::open_in_memory()
        .unwrap()
        .with_staleness_window(std::time::Duration::from_secs(10_000_000_000_000));
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let synced = store
        .insert(MetricKind::Ping, &ping("s1").captured_at(t0))
        .unwrap();
    let pending = store
        .insert(MetricKind::Ping, &ping("s1").captured_at(t0))
        .unwrap();
    store.mark_synced(MetricKind::Ping, &[synced]).unwrap();

    let records = store
        .records_to_sync_as_of(MetricKind::Ping, t0 + Duration::days(365))
        .unwrap();
    assert_eq!(ids(&records), vec![pending.get()]);
    assert_eq!(store.records_to_sync(MetricKind::Ping).unwrap().len(), 1);
}

#[test]
fn default_staleness_window_is_one_week() {
    let store = LocalStore::open_in_memory().unwrap();
    assert_eq!(store.staleness_window(), DEFAULT_STALENESS_WINDOW);
    assert_eq!(DEFAULT_STALENESS_WINDOW.as_secs(), 7 * 24 * 3600);
}

#[test]
fn sync_lifecycle_scenario() {
    let store = LocalStore::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();

    let id = store
        .insert(
            MetricKind::Ping,
            &NewRecord::new().captured_at(t0).site_id("s1").field("google_up", 1.0),
        )
        .unwrap();
    assert_eq!(id.get(), 1);

    let pending = store.records_to_sync_as_of(MetricKind::Ping, t0).unwrap();
    assert_eq!(ids(&pending), vec![1]);

    store.mark_synced(MetricKind::Ping, &[id]).unwrap();

    let next_day = store
        .records_to_sync_as_of(MetricKind::Ping, t0 + Duration::days(1))
        .unwrap();
    assert!(next_day.is_empty());

    let week_later = store
        .records_to_sync_as_of(MetricKind::Ping, t0 + Duration::days(8))
        .unwrap();
    assert_eq!(ids(&week_later), vec![1]);
}

// ── Policy inputs ────────────────────────────────────────────────

#[test]
fn last_synced_at_none_when_never_synced() {
    let store = LocalStore::open_in_memory().unwrap();
    store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    assert_eq!(store.last_synced_at(MetricKind::Ping).unwrap(), None);
}

#[test]
fn last_synced_at_is_newest_synced_capture() {
    let store = LocalStore::open_in_memory().unwrap();
    let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
    let t3 = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();

    let a = store.insert(MetricKind::Ping, &ping("s1").captured_at(t1)).unwrap();
    let b = store.insert(MetricKind::Ping, &ping("s1").captured_at(t2)).unwrap();
    store.insert(MetricKind::Ping, &ping("s1").captured_at(t3)).unwrap();
    store.mark_synced(MetricKind::Ping, &[a, b]).unwrap();

    assert_eq!(store.last_synced_at(MetricKind::Ping).unwrap(), Some(t2));
}

#[test]
fn stats_counts_rows() {
    let store = LocalStore::open_in_memory().unwrap();
    let a = store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    store.mark_synced(MetricKind::Ping, &[a]).unwrap();

    let stats = store.stats(MetricKind::Ping).unwrap();
    assert_eq!(stats.kind, MetricKind::Ping);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.unsynced, 1);
    assert!(stats.last_synced_at.is_some());

    let empty = store.stats(MetricKind::Speed).unwrap();
    assert_eq!(empty.total, 0);
    assert_eq!(empty.unsynced, 0);
    assert_eq!(empty.last_synced_at, None);
}

#[test]
fn clear_returns_removed_count() {
    let store = LocalStore::open_in_memory().unwrap();
    store.insert(MetricKind::Ping, &ping("s1")).unwrap();
    store.insert(MetricKind::Ping, &ping("s2")).unwrap();
    assert_eq!(store.clear(MetricKind::Ping).unwrap(), 2);
    assert_eq!(store.clear(MetricKind::Ping).unwrap(), 0);
}
