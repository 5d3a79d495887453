use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use crate::config::{EngineConfig, HOUR_MS, MINUTE_MS, ReminderOffset};
use crate::model::*;
use crate::notify::{MessageKey, NotifyHub};

use super::{Engine, EngineError};

fn tmp_wal(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("chime_test_engine");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = fs::remove_file(&path);
    path
}

fn test_config() -> EngineConfig {
    EngineConfig {
        admin_ids: vec![999],
        ..Default::default()
    }
}

fn new_engine(wal: &str, config: EngineConfig) -> Arc<Engine> {
    Arc::new(Engine::new(tmp_wal(wal), Arc::new(NotifyHub::new()), config).unwrap())
}

fn slot_at(start: Ms) -> SlotKey {
    SlotKey::new("downtown", "english", "2026-09-15", start)
}

#[tokio::test]
async fn book_reserves_a_seat() {
    let engine = new_engine("book_reserves.wal", test_config());
    let start = now_ms() + 10 * HOUR_MS;
    let slot = slot_at(start);
    engine.define_slot(slot.clone(), 3).await.unwrap();

    let id = engine.book(7, slot.clone()).await.unwrap();

    let info = engine.slot_info(&slot).await.unwrap();
    assert_eq!(info.reserved, 1);
    assert_eq!(info.capacity, 3);
    let booking = engine.bookings.get(&id).unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.user_id, 7);
}

#[tokio::test]
async fn define_slot_rejects_duplicates_and_bad_capacity() {
    let engine = new_engine("define_dup.wal", test_config());
    let slot = slot_at(now_ms() + HOUR_MS);
    engine.define_slot(slot.clone(), 5).await.unwrap();

    assert!(matches!(
        engine.define_slot(slot.clone(), 5).await,
        Err(EngineError::SlotExists(_))
    ));
    assert!(matches!(
        engine.define_slot(slot_at(now_ms() + 2 * HOUR_MS), 0).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn last_seat_goes_to_exactly_one_caller() {
    let engine = new_engine("last_seat.wal", test_config());
    let slot = slot_at(now_ms() + 10 * HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();

    let mut handles = Vec::new();
    for user in 0..8i64 {
        let engine = engine.clone();
        let slot = slot.clone();
        handles.push(tokio::spawn(async move { engine.book(user, slot).await }));
    }

    let mut wins = 0;
    let mut full = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => wins += 1,
            Err(EngineError::SlotFull { .. }) => full += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(full, 7);
    assert_eq!(engine.slot_info(&slot).await.unwrap().reserved, 1);
}

#[tokio::test]
async fn duplicate_booking_rejected() {
    let engine = new_engine("dup_booking.wal", test_config());
    let slot = slot_at(now_ms() + 10 * HOUR_MS);
    engine.define_slot(slot.clone(), 5).await.unwrap();

    engine.book(7, slot.clone()).await.unwrap();
    let err = engine.book(7, slot.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateBooking { user_id: 7, .. }));
    assert_eq!(engine.slot_info(&slot).await.unwrap().reserved, 1);
}

#[tokio::test]
async fn cancel_then_rebook_frees_the_seat() {
    let engine = new_engine("cancel_rebook.wal", test_config());
    let slot = slot_at(now_ms() + 10 * HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();

    let id = engine.book(7, slot.clone()).await.unwrap();
    engine.cancel_booking(id, CancelActor::User).await.unwrap();
    assert_eq!(engine.slot_info(&slot).await.unwrap().reserved, 0);

    // Same user can book again once the old booking is terminal.
    engine.book(7, slot.clone()).await.unwrap();
    assert_eq!(engine.slot_info(&slot).await.unwrap().reserved, 1);
}

#[tokio::test]
async fn double_cancel_releases_once() {
    let engine = new_engine("double_cancel.wal", test_config());
    let slot = slot_at(now_ms() + 10 * HOUR_MS);
    engine.define_slot(slot.clone(), 2).await.unwrap();

    let id = engine.book(7, slot.clone()).await.unwrap();
    engine.book(8, slot.clone()).await.unwrap();
    assert_eq!(engine.slot_info(&slot).await.unwrap().reserved, 2);

    engine.cancel_booking(id, CancelActor::User).await.unwrap();
    let err = engine.cancel_booking(id, CancelActor::User).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyCancelled(_)));
    assert_eq!(engine.slot_info(&slot).await.unwrap().reserved, 1);
}

#[tokio::test]
async fn booking_delayed_slot_is_rejected() {
    let engine = new_engine("book_delayed.wal", test_config());
    let start = now_ms() + 10 * HOUR_MS;
    let slot = slot_at(start);
    engine.define_slot(slot.clone(), 2).await.unwrap();
    engine.delay_slot(&slot, start + HOUR_MS).await.unwrap();

    let err = engine.book(7, slot.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotClosed(_)));
}

#[tokio::test]
async fn delay_moves_unsent_reminders() {
    // 9:30 reminder for a 10:00 lesson moves to 10:30 when the lesson
    // slips to 11:00.
    let mut config = test_config();
    config.offsets = vec![ReminderOffset {
        audience: Audience::Student,
        lead_ms: 30 * MINUTE_MS,
    }];
    let engine = new_engine("delay_resched.wal", config);

    let start = now_ms() + 2 * HOUR_MS;
    let slot = slot_at(start);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();

    let fire_before = engine.reminders.get(&id).unwrap()[0].fire_at;
    assert_eq!(fire_before, start - 30 * MINUTE_MS);

    let new_start = start + HOUR_MS;
    let affected = engine.delay_slot(&slot, new_start).await.unwrap();
    assert_eq!(affected, vec![id]);

    let fire_after = engine.reminders.get(&id).unwrap()[0].fire_at;
    assert_eq!(fire_after, new_start - 30 * MINUTE_MS);
    assert_eq!(
        engine.slot_info(&slot).await.unwrap().effective_start,
        new_start
    );
}

#[tokio::test]
async fn delay_leaves_sent_reminders_alone() {
    let now = now_ms();
    let mut config = test_config();
    config.offsets = vec![
        ReminderOffset { audience: Audience::Student, lead_ms: 115 * MINUTE_MS },
        ReminderOffset { audience: Audience::Student, lead_ms: 30 * MINUTE_MS },
    ];
    let engine = new_engine("delay_sent.wal", config);

    let start = now + 2 * HOUR_MS;
    let slot = slot_at(start);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();

    // The 115-minute reminder fires at now+5m; tick at now+10m sends it.
    assert_eq!(engine.tick(now + 10 * MINUTE_MS).await, 1);

    let new_start = start + HOUR_MS;
    engine.delay_slot(&slot, new_start).await.unwrap();

    let list = engine.reminders.get(&id).unwrap();
    let sent = list.iter().find(|r| r.offset_ms == 115 * MINUTE_MS).unwrap();
    let unsent = list.iter().find(|r| r.offset_ms == 30 * MINUTE_MS).unwrap();
    assert!(sent.sent);
    assert_eq!(sent.fire_at, start - 115 * MINUTE_MS);
    assert!(!unsent.sent);
    assert_eq!(unsent.fire_at, new_start - 30 * MINUTE_MS);
}

#[tokio::test]
async fn delay_cancelled_slot_errors() {
    let engine = new_engine("delay_cancelled.wal", test_config());
    let start = now_ms() + 10 * HOUR_MS;
    let slot = slot_at(start);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    engine.cancel_slot(&slot).await.unwrap();

    let err = engine.delay_slot(&slot, start + HOUR_MS).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotAlreadyCancelled(_)));
}

#[tokio::test]
async fn slot_cancel_takes_bookings_and_reminders_down() {
    let engine = new_engine("slot_cancel.wal", test_config());
    let start = now_ms() + 10 * HOUR_MS;
    let slot = slot_at(start);
    engine.define_slot(slot.clone(), 3).await.unwrap();
    let a = engine.book(7, slot.clone()).await.unwrap();
    let b = engine.book(8, slot.clone()).await.unwrap();

    let affected = engine.cancel_slot(&slot).await.unwrap();
    assert_eq!(affected.len(), 2);

    let info = engine.slot_info(&slot).await.unwrap();
    assert_eq!(info.status, SlotStatus::Cancelled);
    assert_eq!(info.reserved, 0);
    for id in [a, b] {
        assert_eq!(engine.bookings.get(&id).unwrap().status, BookingStatus::Cancelled);
        assert!(engine.reminders.get(&id).unwrap().iter().all(|r| r.suppressed));
    }

    // Cancelling again is a no-op with an empty affected list.
    assert!(engine.cancel_slot(&slot).await.unwrap().is_empty());
    // And no new bookings are accepted.
    assert!(matches!(
        engine.book(9, slot.clone()).await,
        Err(EngineError::SlotClosed(_))
    ));
}

#[tokio::test]
async fn tick_sends_each_reminder_once() {
    let now = now_ms();
    let mut config = test_config();
    config.offsets = vec![ReminderOffset {
        audience: Audience::Student,
        lead_ms: HOUR_MS,
    }];
    let notify = Arc::new(NotifyHub::new());
    let mut rx = notify.subscribe(7);
    let engine =
        Arc::new(Engine::new(tmp_wal("tick_once.wal"), notify, config).unwrap());

    let slot = slot_at(now + 2 * HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    engine.book(7, slot.clone()).await.unwrap();

    // Not due yet.
    assert_eq!(engine.tick(now + 30 * MINUTE_MS).await, 0);
    // Due: fires once, then never again at the same instant.
    let at = now + HOUR_MS + MINUTE_MS;
    assert_eq!(engine.tick(at).await, 1);
    assert_eq!(engine.tick(at).await, 0);

    let notice = rx.try_recv().unwrap();
    assert_eq!(notice.key, MessageKey::ReminderStudent);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn teacher_reminder_goes_to_admins() {
    let now = now_ms();
    let mut config = test_config();
    config.offsets = vec![ReminderOffset {
        audience: Audience::Teacher,
        lead_ms: 10 * MINUTE_MS,
    }];
    let notify = Arc::new(NotifyHub::new());
    let mut admin_rx = notify.subscribe(999);
    let engine =
        Arc::new(Engine::new(tmp_wal("teacher_rem.wal"), notify, config).unwrap());

    let slot = slot_at(now + HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    engine.book(7, slot.clone()).await.unwrap();

    assert_eq!(engine.tick(now + 55 * MINUTE_MS).await, 1);
    let notice = admin_rx.try_recv().unwrap();
    assert_eq!(notice.key, MessageKey::ReminderTeacher);
    assert_eq!(notice.params["student_id"], json!(7));
}

#[tokio::test]
async fn reminders_for_started_lessons_are_retired_unsent() {
    let now = now_ms();
    let mut config = test_config();
    config.offsets = vec![ReminderOffset {
        audience: Audience::Student,
        lead_ms: 90 * MINUTE_MS,
    }];
    let notify = Arc::new(NotifyHub::new());
    let mut rx = notify.subscribe(7);
    let engine =
        Arc::new(Engine::new(tmp_wal("stale_rem.wal"), notify, config).unwrap());

    let start = now + 2 * HOUR_MS;
    let slot = slot_at(start);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();
    rx.try_recv().unwrap(); // confirmation

    // Scheduler was down from before the fire time until after the lesson
    // started: the first tick must drop the reminder, not deliver it late.
    assert_eq!(engine.tick(start + 30 * MINUTE_MS).await, 0);
    assert!(rx.try_recv().is_err());
    let list = engine.reminders.get(&id).unwrap();
    assert!(list.iter().all(|r| !r.sent && r.suppressed));
    drop(list);
    // And it stays retired on later ticks.
    assert_eq!(engine.tick(start + HOUR_MS).await, 0);
}

#[tokio::test]
async fn cancelled_booking_gets_no_reminder() {
    let now = now_ms();
    let mut config = test_config();
    config.offsets = vec![ReminderOffset {
        audience: Audience::Student,
        lead_ms: HOUR_MS,
    }];
    let engine = new_engine("cancelled_no_rem.wal", config);

    let slot = slot_at(now + 2 * HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();
    engine.cancel_booking(id, CancelActor::User).await.unwrap();

    assert_eq!(engine.tick(now + HOUR_MS + MINUTE_MS).await, 0);
}

#[tokio::test]
async fn past_offsets_are_skipped_at_booking_time() {
    let now = now_ms();
    let mut config = test_config();
    config.offsets = vec![
        ReminderOffset { audience: Audience::Student, lead_ms: 4 * HOUR_MS },
        ReminderOffset { audience: Audience::Student, lead_ms: 30 * MINUTE_MS },
    ];
    let engine = new_engine("past_offsets.wal", config);

    // Lesson in one hour: the 4-hour reminder time already passed.
    let slot = slot_at(now + HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();

    let list = engine.reminders.get(&id).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].offset_ms, 30 * MINUTE_MS);
}

#[tokio::test]
async fn list_active_sorted_by_next_lesson() {
    let engine = new_engine("list_active.wal", test_config());
    let now = now_ms();
    let late = slot_at(now + 20 * HOUR_MS);
    let early = SlotKey::new("uptown", "math", "2026-09-16", now + 5 * HOUR_MS);
    engine.define_slot(late.clone(), 1).await.unwrap();
    engine.define_slot(early.clone(), 1).await.unwrap();

    // Book the later lesson first so the sort has to reorder.
    let late_id = engine.book(7, late.clone()).await.unwrap();
    let early_id = engine.book(7, early.clone()).await.unwrap();

    let mine = engine.list_active(7).await;
    assert_eq!(mine.iter().map(|b| b.id).collect::<Vec<_>>(), vec![early_id, late_id]);

    engine.cancel_booking(late_id, CancelActor::User).await.unwrap();
    let mine = engine.list_active(7).await;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, early_id);
    assert!(engine.list_active(8).await.is_empty());
}

#[tokio::test]
async fn admin_cancel_notifies_the_student() {
    let notify = Arc::new(NotifyHub::new());
    let mut rx = notify.subscribe(7);
    let engine = Arc::new(
        Engine::new(tmp_wal("admin_cancel.wal"), notify, test_config()).unwrap(),
    );

    let slot = slot_at(now_ms() + 10 * HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();
    let confirmed = rx.try_recv().unwrap();
    assert_eq!(confirmed.key, MessageKey::BookingConfirmed);

    engine.cancel_booking(id, CancelActor::Admin).await.unwrap();
    let notice = rx.try_recv().unwrap();
    assert_eq!(notice.key, MessageKey::BookingCancelled);
}

#[tokio::test]
async fn user_cancel_sends_no_cancellation_notice() {
    let notify = Arc::new(NotifyHub::new());
    let mut rx = notify.subscribe(7);
    let engine = Arc::new(
        Engine::new(tmp_wal("user_cancel_quiet.wal"), notify, test_config()).unwrap(),
    );

    let slot = slot_at(now_ms() + 10 * HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();
    rx.try_recv().unwrap(); // confirmation

    engine.cancel_booking(id, CancelActor::User).await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn delay_notifies_every_affected_student() {
    let notify = Arc::new(NotifyHub::new());
    let mut rx7 = notify.subscribe(7);
    let mut rx8 = notify.subscribe(8);
    let engine = Arc::new(
        Engine::new(tmp_wal("delay_notify.wal"), notify, test_config()).unwrap(),
    );

    let start = now_ms() + 10 * HOUR_MS;
    let slot = slot_at(start);
    engine.define_slot(slot.clone(), 2).await.unwrap();
    engine.book(7, slot.clone()).await.unwrap();
    engine.book(8, slot.clone()).await.unwrap();
    rx7.try_recv().unwrap();
    rx8.try_recv().unwrap();

    engine.delay_slot(&slot, start + HOUR_MS).await.unwrap();
    assert_eq!(rx7.try_recv().unwrap().key, MessageKey::LessonDelayed);
    assert_eq!(rx8.try_recv().unwrap().key, MessageKey::LessonDelayed);
}

#[tokio::test]
async fn replay_restores_state_after_restart() {
    let path = tmp_wal("replay_restart.wal");
    let start = now_ms() + 10 * HOUR_MS;
    let slot = slot_at(start);
    let delayed = start + HOUR_MS;

    let (kept, cancelled) = {
        let engine = Arc::new(
            Engine::new(path.clone(), Arc::new(NotifyHub::new()), test_config()).unwrap(),
        );
        engine.define_slot(slot.clone(), 3).await.unwrap();
        let kept = engine.book(7, slot.clone()).await.unwrap();
        let cancelled = engine.book(8, slot.clone()).await.unwrap();
        engine.cancel_booking(cancelled, CancelActor::User).await.unwrap();
        engine.delay_slot(&slot, delayed).await.unwrap();
        (kept, cancelled)
    };

    let engine = Arc::new(
        Engine::new(path, Arc::new(NotifyHub::new()), test_config()).unwrap(),
    );
    let info = engine.slot_info(&slot).await.unwrap();
    assert_eq!(info.reserved, 1);
    assert_eq!(info.effective_start, delayed);
    assert_eq!(engine.bookings.get(&kept).unwrap().status, BookingStatus::Confirmed);
    assert_eq!(
        engine.bookings.get(&cancelled).unwrap().status,
        BookingStatus::Cancelled
    );
    // Reminder times reflect the delayed start, same as before the restart.
    assert!(
        engine
            .reminders
            .get(&kept)
            .unwrap()
            .iter()
            .all(|r| r.fire_at == delayed - r.offset_ms)
    );
}

#[tokio::test]
async fn compact_preserves_state_and_shrinks_wal() {
    let path = tmp_wal("compact_state.wal");
    let mut config = test_config();
    config.retention_ms = HOUR_MS;
    // A lesson well in the past, so cancelled churn falls out of retention.
    let slot = slot_at(now_ms() - 2 * HOUR_MS);

    let engine = Arc::new(
        Engine::new(path.clone(), Arc::new(NotifyHub::new()), config.clone()).unwrap(),
    );
    engine.define_slot(slot.clone(), 1).await.unwrap();
    for user in 0..20i64 {
        let id = engine.book(user, slot.clone()).await.unwrap();
        engine.cancel_booking(id, CancelActor::User).await.unwrap();
    }
    let survivor = engine.book(100, slot.clone()).await.unwrap();

    let before = fs::metadata(&path).unwrap().len();
    engine.compact_wal().await.unwrap();
    let after = fs::metadata(&path).unwrap().len();
    assert!(after < before, "compacted WAL should shrink: {after} < {before}");
    drop(engine);

    let engine = Arc::new(Engine::new(path, Arc::new(NotifyHub::new()), config).unwrap());
    let info = engine.slot_info(&slot).await.unwrap();
    assert_eq!(info.reserved, 1);
    assert_eq!(engine.bookings.get(&survivor).unwrap().status, BookingStatus::Confirmed);
    // The churned bookings are gone entirely.
    assert_eq!(engine.bookings.len(), 1);
}

#[tokio::test]
async fn compaction_purges_old_terminal_bookings() {
    let mut config = test_config();
    config.retention_ms = HOUR_MS;
    let engine = new_engine("compact_purge.wal", config);

    // A lesson two hours in the past, outside the one-hour retention window.
    let slot = slot_at(now_ms() - 2 * HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();
    engine.cancel_booking(id, CancelActor::User).await.unwrap();

    engine.compact_wal().await.unwrap();
    assert!(!engine.bookings.contains_key(&id));
    assert!(!engine.reminders.contains_key(&id));
}

#[tokio::test]
async fn compaction_releases_seats_of_purged_completed_bookings() {
    let path = tmp_wal("compact_completed.wal");
    let mut config = test_config();
    config.retention_ms = HOUR_MS;
    let slot = slot_at(now_ms() - 3 * HOUR_MS);

    let engine = Arc::new(
        Engine::new(path.clone(), Arc::new(NotifyHub::new()), config.clone()).unwrap(),
    );
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();
    assert_eq!(engine.sweep_completed(now_ms()).await, 1);
    // Completion keeps the seat occupied.
    assert_eq!(engine.slot_info(&slot).await.unwrap().reserved, 1);

    engine.compact_wal().await.unwrap();
    assert!(!engine.bookings.contains_key(&id));
    assert_eq!(engine.slot_info(&slot).await.unwrap().reserved, 0);
    drop(engine);

    // Replay of the compacted log agrees with the live process.
    let engine = Arc::new(Engine::new(path, Arc::new(NotifyHub::new()), config).unwrap());
    assert_eq!(engine.slot_info(&slot).await.unwrap().reserved, 0);
}

#[tokio::test]
async fn sweep_completes_elapsed_lessons() {
    let now = now_ms();
    let engine = new_engine("sweep.wal", test_config());

    let done = slot_at(now - 3 * HOUR_MS);
    let pending = SlotKey::new("uptown", "math", "2026-09-16", now + 3 * HOUR_MS);
    engine.define_slot(done.clone(), 1).await.unwrap();
    engine.define_slot(pending.clone(), 1).await.unwrap();
    let done_id = engine.book(7, done.clone()).await.unwrap();
    let pending_id = engine.book(7, pending.clone()).await.unwrap();

    assert_eq!(engine.sweep_completed(now).await, 1);
    assert_eq!(engine.bookings.get(&done_id).unwrap().status, BookingStatus::Completed);
    assert_eq!(
        engine.bookings.get(&pending_id).unwrap().status,
        BookingStatus::Confirmed
    );
    // Completed is terminal: cancelling it now fails.
    assert!(matches!(
        engine.cancel_booking(done_id, CancelActor::User).await,
        Err(EngineError::AlreadyCancelled(_))
    ));
}

#[tokio::test]
async fn backfill_schedules_missing_reminders() {
    let now = now_ms();
    let engine = new_engine("backfill.wal", test_config());
    let slot = slot_at(now + 10 * HOUR_MS);
    engine.define_slot(slot.clone(), 1).await.unwrap();
    let id = engine.book(7, slot.clone()).await.unwrap();

    // Simulate a crash between reservation and reminder scheduling.
    engine.reminders.remove(&id);

    assert_eq!(engine.backfill_reminders(now).await, 1);
    let list = engine.reminders.get(&id).unwrap();
    assert_eq!(list.len(), engine.config.offsets.len());
    // A second pass finds nothing to do.
    drop(list);
    assert_eq!(engine.backfill_reminders(now).await, 0);
}

#[tokio::test]
async fn list_open_slots_hides_full_and_closed() {
    let now = now_ms();
    let engine = new_engine("list_open.wal", test_config());
    let open = slot_at(now + 5 * HOUR_MS);
    let full = SlotKey::new("uptown", "math", "2026-09-16", now + 3 * HOUR_MS);
    let gone = SlotKey::new("uptown", "physics", "2026-09-17", now + 4 * HOUR_MS);
    engine.define_slot(open.clone(), 2).await.unwrap();
    engine.define_slot(full.clone(), 1).await.unwrap();
    engine.define_slot(gone.clone(), 1).await.unwrap();
    engine.book(7, full.clone()).await.unwrap();
    engine.cancel_slot(&gone).await.unwrap();

    let listed = engine.list_open_slots().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, open);
}
