use std::time::Duration;
use tempfile::TempDir;
use voicememo::{Recorder, RecorderControlState, RecorderHandle, RecorderState};

mod support;
use support::fake_recorder::FakeRecorder;
use support::{eventually, wait_for};

fn spawn_recorder() -> (TempDir, FakeRecorder, RecorderHandle) {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeRecorder::new(dir.path());
    let handle = Recorder::spawn(Box::new(fake.clone()), 8, 100);
    (dir, fake, handle)
}

/// Initialized recorder holding one pending take (`rec1`)
async fn recorder_with_pending() -> (TempDir, FakeRecorder, RecorderHandle) {
    let (dir, fake, recorder) = spawn_recorder();
    recorder.initialize().await.unwrap();
    recorder.start().await.unwrap();
    recorder.stop().await.unwrap();
    (dir, fake, recorder)
}

#[tokio::test]
async fn test_uninitialized_rejects_everything_but_lifecycle() {
    let (_dir, fake, recorder) = spawn_recorder();

    assert!(recorder.start().await.is_err());
    assert!(recorder.stop().await.is_err());
    assert!(recorder.save_recording("rec2").await.is_err());
    assert!(recorder.delete_recording().await.is_err());
    assert_eq!(recorder.state(), RecorderControlState::default());

    recorder.dispose().await.unwrap();
    recorder.app_go_inactive().await.unwrap();
    assert!(fake.calls().is_empty());

    recorder.initialize().await.unwrap();
    recorder.initialize().await.unwrap();
    assert_eq!(fake.count("initialize"), 1);
    assert_eq!(recorder.state().state, RecorderState::Stopped);
}

#[tokio::test]
async fn test_record_then_save_scenario() {
    let (dir, fake, recorder) = spawn_recorder();
    recorder.initialize().await.unwrap();

    recorder.start().await.unwrap();
    assert_eq!(recorder.state().state, RecorderState::Recording);

    let take = recorder.stop().await.unwrap().expect("a finished take");
    assert_eq!(take.name, "rec1");
    let stopped = recorder.state();
    assert_eq!(stopped.state, RecorderState::Stopped);
    assert_eq!(stopped.pending, Some(take.clone()));

    // Illegal name: nothing changes and the service is never asked
    assert!(recorder.save_recording("rec/2").await.is_err());
    assert_eq!(recorder.state(), stopped);
    assert_eq!(fake.count("save"), 0);

    let saved = recorder.save_recording("rec2").await.unwrap();
    assert_eq!(saved.name, "rec2");
    assert_eq!(saved.duration, take.duration);
    assert_eq!(saved.path, dir.path().join("rec2.wav"));
    assert!(saved.path.exists());
    assert!(recorder.state().pending.is_none());
}

#[tokio::test]
async fn test_pending_recording_blocks_new_take() {
    let (_dir, fake, recorder) = recorder_with_pending().await;

    assert!(recorder.start().await.is_err());
    assert_eq!(fake.count("start_recording"), 1);

    let pending = recorder.state().pending.unwrap();
    recorder.delete_recording().await.unwrap();
    assert!(!pending.path.exists());
    assert!(recorder.state().pending.is_none());

    recorder.start().await.unwrap();
    assert_eq!(recorder.state().state, RecorderState::Recording);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (_dir, fake, recorder) = recorder_with_pending().await;
    let pending = recorder.state().pending;

    assert_eq!(recorder.stop().await.unwrap(), pending);
    assert_eq!(fake.count("stop_recording"), 1);

    recorder.delete_recording().await.unwrap();
    assert_eq!(recorder.stop().await.unwrap(), None);
}

#[tokio::test]
async fn test_save_and_delete_need_a_pending_recording() {
    let (_dir, _fake, recorder) = spawn_recorder();
    recorder.initialize().await.unwrap();

    assert!(recorder.save_recording("memo").await.is_err());
    assert!(recorder.delete_recording().await.is_err());

    recorder.start().await.unwrap();
    assert!(recorder.save_recording("memo").await.is_err());
    assert!(recorder.delete_recording().await.is_err());
    assert_eq!(recorder.state().state, RecorderState::Recording);
}

#[tokio::test]
async fn test_missing_file_fails_without_touching_pending() {
    let (_dir, fake, recorder) = recorder_with_pending().await;
    let before = recorder.state();
    std::fs::remove_file(&before.pending.as_ref().unwrap().path).unwrap();

    assert!(recorder.save_recording("rec2").await.is_err());
    assert!(recorder.delete_recording().await.is_err());

    assert_eq!(recorder.state(), before);
    assert_eq!(fake.count("save"), 0);
    assert_eq!(fake.count("delete"), 0);
}

#[tokio::test]
async fn test_service_failure_leaves_state_unchanged() {
    let (_dir, fake, recorder) = recorder_with_pending().await;
    let mut failures = recorder.failures();
    let before = recorder.state();

    fake.fail_next("save", "disk full");
    let result = recorder.save_recording("rec2").await;

    assert_eq!(result.unwrap_err().message(), "disk full");
    assert_eq!(recorder.state(), before);
    assert_eq!(failures.recv().await.unwrap().message(), "disk full");

    recorder.save_recording("rec2").await.unwrap();
    assert!(recorder.state().pending.is_none());
}

#[tokio::test]
async fn test_failed_delete_keeps_pending() {
    let (_dir, fake, recorder) = recorder_with_pending().await;
    let before = recorder.state();
    let pending = before.pending.clone().unwrap();

    fake.fail_next("delete", "permission denied");
    assert!(recorder.delete_recording().await.is_err());

    assert_eq!(recorder.state(), before);
    assert!(pending.path.exists());

    recorder.delete_recording().await.unwrap();
    assert!(!pending.path.exists());
    assert!(recorder.state().pending.is_none());
}

#[tokio::test]
async fn test_failed_stop_hands_back_a_stopped_recorder() {
    let (_dir, fake, recorder) = spawn_recorder();
    let mut states = recorder.subscribe();
    recorder.initialize().await.unwrap();
    recorder.start().await.unwrap();

    fake.fail_next("stop_recording", "encoder crashed");
    let result = recorder.stop().await;
    assert_eq!(result.unwrap_err().message(), "encoder crashed");

    // The service reports that nothing is recording any more
    let stopped = wait_for(&mut states, |s| s.state == RecorderState::Stopped).await;
    assert!(stopped.pending.is_none());
    assert_eq!(recorder.stop().await.unwrap(), None);

    recorder.start().await.unwrap();
    assert_eq!(recorder.state().state, RecorderState::Recording);
    assert_eq!(fake.count("start_recording"), 2);
}

#[tokio::test]
async fn test_illegal_name_is_shown_then_cleared() {
    let (_dir, _fake, recorder) = recorder_with_pending().await;
    let mut states = recorder.subscribe();
    let shown = tokio::spawn(async move { wait_for(&mut states, |s| s.error.is_some()).await });
    let before = recorder.state();

    assert!(recorder.save_recording("rec/2").await.is_err());

    let shown = shown.await.unwrap();
    assert!(shown.error.is_some());
    assert_eq!(shown.with_error(None), before);
    assert_eq!(recorder.state(), before);
}

#[tokio::test]
async fn test_failed_start_stays_stopped() {
    let (_dir, fake, recorder) = spawn_recorder();
    recorder.initialize().await.unwrap();
    let before = recorder.state();

    fake.fail_next("start_recording", "microphone busy");
    assert!(recorder.start().await.is_err());

    assert_eq!(recorder.state(), before);
}

#[tokio::test]
async fn test_elapsed_follows_service() {
    let (_dir, fake, recorder) = spawn_recorder();
    let mut states = recorder.subscribe();
    recorder.initialize().await.unwrap();
    recorder.start().await.unwrap();

    for tick in 1..=10 {
        fake.push_elapsed(Duration::from_millis(tick * 250));
    }

    let latest = wait_for(&mut states, |s| s.elapsed == Duration::from_millis(2500)).await;
    assert_eq!(latest.state, RecorderState::Recording);
}

#[tokio::test]
async fn test_service_stop_event_ends_recording() {
    let (_dir, fake, recorder) = spawn_recorder();
    let mut states = recorder.subscribe();
    recorder.initialize().await.unwrap();
    recorder.start().await.unwrap();

    fake.push_state(RecorderState::Stopped);

    let stopped = wait_for(&mut states, |s| s.state == RecorderState::Stopped).await;
    assert!(stopped.pending.is_none());
    recorder.start().await.unwrap();
}

#[tokio::test]
async fn test_app_go_inactive_forces_stop() {
    let (_dir, fake, recorder) = spawn_recorder();
    recorder.initialize().await.unwrap();
    recorder.start().await.unwrap();

    recorder.app_go_inactive().await.unwrap();

    let state = recorder.state();
    assert_eq!(state.state, RecorderState::Stopped);
    assert_eq!(state.pending.map(|p| p.name), Some("rec1".to_string()));
    assert_eq!(fake.count("stop_recording"), 1);

    // Already stopped: nothing to do
    recorder.app_go_inactive().await.unwrap();
    assert_eq!(fake.count("stop_recording"), 1);
}

#[tokio::test]
async fn test_app_go_inactive_stops_even_when_service_fails() {
    let (_dir, fake, recorder) = spawn_recorder();
    recorder.initialize().await.unwrap();
    recorder.start().await.unwrap();

    fake.fail_next("stop_recording", "encoder crashed");
    let result = recorder.app_go_inactive().await;

    assert!(result.is_err());
    let state = recorder.state();
    assert_eq!(state.state, RecorderState::Stopped);
    assert!(state.pending.is_none());
    assert!(!state.processing);
}

#[tokio::test]
async fn test_app_go_inactive_waits_for_in_flight_save() {
    let (dir, fake, recorder) = recorder_with_pending().await;
    fake.delay_saves(Duration::from_millis(100));

    let (saved, inactive) = tokio::join!(
        recorder.save_recording("kept"),
        recorder.app_go_inactive()
    );

    assert_eq!(saved.unwrap().path, dir.path().join("kept.wav"));
    inactive.unwrap();
    assert!(dir.path().join("kept.wav").exists());
    assert_eq!(fake.count("stop_recording"), 1);
    assert_eq!(recorder.state().state, RecorderState::Stopped);
    assert!(recorder.state().pending.is_none());
}

#[tokio::test]
async fn test_dispose_and_teardown() {
    let (_dir, fake, recorder) = recorder_with_pending().await;

    recorder.dispose().await.unwrap();
    assert_eq!(recorder.state(), RecorderControlState::default());
    assert_eq!(fake.count("dispose"), 1);

    recorder.initialize().await.unwrap();
    drop(recorder);
    eventually(|| fake.count("dispose") == 2).await;
}
