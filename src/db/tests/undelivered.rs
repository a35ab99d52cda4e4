use super::test_db;
use crate::types::{ProgressUpdate, Status, StatusUpdate, TaskId, Update, UpdateKind};

fn status_update(id: &str) -> Update {
    Update::Status(StatusUpdate {
        task_id: TaskId(id.to_string()),
        group: "default".to_string(),
        status: Status::Complete,
        exception: None,
        response_body: None,
        mime_type: None,
        char_set: None,
        response_status_code: Some(200),
        response_headers: Default::default(),
    })
}

fn progress_update(id: &str) -> Update {
    Update::Progress(ProgressUpdate {
        task_id: TaskId(id.to_string()),
        group: "default".to_string(),
        progress: 0.5,
        expected_file_size: Some(1000),
        network_speed_mbps: 1.2,
        time_remaining_ms: 500,
    })
}

#[tokio::test]
async fn pop_undelivered_only_returns_matching_kind() {
    let (db, _dir) = test_db().await;
    db.push_undelivered(&status_update("t1")).await.expect("push");
    db.push_undelivered(&progress_update("t2")).await.expect("push");

    let statuses = db.pop_undelivered(UpdateKind::Status).await.expect("pop");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].kind(), UpdateKind::Status);

    let progress = db.pop_undelivered(UpdateKind::Progress).await.expect("pop");
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].kind(), UpdateKind::Progress);
}

#[tokio::test]
async fn pop_undelivered_clears_the_buffer() {
    let (db, _dir) = test_db().await;
    db.push_undelivered(&status_update("t1")).await.expect("push");

    let first = db.pop_undelivered(UpdateKind::Status).await.expect("pop");
    assert_eq!(first.len(), 1);

    let second = db.pop_undelivered(UpdateKind::Status).await.expect("pop");
    assert!(second.is_empty());
}

#[tokio::test]
async fn pop_undelivered_preserves_emission_order() {
    let (db, _dir) = test_db().await;
    for i in 0..3 {
        db.push_undelivered(&status_update(&format!("t{i}")))
            .await
            .expect("push");
    }

    let statuses = db.pop_undelivered(UpdateKind::Status).await.expect("pop");
    let ids: Vec<_> = statuses.iter().map(|u| u.task_id().as_str().to_string()).collect();
    assert_eq!(ids, vec!["t0", "t1", "t2"]);
}
