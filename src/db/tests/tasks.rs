use super::test_db;
use crate::types::{Status, Task, TaskException, TaskMeta};
use std::collections::HashMap;

fn sample_task(id: &str) -> Task {
    Task::Download(TaskMeta {
        task_id: crate::types::TaskId(id.to_string()),
        url: "https://example.com/file.zip".to_string(),
        url_query_parameters: HashMap::new(),
        headers: HashMap::new(),
        http_request_method: crate::types::HttpMethod::Get,
        post: None,
        base_directory: crate::types::BaseDirectory::Temporary,
        directory: "downloads".to_string(),
        filename: "file.zip".to_string(),
        group: "default".to_string(),
        updates: crate::types::Updates::StatusAndProgress,
        requires_wifi: false,
        retries: 3,
        retries_remaining: 3,
        allow_pause: true,
        priority: 5,
        meta_data: HashMap::new(),
        display_name: None,
        creation_time: 1_700_000_000_000,
        unique: false,
    })
}

#[tokio::test]
async fn insert_and_get_round_trips_task() {
    let (db, _dir) = test_db().await;
    let task = sample_task("t1");
    db.insert_task(&task).await.expect("insert");

    let record = db.get_task(task.id()).await.expect("get").expect("present");
    assert_eq!(record.task, task);
    assert_eq!(record.status, Status::Enqueued);
    assert_eq!(record.progress, None);
}

#[tokio::test]
async fn get_missing_task_returns_none() {
    let (db, _dir) = test_db().await;
    let missing = crate::types::TaskId("nope".to_string());
    assert!(db.get_task(&missing).await.expect("get").is_none());
}

#[tokio::test]
async fn list_tasks_orders_newest_first() {
    let (db, _dir) = test_db().await;
    let mut older = sample_task("old");
    older.meta_mut().creation_time = 1_000;
    let mut newer = sample_task("new");
    newer.meta_mut().creation_time = 2_000;

    db.insert_task(&older).await.expect("insert");
    db.insert_task(&newer).await.expect("insert");

    let tasks = db.list_tasks().await.expect("list");
    assert_eq!(tasks[0].task.id(), newer.id());
    assert_eq!(tasks[1].task.id(), older.id());
}

#[tokio::test]
async fn list_tasks_by_group_filters() {
    let (db, _dir) = test_db().await;
    let mut a = sample_task("a");
    a.meta_mut().group = "videos".to_string();
    let mut b = sample_task("b");
    b.meta_mut().group = "docs".to_string();

    db.insert_task(&a).await.expect("insert");
    db.insert_task(&b).await.expect("insert");

    let videos = db.list_tasks_by_group("videos").await.expect("list");
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].task.id(), a.id());
}

#[tokio::test]
async fn list_active_tasks_excludes_terminal_statuses() {
    let (db, _dir) = test_db().await;
    let running = sample_task("running");
    let done = sample_task("done");

    db.insert_task(&running).await.expect("insert");
    db.insert_task(&done).await.expect("insert");
    db.update_status(done.id(), Status::Complete)
        .await
        .expect("update");

    let active = db.list_active_tasks().await.expect("list");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].task.id(), running.id());
}

#[tokio::test]
async fn update_progress_sets_fraction_and_expected_size() {
    let (db, _dir) = test_db().await;
    let task = sample_task("t2");
    db.insert_task(&task).await.expect("insert");

    db.update_progress(task.id(), 0.5, Some(1024))
        .await
        .expect("update progress");

    let record = db.get_task(task.id()).await.expect("get").expect("present");
    assert_eq!(record.progress, Some(0.5));
    assert_eq!(record.expected_file_size, Some(1024));
}

#[tokio::test]
async fn set_exception_attaches_failure_detail() {
    let (db, _dir) = test_db().await;
    let task = sample_task("t3");
    db.insert_task(&task).await.expect("insert");
    db.update_status(task.id(), Status::Failed)
        .await
        .expect("update status");

    let exception = TaskException::HttpResponse {
        status_code: 403,
        description: "forbidden".to_string(),
    };
    db.set_exception(task.id(), &exception)
        .await
        .expect("set exception");

    let record = db.get_task(task.id()).await.expect("get").expect("present");
    assert_eq!(record.status, Status::Failed);
    assert_eq!(record.exception, Some(exception));
}

#[tokio::test]
async fn replace_task_overwrites_stored_definition() {
    let (db, _dir) = test_db().await;
    let mut task = sample_task("t4");
    db.insert_task(&task).await.expect("insert");

    task.meta_mut().priority = 1;
    db.replace_task(&task).await.expect("replace");

    let record = db.get_task(task.id()).await.expect("get").expect("present");
    assert_eq!(record.task.meta().priority, 1);
}

#[tokio::test]
async fn delete_task_removes_record() {
    let (db, _dir) = test_db().await;
    let task = sample_task("t5");
    db.insert_task(&task).await.expect("insert");
    db.delete_task(task.id()).await.expect("delete");

    assert!(db.get_task(task.id()).await.expect("get").is_none());
}

#[tokio::test]
async fn ids_to_cleanup_selects_excess_beyond_max_record_count() {
    let (db, _dir) = test_db().await;
    // created_at in task_records is stamped by insert_task itself (chrono::Utc::now),
    // so all five rows land well inside the max_age window; only the
    // max_record_count overflow should be selected.
    for i in 0..5 {
        let task = sample_task(&format!("t{i}"));
        db.insert_task(&task).await.expect("insert");
    }

    let ids = db
        .ids_to_cleanup(2, 10 * 24 * 60 * 60)
        .await
        .expect("ids_to_cleanup");
    assert_eq!(ids.len(), 3);
    for id in &ids {
        db.delete_task(id).await.expect("delete");
    }
    assert_eq!(db.count_tasks().await.expect("count"), 2);
}

#[tokio::test]
async fn count_tasks_reflects_inserts_and_deletes() {
    let (db, _dir) = test_db().await;
    assert_eq!(db.count_tasks().await.expect("count"), 0);

    let task = sample_task("t6");
    db.insert_task(&task).await.expect("insert");
    assert_eq!(db.count_tasks().await.expect("count"), 1);

    db.delete_task(task.id()).await.expect("delete");
    assert_eq!(db.count_tasks().await.expect("count"), 0);
}
