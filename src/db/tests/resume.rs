use super::test_db;
use crate::types::{ResumeData, Task, TaskId, TaskMeta};
use std::collections::HashMap;

fn sample_task(id: &str) -> Task {
    Task::Download(TaskMeta {
        task_id: TaskId(id.to_string()),
        url: "https://example.com/file.zip".to_string(),
        url_query_parameters: HashMap::new(),
        headers: HashMap::new(),
        http_request_method: crate::types::HttpMethod::Get,
        post: None,
        base_directory: crate::types::BaseDirectory::Temporary,
        directory: String::new(),
        filename: "file.zip".to_string(),
        group: "default".to_string(),
        updates: crate::types::Updates::StatusAndProgress,
        requires_wifi: false,
        retries: 0,
        retries_remaining: 0,
        allow_pause: true,
        priority: 5,
        meta_data: HashMap::new(),
        display_name: None,
        creation_time: 0,
        unique: false,
    })
}

#[tokio::test]
async fn put_and_get_resume_data_round_trips() {
    let (db, _dir) = test_db().await;
    let task = sample_task("t1");
    db.insert_task(&task).await.expect("insert task");

    let resume = ResumeData {
        task_id: task.id().clone(),
        data: "/tmp/partial-abc".to_string(),
        required_start_byte: 4096,
        e_tag: Some("\"etag-value\"".to_string()),
    };
    db.put_resume_data(&resume).await.expect("put resume");

    let fetched = db
        .get_resume_data(task.id())
        .await
        .expect("get resume")
        .expect("present");
    assert_eq!(fetched, resume);
}

#[tokio::test]
async fn put_resume_data_upserts_existing_row() {
    let (db, _dir) = test_db().await;
    let task = sample_task("t2");
    db.insert_task(&task).await.expect("insert task");

    let first = ResumeData {
        task_id: task.id().clone(),
        data: "/tmp/a".to_string(),
        required_start_byte: 100,
        e_tag: None,
    };
    db.put_resume_data(&first).await.expect("put first");

    let second = ResumeData {
        task_id: task.id().clone(),
        data: "/tmp/b".to_string(),
        required_start_byte: 200,
        e_tag: Some("\"e2\"".to_string()),
    };
    db.put_resume_data(&second).await.expect("put second");

    let fetched = db
        .get_resume_data(task.id())
        .await
        .expect("get")
        .expect("present");
    assert_eq!(fetched, second);
}

#[tokio::test]
async fn delete_resume_data_clears_row() {
    let (db, _dir) = test_db().await;
    let task = sample_task("t3");
    db.insert_task(&task).await.expect("insert task");

    let resume = ResumeData {
        task_id: task.id().clone(),
        data: "/tmp/c".to_string(),
        required_start_byte: 0,
        e_tag: None,
    };
    db.put_resume_data(&resume).await.expect("put");
    db.delete_resume_data(task.id()).await.expect("delete");

    assert!(db.get_resume_data(task.id()).await.expect("get").is_none());
}

#[tokio::test]
async fn get_resume_data_for_unknown_task_is_none() {
    let (db, _dir) = test_db().await;
    let missing = TaskId("nope".to_string());
    assert!(db.get_resume_data(&missing).await.expect("get").is_none());
}
