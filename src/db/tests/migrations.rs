use super::test_db;

#[tokio::test]
async fn new_database_creates_parent_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("deeper").join("test.db");
    let db = crate::Database::new(&path).await.expect("open database");
    assert!(path.exists());
    db.close().await;
}

#[tokio::test]
async fn reopening_an_existing_database_does_not_rerun_migrations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("test.db");

    let db = crate::Database::new(&path).await.expect("open database");
    db.close().await;

    // Reopening must not error even though schema_version already has rows.
    let db2 = crate::Database::new(&path).await.expect("reopen database");
    assert_eq!(db2.count_tasks().await.expect("count"), 0);
}

#[tokio::test]
async fn unclean_shutdown_is_detected_on_fresh_database() {
    let (db, _dir) = test_db().await;
    assert!(db.was_unclean_shutdown().await.expect("check"));
}

#[tokio::test]
async fn clean_start_clears_unclean_shutdown_flag() {
    let (db, _dir) = test_db().await;
    db.set_clean_start().await.expect("set clean start");
    // was_unclean_shutdown reports the *previous* session's flag; setting
    // clean_start marks the current session as clean, which the next
    // open would observe.
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = 'clean_shutdown'")
            .fetch_optional(db.pool())
            .await
            .expect("query");
    assert_eq!(value.as_deref(), Some("false"));
}
