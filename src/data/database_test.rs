//! Database tests

use super::*;
use crate::error::AppError;
use chrono::Utc;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn credentials(suffix: &str) -> AppCredentials {
    AppCredentials {
        client_id: format!("client-{suffix}"),
        client_secret: format!("secret-{suffix}"),
    }
}

fn key(twitter: &str, mastodon: &str) -> BridgeKey {
    BridgeKey {
        twitter_handle: twitter.to_string(),
        mastodon_user: mastodon.to_string(),
    }
}

fn changes(host_id: i64, token: &str) -> BridgeChanges {
    BridgeChanges {
        enabled: true,
        settings: BridgeSettings::default(),
        twitter_oauth_token: format!("tw-{token}"),
        twitter_oauth_secret: format!("tw-secret-{token}"),
        mastodon_access_code: format!("md-{token}"),
        mastodon_host_id: host_id,
        updated: Utc::now(),
    }
}

async fn insert_host(db: &Database, hostname: &str) -> MastodonHost {
    let (host, _) = db
        .insert_host_if_absent(hostname, &credentials(hostname))
        .await
        .unwrap();
    host
}

#[tokio::test]
async fn test_database_connection() {
    let (db, _temp_dir) = create_test_db().await;
    assert_eq!(db.count_bridges().await.unwrap(), 0);
    assert_eq!(db.count_hosts().await.unwrap(), 0);
}

#[tokio::test]
async fn test_host_insert_and_lookup() {
    let (db, _temp_dir) = create_test_db().await;

    let (host, inserted) = db
        .insert_host_if_absent("example.social", &credentials("a"))
        .await
        .unwrap();
    assert!(inserted);
    assert_eq!(host.hostname, "example.social");
    assert_eq!(host.client_id, "client-a");

    let found = db.get_host_by_hostname("example.social").await.unwrap();
    assert_eq!(found, Some(host));
    assert!(db.get_host_by_hostname("other.social").await.unwrap().is_none());
}

#[tokio::test]
async fn test_host_insert_keeps_first_registration() {
    let (db, _temp_dir) = create_test_db().await;

    let (first, _) = db
        .insert_host_if_absent("example.social", &credentials("first"))
        .await
        .unwrap();
    let (second, inserted) = db
        .insert_host_if_absent("example.social", &credentials("second"))
        .await
        .unwrap();

    assert!(!inserted);
    assert_eq!(second.id, first.id);
    assert_eq!(second.client_id, "client-first");
    assert_eq!(db.count_hosts().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bridge_insert_and_find() {
    let (db, _temp_dir) = create_test_db().await;
    let host = insert_host(&db, "example.social").await;

    let new = NewBridge {
        key: key("alice", "alice"),
        changes: changes(host.id, "1"),
        mastodon_account_id: Some("109".to_string()),
        cursors: InitialCursors {
            twitter_last_id: 1_500,
            mastodon_last_id: 42,
        },
    };

    let (bridge, inserted) = db.insert_bridge(&new).await.unwrap();
    assert!(inserted);
    assert_eq!(bridge.twitter_handle, "alice");
    assert_eq!(bridge.twitter_last_id, 1_500);
    assert_eq!(bridge.mastodon_last_id, 42);
    assert_eq!(bridge.mastodon_host_id, host.id);
    assert_eq!(bridge.metadata_id, None);
    assert_eq!(bridge.settings, BridgeSettings::default());

    let found = db.find_bridge_by_key(&key("alice", "alice")).await.unwrap();
    assert_eq!(found.map(|b| b.id), Some(bridge.id));
    assert!(
        db.find_bridge_by_key(&key("alice", "bob"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_bridge_insert_conflict_keeps_cursors() {
    let (db, _temp_dir) = create_test_db().await;
    let host = insert_host(&db, "example.social").await;

    let first = NewBridge {
        key: key("alice", "alice"),
        changes: changes(host.id, "1"),
        mastodon_account_id: None,
        cursors: InitialCursors {
            twitter_last_id: 10,
            mastodon_last_id: 20,
        },
    };
    db.insert_bridge(&first).await.unwrap();

    let racing = NewBridge {
        changes: changes(host.id, "2"),
        cursors: InitialCursors {
            twitter_last_id: 99,
            mastodon_last_id: 99,
        },
        ..first.clone()
    };
    let (bridge, inserted) = db.insert_bridge(&racing).await.unwrap();

    assert!(!inserted);
    assert_eq!(bridge.twitter_oauth_token, "tw-2");
    assert_eq!(bridge.twitter_last_id, 10);
    assert_eq!(bridge.mastodon_last_id, 20);
    assert_eq!(db.count_bridges().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bridge_update_leaves_cursors() {
    let (db, _temp_dir) = create_test_db().await;
    let host = insert_host(&db, "example.social").await;
    let other_host = insert_host(&db, "other.social").await;
    let bridge_key = key("alice", "alice");

    db.insert_bridge(&NewBridge {
        key: bridge_key.clone(),
        changes: changes(host.id, "1"),
        mastodon_account_id: None,
        cursors: InitialCursors::default(),
    })
    .await
    .unwrap();

    // Relay worker advances the cursors
    db.set_cursors_for_test(&bridge_key, 777, 888).await.unwrap();

    let mut update = changes(other_host.id, "2");
    update.enabled = false;
    update.settings.toot_visibility = TootVisibility::Unlisted;
    update.settings.post_sensitive_behavior = SensitiveBehavior::Attachments;

    let bridge = db
        .update_bridge(&bridge_key, &update)
        .await
        .unwrap()
        .expect("bridge exists");

    assert!(!bridge.enabled);
    assert_eq!(bridge.settings.toot_visibility, TootVisibility::Unlisted);
    assert_eq!(
        bridge.settings.post_sensitive_behavior,
        SensitiveBehavior::Attachments
    );
    assert_eq!(bridge.mastodon_access_code, "md-2");
    assert_eq!(bridge.mastodon_host_id, other_host.id);
    assert_eq!(bridge.twitter_last_id, 777);
    assert_eq!(bridge.mastodon_last_id, 888);
}

#[tokio::test]
async fn test_bridge_update_missing_row() {
    let (db, _temp_dir) = create_test_db().await;
    let host = insert_host(&db, "example.social").await;

    let result = db
        .update_bridge(&key("nobody", "nobody"), &changes(host.id, "1"))
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(db.count_bridges().await.unwrap(), 0);
}

#[tokio::test]
async fn test_bridge_delete_is_idempotent() {
    let (db, _temp_dir) = create_test_db().await;
    let host = insert_host(&db, "example.social").await;
    let bridge_key = key("alice", "alice");

    db.insert_bridge(&NewBridge {
        key: bridge_key.clone(),
        changes: changes(host.id, "1"),
        mastodon_account_id: None,
        cursors: InitialCursors::default(),
    })
    .await
    .unwrap();

    assert!(db.delete_bridge(&bridge_key).await.unwrap());
    assert!(!db.delete_bridge(&bridge_key).await.unwrap());
    assert_eq!(db.count_bridges().await.unwrap(), 0);
    // Host registrations outlive bridges
    assert_eq!(db.count_hosts().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bridge_requires_existing_host() {
    let (db, _temp_dir) = create_test_db().await;

    let result = db
        .insert_bridge(&NewBridge {
            key: key("alice", "alice"),
            changes: changes(4_242, "1"),
            mastodon_account_id: None,
            cursors: InitialCursors::default(),
        })
        .await;

    assert!(matches!(result, Err(AppError::Database(_))));
    assert_eq!(db.count_bridges().await.unwrap(), 0);
}

#[tokio::test]
async fn test_bridge_metadata_lookup() {
    let (db, _temp_dir) = create_test_db().await;
    let host = insert_host(&db, "example.social").await;
    let bridge_key = key("alice", "alice");

    db.insert_bridge(&NewBridge {
        key: bridge_key.clone(),
        changes: changes(host.id, "1"),
        mastodon_account_id: None,
        cursors: InitialCursors::default(),
    })
    .await
    .unwrap();

    let metadata_id = db.attach_metadata_for_test(&bridge_key, 3).await.unwrap();
    let bridge = db.find_bridge_by_key(&bridge_key).await.unwrap().unwrap();
    assert_eq!(bridge.metadata_id, Some(metadata_id));

    let metadata = db.get_bridge_metadata(metadata_id).await.unwrap().unwrap();
    assert_eq!(metadata.worker_id, Some(3));
    assert!(!metadata.is_bot);
    assert!(metadata.last_tweet.is_none());
}
