use crate::domain::error::Result;
use crate::domain::test_session::TestSession;
use crate::infrastructure::db::sessions::SessionStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 256;
const SNAPSHOT_BUFFER: usize = 16;

/// Fan-out of owner change notifications into per-subscriber snapshot streams.
#[derive(Clone)]
pub struct SessionFeed {
    store: Arc<dyn SessionStore>,
    changes: broadcast::Sender<String>,
    active: Arc<AtomicUsize>,
}

impl SessionFeed {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store,
            changes,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Signals that `owner_id`'s sessions changed. A no-op when nobody is listening.
    pub fn notify(&self, owner_id: &str) {
        let _ = self.changes.send(owner_id.to_string());
    }

    /// Streams the owner's full session list: once immediately, then after every change.
    pub fn subscribe(&self, owner_id: &str) -> SessionSubscription {
        // Listen before the first read so a change racing the initial snapshot is not lost.
        let mut changes = self.changes.subscribe();
        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let owner = owner_id.to_string();

        let task = tokio::spawn(async move {
            if snapshot_tx.send(store.list_for_owner(&owner).await).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    message = changes.recv() => match message {
                        Ok(changed) if changed == owner => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(owner_id = %owner, skipped, "Live feed lagged, resending snapshot");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }

                let snapshot = store.list_for_owner(&owner).await;
                if let Err(e) = &snapshot {
                    warn!(owner_id = %owner, error = %e, "Live feed snapshot failed");
                }
                if snapshot_tx.send(snapshot).await.is_err() {
                    break;
                }
            }
        });

        let count = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(owner_id = %owner_id, active = count, "Live feed subscribed");

        SessionSubscription {
            owner_id: owner_id.to_string(),
            snapshots: snapshot_rx,
            shutdown: shutdown_tx,
            task: Some(task),
            active: Arc::clone(&self.active),
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct SessionSubscription {
    owner_id: String,
    snapshots: mpsc::Receiver<Result<Vec<TestSession>>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
}

impl SessionSubscription {
    /// `None` once the feed has shut down.
    pub async fn next_snapshot(&mut self) -> Option<Result<Vec<TestSession>>> {
        self.snapshots.recv().await
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = self.shutdown.send(true);
        task.abort();
        self.snapshots.close();
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(owner_id = %self.owner_id, active = remaining, "Live feed released");
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AppError;
    use crate::domain::test_session::{
        Platform, PlatformDetails, SessionFieldUpdate, SessionStatus,
    };
    use crate::infrastructure::db::connection::init_memory_db;
    use crate::infrastructure::db::sessions::SqliteSessionStore;
    use async_trait::async_trait;
    use std::time::Duration;

    fn session(id: &str, owner: &str, created_at: i64) -> TestSession {
        TestSession {
            id: id.to_string(),
            user_id: owner.to_string(),
            user_name: "Tester".to_string(),
            platform_details: PlatformDetails {
                platform_name: Platform::Roku,
                device_model: None,
                os_version: None,
                app_version: None,
                browser_name: None,
                browser_version: None,
                custom_platform_name: None,
            },
            test_cases: Vec::new(),
            status: SessionStatus::InProgress,
            created_at,
            updated_at: created_at,
            completed_at: None,
            summary: None,
            reason_for_incompletion: None,
        }
    }

    async fn feed() -> (SessionFeed, Arc<dyn SessionStore>) {
        let store: Arc<dyn SessionStore> =
            Arc::new(SqliteSessionStore::new(init_memory_db().await.unwrap()));
        (SessionFeed::new(Arc::clone(&store)), store)
    }

    async fn next(sub: &mut SessionSubscription) -> Vec<TestSession> {
        tokio::time::timeout(Duration::from_secs(2), sub.next_snapshot())
            .await
            .expect("snapshot timed out")
            .expect("feed closed")
            .unwrap()
    }

    #[tokio::test]
    async fn test_initial_snapshot_then_update_after_change() {
        let (feed, store) = feed().await;
        store.create_session(&session("a", "owner", 1)).await.unwrap();

        let mut sub = feed.subscribe("owner");
        assert_eq!(next(&mut sub).await.len(), 1);

        store.create_session(&session("b", "owner", 2)).await.unwrap();
        feed.notify("owner");

        let ids: Vec<String> = next(&mut sub).await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_changes_for_other_owners_are_ignored() {
        let (feed, store) = feed().await;
        let mut sub = feed.subscribe("owner");
        assert!(next(&mut sub).await.is_empty());

        store.create_session(&session("x", "someone-else", 1)).await.unwrap();
        feed.notify("someone-else");

        let waited = tokio::time::timeout(Duration::from_millis(100), sub.next_snapshot()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_reflects_field_updates() {
        let (feed, store) = feed().await;
        store.create_session(&session("a", "owner", 1)).await.unwrap();
        let mut sub = feed.subscribe("owner");
        next(&mut sub).await;

        let update = SessionFieldUpdate {
            status: Some(SessionStatus::Aborted),
            updated_at: Some(5),
            ..Default::default()
        };
        store.update_fields("a", &update).await.unwrap();
        feed.notify("owner");

        assert_eq!(next(&mut sub).await[0].status, SessionStatus::Aborted);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_drop_release_subscriptions() {
        let (feed, _store) = feed().await;
        let first = feed.subscribe("owner");
        let second = feed.subscribe("owner");
        assert_eq!(feed.active_subscriptions(), 2);

        first.unsubscribe();
        assert_eq!(feed.active_subscriptions(), 1);

        drop(second);
        assert_eq!(feed.active_subscriptions(), 0);
    }

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn create_session(&self, _session: &TestSession) -> Result<String> {
            Err(AppError::DatabaseError("offline".to_string()))
        }

        async fn update_fields(&self, _id: &str, _update: &SessionFieldUpdate) -> Result<()> {
            Err(AppError::DatabaseError("offline".to_string()))
        }

        async fn get_session(&self, _id: &str) -> Result<TestSession> {
            Err(AppError::DatabaseError("offline".to_string()))
        }

        async fn list_for_owner(&self, _owner_id: &str) -> Result<Vec<TestSession>> {
            Err(AppError::DatabaseError("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_errors_are_delivered_and_feed_keeps_running() {
        let feed = SessionFeed::new(Arc::new(BrokenStore));
        let mut sub = feed.subscribe("owner");

        let first = sub.next_snapshot().await.unwrap();
        assert!(matches!(first, Err(AppError::DatabaseError(_))));

        feed.notify("owner");
        let second = tokio::time::timeout(Duration::from_secs(2), sub.next_snapshot())
            .await
            .unwrap()
            .unwrap();
        assert!(second.is_err());
    }
}
