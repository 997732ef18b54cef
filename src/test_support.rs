// Shared fixtures for registry and API tests

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::db::SqliteGateway;
use crate::entities::BRANCHES_TABLE;
use crate::error::{GatewayError, StorageError};
use crate::gateway::{Filter, Ordering, RemoteTableGateway, Row};
use crate::notify::{BranchChanged, NotificationBus};
use crate::registry::BranchRegistry;
use crate::storage::{MemorySelectionStore, SelectionStore, SELECTED_BRANCH_KEY};
use crate::toast::CollectedToasts;

/// Debounce window used by tests
pub(crate) const TEST_DEBOUNCE: Duration = Duration::from_millis(20);

/// In-memory SQLite gateway that counts calls and can be told to fail
pub(crate) struct TestGateway {
    inner: SqliteGateway,
    calls: AtomicUsize,
    failure: Mutex<Option<GatewayError>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl TestGateway {
    pub(crate) fn new() -> Self {
        TestGateway {
            inner: SqliteGateway::open_in_memory().unwrap(),
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            gate: Mutex::new(None),
        }
    }

    /// Insert a row directly, bypassing the call counter
    pub(crate) async fn seed(&self, id: &str, name: &str) {
        let mut row = Row::new();
        row.insert("id".into(), Value::from(id));
        row.insert("name".into(), Value::from(name));
        row.insert("address".into(), Value::from(format!("{} Street", name)));
        self.inner.insert(BRANCHES_TABLE, row).await.unwrap();
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Every following call fails with `err`
    pub(crate) fn fail_with(&self, err: GatewayError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    /// Selects wait until the returned Notify is signalled
    pub(crate) fn hold_selects(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn enter(&self) -> Result<(), GatewayError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteTableGateway for TestGateway {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        ordering: Option<&Ordering>,
    ) -> Result<Vec<Row>, GatewayError> {
        self.enter()?;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.inner.select(table, filters, ordering).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, GatewayError> {
        self.enter()?;
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, GatewayError> {
        self.enter()?;
        self.inner.update(table, id, patch).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), GatewayError> {
        self.enter()?;
        self.inner.delete(table, id).await
    }
}

/// Selection store whose writes always fail
pub(crate) struct ReadOnlySelectionStore;

impl SelectionStore for ReadOnlySelectionStore {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(read_only())
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(read_only())
    }
}

fn read_only() -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "read-only filesystem",
    ))
}

/// Registry wired to test doubles, with every side effect observable
pub(crate) struct Harness {
    pub registry: Arc<BranchRegistry>,
    pub gateway: Arc<TestGateway>,
    pub store: Arc<MemorySelectionStore>,
    pub toasts: Arc<CollectedToasts>,
    events: Arc<Mutex<Vec<BranchChanged>>>,
}

impl Harness {
    pub(crate) fn stored(&self) -> Option<String> {
        self.store.get(SELECTED_BRANCH_KEY)
    }

    pub(crate) fn events(&self) -> Vec<BranchChanged> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }
}

/// `seed` is (id, name) pairs; `stored` pre-populates the selection key
pub(crate) async fn harness(seed: &[(&str, &str)], stored: Option<&str>) -> Harness {
    let gateway = Arc::new(TestGateway::new());
    for (id, name) in seed {
        gateway.seed(id, name).await;
    }

    let store = Arc::new(match stored {
        Some(id) => MemorySelectionStore::with_entry(SELECTED_BRANCH_KEY, id),
        None => MemorySelectionStore::new(),
    });
    let toasts = Arc::new(CollectedToasts::new());
    let bus = Arc::new(NotificationBus::new());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.subscribe(move |event: &BranchChanged| sink.lock().unwrap().push(event.clone()));

    let registry = BranchRegistry::new(gateway.clone(), store.clone(), bus)
        .with_toasts(toasts.clone())
        .with_debounce(TEST_DEBOUNCE);

    Harness {
        registry: Arc::new(registry),
        gateway,
        store,
        toasts,
        events,
    }
}

/// Wait long enough for a debounced notification to fire
pub(crate) async fn settle() {
    tokio::time::sleep(TEST_DEBOUNCE * 5).await;
}
