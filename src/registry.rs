// 🏢 Branch Registry - which branches exist, which one is active
//
// Single source of truth for the branch list and the current selection.
// The selection is persisted through a SelectionStore and every change is
// announced on the NotificationBus (debounced) so branch-scoped views can
// re-query.
//
// State only changes after the gateway confirms an operation; a failed
// operation leaves the in-memory list and selection exactly as they were.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::debounce::{Debouncer, DEFAULT_DEBOUNCE};
use crate::entities::{Branch, BranchPatch, NewBranch, BRANCHES_TABLE, DEFAULT_COUNTRY};
use crate::error::RegistryError;
use crate::gateway::{Ordering, RemoteTableGateway, Row};
use crate::notify::{BranchChanged, NotificationBus, SubscriptionId};
use crate::storage::{SelectionStore, SELECTED_BRANCH_KEY};
use crate::toast::{LogToasts, Toast, ToastSink};

// ============================================================================
// STATE
// ============================================================================

/// Lifecycle of a registry instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// `load()` has never been called
    Uninitialized,
    /// A load is waiting on the gateway
    Loading,
    /// At least one load has finished (successfully or not)
    Ready,
}

struct Inner {
    state: RegistryState,
    branches: Vec<Branch>,
    current: Option<Branch>,
    /// Last notification timestamp handed out (keeps them strictly increasing)
    last_timestamp: i64,
}

/// Resets the in-flight flag when a load finishes, however it finishes
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, AtomicOrdering::SeqCst);
    }
}

// ============================================================================
// BRANCH REGISTRY
// ============================================================================

/// Registry of branches plus the active selection
///
/// Build one per process and share it as `Arc<BranchRegistry>`. Readers get
/// clones of the branch records; only the registry's own operations mutate
/// its state.
pub struct BranchRegistry {
    gateway: Arc<dyn RemoteTableGateway>,
    store: Arc<dyn SelectionStore>,
    bus: Arc<NotificationBus>,
    toasts: Arc<dyn ToastSink>,
    notifier: Debouncer<BranchChanged>,
    default_country: String,
    loading: AtomicBool,
    inner: RwLock<Inner>,
}

impl BranchRegistry {
    pub fn new(
        gateway: Arc<dyn RemoteTableGateway>,
        store: Arc<dyn SelectionStore>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        BranchRegistry {
            notifier: notifier(DEFAULT_DEBOUNCE, &bus),
            gateway,
            store,
            bus,
            toasts: Arc::new(LogToasts),
            default_country: DEFAULT_COUNTRY.to_string(),
            loading: AtomicBool::new(false),
            inner: RwLock::new(Inner {
                state: RegistryState::Uninitialized,
                branches: Vec::new(),
                current: None,
                last_timestamp: 0,
            }),
        }
    }

    pub fn from_config(
        config: &RegistryConfig,
        gateway: Arc<dyn RemoteTableGateway>,
        store: Arc<dyn SelectionStore>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self::new(gateway, store, bus)
            .with_debounce(config.debounce_window())
            .with_default_country(config.default_country.clone())
    }

    pub fn with_toasts(mut self, toasts: Arc<dyn ToastSink>) -> Self {
        self.toasts = toasts;
        self
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.notifier = notifier(window, &self.bus);
        self
    }

    pub fn with_default_country(mut self, country: impl Into<String>) -> Self {
        self.default_country = country.into();
        self
    }

    // ========================================================================
    // READ ACCESS
    // ========================================================================

    /// Snapshot of all loaded branches
    pub fn branches(&self) -> Vec<Branch> {
        self.read().branches.clone()
    }

    pub fn active_branches(&self) -> Vec<Branch> {
        self.read()
            .branches
            .iter()
            .filter(|b| b.is_active)
            .cloned()
            .collect()
    }

    pub fn current_branch(&self) -> Option<Branch> {
        self.read().current.clone()
    }

    pub fn current_branch_id(&self) -> Option<String> {
        self.read().current.as_ref().map(|b| b.id.clone())
    }

    pub fn find(&self, id: &str) -> Option<Branch> {
        find(&self.read().branches, id).cloned()
    }

    pub fn state(&self) -> RegistryState {
        self.read().state
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(AtomicOrdering::SeqCst)
    }

    /// Listen for branch changes
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&BranchChanged) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    /// Fetch all branches ordered by name
    ///
    /// Never fails: on a gateway error the previous list is kept and
    /// returned. A load issued while another is in flight returns the
    /// cached list without touching the gateway.
    pub async fn load(&self) -> Vec<Branch> {
        if self.loading.swap(true, AtomicOrdering::SeqCst) {
            debug!("Branch load already in flight; returning cached list");
            return self.branches();
        }
        let _in_flight = InFlight(&self.loading);

        self.write().state = RegistryState::Loading;

        let ordering = Ordering::asc("name");
        let result = match self.gateway.select(BRANCHES_TABLE, &[], Some(&ordering)).await {
            Ok(rows) => decode_all(rows),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(branches) => {
                let (loaded, change) = {
                    let mut inner = self.write();
                    inner.state = RegistryState::Ready;
                    inner.branches = branches;

                    let still_selected = inner
                        .current
                        .as_ref()
                        .and_then(|current| find(&inner.branches, &current.id))
                        .cloned();
                    let change = match still_selected {
                        Some(fresh) => {
                            inner.current = Some(fresh);
                            None
                        }
                        None => self.recover_selection(&mut inner),
                    };
                    (inner.branches.clone(), change)
                };

                info!("Loaded {} branches", loaded.len());
                self.announce(change);
                loaded
            }
            Err(message) => {
                error!("Failed to load branches: {}", message);
                let kept = {
                    let mut inner = self.write();
                    inner.state = RegistryState::Ready;
                    inner.branches.clone()
                };
                self.toasts
                    .show(Toast::failure(format!("Could not load branches: {}", message)));
                kept
            }
        }
    }

    /// Validate, normalize and insert a new branch
    pub async fn create(&self, fields: NewBranch) -> Result<Branch, RegistryError> {
        if let Err(err) = fields.validate() {
            return Err(self.fail("create branch", err));
        }

        let row = fields.normalize(&self.default_country);
        let inserted = match self.gateway.insert(BRANCHES_TABLE, row).await {
            Ok(row) => row,
            Err(e) => return Err(self.fail("create branch", e.into())),
        };
        let branch = self.decode_confirmed("create branch", inserted)?;

        let change = {
            let mut inner = self.write();
            inner.branches.retain(|b| b.id != branch.id);
            inner.branches.push(branch.clone());
            // Before the first load the list is partial; load recovers instead
            if inner.current.is_none() && inner.state == RegistryState::Ready {
                self.recover_selection(&mut inner)
            } else {
                None
            }
        };
        self.announce(change);

        info!("Created branch {} ({})", branch.name, branch.id);
        self.toasts
            .show(Toast::success(format!("Branch {} created", branch.label())));
        Ok(branch)
    }

    /// Apply a partial update to a loaded branch
    pub async fn update(&self, id: &str, patch: BranchPatch) -> Result<Branch, RegistryError> {
        if let Err(err) = patch.validate() {
            return Err(self.fail("update branch", err));
        }
        if self.find(id).is_none() {
            return Err(self.fail("update branch", RegistryError::NotFound(id.to_string())));
        }

        let updated = match self.gateway.update(BRANCHES_TABLE, id, patch.into_row()).await {
            Ok(row) => row,
            Err(e) => return Err(self.fail("update branch", e.into())),
        };
        let branch = self.decode_confirmed("update branch", updated)?;

        {
            let mut inner = self.write();
            if let Some(slot) = inner.branches.iter_mut().find(|b| b.id == branch.id) {
                *slot = branch.clone();
            }
            if inner.current.as_ref().is_some_and(|c| c.id == branch.id) {
                inner.current = Some(branch.clone());
            }
        }

        info!("Updated branch {} ({})", branch.name, branch.id);
        self.toasts
            .show(Toast::success(format!("Branch {} updated", branch.label())));
        Ok(branch)
    }

    /// Delete a loaded branch; deleting the current one re-runs selection recovery
    pub async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        let Some(branch) = self.find(id) else {
            return Err(self.fail("delete branch", RegistryError::NotFound(id.to_string())));
        };

        if let Err(e) = self.gateway.delete(BRANCHES_TABLE, id).await {
            return Err(self.fail("delete branch", e.into()));
        }

        let change = {
            let mut inner = self.write();
            inner.branches.retain(|b| b.id != id);
            if inner.current.as_ref().is_some_and(|c| c.id == id) {
                inner.current = None;
                self.recover_selection(&mut inner)
            } else {
                None
            }
        };
        self.announce(change);

        info!("Deleted branch {} ({})", branch.name, branch.id);
        self.toasts
            .show(Toast::success(format!("Branch {} deleted", branch.label())));
        Ok(())
    }

    /// Make `id` the current branch
    ///
    /// Works purely on the loaded list. Selection and persistence happen
    /// before this returns; only the bus notification is debounced.
    pub fn switch_branch(&self, id: &str) -> Result<Branch, RegistryError> {
        let (branch, event) = {
            let mut inner = self.write();

            if let Some(current) = inner.current.as_ref().filter(|c| c.id == id) {
                return Ok(current.clone());
            }

            let Some(branch) = find(&inner.branches, id).cloned() else {
                drop(inner);
                return Err(self.fail("switch branch", RegistryError::NotFound(id.to_string())));
            };

            inner.current = Some(branch.clone());
            self.persist(id);
            let event = next_event(&mut inner, id);
            (branch, event)
        };

        debug!("Switched to branch {}", branch.id);
        self.notifier.schedule(event);
        self.toasts
            .show(Toast::success(format!("Switched to {}", branch.label())));
        Ok(branch)
    }

    // ========================================================================
    // SELECTION RECOVERY
    // ========================================================================

    /// Pick a current branch after the list changed underneath the selection
    ///
    /// 1. empty list: nothing is current, stored id is cleared
    /// 2. stored id present in the list: select it
    /// 3. otherwise: select the first branch and persist its id
    ///
    /// Returns the notification to announce when the selected id changed.
    /// Running it twice in a row writes and announces nothing the second time.
    fn recover_selection(&self, inner: &mut Inner) -> Option<BranchChanged> {
        let previous = inner.current.as_ref().map(|b| b.id.clone());
        let stored = self.store.get(SELECTED_BRANCH_KEY);

        let next = if inner.branches.is_empty() {
            if stored.is_some() {
                self.clear_persisted();
            }
            None
        } else if let Some(found) = stored.as_deref().and_then(|id| find(&inner.branches, id)) {
            Some(found.clone())
        } else {
            let first = inner.branches.first().cloned();
            if let Some(first) = &first {
                self.persist(&first.id);
            }
            first
        };

        let next_id = next.as_ref().map(|b| b.id.clone());
        inner.current = next;

        match next_id {
            Some(id) if previous.as_deref() != Some(id.as_str()) => {
                debug!("Selection recovered to branch {}", id);
                Some(next_event(inner, &id))
            }
            _ => None,
        }
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn announce(&self, change: Option<BranchChanged>) {
        if let Some(event) = change {
            self.notifier.schedule(event);
        }
    }

    fn persist(&self, id: &str) {
        if let Err(e) = self.store.set(SELECTED_BRANCH_KEY, id) {
            warn!("Failed to persist selected branch {}: {}", id, e);
        }
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.store.remove(SELECTED_BRANCH_KEY) {
            warn!("Failed to clear selected branch: {}", e);
        }
    }

    /// Log, toast, and hand the error back
    fn fail(&self, action: &str, err: RegistryError) -> RegistryError {
        warn!("Failed to {}: {}", action, err);
        self.toasts
            .show(Toast::failure(format!("Could not {}: {}", action, err)));
        err
    }

    fn decode_confirmed(&self, action: &str, row: Row) -> Result<Branch, RegistryError> {
        Branch::from_row(row).map_err(|e| {
            self.fail(
                action,
                RegistryError::Persistence(format!("malformed branch row: {}", e)),
            )
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn notifier(window: Duration, bus: &Arc<NotificationBus>) -> Debouncer<BranchChanged> {
    let bus = Arc::clone(bus);
    Debouncer::new(window, move |event: BranchChanged| {
        bus.emit(&event);
    })
}

fn find<'a>(branches: &'a [Branch], id: &str) -> Option<&'a Branch> {
    branches.iter().find(|b| b.id == id)
}

fn next_event(inner: &mut Inner, id: &str) -> BranchChanged {
    let timestamp = Utc::now()
        .timestamp_millis()
        .max(inner.last_timestamp + 1);
    inner.last_timestamp = timestamp;

    BranchChanged {
        branch_id: id.to_string(),
        timestamp,
    }
}

fn decode_all(rows: Vec<Row>) -> Result<Vec<Branch>, String> {
    rows.into_iter()
        .map(|row| Branch::from_row(row).map_err(|e| format!("malformed branch row: {}", e)))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
