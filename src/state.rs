use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{Local, NaiveDate, Utc};
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::error::{ErrorCategory, PersistenceError, StoreError, ValidationError};
use crate::models::{SortField, Task, TaskDraft, TaskFilter, TaskPatch, TaskStats};

pub type Listener = Arc<dyn Fn(&[Task]) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&StoreError) + Send + Sync>;

/// The session's task collection. Mutations are persisted through the backend
/// before they are applied in memory and announced to subscribers.
#[derive(Clone)]
pub struct TaskStore {
    backend: Arc<dyn Backend>,
    inner: Arc<Mutex<StoreData>>,
}

struct StoreData {
    tasks: Vec<Task>,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
    error_handlers: HashMap<ErrorCategory, ErrorHandler>,
}

/// Handle returned by [`TaskStore::subscribe`].
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<StoreData>>,
}

impl Subscription {
    /// Deregisters the listener. Returns whether it was still registered.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut guard = inner.lock();
        let before = guard.listeners.len();
        guard.listeners.retain(|(id, _)| *id != self.id);
        guard.listeners.len() != before
    }
}

impl TaskStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            inner: Arc::new(Mutex::new(StoreData {
                tasks: Vec::new(),
                listeners: Vec::new(),
                next_listener_id: 0,
                error_handlers: HashMap::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[Task]) + Send + Sync + 'static,
    {
        let mut guard = self.inner.lock();
        let id = guard.next_listener_id;
        guard.next_listener_id += 1;
        guard.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers the handler for `category`, replacing any previous one.
    pub fn on_error<F>(&self, category: ErrorCategory, handler: F)
    where
        F: Fn(&StoreError) + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .error_handlers
            .insert(category, Arc::new(handler));
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.inner.lock().tasks.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.inner.lock().tasks.iter().find(|t| t.id() == id).cloned()
    }

    // Listeners run on a snapshot with the lock released, in registration order.
    // One that was unsubscribed mid-round is skipped.
    fn notify(&self) {
        let (snapshot, listeners) = {
            let guard = self.inner.lock();
            (guard.tasks.clone(), guard.listeners.clone())
        };
        for (id, listener) in listeners {
            let registered = self.inner.lock().listeners.iter().any(|(l, _)| *l == id);
            if registered {
                listener(&snapshot);
            }
        }
    }

    fn handle_error(&self, category: ErrorCategory, error: &StoreError) {
        let handler = self.inner.lock().error_handlers.get(&category).cloned();
        match handler {
            Some(handler) => handler(error),
            None => log::error!("[{category}] {error}"),
        }
    }

    fn fail_validation(&self, category: ErrorCategory, error: ValidationError) -> StoreError {
        let error = StoreError::from(error);
        self.handle_error(category, &error);
        error
    }

    fn fail_persistence(&self, category: ErrorCategory, error: PersistenceError) -> StoreError {
        let error = StoreError::from(error);
        self.handle_error(ErrorCategory::Save, &error);
        self.handle_error(category, &error);
        error
    }

    /// Replaces the collection with the backend's. On failure nothing changes.
    pub async fn load(&self) -> Result<(), StoreError> {
        match self.backend.list().await {
            Ok(tasks) => {
                log::info!("loaded {} tasks", tasks.len());
                self.inner.lock().tasks = tasks;
                self.notify();
                Ok(())
            }
            Err(err) => {
                let error = StoreError::from(err);
                self.handle_error(ErrorCategory::Load, &error);
                Err(error)
            }
        }
    }

    pub async fn add_task(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let task = Task::create(draft, Utc::now())
            .map_err(|err| self.fail_validation(ErrorCategory::Add, err))?;
        let created = self
            .backend
            .create(&task)
            .await
            .map_err(|err| self.fail_persistence(ErrorCategory::Add, err))?;
        {
            let mut guard = self.inner.lock();
            guard.tasks.retain(|t| t.id() != created.id());
            guard.tasks.push(created.clone());
        }
        log::info!("added task id={}", created.id());
        self.notify();
        Ok(created)
    }

    /// Returns `false` when no task has `id`.
    pub async fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        if self.get(id).is_none() {
            log::debug!("delete skipped, no task id={id}");
            return Ok(false);
        }
        match self.backend.delete(id).await {
            Ok(()) => {
                self.remove_local(id);
                log::info!("deleted task id={id}");
                self.notify();
                Ok(true)
            }
            Err(PersistenceError::NotFound(_)) => {
                self.drop_stale(id);
                Ok(false)
            }
            Err(err) => Err(self.fail_persistence(ErrorCategory::Delete, err)),
        }
    }

    /// Deletes every listed task that exists; returns how many were removed.
    /// Stops at the first backend failure, keeping the deletions already made.
    pub async fn delete_tasks(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut removed = 0;
        let mut changed = false;
        let mut failure = None;
        for id in ids {
            if self.get(id).is_none() {
                continue;
            }
            match self.backend.delete(id).await {
                Ok(()) => {
                    self.remove_local(id);
                    removed += 1;
                    changed = true;
                }
                Err(PersistenceError::NotFound(_)) => {
                    self.remove_local(id);
                    changed = true;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        if changed {
            log::info!("bulk delete removed {removed} tasks");
            self.notify();
        }
        match failure {
            Some(err) => Err(self.fail_persistence(ErrorCategory::Delete, err)),
            None => Ok(removed),
        }
    }

    /// Returns `false` when no task has `id`.
    pub async fn toggle_task(&self, id: &str) -> Result<bool, StoreError> {
        let Some(mut candidate) = self.get(id) else {
            log::debug!("toggle skipped, no task id={id}");
            return Ok(false);
        };
        candidate.toggle_complete(Utc::now());
        self.commit_update(ErrorCategory::Toggle, candidate).await
    }

    /// Returns `false` when no task has `id`. Validation failures leave the task untouched.
    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<bool, StoreError> {
        let Some(mut candidate) = self.get(id) else {
            log::debug!("update skipped, no task id={id}");
            return Ok(false);
        };
        candidate
            .update(patch, Utc::now())
            .map_err(|err| self.fail_validation(ErrorCategory::Update, err))?;
        self.commit_update(ErrorCategory::Update, candidate).await
    }

    async fn commit_update(
        &self,
        category: ErrorCategory,
        candidate: Task,
    ) -> Result<bool, StoreError> {
        match self.backend.update(&candidate).await {
            Ok(stored) => {
                let stored = stored.not_older_than(candidate.updated_at());
                {
                    let mut guard = self.inner.lock();
                    if let Some(slot) = guard.tasks.iter_mut().find(|t| t.id() == stored.id()) {
                        *slot = stored;
                    }
                }
                log::info!("{category} committed for task id={}", candidate.id());
                self.notify();
                Ok(true)
            }
            Err(PersistenceError::NotFound(_)) => {
                self.drop_stale(candidate.id());
                Ok(false)
            }
            Err(err) => Err(self.fail_persistence(category, err)),
        }
    }

    fn remove_local(&self, id: &str) {
        self.inner.lock().tasks.retain(|t| t.id() != id);
    }

    // The backend no longer knows the task; another view removed it.
    fn drop_stale(&self, id: &str) {
        log::warn!("task id={id} vanished from the backend, dropping local copy");
        self.remove_local(id);
        self.notify();
    }

    pub fn get_filtered(&self, filter: &TaskFilter) -> Vec<Task> {
        self.get_filtered_on(filter, Local::now().date_naive())
    }

    pub fn get_filtered_on(&self, filter: &TaskFilter, today: NaiveDate) -> Vec<Task> {
        self.inner
            .lock()
            .tasks
            .iter()
            .filter(|task| filter.matches(task, today))
            .cloned()
            .collect()
    }

    /// Sorted copy of the collection. For priority, `ascending` means most
    /// important first. Tasks without a due date always sort last.
    pub fn get_sorted(&self, field: SortField, ascending: bool) -> Vec<Task> {
        let mut tasks = self.tasks();
        sort_tasks(&mut tasks, field, ascending);
        tasks
    }

    /// [`TaskStore::get_sorted`] with the field given by name.
    pub fn get_sorted_by(&self, field: &str, ascending: bool) -> Result<Vec<Task>, StoreError> {
        let field: SortField = field.parse()?;
        Ok(self.get_sorted(field, ascending))
    }

    pub fn stats(&self) -> TaskStats {
        TaskStats::collect(&self.inner.lock().tasks, Local::now().date_naive())
    }
}

pub fn sort_tasks(tasks: &mut [Task], field: SortField, ascending: bool) {
    let directed = |ordering: std::cmp::Ordering| {
        if ascending {
            ordering
        } else {
            ordering.reverse()
        }
    };
    match field {
        SortField::CreatedAt => tasks.sort_by(|a, b| directed(a.created_at().cmp(&b.created_at()))),
        SortField::UpdatedAt => tasks.sort_by(|a, b| directed(a.updated_at().cmp(&b.updated_at()))),
        SortField::Priority => {
            tasks.sort_by(|a, b| directed(b.priority().rank().cmp(&a.priority().rank())))
        }
        SortField::DueDate => tasks.sort_by(|a, b| match (a.due_date(), b.due_date()) {
            (Some(a), Some(b)) => directed(a.cmp(&b)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }),
    }
}
