use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{ErrorCategory, StoreError};
use crate::models::{Task, TaskDraft, TaskFilter, TaskPatch};
use crate::scheduler::spawn_after;
use crate::state::{Subscription, TaskStore};

/// The user-facing side the controller drives.
pub trait UiCtx: Send + Sync + 'static {
    /// Called with every committed store snapshot.
    fn render(&self, tasks: &[Task]);
    fn set_filter(&self, filter: &TaskFilter);
    fn set_busy(&self, busy: bool);
    fn operation_changed(&self, id: &OperationId, state: &OperationState);
    fn show_notice(&self, notice: &Notice);
    fn dismiss_notice(&self, id: u64);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId(String);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Fulfilled,
    Rejected(String),
    /// The indicator's display time ran out.
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Shown next to the input that caused it.
    Validation,
    /// Banner.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Done(T),
    /// Dropped: another operation was in flight, or there was nothing to do.
    Ignored,
    /// Failed; the message was already shown. Callers keep the user's input.
    Rejected(String),
}

impl<T> Outcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

pub struct Controller<U: UiCtx> {
    store: TaskStore,
    ui: Arc<U>,
    busy: AtomicBool,
    // Keyed by id; the run number lets a stale clear timer recognise that
    // the same id has been reused by a newer run.
    operations: Arc<Mutex<HashMap<OperationId, (u64, OperationState)>>>,
    next_seq: AtomicU64,
    next_run: AtomicU64,
    next_notice: Arc<AtomicU64>,
    notice_ttl: Duration,
    subscription: Option<Subscription>,
}

impl<U: UiCtx> Controller<U> {
    pub fn new(store: TaskStore, ui: Arc<U>, notice_ttl: Duration) -> Self {
        let view = ui.clone();
        let subscription = store.subscribe(move |tasks| view.render(tasks));
        for category in [
            ErrorCategory::Add,
            ErrorCategory::Update,
            ErrorCategory::Toggle,
            ErrorCategory::Delete,
            ErrorCategory::Load,
            ErrorCategory::Save,
        ] {
            store.on_error(category, move |err| log::warn!("[{category}] {err}"));
        }
        Self {
            store,
            ui,
            busy: AtomicBool::new(false),
            operations: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(1),
            next_run: AtomicU64::new(1),
            next_notice: Arc::new(AtomicU64::new(1)),
            notice_ttl,
            subscription: Some(subscription),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn ui(&self) -> &Arc<U> {
        &self.ui
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn operations(&self) -> HashMap<OperationId, OperationState> {
        self.operations
            .lock()
            .iter()
            .map(|(id, (_, state))| (id.clone(), state.clone()))
            .collect()
    }

    fn operation_id(&self, kind: &str, key: Option<&str>) -> OperationId {
        match key {
            Some(key) => OperationId(format!("{kind}-{key}")),
            None => OperationId(format!("{kind}-{}", self.next_seq.fetch_add(1, Ordering::SeqCst))),
        }
    }

    fn set_state(&self, id: &OperationId, run: u64, state: OperationState) {
        self.operations.lock().insert(id.clone(), (run, state.clone()));
        self.ui.operation_changed(id, &state);
    }

    fn schedule_clear(&self, id: OperationId, run: u64) {
        let operations = self.operations.clone();
        let ui = self.ui.clone();
        spawn_after(self.notice_ttl, async move {
            let cleared = {
                let mut guard = operations.lock();
                match guard.get(&id) {
                    Some((current, _)) if *current == run => {
                        guard.remove(&id);
                        true
                    }
                    _ => false,
                }
            };
            if cleared {
                ui.operation_changed(&id, &OperationState::Cleared);
            } else {
                log::debug!("operation {id} reused before its clear, keeping newer state");
            }
        });
    }

    fn show_notice(&self, kind: NoticeKind, message: String) {
        let notice = Notice {
            id: self.next_notice.fetch_add(1, Ordering::SeqCst),
            kind,
            message,
        };
        self.ui.show_notice(&notice);
        let ui = self.ui.clone();
        let id = notice.id;
        spawn_after(self.notice_ttl, async move {
            ui.dismiss_notice(id);
        });
    }

    /// Runs one mutating round trip unless another is in flight.
    async fn run<T, F>(&self, id: OperationId, failure: &str, work: F) -> Outcome<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.busy.swap(true, Ordering::SeqCst) {
            log::debug!("busy, dropping {id}");
            return Outcome::Ignored;
        }
        self.ui.set_busy(true);
        let run = self.next_run.fetch_add(1, Ordering::SeqCst);
        self.set_state(&id, run, OperationState::Pending);

        let outcome = match work.await {
            Ok(value) => {
                self.set_state(&id, run, OperationState::Fulfilled);
                Outcome::Done(value)
            }
            Err(err) => {
                let message = format!("{failure}: {err}");
                let kind = if err.validation().is_some() {
                    NoticeKind::Validation
                } else {
                    NoticeKind::Error
                };
                self.show_notice(kind, message.clone());
                self.set_state(&id, run, OperationState::Rejected(message.clone()));
                Outcome::Rejected(message)
            }
        };

        self.busy.store(false, Ordering::SeqCst);
        self.ui.set_busy(false);
        self.schedule_clear(id, run);
        outcome
    }

    pub async fn initialize(&self) -> Outcome<()> {
        let id = self.operation_id("load", None);
        self.run(id, "failed to load tasks", self.store.load()).await
    }

    pub async fn submit_new_task(&self, draft: TaskDraft) -> Outcome<Task> {
        let id = self.operation_id("add", None);
        self.run(id, "failed to add task", self.store.add_task(draft)).await
    }

    /// `Done(false)` when the task no longer exists.
    pub async fn toggle(&self, task_id: &str) -> Outcome<bool> {
        let id = self.operation_id("toggle", Some(task_id));
        self.run(id, "failed to update task", self.store.toggle_task(task_id))
            .await
    }

    pub async fn delete(&self, task_id: &str) -> Outcome<bool> {
        let id = self.operation_id("delete", Some(task_id));
        self.run(id, "failed to delete task", self.store.delete_task(task_id))
            .await
    }

    /// An empty patch is ignored.
    pub async fn update(&self, task_id: &str, patch: TaskPatch) -> Outcome<bool> {
        if patch.is_empty() {
            return Outcome::Ignored;
        }
        let id = self.operation_id("update", Some(task_id));
        let store = &self.store;
        self.run(id, "failed to update task", async move {
            store.update_task(task_id, &patch).await
        })
        .await
    }

    /// Inline title edit. Blank or unchanged text is ignored.
    pub async fn edit_title(&self, task_id: &str, text: &str) -> Outcome<bool> {
        let text = text.trim();
        let unchanged = self
            .store
            .get(task_id)
            .is_some_and(|task| task.title() == text);
        if text.is_empty() || unchanged {
            return Outcome::Ignored;
        }
        self.update(task_id, TaskPatch::title(text)).await
    }

    /// Deletes every completed task; returns how many went.
    pub async fn clear_completed(&self) -> Outcome<usize> {
        let ids: Vec<String> = self
            .store
            .get_filtered(&TaskFilter::completed(true))
            .iter()
            .map(|task| task.id().to_string())
            .collect();
        if ids.is_empty() {
            return Outcome::Ignored;
        }
        let id = self.operation_id("clear", None);
        let store = &self.store;
        self.run(id, "failed to delete tasks", async move {
            store.delete_tasks(&ids).await
        })
        .await
    }

    pub fn change_filter(&self, filter: TaskFilter) {
        log::debug!("filter changed to {filter:?}");
        self.ui.set_filter(&filter);
    }
}

impl<U: UiCtx> Drop for Controller<U> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
