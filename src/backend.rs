//! The backing collaborator contract and its in-process implementations.

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PersistenceError;
use crate::models::{Task, TaskRecord};
use crate::storage::Storage;

pub type BackendResult<T> = Result<T, PersistenceError>;

/// Durable home of the task list. Every method returns the authoritative state
/// after the call; callers adopt the echoed task rather than their own copy.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetches every stored task. Fails as a whole if any record is invalid.
    async fn list(&self) -> BackendResult<Vec<Task>>;

    /// Stores a new task and returns the stored form (which may carry a
    /// collaborator-assigned id and timestamps).
    async fn create(&self, task: &Task) -> BackendResult<Task>;

    /// Replaces the stored task with the same id.
    ///
    /// Returns [`PersistenceError::NotFound`] when no such task is stored.
    async fn update(&self, task: &Task) -> BackendResult<Task>;

    /// Returns [`PersistenceError::NotFound`] when no such task is stored.
    async fn delete(&self, id: &str) -> BackendResult<()>;
}

pub(crate) fn restore_all(records: Vec<TaskRecord>) -> BackendResult<Vec<Task>> {
    records
        .into_iter()
        .map(|record| {
            let id = record.id.clone();
            Task::restore(record).map_err(|source| PersistenceError::InvalidRecord { id, source })
        })
        .collect()
}

/// On-device storage: the whole list is rewritten on every change.
pub struct LocalBackend {
    storage: Storage,
    // Serializes read-modify-write cycles on the file.
    write_lock: Mutex<()>,
}

impl LocalBackend {
    pub fn new(root: PathBuf) -> BackendResult<Self> {
        let storage = Storage::new(root);
        storage.ensure_dirs()?;
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
        })
    }

    fn modify<T>(
        &self,
        apply: impl FnOnce(&mut Vec<TaskRecord>) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let _guard = self.write_lock.lock();
        let mut records = self.storage.load_tasks()?;
        let out = apply(&mut records)?;
        self.storage.save_tasks(&records)?;
        Ok(out)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn list(&self) -> BackendResult<Vec<Task>> {
        restore_all(self.storage.load_tasks()?)
    }

    async fn create(&self, task: &Task) -> BackendResult<Task> {
        self.modify(|records| {
            records.retain(|record| record.id != task.id());
            records.push(task.to_record());
            Ok(())
        })?;
        log::debug!("local backend stored task id={}", task.id());
        Ok(task.clone())
    }

    async fn update(&self, task: &Task) -> BackendResult<Task> {
        self.modify(|records| {
            let slot = records
                .iter_mut()
                .find(|record| record.id == task.id())
                .ok_or_else(|| PersistenceError::NotFound(task.id().to_string()))?;
            *slot = task.to_record();
            Ok(())
        })?;
        Ok(task.clone())
    }

    async fn delete(&self, id: &str) -> BackendResult<()> {
        self.modify(|records| {
            let before = records.len();
            records.retain(|record| record.id != id);
            if records.len() == before {
                return Err(PersistenceError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }
}

/// Volatile collaborator for sessions without persistence and for tests.
/// Failures can be injected per call.
#[derive(Default)]
pub struct MemoryBackend {
    tasks: Mutex<Vec<Task>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            fail_next: Mutex::new(None),
        }
    }

    /// Makes the next call fail with a transport error carrying `message`.
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    pub fn stored(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }

    fn check_failure(&self) -> BackendResult<()> {
        match self.fail_next.lock().take() {
            Some(message) => Err(PersistenceError::Transport(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn list(&self) -> BackendResult<Vec<Task>> {
        self.check_failure()?;
        Ok(self.stored())
    }

    async fn create(&self, task: &Task) -> BackendResult<Task> {
        self.check_failure()?;
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| t.id() != task.id());
        tasks.push(task.clone());
        Ok(task.clone())
    }

    async fn update(&self, task: &Task) -> BackendResult<Task> {
        self.check_failure()?;
        let mut tasks = self.tasks.lock();
        let slot = tasks
            .iter_mut()
            .find(|t| t.id() == task.id())
            .ok_or_else(|| PersistenceError::NotFound(task.id().to_string()))?;
        *slot = task.clone();
        Ok(task.clone())
    }

    async fn delete(&self, id: &str) -> BackendResult<()> {
        self.check_failure()?;
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|t| t.id() != id);
        if tasks.len() == before {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, TaskDraft, TaskPatch};
    use chrono::Utc;
    use std::fs;

    fn make_task(title: &str) -> Task {
        Task::create(TaskDraft::new(title).priority(Priority::High), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn local_backend_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_path_buf()).unwrap();
        assert!(backend.list().await.unwrap().is_empty());

        let a = backend.create(&make_task("a")).await.unwrap();
        let b = backend.create(&make_task("b")).await.unwrap();

        let mut changed = a.clone();
        changed.update(&TaskPatch::title("a2"), Utc::now()).unwrap();
        backend.update(&changed).await.unwrap();
        backend.delete(b.id()).await.unwrap();

        let reopened = LocalBackend::new(dir.path().to_path_buf()).unwrap();
        let tasks = reopened.list().await.unwrap();
        assert_eq!(tasks, vec![changed]);
    }

    #[tokio::test]
    async fn local_backend_reports_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path().to_path_buf()).unwrap();
        let ghost = make_task("ghost");
        assert!(matches!(
            backend.update(&ghost).await,
            Err(PersistenceError::NotFound(id)) if id == ghost.id()
        ));
        assert!(matches!(
            backend.delete("nope").await,
            Err(PersistenceError::NotFound(_))
        ));
        // Failed modifications never create the file.
        assert!(!dir.path().join("todos.json").exists());
    }

    #[tokio::test]
    async fn local_backend_rejects_a_list_with_an_invalid_record() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("todos.json"),
            r#"[{"id":"ok","title":"fine"},{"id":"bad","title":"   "}]"#,
        )
        .unwrap();
        let backend = LocalBackend::new(dir.path().to_path_buf()).unwrap();
        match backend.list().await {
            Err(PersistenceError::InvalidRecord { id, .. }) => assert_eq!(id, "bad"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn memory_backend_injects_one_failure() {
        let backend = MemoryBackend::new();
        backend.fail_next("offline");
        assert!(matches!(
            backend.create(&make_task("a")).await,
            Err(PersistenceError::Transport(m)) if m == "offline"
        ));
        assert!(backend.stored().is_empty());
        backend.create(&make_task("a")).await.unwrap();
        assert_eq!(backend.stored().len(), 1);
    }
}
