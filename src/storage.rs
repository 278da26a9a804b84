use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistenceError;
use crate::models::{SettingsFile, TaskRecord};

/// The task list lives under a single key: one JSON array, replaced wholesale on save.
pub const STORAGE_KEY: &str = "todos";
const SETTINGS_FILE: &str = "settings.json";

pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ensure_dirs(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn tasks_path(&self) -> PathBuf {
        self.root.join(format!("{STORAGE_KEY}.json"))
    }

    /// A missing file is an empty list.
    pub fn load_tasks(&self) -> Result<Vec<TaskRecord>, PersistenceError> {
        match self.load_json(self.tasks_path()) {
            Err(PersistenceError::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            other => other,
        }
    }

    pub fn save_tasks(&self, records: &[TaskRecord]) -> Result<(), PersistenceError> {
        self.write_atomic(self.tasks_path(), &records)
    }

    pub fn load_settings(&self) -> Result<SettingsFile, PersistenceError> {
        self.load_json(self.root.join(SETTINGS_FILE))
    }

    pub fn save_settings(&self, data: &SettingsFile) -> Result<(), PersistenceError> {
        self.write_atomic(self.root.join(SETTINGS_FILE), data)
    }

    fn load_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, PersistenceError> {
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    fn write_atomic<T: Serialize>(&self, path: PathBuf, data: &T) -> Result<(), PersistenceError> {
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(data)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendKind, Settings};

    fn record(id: &str) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            title: format!("task-{id}"),
            description: None,
            priority: Some("high".into()),
            category: Some("work".into()),
            due_date: Some("2025-01-01".into()),
            completed: false,
            created_at: Some("2025-01-01T00:00:00+00:00".into()),
            updated_at: Some("2025-01-01T00:00:00+00:00".into()),
        }
    }

    #[test]
    fn missing_task_file_loads_as_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(storage.load_tasks().unwrap().is_empty());
    }

    #[test]
    fn tasks_are_stored_as_one_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        storage.save_tasks(&[record("a"), record("b")]).unwrap();

        let raw = fs::read_to_string(dir.path().join("todos.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert_eq!(value[0]["dueDate"], "2025-01-01");
        assert!(!dir.path().join("todos.tmp").exists());

        storage.save_tasks(&[record("c")]).unwrap();
        let loaded = storage.load_tasks().unwrap();
        assert_eq!(loaded, vec![record("c")]);
    }

    #[test]
    fn corrupt_task_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("todos.json"), b"{not json").unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(matches!(storage.load_tasks(), Err(PersistenceError::Json(_))));
    }

    #[test]
    fn save_fails_when_target_is_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("todos.json")).unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(matches!(
            storage.save_tasks(&[record("a")]),
            Err(PersistenceError::Io(_))
        ));
    }

    #[test]
    fn settings_round_trip_with_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("nested"));
        storage.ensure_dirs().unwrap();
        assert!(storage.load_settings().is_err());

        let settings = Settings {
            backend: BackendKind::Remote,
            ..Settings::default()
        };
        storage
            .save_settings(&SettingsFile {
                schema_version: 1,
                settings: settings.clone(),
            })
            .unwrap();
        let loaded = storage.load_settings().unwrap();
        assert_eq!(loaded.schema_version, 1);
        assert_eq!(loaded.settings, settings);
    }
}
