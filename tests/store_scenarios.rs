use std::sync::Arc;

use chrono::NaiveDate;
use todo_board_lib::backend::{LocalBackend, MemoryBackend};
use todo_board_lib::error::{StoreError, ValidationError};
use todo_board_lib::models::{Category, Priority, SortField, Task, TaskDraft, TaskFilter, TaskPatch};
use todo_board_lib::state::TaskStore;

fn memory_store() -> TaskStore {
    TaskStore::new(Arc::new(MemoryBackend::new()))
}

fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(Task::title).collect()
}

#[tokio::test]
async fn buy_milk_moves_between_partitions_when_toggled() {
    let store = memory_store();
    let draft = TaskDraft::from_form("Buy milk", "high", "2025-01-01", "shopping").unwrap();
    let task = store.add_task(draft).await.unwrap();

    let open = store.get_filtered(&TaskFilter::completed(false));
    assert_eq!(titles(&open), ["Buy milk"]);
    assert_eq!(open[0].priority(), Priority::High);
    assert_eq!(open[0].category(), Category::Shopping);
    assert_eq!(open[0].due_date(), NaiveDate::from_ymd_opt(2025, 1, 1));

    assert!(store.toggle_task(task.id()).await.unwrap());
    assert_eq!(
        titles(&store.get_filtered(&TaskFilter::completed(true))),
        ["Buy milk"]
    );
    assert!(store.get_filtered(&TaskFilter::completed(false)).is_empty());
}

#[tokio::test]
async fn emptying_a_title_fails_and_keeps_the_old_one() {
    let store = memory_store();
    let task = store.add_task(TaskDraft::new("Walk dog")).await.unwrap();
    let err = store
        .update_task(task.id(), &TaskPatch::title(""))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(ValidationError::EmptyTitle)));
    assert_eq!(store.get(task.id()).unwrap().title(), "Walk dog");
}

#[tokio::test]
async fn invalid_titles_leave_the_count_unchanged() {
    let store = memory_store();
    store.add_task(TaskDraft::new("keep")).await.unwrap();
    for blank in ["", "   ", "\t\n"] {
        let err = store.add_task(TaskDraft::new(blank)).await.unwrap_err();
        assert_eq!(err.validation(), Some(&ValidationError::EmptyTitle));
    }
    let err = store
        .add_task(TaskDraft::new("a".repeat(201)))
        .await
        .unwrap_err();
    assert!(matches!(
        err.validation(),
        Some(ValidationError::TitleTooLong { len: 201, max: 200 })
    ));
    // Exactly at the limit is fine.
    store.add_task(TaskDraft::new("b".repeat(200))).await.unwrap();
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn local_backend_round_trips_through_a_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let first = TaskStore::new(Arc::new(LocalBackend::new(dir.path().to_path_buf()).unwrap()));
    let a = first
        .add_task(
            TaskDraft::new("  Pay rent ")
                .priority(Priority::High)
                .category(Category::Personal)
                .due_date(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()),
        )
        .await
        .unwrap();
    let b = first.add_task(TaskDraft::new("Read book")).await.unwrap();
    first.toggle_task(b.id()).await.unwrap();
    let c = first.add_task(TaskDraft::new("gone")).await.unwrap();
    assert!(first.delete_task(c.id()).await.unwrap());
    assert!(!first.delete_task(c.id()).await.unwrap());

    let second = TaskStore::new(Arc::new(LocalBackend::new(dir.path().to_path_buf()).unwrap()));
    second.load().await.unwrap();
    assert_eq!(second.tasks(), first.tasks());
    assert_eq!(second.get(a.id()).unwrap().title(), "Pay rent");
    assert!(second.get(b.id()).unwrap().completed());
    assert!(dir.path().join("todos.json").exists());
}

#[tokio::test]
async fn sorted_views_follow_documented_conventions() {
    let store = memory_store();
    let day = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
    store
        .add_task(TaskDraft::new("undated low").priority(Priority::Low))
        .await
        .unwrap();
    store
        .add_task(TaskDraft::new("late").due_date(day(20)))
        .await
        .unwrap();
    store
        .add_task(TaskDraft::new("undated high").priority(Priority::High))
        .await
        .unwrap();
    store
        .add_task(TaskDraft::new("early").due_date(day(2)))
        .await
        .unwrap();

    let by_due = store.get_sorted(SortField::DueDate, true);
    assert_eq!(&titles(&by_due)[..2], ["early", "late"]);
    assert!(by_due[2..].iter().all(|t| t.due_date().is_none()));

    let by_priority = store.get_sorted_by("priority", true).unwrap();
    let ranks: Vec<Priority> = by_priority.iter().map(Task::priority).collect();
    assert_eq!(
        ranks,
        [Priority::High, Priority::Medium, Priority::Medium, Priority::Low]
    );
}
