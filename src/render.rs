//! Incremental list rendering.
//!
//! The rendered list is two partitions, incomplete and completed. A
//! [`ListView`] remembers which item is shown where (by task id) and, given a
//! fresh task snapshot, emits the structural operations that bring a
//! [`RenderTarget`] in sync without rebuilding untouched items.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Local, NaiveDate};
use parking_lot::Mutex;

use crate::models::{Category, Locale, Priority, Task, TaskFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Incomplete,
    Completed,
}

impl Partition {
    pub fn of(completed: bool) -> Self {
        if completed {
            Partition::Completed
        } else {
            Partition::Incomplete
        }
    }
}

/// Formatting preferences handed to the renderer explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    pub locale: Locale,
    pub today: NaiveDate,
}

impl RenderContext {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            today: Local::now().date_naive(),
        }
    }

    pub fn priority_label(&self, priority: Priority) -> &'static str {
        match (self.locale, priority) {
            (Locale::Ja, Priority::High) => "高",
            (Locale::Ja, Priority::Medium) => "中",
            (Locale::Ja, Priority::Low) => "低",
            (Locale::En, Priority::High) => "High",
            (Locale::En, Priority::Medium) => "Medium",
            (Locale::En, Priority::Low) => "Low",
        }
    }

    /// `None` for uncategorized tasks, which show no tag.
    pub fn category_label(&self, category: Category) -> Option<&'static str> {
        let label = match (self.locale, category) {
            (_, Category::None) => return None,
            (Locale::Ja, Category::Work) => "仕事",
            (Locale::Ja, Category::Personal) => "個人",
            (Locale::Ja, Category::Shopping) => "買い物",
            (Locale::Ja, Category::Study) => "学習",
            (Locale::En, Category::Work) => "Work",
            (Locale::En, Category::Personal) => "Personal",
            (Locale::En, Category::Shopping) => "Shopping",
            (Locale::En, Category::Study) => "Study",
        };
        Some(label)
    }

    pub fn due_label(&self, due: Option<NaiveDate>) -> String {
        match (self.locale, due) {
            (Locale::Ja, None) => "期限なし".to_string(),
            (Locale::En, None) => "No due date".to_string(),
            (Locale::Ja, Some(date)) => {
                format!("{}年{}月{}日", date.year(), date.month(), date.day())
            }
            (Locale::En, Some(date)) => date.format("%b %-d, %Y").to_string(),
        }
    }
}

/// Everything an item shows; two equal views render identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    pub priority_label: String,
    pub category: Category,
    pub category_label: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_label: String,
    pub expired: bool,
    pub completed: bool,
    /// Only incomplete items accept inline title edits.
    pub editable: bool,
}

impl ItemView {
    pub fn from_task(task: &Task, ctx: &RenderContext) -> Self {
        Self {
            id: task.id().to_string(),
            title: task.title().to_string(),
            priority: task.priority(),
            priority_label: ctx.priority_label(task.priority()).to_string(),
            category: task.category(),
            category_label: ctx.category_label(task.category()).map(str::to_string),
            due_date: task.due_date(),
            due_label: ctx.due_label(task.due_date()),
            expired: task.is_expired_on(ctx.today),
            completed: task.completed(),
            editable: !task.completed(),
        }
    }

    pub fn partition(&self) -> Partition {
        Partition::of(self.completed)
    }

    pub fn changed_fields(&self, next: &ItemView) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.title != next.title {
            fields.push(Field::Title);
        }
        if self.priority != next.priority || self.priority_label != next.priority_label {
            fields.push(Field::Priority);
        }
        if self.category != next.category || self.category_label != next.category_label {
            fields.push(Field::Category);
        }
        if self.due_date != next.due_date
            || self.due_label != next.due_label
            || self.expired != next.expired
        {
            fields.push(Field::DueDate);
        }
        if self.completed != next.completed || self.editable != next.editable {
            fields.push(Field::Completed);
        }
        fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Priority,
    Category,
    DueDate,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOp {
    /// New item at the head of its partition.
    Insert { partition: Partition, item: ItemView },
    /// Animated removal from `from`, fresh item at the head of `to`.
    Move {
        from: Partition,
        to: Partition,
        item: ItemView,
    },
    /// In-place update of an existing item.
    Patch {
        partition: Partition,
        fields: Vec<Field>,
        item: ItemView,
    },
    /// Animated removal of a deleted (or filtered out) item.
    Remove { partition: Partition, id: String },
}

impl RenderOp {
    pub fn is_structural(&self) -> bool {
        !matches!(self, RenderOp::Patch { .. })
    }
}

/// A concrete list widget the reconciler drives.
pub trait RenderTarget {
    fn apply(&mut self, op: &RenderOp);

    fn scroll_position(&self) -> f64 {
        0.0
    }

    fn restore_scroll(&mut self, _position: f64) {}
}

#[derive(Debug, Clone)]
struct Rendered {
    partition: Partition,
    view: ItemView,
}

/// What is currently on screen, keyed by task id.
#[derive(Debug, Default)]
pub struct ListView {
    incomplete: Vec<String>,
    completed: Vec<String>,
    items: HashMap<String, Rendered>,
}

impl ListView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids in display order (head first).
    pub fn ids(&self, partition: Partition) -> &[String] {
        match partition {
            Partition::Incomplete => &self.incomplete,
            Partition::Completed => &self.completed,
        }
    }

    pub fn item(&self, id: &str) -> Option<&ItemView> {
        self.items.get(id).map(|rendered| &rendered.view)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn column_mut(&mut self, partition: Partition) -> &mut Vec<String> {
        match partition {
            Partition::Incomplete => &mut self.incomplete,
            Partition::Completed => &mut self.completed,
        }
    }

    fn push_head(&mut self, view: ItemView) {
        let partition = view.partition();
        self.column_mut(partition).insert(0, view.id.clone());
        self.items
            .insert(view.id.clone(), Rendered { partition, view });
    }

    fn detach(&mut self, id: &str, partition: Partition) {
        self.column_mut(partition).retain(|existing| existing != id);
        self.items.remove(id);
    }

    /// Brings the view (and `target`) in line with `tasks`, returning the
    /// operations applied, in order.
    pub fn reconcile(
        &mut self,
        tasks: &[Task],
        ctx: &RenderContext,
        target: &mut dyn RenderTarget,
    ) -> Vec<RenderOp> {
        let scroll = target.scroll_position();
        let mut pending: HashSet<String> = self.items.keys().cloned().collect();
        let mut ops = Vec::new();

        for task in tasks {
            let next = ItemView::from_task(task, ctx);
            let op = match self.items.get(task.id()) {
                None => {
                    self.push_head(next.clone());
                    Some(RenderOp::Insert {
                        partition: next.partition(),
                        item: next,
                    })
                }
                Some(current) if current.partition != next.partition() => {
                    let from = current.partition;
                    self.detach(task.id(), from);
                    self.push_head(next.clone());
                    Some(RenderOp::Move {
                        from,
                        to: next.partition(),
                        item: next,
                    })
                }
                Some(current) => {
                    let fields = current.view.changed_fields(&next);
                    if fields.is_empty() {
                        None
                    } else {
                        let partition = current.partition;
                        if let Some(slot) = self.items.get_mut(task.id()) {
                            slot.view = next.clone();
                        }
                        Some(RenderOp::Patch {
                            partition,
                            fields,
                            item: next,
                        })
                    }
                }
            };
            if let Some(op) = op {
                target.apply(&op);
                ops.push(op);
            }
            pending.remove(task.id());
        }

        // Leftovers were deleted; remove them in display order.
        let leftovers: Vec<(String, Partition)> = self
            .incomplete
            .iter()
            .map(|id| (id.clone(), Partition::Incomplete))
            .chain(
                self.completed
                    .iter()
                    .map(|id| (id.clone(), Partition::Completed)),
            )
            .filter(|(id, _)| pending.contains(id))
            .collect();
        for (id, partition) in leftovers {
            self.detach(&id, partition);
            let op = RenderOp::Remove { partition, id };
            target.apply(&op);
            ops.push(op);
        }

        target.restore_scroll(scroll);
        ops
    }
}

/// A list widget subscribed to a task store: filters each snapshot and
/// reconciles it onto its target.
pub struct ListPanel<T: RenderTarget> {
    inner: Mutex<PanelState<T>>,
}

struct PanelState<T> {
    view: ListView,
    target: T,
    ctx: RenderContext,
    filter: TaskFilter,
    last: Vec<Task>,
}

impl<T: RenderTarget> ListPanel<T> {
    pub fn new(target: T, ctx: RenderContext) -> Self {
        Self {
            inner: Mutex::new(PanelState {
                view: ListView::new(),
                target,
                ctx,
                filter: TaskFilter::default(),
                last: Vec::new(),
            }),
        }
    }

    pub fn render(&self, tasks: &[Task]) -> Vec<RenderOp> {
        let mut guard = self.inner.lock();
        guard.last = tasks.to_vec();
        Self::redraw(&mut guard)
    }

    /// Re-renders the last snapshot under a new filter.
    pub fn set_filter(&self, filter: TaskFilter) -> Vec<RenderOp> {
        let mut guard = self.inner.lock();
        guard.filter = filter;
        Self::redraw(&mut guard)
    }

    /// Re-renders the last snapshot with new formatting (locale or day change).
    pub fn set_context(&self, ctx: RenderContext) -> Vec<RenderOp> {
        let mut guard = self.inner.lock();
        guard.ctx = ctx;
        Self::redraw(&mut guard)
    }

    pub fn context(&self) -> RenderContext {
        self.inner.lock().ctx
    }

    pub fn with_target<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.lock().target)
    }

    fn redraw(state: &mut PanelState<T>) -> Vec<RenderOp> {
        let PanelState {
            view,
            target,
            ctx,
            filter,
            last,
        } = state;
        let visible: Vec<Task> = last
            .iter()
            .filter(|task| filter.matches(task, ctx.today))
            .cloned()
            .collect();
        view.reconcile(&visible, ctx, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskDraft, TaskPatch};
    use chrono::{TimeZone, Utc};

    #[derive(Default)]
    struct Recorder {
        ops: Vec<RenderOp>,
        scroll: f64,
        restored: Vec<f64>,
    }

    impl RenderTarget for Recorder {
        fn apply(&mut self, op: &RenderOp) {
            self.ops.push(op.clone());
        }

        fn scroll_position(&self) -> f64 {
            self.scroll
        }

        fn restore_scroll(&mut self, position: f64) {
            self.restored.push(position);
        }
    }

    fn ctx() -> RenderContext {
        RenderContext {
            locale: Locale::En,
            today: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        }
    }

    fn make_task(title: &str) -> Task {
        let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        Task::create(TaskDraft::new(title), now).unwrap()
    }

    fn toggled(task: &Task) -> Task {
        let mut next = task.clone();
        next.toggle_complete(Utc::now());
        next
    }

    #[test]
    fn first_render_inserts_each_task_at_its_partition_head() {
        let a = make_task("a");
        let b = make_task("b");
        let c = toggled(&make_task("c"));
        let mut view = ListView::new();
        let mut target = Recorder::default();

        let ops = view.reconcile(&[a.clone(), b.clone(), c.clone()], &ctx(), &mut target);
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|op| matches!(op, RenderOp::Insert { .. })));
        assert_eq!(target.ops, ops);
        // Most recently processed first.
        assert_eq!(
            view.ids(Partition::Incomplete),
            [b.id().to_string(), a.id().to_string()]
        );
        assert_eq!(view.ids(Partition::Completed), [c.id().to_string()]);
    }

    #[test]
    fn same_snapshot_twice_produces_no_operations() {
        let tasks = vec![make_task("a"), toggled(&make_task("b"))];
        let mut view = ListView::new();
        let mut target = Recorder::default();
        view.reconcile(&tasks, &ctx(), &mut target);
        let second = view.reconcile(&tasks, &ctx(), &mut target);
        assert!(second.is_empty());
        assert_eq!(target.ops.len(), 2);
    }

    #[test]
    fn completion_change_moves_item_to_head_of_other_partition() {
        let a = make_task("a");
        let b = toggled(&make_task("b"));
        let mut view = ListView::new();
        let mut target = Recorder::default();
        view.reconcile(&[a.clone(), b.clone()], &ctx(), &mut target);

        let a_done = toggled(&a);
        let ops = view.reconcile(&[a_done.clone(), b.clone()], &ctx(), &mut target);
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            RenderOp::Move { from, to, item } => {
                assert_eq!(*from, Partition::Incomplete);
                assert_eq!(*to, Partition::Completed);
                assert_eq!(item.id, a.id());
                assert!(!item.editable);
            }
            other => panic!("expected move, got {other:?}"),
        }
        assert!(view.ids(Partition::Incomplete).is_empty());
        assert_eq!(
            view.ids(Partition::Completed),
            [a.id().to_string(), b.id().to_string()]
        );
    }

    #[test]
    fn field_edits_patch_in_place() {
        let a = make_task("a");
        let mut view = ListView::new();
        let mut target = Recorder::default();
        view.reconcile(&[a.clone()], &ctx(), &mut target);

        let mut edited = a.clone();
        let patch = TaskPatch {
            title: Some("renamed".into()),
            priority: Some(Priority::High),
            ..TaskPatch::default()
        };
        edited.update(&patch, Utc::now()).unwrap();
        let ops = view.reconcile(&[edited], &ctx(), &mut target);
        assert_eq!(
            ops,
            vec![RenderOp::Patch {
                partition: Partition::Incomplete,
                fields: vec![Field::Title, Field::Priority],
                item: view.item(a.id()).cloned().unwrap(),
            }]
        );
        assert_eq!(view.item(a.id()).unwrap().title, "renamed");
        assert_eq!(view.item(a.id()).unwrap().priority_label, "High");
        assert!(!ops[0].is_structural());
    }

    #[test]
    fn missing_tasks_are_removed_and_scroll_is_restored() {
        let a = make_task("a");
        let b = make_task("b");
        let mut view = ListView::new();
        let mut target = Recorder {
            scroll: 120.0,
            ..Recorder::default()
        };
        view.reconcile(&[a.clone(), b.clone()], &ctx(), &mut target);
        let ops = view.reconcile(&[b.clone()], &ctx(), &mut target);
        assert_eq!(
            ops,
            vec![RenderOp::Remove {
                partition: Partition::Incomplete,
                id: a.id().to_string(),
            }]
        );
        assert_eq!(view.len(), 1);
        assert_eq!(target.restored, vec![120.0, 120.0]);
    }

    #[test]
    fn locale_switch_relabels_without_structural_changes() {
        let task = Task::create(
            TaskDraft::new("report")
                .category(crate::models::Category::Work)
                .due_date(NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()),
            Utc::now(),
        )
        .unwrap();
        let mut view = ListView::new();
        let mut target = Recorder::default();
        view.reconcile(&[task.clone()], &ctx(), &mut target);
        let shown = view.item(task.id()).unwrap().clone();
        assert_eq!(shown.category_label.as_deref(), Some("Work"));
        assert_eq!(shown.due_label, "Jan 5, 2025");
        assert!(shown.expired);

        let ja = RenderContext {
            locale: Locale::Ja,
            ..ctx()
        };
        let ops = view.reconcile(&[task.clone()], &ja, &mut target);
        assert_eq!(ops.len(), 1);
        assert!(ops.iter().all(|op| !op.is_structural()));
        let shown = view.item(task.id()).unwrap();
        assert_eq!(shown.priority_label, "中");
        assert_eq!(shown.category_label.as_deref(), Some("仕事"));
        assert_eq!(shown.due_label, "2025年1月5日");
    }

    #[test]
    fn labels_cover_missing_values() {
        let en = ctx();
        assert_eq!(en.category_label(crate::models::Category::None), None);
        assert_eq!(en.due_label(None), "No due date");
        let ja = RenderContext {
            locale: Locale::Ja,
            ..en
        };
        assert_eq!(ja.due_label(None), "期限なし");
    }

    #[test]
    fn panel_applies_filter_to_last_snapshot() {
        let a = make_task("a");
        let b = toggled(&make_task("b"));
        let panel = ListPanel::new(Recorder::default(), ctx());
        let ops = panel.render(&[a.clone(), b.clone()]);
        assert_eq!(ops.len(), 2);

        let ops = panel.set_filter(TaskFilter::completed(false));
        assert_eq!(
            ops,
            vec![RenderOp::Remove {
                partition: Partition::Completed,
                id: b.id().to_string(),
            }]
        );
        assert_eq!(panel.with_target(|t| t.ops.len()), 3);

        let ops = panel.set_filter(TaskFilter::default());
        assert!(matches!(&ops[..], [RenderOp::Insert { partition: Partition::Completed, .. }]));
    }
}
