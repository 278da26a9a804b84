//! Terminal host: a line-oriented front end over the controller.

use std::fmt::Write as _;

use thiserror::Error;

use crate::controller::{Controller, Notice, NoticeKind, OperationId, OperationState, Outcome, UiCtx};
use crate::error::ValidationError;
use crate::models::{parse_due_date, Locale, SortField, Task, TaskDraft, TaskFilter};
use crate::render::{ItemView, ListPanel, Partition, RenderContext, RenderOp, RenderTarget};

pub const HELP: &str = "\
commands:
  add <title> [!low|!medium|!high] [#work|#personal|#shopping|#study] [@YYYY-MM-DD]
  done <n>          toggle completion of row n
  edit <n> <title>  rename row n
  rm <n>            delete row n
  clear             delete all completed tasks
  filter <all|active|done|expired|#category|!priority>...
  sort <createdAt|updatedAt|dueDate|priority> [asc|desc]
  stats | list | help | quit";

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("no row {0}")]
    NoRow(usize),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(TaskDraft),
    Toggle(usize),
    Edit(usize, String),
    Delete(usize),
    Clear,
    Filter(TaskFilter),
    Sort(SortField, bool),
    Stats,
    List,
    Help,
    Quit,
}

/// `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let command = match verb {
        "add" | "a" => Command::Add(parse_add(rest)?),
        "done" | "toggle" => Command::Toggle(parse_row(rest, "done <n>")?),
        "rm" | "delete" => Command::Delete(parse_row(rest, "rm <n>")?),
        "edit" => {
            let (row, title) = rest
                .split_once(char::is_whitespace)
                .ok_or(CommandError::Usage("edit <n> <title>"))?;
            Command::Edit(parse_row(row, "edit <n> <title>")?, title.trim().to_string())
        }
        "clear" => Command::Clear,
        "filter" => Command::Filter(parse_filter(rest)?),
        "sort" => {
            let mut words = rest.split_whitespace();
            let field = words
                .next()
                .ok_or(CommandError::Usage("sort <field> [asc|desc]"))?
                .parse()?;
            let ascending = !matches!(words.next(), Some("desc"));
            Command::Sort(field, ascending)
        }
        "stats" => Command::Stats,
        "list" | "ls" => Command::List,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_row(text: &str, usage: &'static str) -> Result<usize, CommandError> {
    match text.trim().parse::<usize>() {
        Ok(row) if row > 0 => Ok(row),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_add(rest: &str) -> Result<TaskDraft, CommandError> {
    let mut title = Vec::new();
    let mut draft = TaskDraft::default();
    for word in rest.split_whitespace() {
        if let Some(priority) = word.strip_prefix('!') {
            draft.priority = priority.parse()?;
        } else if let Some(category) = word.strip_prefix('#') {
            draft.category = category.parse()?;
        } else if let Some(due) = word.strip_prefix('@') {
            draft.due_date = Some(parse_due_date(due)?);
        } else {
            title.push(word);
        }
    }
    draft.title = title.join(" ");
    Ok(draft)
}

fn parse_filter(rest: &str) -> Result<TaskFilter, CommandError> {
    let mut filter = TaskFilter::default();
    for word in rest.split_whitespace() {
        match word {
            "all" => filter = TaskFilter::default(),
            "active" => filter.completed = Some(false),
            "done" => filter.completed = Some(true),
            "expired" => filter.expired_only = true,
            _ => {
                if let Some(category) = word.strip_prefix('#') {
                    filter.category = Some(category.parse()?);
                } else if let Some(priority) = word.strip_prefix('!') {
                    filter.priority = Some(priority.parse()?);
                } else {
                    return Err(CommandError::Usage(
                        "filter <all|active|done|expired|#category|!priority>...",
                    ));
                }
            }
        }
    }
    Ok(filter)
}

/// Mirrors the two rendered partitions as plain rows.
#[derive(Debug, Default)]
pub struct ConsoleTarget {
    incomplete: Vec<ItemView>,
    completed: Vec<ItemView>,
}

impl ConsoleTarget {
    fn column_mut(&mut self, partition: Partition) -> &mut Vec<ItemView> {
        match partition {
            Partition::Incomplete => &mut self.incomplete,
            Partition::Completed => &mut self.completed,
        }
    }

    /// Rows as numbered on screen: incomplete first, then completed.
    pub fn rows(&self) -> impl Iterator<Item = &ItemView> {
        self.incomplete.iter().chain(self.completed.iter())
    }

    /// Task id behind 1-based row `n`.
    pub fn id_at(&self, n: usize) -> Option<String> {
        self.rows().nth(n.checked_sub(1)?).map(|item| item.id.clone())
    }

    pub fn format(&self, locale: Locale) -> String {
        let (open, done, empty) = match locale {
            Locale::Ja => ("未完了", "完了", "(なし)"),
            Locale::En => ("Incomplete", "Completed", "(none)"),
        };
        let mut out = String::new();
        let mut n = 0;
        for (header, column) in [(open, &self.incomplete), (done, &self.completed)] {
            let _ = writeln!(out, "{header} ({})", column.len());
            if column.is_empty() {
                let _ = writeln!(out, "     {empty}");
            }
            for item in column {
                n += 1;
                let _ = writeln!(out, "{}", format_row(n, item));
            }
        }
        out
    }
}

fn format_row(n: usize, item: &ItemView) -> String {
    let check = if item.completed { "x" } else { " " };
    let mut line = format!("{n:>3}. [{check}] {} ({})", item.title, item.priority_label);
    if let Some(category) = &item.category_label {
        let _ = write!(line, " #{category}");
    }
    let _ = write!(line, " - {}", item.due_label);
    if item.expired {
        line.push_str(" (!)");
    }
    line
}

impl RenderTarget for ConsoleTarget {
    fn apply(&mut self, op: &RenderOp) {
        match op {
            RenderOp::Insert { partition, item } => {
                self.column_mut(*partition).insert(0, item.clone());
            }
            RenderOp::Move { from, to, item } => {
                self.column_mut(*from).retain(|row| row.id != item.id);
                self.column_mut(*to).insert(0, item.clone());
            }
            RenderOp::Patch {
                partition, item, ..
            } => {
                if let Some(row) = self
                    .column_mut(*partition)
                    .iter_mut()
                    .find(|row| row.id == item.id)
                {
                    *row = item.clone();
                }
            }
            RenderOp::Remove { partition, id } => {
                self.column_mut(*partition).retain(|row| &row.id != id);
            }
        }
    }
}

pub struct ConsoleUi {
    panel: ListPanel<ConsoleTarget>,
    echo: bool,
}

impl ConsoleUi {
    pub fn new(ctx: RenderContext) -> Self {
        Self {
            panel: ListPanel::new(ConsoleTarget::default(), ctx),
            echo: true,
        }
    }

    /// A UI that keeps its state but prints nothing.
    pub fn quiet(ctx: RenderContext) -> Self {
        Self {
            echo: false,
            ..Self::new(ctx)
        }
    }

    pub fn panel(&self) -> &ListPanel<ConsoleTarget> {
        &self.panel
    }

    pub fn listing(&self) -> String {
        let locale = self.panel.context().locale;
        self.panel.with_target(|target| target.format(locale))
    }

    pub fn id_at(&self, row: usize) -> Option<String> {
        self.panel.with_target(|target| target.id_at(row))
    }

    fn print(&self, text: &str) {
        if self.echo {
            println!("{text}");
        }
    }
}

impl UiCtx for ConsoleUi {
    fn render(&self, tasks: &[Task]) {
        let ops = self.panel.render(tasks);
        if !ops.is_empty() {
            self.print(&self.listing());
        }
    }

    fn set_filter(&self, filter: &TaskFilter) {
        self.panel.set_filter(filter.clone());
        self.print(&self.listing());
    }

    fn set_busy(&self, busy: bool) {
        log::debug!("busy={busy}");
    }

    fn operation_changed(&self, id: &OperationId, state: &OperationState) {
        log::debug!("operation {id}: {state:?}");
    }

    fn show_notice(&self, notice: &Notice) {
        match notice.kind {
            NoticeKind::Validation => self.print(&format!("  ! {}", notice.message)),
            NoticeKind::Error => self.print(&format!("[error] {}", notice.message)),
        }
    }

    fn dismiss_notice(&self, id: u64) {
        log::debug!("notice {id} dismissed");
    }
}

/// Runs one command; returns text to show (possibly empty).
pub async fn execute(
    controller: &Controller<ConsoleUi>,
    command: Command,
) -> Result<String, CommandError> {
    let ui = controller.ui();
    let row_id = |row: usize| ui.id_at(row).ok_or(CommandError::NoRow(row));
    let out = match command {
        Command::Add(draft) => {
            let title = draft.title.clone();
            match controller.submit_new_task(draft).await {
                Outcome::Rejected(_) => format!("  (kept input: {title})"),
                Outcome::Ignored => "  busy, try again".to_string(),
                Outcome::Done(_) => String::new(),
            }
        }
        Command::Toggle(row) => ignored_note(controller.toggle(&row_id(row)?).await),
        Command::Delete(row) => ignored_note(controller.delete(&row_id(row)?).await),
        Command::Edit(row, title) => {
            ignored_note(controller.edit_title(&row_id(row)?, &title).await)
        }
        Command::Clear => match controller.clear_completed().await {
            Outcome::Done(count) => format!("  removed {count}"),
            other => ignored_note(other),
        },
        Command::Filter(filter) => {
            controller.change_filter(filter);
            String::new()
        }
        Command::Sort(field, ascending) => {
            let ctx = ui.panel().context();
            let tasks = controller.store().get_sorted(field, ascending);
            let mut out = String::new();
            for (i, task) in tasks.iter().enumerate() {
                let _ = writeln!(out, "{}", format_row(i + 1, &ItemView::from_task(task, &ctx)));
            }
            out
        }
        Command::Stats => {
            let stats = controller.store().stats();
            format!(
                "  total {} / active {} / completed {} / expired {}",
                stats.total, stats.active, stats.completed, stats.expired
            )
        }
        Command::List => ui.listing(),
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
    };
    Ok(out)
}

fn ignored_note<T>(outcome: Outcome<T>) -> String {
    match outcome {
        Outcome::Ignored => "  nothing to do".to_string(),
        _ => String::new(),
    }
}

/// Reads commands from stdin until `quit` or end of input.
#[cfg(feature = "app")]
pub async fn run_loop(controller: &Controller<ConsoleUi>) -> std::io::Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("  ! {err}");
                continue;
            }
        };
        match execute(controller, command).await {
            Ok(out) if !out.is_empty() => println!("{}", out.trim_end()),
            Ok(_) => {}
            Err(err) => println!("  ! {err}"),
        }
    }
    log::info!("input closed, exiting");
    Ok(())
}
