use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub type Timestamp = DateTime<Utc>;

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Severity rank: high outranks medium outranks low.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(ValidationError::InvalidPriority(s.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    None,
    Work,
    Personal,
    Shopping,
    Study,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::None,
        Category::Work,
        Category::Personal,
        Category::Shopping,
        Category::Study,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::None => "none",
            Category::Work => "work",
            Category::Personal => "personal",
            Category::Shopping => "shopping",
            Category::Study => "study",
        }
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Category::None),
            "work" => Ok(Category::Work),
            "personal" => Ok(Category::Personal),
            "shopping" => Ok(Category::Shopping),
            "study" => Ok(Category::Study),
            _ => Err(ValidationError::InvalidCategory(s.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339, and zone-less `YYYY-MM-DDTHH:MM[:SS[.f]]`; keeps the date.
pub fn parse_due_date(input: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }
    parse_naive_datetime(trimmed)
        .map(|dt| dt.date())
        .ok_or_else(|| ValidationError::InvalidDate(input.to_string()))
}

fn parse_naive_datetime(input: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
        .ok()
}

/// Zone-less timestamps are read as UTC.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, ValidationError> {
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_naive_datetime(trimmed)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ValidationError::InvalidDate(input.to_string()))
}

fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let len = trimmed.chars().count();
    if len > TITLE_MAX_CHARS {
        return Err(ValidationError::TitleTooLong {
            len,
            max: TITLE_MAX_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

fn validate_description(description: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(trimmed) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    let len = trimmed.chars().count();
    if len > DESCRIPTION_MAX_CHARS {
        return Err(ValidationError::DescriptionTooLong {
            len,
            max: DESCRIPTION_MAX_CHARS,
        });
    }
    Ok(Some(trimmed.to_string()))
}

/// Input for a new task. Typed fields are already in range; the title and
/// description are checked by [`Task::create`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub category: Category,
    pub due_date: Option<NaiveDate>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builds a draft from raw form values. Blank priority/category fall back to
    /// their defaults and a blank due date means none.
    pub fn from_form(
        title: &str,
        priority: &str,
        due_date: &str,
        category: &str,
    ) -> Result<Self, ValidationError> {
        let priority = match priority.trim() {
            "" => Priority::default(),
            value => value.parse()?,
        };
        let category = match category.trim() {
            "" => Category::default(),
            value => value.parse()?,
        };
        let due_date = match due_date.trim() {
            "" => None,
            value => Some(parse_due_date(value)?),
        };
        Ok(Self {
            title: title.to_string(),
            description: None,
            priority,
            category,
            due_date,
        })
    }
}

/// Field-by-field update. `None` leaves a field untouched; the nested options
/// clear optional fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub due_date: Option<Option<NaiveDate>>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: String,
    title: String,
    description: Option<String>,
    priority: Priority,
    category: Category,
    due_date: Option<NaiveDate>,
    completed: bool,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Task {
    pub fn create(draft: TaskDraft, now: Timestamp) -> Result<Self, ValidationError> {
        let title = validate_title(&draft.title)?;
        let description = validate_description(draft.description.as_deref())?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            description,
            priority: draft.priority,
            category: draft.category,
            due_date: draft.due_date,
            completed: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds a task from its stored or wire form, applying the creation rules.
    pub fn restore(record: TaskRecord) -> Result<Self, ValidationError> {
        let title = validate_title(&record.title)?;
        let description = validate_description(record.description.as_deref())?;
        let priority = match record.priority.as_deref().map(str::trim) {
            None | Some("") => Priority::default(),
            Some(value) => value.parse()?,
        };
        let category = match record.category.as_deref().map(str::trim) {
            None | Some("") => Category::default(),
            Some(value) => value.parse()?,
        };
        let due_date = match record.due_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(parse_due_date(value)?),
        };
        let now = Utc::now();
        let created_at = match record.created_at.as_deref() {
            Some(value) => parse_timestamp(value)?,
            None => now,
        };
        let updated_at = match record.updated_at.as_deref() {
            Some(value) => parse_timestamp(value)?,
            None => created_at,
        };
        Ok(Self {
            id: record.id,
            title,
            description,
            priority,
            category,
            due_date,
            completed: record.completed,
            created_at,
            updated_at: updated_at.max(created_at),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Applies every field present in `patch`, or none of them.
    pub fn update(&mut self, patch: &TaskPatch, now: Timestamp) -> Result<(), ValidationError> {
        let title = patch.title.as_deref().map(validate_title).transpose()?;
        let description = match &patch.description {
            Some(value) => Some(validate_description(value.as_deref())?),
            None => None,
        };

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        self.touch(now);
        Ok(())
    }

    pub fn toggle_complete(&mut self, now: Timestamp) {
        self.completed = !self.completed;
        self.touch(now);
    }

    // updated_at must strictly increase even when the clock has not moved.
    fn touch(&mut self, now: Timestamp) {
        let floor = self.updated_at + Duration::milliseconds(1);
        self.updated_at = now.max(floor);
    }

    /// Raises `updated_at` to `floor` if it is older. Used when adopting a
    /// stored copy whose clock is coarser than ours.
    pub fn not_older_than(mut self, floor: Timestamp) -> Self {
        self.updated_at = self.updated_at.max(floor);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_on(Local::now().date_naive())
    }

    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        match self.due_date {
            Some(due) => !self.completed && due < today,
            None => false,
        }
    }

    pub fn days_until_due(&self) -> Option<i64> {
        self.days_until_due_on(Local::now().date_naive())
    }

    pub fn days_until_due_on(&self, today: NaiveDate) -> Option<i64> {
        self.due_date.map(|due| (due - today).num_days())
    }

    pub fn to_record(&self) -> TaskRecord {
        TaskRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            priority: Some(self.priority.as_str().to_string()),
            category: Some(self.category.as_str().to_string()),
            due_date: self.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            completed: self.completed,
            created_at: Some(self.created_at.to_rfc3339()),
            updated_at: Some(self.updated_at.to_rfc3339()),
        }
    }
}

/// Loose storage/wire shape of a task, validated by [`Task::restore`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(alias = "text")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

// The remote resource hands out numeric ids; locally generated ones are strings.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::String(id) if !id.trim().is_empty() => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(D::Error::custom(format!("invalid task id: {other}"))),
    }
}

/// Every supplied criterion must match; `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub expired_only: bool,
}

impl TaskFilter {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task, today: NaiveDate) -> bool {
        if self.completed.is_some_and(|completed| task.completed != completed) {
            return false;
        }
        if self.category.is_some_and(|category| task.category != category) {
            return false;
        }
        if self.priority.is_some_and(|priority| task.priority != priority) {
            return false;
        }
        if self.expired_only && !task.is_expired_on(today) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    DueDate,
    Priority,
}

impl FromStr for SortField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "createdAt" | "created_at" => Ok(SortField::CreatedAt),
            "updatedAt" | "updated_at" => Ok(SortField::UpdatedAt),
            "dueDate" | "due_date" => Ok(SortField::DueDate),
            "priority" => Ok(SortField::Priority),
            _ => Err(ValidationError::InvalidSortField(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub expired: usize,
    pub by_priority: BTreeMap<Priority, usize>,
    pub by_category: BTreeMap<Category, usize>,
}

impl TaskStats {
    pub fn collect(tasks: &[Task], today: NaiveDate) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();
        let expired = tasks.iter().filter(|t| t.is_expired_on(today)).count();
        let by_priority = Priority::ALL
            .iter()
            .map(|p| (*p, tasks.iter().filter(|t| t.priority == *p).count()))
            .collect();
        let by_category = Category::ALL
            .iter()
            .map(|c| (*c, tasks.iter().filter(|t| t.category == *c).count()))
            .collect();
        Self {
            total,
            completed,
            active: total - completed,
            expired,
            by_priority,
            by_category,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    Ja,
    En,
}

impl Locale {
    /// Matches a BCP 47 style tag (`ja`, `ja-JP`, `en_US`...) by its language.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let lower = tag.trim().to_lowercase();
        if lower.starts_with("ja") {
            Some(Locale::Ja)
        } else if lower.starts_with("en") {
            Some(Locale::En)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" | "http" => Ok(BackendKind::Remote),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_notice_ttl_secs")]
    pub notice_ttl_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            api_base_url: default_api_base_url(),
            locale: default_locale(),
            notice_ttl_secs: default_notice_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_locale() -> String {
    "auto".to_string()
}

fn default_notice_ttl_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Settings,
}
