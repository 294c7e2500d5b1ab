//! Per-user multi-turn dialogue state.
//!
//! [`ConversationState`] is the JSON document persisted under
//! `conversation:<userId>`; [`ContextStore`] evolves it turn by turn.

mod store;

pub use store::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::Entities;

/// Multi-step flows a user can be in the middle of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationFlow {
    CourseCreation,
    CourseModification,
    CourseCancellation,
    RecurringSetup,
    ReminderSetup,
    LessonRecord,
}

impl ConversationFlow {
    /// Get the flow name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationFlow::CourseCreation => "course_creation",
            ConversationFlow::CourseModification => "course_modification",
            ConversationFlow::CourseCancellation => "course_cancellation",
            ConversationFlow::RecurringSetup => "recurring_setup",
            ConversationFlow::ReminderSetup => "reminder_setup",
            ConversationFlow::LessonRecord => "lesson_record",
        }
    }
}

impl std::fmt::Display for ConversationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConversationFlow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "course_creation" => Ok(ConversationFlow::CourseCreation),
            "course_modification" => Ok(ConversationFlow::CourseModification),
            "course_cancellation" => Ok(ConversationFlow::CourseCancellation),
            "recurring_setup" => Ok(ConversationFlow::RecurringSetup),
            "reminder_setup" => Ok(ConversationFlow::ReminderSetup),
            "lesson_record" => Ok(ConversationFlow::LessonRecord),
            _ => Err(format!("Unknown conversation flow: {}", s)),
        }
    }
}

/// Categories of input the assistant can be waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputCategory {
    Confirmation,
    Modification,
    CourseName,
    StudentName,
    Time,
    Date,
    Selection,
}

impl std::str::FromStr for InputCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confirmation" => Ok(InputCategory::Confirmation),
            "modification" => Ok(InputCategory::Modification),
            "course_name" => Ok(InputCategory::CourseName),
            "student_name" => Ok(InputCategory::StudentName),
            "time" => Ok(InputCategory::Time),
            "date" => Ok(InputCategory::Date),
            "selection" => Ok(InputCategory::Selection),
            _ => Err(format!("Unknown input category: {}", s)),
        }
    }
}

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Bot,
    Task,
}

/// A task handler's structured outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAction {
    pub action: String,
    pub input: Value,
    pub result: Value,
}

/// Free text for user/bot turns, a structured action for task results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistoryContent {
    Text(String),
    Action(TaskAction),
}

/// One entry of the bounded turn log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: HistoryContent,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl HistoryEntry {
    /// A user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(HistoryRole::User, text)
    }

    /// A bot response.
    pub fn bot(text: impl Into<String>) -> Self {
        Self::text(HistoryRole::Bot, text)
    }

    fn text(role: HistoryRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: HistoryContent::Text(text.into()),
            timestamp: Utc::now(),
            intent: None,
            meta: None,
        }
    }

    /// A task handler outcome.
    pub fn task(action: impl Into<String>, input: Value, result: Value) -> Self {
        Self {
            role: HistoryRole::Task,
            content: HistoryContent::Action(TaskAction {
                action: action.into(),
                input,
                result,
            }),
            timestamp: Utc::now(),
            intent: None,
            meta: None,
        }
    }

    /// Set the recognized intent
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    /// Attach metadata
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Render the entry as a single line of text.
    pub fn as_text(&self) -> String {
        match &self.content {
            HistoryContent::Text(text) => text.clone(),
            HistoryContent::Action(action) => {
                format!("[{}] {} -> {}", action.action, action.input, action.result)
            }
        }
    }
}

/// Most recent result of an action, kept for undo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastAction {
    pub input: Value,
    pub result: Value,
    pub timestamp: DateTime<Utc>,
}

/// Ordered set where the most recent value is last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecencySet(Vec<String>);

impl RecencySet {
    /// Mark `value` as most recent, moving it if present, dropping the
    /// oldest values beyond `limit`.
    pub fn touch(&mut self, value: &str, limit: usize) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        self.0.retain(|v| v != value);
        self.0.push(value.to_string());
        if self.0.len() > limit {
            let overflow = self.0.len() - limit;
            self.0.drain(..overflow);
        }
    }

    /// The most recently mentioned value.
    pub fn most_recent(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Values, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Kinds of entity tracked for reference resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Student,
    Course,
    Date,
    Time,
}

impl EntityKind {
    /// Which kind an entity key feeds, if any.
    pub fn from_entity_key(key: &str) -> Option<Self> {
        match key {
            "student_name" => Some(EntityKind::Student),
            "course_name" => Some(EntityKind::Course),
            "date" | "weekday" => Some(EntityKind::Date),
            "time" | "time_of_day" => Some(EntityKind::Time),
            _ => None,
        }
    }

    /// Canonical entity key filled when resolving this kind.
    pub fn entity_key(&self) -> &'static str {
        match self {
            EntityKind::Student => "student_name",
            EntityKind::Course => "course_name",
            EntityKind::Date => "date",
            EntityKind::Time => "time",
        }
    }
}

/// Recency-ordered entities mentioned across turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MentionedEntities {
    #[serde(default)]
    pub students: RecencySet,
    #[serde(default)]
    pub courses: RecencySet,
    #[serde(default)]
    pub dates: RecencySet,
    #[serde(default)]
    pub times: RecencySet,
}

impl MentionedEntities {
    /// The set tracking `kind`.
    pub fn get(&self, kind: EntityKind) -> &RecencySet {
        match kind {
            EntityKind::Student => &self.students,
            EntityKind::Course => &self.courses,
            EntityKind::Date => &self.dates,
            EntityKind::Time => &self.times,
        }
    }

    fn get_mut(&mut self, kind: EntityKind) -> &mut RecencySet {
        match kind {
            EntityKind::Student => &mut self.students,
            EntityKind::Course => &mut self.courses,
            EntityKind::Date => &mut self.dates,
            EntityKind::Time => &mut self.times,
        }
    }

    /// Record every trackable string entity, in key order.
    pub fn remember(&mut self, entities: &Entities, limit: usize) {
        for (key, value) in entities {
            let (Some(kind), Some(text)) = (EntityKind::from_entity_key(key), value.as_str())
            else {
                continue;
            };
            self.get_mut(kind).touch(text, limit);
        }
    }
}

/// Dialogue state of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub user_id: String,
    #[serde(default)]
    pub current_flow: Option<ConversationFlow>,
    #[serde(default)]
    pub expecting_input: BTreeSet<InputCategory>,
    #[serde(default)]
    pub last_actions: BTreeMap<String, LastAction>,
    #[serde(default)]
    pub pending_data: Entities,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub mentioned_entities: MentionedEntities,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Fresh, empty state.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            current_flow: None,
            expecting_input: BTreeSet::new(),
            last_actions: BTreeMap::new(),
            pending_data: Entities::new(),
            history: Vec::new(),
            mentioned_entities: MentionedEntities::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append to history, dropping the oldest entries beyond `limit`.
    pub fn push_history(&mut self, entry: HistoryEntry, limit: usize) {
        self.history.push(entry);
        if self.history.len() > limit {
            let overflow = self.history.len() - limit;
            self.history.drain(..overflow);
        }
        self.touch();
    }

    /// Whether `category` is currently awaited.
    pub fn is_expecting(&self, category: InputCategory) -> bool {
        self.expecting_input.contains(&category)
    }

    /// Reset the flow, awaited categories and pending slots.
    pub fn clear_expected(&mut self) {
        self.current_flow = None;
        self.expecting_input.clear();
        self.pending_data.clear();
        self.touch();
    }

    /// The last `n` history entries, oldest first.
    pub fn recent_history(&self, n: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recency_set_moves_existing_to_end() {
        let mut set = RecencySet::default();
        set.touch("數學", 10);
        set.touch("英文", 10);
        set.touch("數學", 10);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["英文", "數學"]);
        assert_eq!(set.most_recent(), Some("數學"));
    }

    #[test]
    fn test_recency_set_is_bounded() {
        let mut set = RecencySet::default();
        for name in ["a", "b", "c", "d"] {
            set.touch(name, 3);
        }
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
        set.touch("  ", 3);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_history_is_capped_oldest_dropped() {
        let mut state = ConversationState::new("u1");
        for i in 0..25 {
            state.push_history(HistoryEntry::user(format!("msg {}", i)), 20);
        }
        assert_eq!(state.history.len(), 20);
        assert_eq!(state.history[0].as_text(), "msg 5");
        assert_eq!(state.history[19].as_text(), "msg 24");
        assert_eq!(state.recent_history(2).len(), 2);
        assert_eq!(state.recent_history(50).len(), 20);
    }

    #[test]
    fn test_remember_entities() {
        let mut mentioned = MentionedEntities::default();
        let mut entities = Entities::new();
        entities.insert("course_name".into(), json!("鋼琴"));
        entities.insert("student_name".into(), json!("小明"));
        entities.insert("reminder_minutes".into(), json!(30));
        mentioned.remember(&entities, 10);

        assert_eq!(mentioned.get(EntityKind::Course).most_recent(), Some("鋼琴"));
        assert_eq!(mentioned.get(EntityKind::Student).most_recent(), Some("小明"));
        assert!(mentioned.get(EntityKind::Time).is_empty());
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let mut state = ConversationState::new("u1");
        state.current_flow = Some(ConversationFlow::CourseCreation);
        state.expecting_input.insert(InputCategory::Confirmation);
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["currentFlow"], "course_creation");
        assert_eq!(value["expectingInput"], json!(["confirmation"]));
        assert!(value.get("mentionedEntities").is_some());

        let back: ConversationState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_task_entry_round_trips_as_action() {
        let entry = HistoryEntry::task("create_course", json!({"course_name": "數學"}), json!({"ok": true}));
        let value = serde_json::to_value(&entry).unwrap();
        let back: HistoryEntry = serde_json::from_value(value).unwrap();
        assert!(matches!(back.content, HistoryContent::Action(_)));
        assert!(back.as_text().starts_with("[create_course]"));
    }

    #[test]
    fn test_flow_from_str() {
        assert_eq!(
            "course_creation".parse::<ConversationFlow>().unwrap(),
            ConversationFlow::CourseCreation
        );
        assert!("nope".parse::<ConversationFlow>().is_err());
        assert_eq!(
            "Confirmation".parse::<InputCategory>().unwrap(),
            InputCategory::Confirmation
        );
    }
}
