use crate::analysis::Evidence;

/// Decides whether AI-detected mood contradicts the regex reading.
///
/// Only consulted when the AI reported at least one mood indicator.
pub trait MoodConflictDetector: Send + Sync {
    fn conflicts(&self, regex_intent: &str, evidence: &Evidence) -> bool;
}

/// Intents that ask the assistant to change something.
const ACTION_INTENTS: &[&str] = &[
    "record_course",
    "create_recurring_course",
    "modify_course",
    "cancel_course",
    "set_reminder",
    "record_lesson_content",
    "record_homework",
    "add_student",
];

/// Markers of a question or of hesitation.
const UNCERTAINTY_LEXICON: &[&str] = &[
    "?", "？", "嗎", "吗", "呢", "吧", "不確定", "不确定", "好像", "可能", "也許", "也许", "是不是",
    "要不要", "不知道", "maybe", "perhaps", "not sure", "wonder", "should i",
];

/// Flags a conflict when the regex intent is an action and the mood
/// indicators (or any question marker) read as a question or doubt.
#[derive(Debug, Clone)]
pub struct LexiconConflictDetector {
    action_intents: Vec<String>,
    lexicon: Vec<String>,
}

impl Default for LexiconConflictDetector {
    fn default() -> Self {
        Self::new(ACTION_INTENTS, UNCERTAINTY_LEXICON)
    }
}

impl LexiconConflictDetector {
    pub fn new(action_intents: &[&str], lexicon: &[&str]) -> Self {
        Self {
            action_intents: action_intents.iter().map(|s| s.to_string()).collect(),
            lexicon: lexicon.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    fn is_action(&self, intent: &str) -> bool {
        self.action_intents.iter().any(|a| a == intent)
    }

    fn is_uncertain(&self, indicator: &str) -> bool {
        let indicator = indicator.to_lowercase();
        self.lexicon.iter().any(|term| indicator.contains(term.as_str()))
    }
}

impl MoodConflictDetector for LexiconConflictDetector {
    fn conflicts(&self, regex_intent: &str, evidence: &Evidence) -> bool {
        if !self.is_action(regex_intent) {
            return false;
        }
        !evidence.question_markers.is_empty()
            || evidence.mood_indicators.iter().any(|m| self.is_uncertain(m))
    }
}
