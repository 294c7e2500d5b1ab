//! Deterministic intent extraction over a static regex rule table.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::{Entities, MatchDetails, RegexAnalysisResult, RegexLimitations};

// ── Intent rules ──────────────────────────────────────────────

struct IntentRule {
    name: &'static str,
    intent: &'static str,
    regex: Regex,
}

impl IntentRule {
    fn new(name: &'static str, intent: &'static str, pattern: &str) -> Self {
        Self {
            name,
            intent,
            regex: Regex::new(pattern).expect("intent rule pattern must compile"),
        }
    }
}

// Declaration order is the tie-break when two rules match equally long spans.
static INTENT_RULES: LazyLock<Vec<IntentRule>> = LazyLock::new(|| {
    vec![
        IntentRule::new(
            "greeting",
            "greeting",
            r"(?i)^\s*(你好|您好|哈囉|哈啰|嗨|hi|hello|hey)[\s!！~。.]*$",
        ),
        IntentRule::new(
            "confirm",
            "confirm_action",
            r"(?i)^\s*(確認|确认|確定|确定|好的?|是的?|對的?|对的?|沒錯|没错|yes|yep|ok(?:ay)?|confirm)[\s!！。.]*$",
        ),
        IntentRule::new(
            "abort",
            "cancel_action",
            r"(?i)^\s*(算了|不要了|不用了|取消操作|never\s*mind|forget\s+it)[\s!！。.]*$",
        ),
        IntentRule::new(
            "recurring",
            "create_recurring_course",
            r"(?i)(每週|每周|每個星期|每个星期|每星期|每天|每日|every\s+(?:day|week|monday|tuesday|wednesday|thursday|friday|saturday|sunday))[^，,。.!?！？]{0,20}?(課|课|class|lesson)",
        ),
        IntentRule::new(
            "add_student",
            "add_student",
            r"(?i)(新增|加入|添加|add)\s*(?:一[個个位])?\s*(學生|学生|student)",
        ),
        IntentRule::new(
            "homework",
            "record_homework",
            r"(?i)(作業|作业|功課|功课|homework|assignment)",
        ),
        IntentRule::new(
            "content_query",
            "query_course_content",
            r"(?i)(上次|上堂|上一堂|之前|last\s+(?:class|lesson)).{0,10}?(教了什麼|教了什么|學了什麼|学了什么|內容|内容|what\s+did)",
        ),
        IntentRule::new(
            "lesson_content",
            "record_lesson_content",
            r"(?i)(今天|這堂|这堂|本堂|today).{0,12}?(上了|教了|學了|学了|內容是|内容是|covered|taught|learned)",
        ),
        IntentRule::new(
            "reminder",
            "set_reminder",
            r"(?i)(提醒我?|設定提醒|设定提醒|設提醒|remind\s+me)",
        ),
        IntentRule::new(
            "cancel",
            "cancel_course",
            r"(?i)(取消|刪除|删除|cancel|delete|remove)\s*.{0,20}?(課|课|class|lesson)",
        ),
        IntentRule::new(
            "modify",
            "modify_course",
            r"(?i)(修改|更改|調整|调整|改期|改到|改成|reschedule|change|move)\s*.{0,20}?(課|课|時間|时间|class|lesson|to\s+\w+)",
        ),
        IntentRule::new(
            "schedule_query",
            "query_schedule",
            r"(?i)(查詢|查询|查看|看一下|有什麼|有什么|有哪些|show|what(?:'s|\s+is)?)\s*.{0,10}?(課表|课表|課程|课程|課|课|schedule|classes)",
        ),
        IntentRule::new(
            "schedule_query_relative",
            "query_schedule",
            r"(今天|明天|後天|后天|這週|这周|本週|本周|下週|下周).{0,4}?(有什麼課|有什么课|有哪些課|有哪些课|有課嗎|有课吗|的課|的课)",
        ),
        IntentRule::new(
            "record",
            "record_course",
            r"(?i)(記錄|记录|新增|安排|add|schedule|record)\s*(?:一[堂節节个個])?\s*.{0,20}?(課程|课程|課|课|class|lesson)",
        ),
        IntentRule::new(
            "record_attend",
            "record_course",
            r"(今天|明天|後天|后天|下週.|下周.|週.|周.|星期.).{0,12}?(要上|有|上)[\p{Han}A-Za-z]{1,10}?(課|课)",
        ),
    ]
});

// ── Entity extractors ─────────────────────────────────────────

static RE_COURSE_HAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:上|記錄|记录|新增|安排|取消|刪除|删除|修改|更改|調整|调整|的|堂|節|节)\s*([\p{Han}A-Za-z0-9]{1,10}?)(?:課|课)",
    )
    .expect("course pattern must compile")
});

static RE_COURSE_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:(?:my|the|a|an)\s+)?([a-z][a-z]+(?:\s+[a-z]+)?)\s+(?:class|lesson)\b")
        .expect("course pattern must compile")
});

static RE_STUDENT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:學生|学生|student)\s*[:：]?\s*([\p{Han}A-Za-z]{2,10})",
        r"(?:幫|帮|給|给|替)\s*([\p{Han}]{2,3}?)\s*(?:記錄|记录|新增|安排|取消|預約|预约|排|上|請假|请假)",
        r"\bfor\s+([A-Z][a-z]+)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("student pattern must compile"))
    .collect()
});

static SIMPLE_EXTRACTORS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "date",
            r"(大後天|大后天|今天|明天|後天|后天|昨天|(?:下|這|这|本)(?:週|周|星期)[一二三四五六日天]|\d{1,2}月\d{1,2}[日號号]|\d{4}-\d{1,2}-\d{1,2}|\d{1,2}/\d{1,2}|(?i:today|tomorrow|tonight))",
        ),
        (
            "weekday",
            r"((?:週|周|星期|禮拜|礼拜)[一二三四五六日天]|(?i:monday|tuesday|wednesday|thursday|friday|saturday|sunday))",
        ),
        (
            "time",
            r"(\d{1,2}[:：]\d{2}|\d{1,2}\s*(?i:am|pm)|(?:\d{1,2}|[一二三四五六七八九十]{1,3})[點点](?:半|\d{1,2}分|[一二三四五]十分?)?)",
        ),
        (
            "time_of_day",
            r"(早上|上午|中午|下午|傍晚|晚上|(?i:morning|afternoon|evening))",
        ),
        (
            "location",
            r"在\s*([\p{Han}A-Za-z0-9]{2,10}?)(?:上課|上课|教室|見|见)",
        ),
        ("teacher", r"(\p{Han}(?:老師|老师))"),
    ]
    .into_iter()
    .map(|(entity, p)| (entity, Regex::new(p).expect("entity pattern must compile")))
    .collect()
});

static RE_REMINDER_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:提前|前)\s*(\d{1,3})\s*(?:分鐘|分钟)|(\d{1,3})\s*(?:分鐘|分钟|minutes?|mins?)\s*(?:前|before|early)",
    )
    .expect("reminder pattern must compile")
});

// ── Vocabulary ────────────────────────────────────────────────

const KEYWORDS: &[&str] = &[
    "記錄", "记录", "新增", "安排", "課程", "课程", "課表", "课表", "取消", "刪除", "删除", "修改",
    "更改", "調整", "调整", "查詢", "查询", "提醒", "每週", "每周", "作業", "作业", "學生", "学生",
    "內容", "内容", "schedule", "class", "lesson", "remind", "cancel", "reschedule", "homework",
    "student",
];

const AMBIGUOUS_TERMS: &[&str] = &[
    "那個", "那个", "那堂", "那節", "那节", "這個", "这个", "這堂", "这堂", "同一個", "同一个",
    "一樣", "一样", "之後", "之后", "下次", "that one", "the same", "same time",
];

const COURSE_NAME_STOPWORDS: &[&str] = &[
    "什麼", "什么", "哪些", "哪", "那", "這", "这", "一", "有", "些", "程", "add", "schedule",
    "cancel", "record", "next", "this", "that",
];

const COURSE_NAME_PREFIXES: &[&str] = &[
    "大後天", "大后天", "今天", "明天", "後天", "后天", "早上", "上午", "中午", "下午", "晚上",
    "每週", "每周", "一堂", "一節", "一节",
];

/// Regex-driven analyzer. Stateless: the rule table is compiled once per process.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternAnalyzer;

impl PatternAnalyzer {
    /// Create an analyzer over the built-in rule table.
    pub fn new() -> Self {
        Self
    }

    /// Analyze one message. Unmatched input yields `unknown` with zero strength.
    pub fn analyze(&self, text: &str) -> RegexAnalysisResult {
        let text = text.trim();
        if text.is_empty() {
            return RegexAnalysisResult::unmatched();
        }

        let mut triggered_patterns = Vec::new();
        let mut best: Option<(usize, usize)> = None; // (rule index, span chars)

        for (index, rule) in INTENT_RULES.iter().enumerate() {
            let longest = rule
                .regex
                .find_iter(text)
                .map(|m| visible_len(m.as_str()))
                .max();
            let Some(span) = longest else { continue };

            triggered_patterns.push(rule.name.to_string());
            // Strictly longer wins, so the earlier rule keeps a tie.
            if best.map_or(true, |(_, best_span)| span > best_span) {
                best = Some((index, span));
            }
        }

        let keyword_matches = find_terms(text, KEYWORDS);
        let ambiguous_terms = find_terms(text, AMBIGUOUS_TERMS);

        let Some((winner, span)) = best else {
            return RegexAnalysisResult {
                match_details: MatchDetails {
                    keyword_matches,
                    ambiguous_terms,
                    ..MatchDetails::default()
                },
                ..RegexAnalysisResult::unmatched()
            };
        };

        let coverage = span as f64 / visible_len(text).max(1) as f64;
        let extra_hits = (triggered_patterns.len() - 1) + keyword_matches.len();
        let pattern_strength = pattern_strength(coverage, extra_hits);

        RegexAnalysisResult {
            intent: INTENT_RULES[winner].intent.to_string(),
            entities: extract_entities(text),
            match_details: MatchDetails {
                triggered_patterns,
                keyword_matches,
                ambiguous_terms,
                pattern_strength,
            },
            limitations: RegexLimitations::default(),
        }
    }
}

/// Specificity score: a base for any hit, most of the weight on how much of
/// the message the winning span covers, and a small capped bonus per extra hit.
fn pattern_strength(coverage: f64, extra_hits: usize) -> f64 {
    let bonus = 0.05 * extra_hits.min(4) as f64;
    (0.4 + 0.5 * coverage.clamp(0.0, 1.0) + bonus).min(1.0)
}

fn visible_len(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

fn find_terms(text: &str, terms: &[&str]) -> Vec<String> {
    let lower = text.to_lowercase();
    terms
        .iter()
        .filter(|term| lower.contains(*term))
        .map(|term| term.to_string())
        .collect()
}

fn extract_entities(text: &str) -> Entities {
    let mut entities = Entities::new();

    if let Some(course) = extract_course_name(text) {
        entities.insert("course_name".to_string(), Value::String(course));
    }

    if let Some(student) = RE_STUDENT
        .iter()
        .find_map(|re| re.captures(text).map(|c| c[1].trim().to_string()))
    {
        entities.insert("student_name".to_string(), Value::String(student));
    }

    for (entity, regex) in SIMPLE_EXTRACTORS.iter() {
        if let Some(caps) = regex.captures(text) {
            entities.insert(entity.to_string(), Value::String(caps[1].trim().to_string()));
        }
    }

    if let Some(caps) = RE_REMINDER_MINUTES.captures(text) {
        let minutes = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        if let Some(minutes) = minutes {
            entities.insert("reminder_minutes".to_string(), Value::from(minutes));
        }
    }

    entities
}

fn extract_course_name(text: &str) -> Option<String> {
    let raw = RE_COURSE_HAN
        .captures(text)
        .or_else(|| RE_COURSE_EN.captures(text))
        .map(|c| c[1].trim().to_string())?;
    clean_course_name(&raw)
}

/// Drop leading date/time words and anything before the last particle.
fn clean_course_name(raw: &str) -> Option<String> {
    let mut name = raw
        .rfind(['的', '上', '堂', '節', '节', '個', '个'])
        .map(|i| &raw[i..])
        .map(|s| s.chars().skip(1).collect::<String>())
        .unwrap_or_else(|| raw.to_string());

    while let Some(prefix) = COURSE_NAME_PREFIXES.iter().find(|p| name.starts_with(*p)) {
        name = name[prefix.len()..].to_string();
    }
    let name = name.trim().to_string();

    if name.is_empty() || COURSE_NAME_STOPWORDS.contains(&name.to_lowercase().as_str()) {
        None
    } else {
        Some(name)
    }
}
