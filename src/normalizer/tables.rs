//! Static vocabulary tables. The precomputed tier is built from these once
//! at startup; the fuzzy matcher uses them as its variant corpus.

/// Canonical intent vocabulary.
pub const CANONICAL_INTENTS: &[&str] = &[
    "record_course",
    "create_recurring_course",
    "query_schedule",
    "modify_course",
    "cancel_course",
    "set_reminder",
    "record_lesson_content",
    "record_homework",
    "query_course_content",
    "add_student",
    "confirm_action",
    "cancel_action",
    "greeting",
    "unknown",
];

/// Legacy, camelCase and natural-language names for canonical intents.
pub const INTENT_ALIASES: &[(&str, &str)] = &[
    ("recordCourse", "record_course"),
    ("add_course", "record_course"),
    ("create_course", "record_course"),
    ("new_course", "record_course"),
    ("schedule_course", "record_course"),
    ("記錄課程", "record_course"),
    ("新增課程", "record_course"),
    ("createRecurringCourse", "create_recurring_course"),
    ("recurring_course", "create_recurring_course"),
    ("create_recurring", "create_recurring_course"),
    ("重複課程", "create_recurring_course"),
    ("querySchedule", "query_schedule"),
    ("query_courses", "query_schedule"),
    ("check_schedule", "query_schedule"),
    ("list_courses", "query_schedule"),
    ("查詢課表", "query_schedule"),
    ("查詢課程", "query_schedule"),
    ("modifyCourse", "modify_course"),
    ("edit_course", "modify_course"),
    ("update_course", "modify_course"),
    ("reschedule_course", "modify_course"),
    ("修改課程", "modify_course"),
    ("cancelCourse", "cancel_course"),
    ("delete_course", "cancel_course"),
    ("remove_course", "cancel_course"),
    ("取消課程", "cancel_course"),
    ("刪除課程", "cancel_course"),
    ("setReminder", "set_reminder"),
    ("add_reminder", "set_reminder"),
    ("create_reminder", "set_reminder"),
    ("設定提醒", "set_reminder"),
    ("recordLessonContent", "record_lesson_content"),
    ("record_content", "record_lesson_content"),
    ("lesson_note", "record_lesson_content"),
    ("記錄內容", "record_lesson_content"),
    ("recordHomework", "record_homework"),
    ("add_homework", "record_homework"),
    ("記錄作業", "record_homework"),
    ("queryCourseContent", "query_course_content"),
    ("query_content", "query_course_content"),
    ("查詢內容", "query_course_content"),
    ("addStudent", "add_student"),
    ("create_student", "add_student"),
    ("新增學生", "add_student"),
    ("confirm", "confirm_action"),
    ("confirmation", "confirm_action"),
    ("確認", "confirm_action"),
    ("cancel", "cancel_action"),
    ("abort", "cancel_action"),
    ("greet", "greeting"),
    ("hello", "greeting"),
    ("unknown_intent", "unknown"),
    ("none", "unknown"),
];

/// Canonical entity keys.
pub const CANONICAL_ENTITY_KEYS: &[&str] = &[
    "course_name",
    "student_name",
    "date",
    "weekday",
    "time",
    "time_of_day",
    "location",
    "teacher",
    "reminder_minutes",
];

/// Legacy key names and localized labels for canonical entity keys.
pub const ENTITY_KEY_ALIASES: &[(&str, &str)] = &[
    ("courseName", "course_name"),
    ("course", "course_name"),
    ("subject", "course_name"),
    ("課程", "course_name"),
    ("課程名稱", "course_name"),
    ("studentName", "student_name"),
    ("student", "student_name"),
    ("child", "student_name"),
    ("學生", "student_name"),
    ("day", "date"),
    ("course_date", "date"),
    ("日期", "date"),
    ("dayOfWeek", "weekday"),
    ("day_of_week", "weekday"),
    ("星期", "weekday"),
    ("startTime", "time"),
    ("start_time", "time"),
    ("timeInfo", "time"),
    ("時間", "time"),
    ("timeOfDay", "time_of_day"),
    ("period", "time_of_day"),
    ("時段", "time_of_day"),
    ("place", "location"),
    ("地點", "location"),
    ("teacherName", "teacher"),
    ("instructor", "teacher"),
    ("老師", "teacher"),
    ("reminderMinutes", "reminder_minutes"),
    ("reminder_time", "reminder_minutes"),
    ("advance_minutes", "reminder_minutes"),
];

/// Simplified-script characters of the domain vocabulary and their
/// traditional forms.
pub const SCRIPT_VARIANTS: &[(char, char)] = &[
    ('记', '記'),
    ('录', '錄'),
    ('课', '課'),
    ('询', '詢'),
    ('删', '刪'),
    ('时', '時'),
    ('间', '間'),
    ('设', '設'),
    ('学', '學'),
    ('师', '師'),
    ('点', '點'),
    ('称', '稱'),
    ('节', '節'),
    ('个', '個'),
    ('业', '業'),
    ('认', '認'),
    ('确', '確'),
    ('复', '複'),
    ('内', '內'),
];
