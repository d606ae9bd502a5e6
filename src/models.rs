use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_MASTERY_SCORE: i64 = 80;
pub const DEFAULT_MASTERY_COUNT: i64 = 3;

fn default_true() -> bool {
    true
}

fn default_mastery_score() -> i64 {
    DEFAULT_MASTERY_SCORE
}

fn default_mastery_count() -> i64 {
    DEFAULT_MASTERY_COUNT
}

/// Accepts plain `YYYY-MM-DD` dates as well as RFC 3339 timestamps, which is
/// how older backup files encoded them.
pub mod flexible_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, de::Error};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid date: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub student_id: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Goal {
    pub id: i64,
    pub student_id: i64,
    pub subject: String,
    #[serde(deserialize_with = "flexible_date::deserialize")]
    pub iep_date: NaiveDate,
    pub description: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_mastery_score")]
    pub mastery_score: i64,
    #[serde(default = "default_mastery_count")]
    pub mastery_count: i64,
}

/// A goal joined with the student it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GoalDetail {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub goal: Goal,
    pub student_name: String,
    pub student_id_str: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackingLog {
    pub id: i64,
    pub goal_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[sqlx(default)]
    pub tester_name: Option<String>,
    #[serde(deserialize_with = "flexible_date::deserialize")]
    pub log_date: NaiveDate,
    #[serde(default)]
    pub score: String,
    #[serde(default)]
    pub prompt_level: String,
    #[serde(default)]
    pub manipulatives_used: bool,
    #[serde(default)]
    pub manipulatives_type: String,
    #[serde(default)]
    pub compliance: String,
    #[serde(default)]
    pub behavior: String,
    #[serde(default)]
    pub time_spent: String,
    #[serde(default)]
    pub notes: String,
}

/// Point-in-time copy of every student, goal and tracking log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub students: Vec<Student>,
    pub goals: Vec<Goal>,
    pub logs: Vec<TrackingLog>,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub students: usize,
    pub goals: usize,
    pub logs: usize,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StudentFields {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Student ID is required"))]
    pub student_id: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GoalFields {
    #[validate(range(min = 1, message = "Student is required"))]
    pub student_id: i64,
    #[validate(length(min = 1, message = "Subject is required"))]
    pub subject: String,
    #[serde(deserialize_with = "flexible_date::deserialize")]
    pub iep_date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "Mastery score must be 0-100"))]
    pub mastery_score: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Mastery count cannot be negative"))]
    pub mastery_count: Option<i64>,
}

impl GoalFields {
    /// A missing or zero threshold falls back to the default.
    pub fn mastery_score(&self) -> i64 {
        self.mastery_score
            .filter(|score| *score > 0)
            .unwrap_or(DEFAULT_MASTERY_SCORE)
    }

    pub fn mastery_count(&self) -> i64 {
        self.mastery_count
            .filter(|count| *count > 0)
            .unwrap_or(DEFAULT_MASTERY_COUNT)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LogFields {
    #[serde(default)]
    pub goal_id: i64,
    #[serde(deserialize_with = "flexible_date::deserialize")]
    pub log_date: NaiveDate,
    #[serde(default)]
    pub score: String,
    #[serde(default)]
    pub prompt_level: String,
    #[serde(default)]
    pub manipulatives_used: bool,
    #[serde(default)]
    pub manipulatives_type: String,
    #[serde(default)]
    pub compliance: String,
    #[serde(default)]
    pub behavior: String,
    #[serde(default)]
    pub time_spent: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecentLog {
    pub student_name: String,
    pub subject: String,
    pub score: String,
    pub date: NaiveDate,
    pub goal_id: i64,
    pub student_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub student_count: i64,
    pub active_goals: i64,
    pub logs_this_week: i64,
    pub recent_logs: Vec<RecentLog>,
}
