use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::models::{QuestDifficulty, QuestStatus};

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_status(code: i64) -> Result<QuestStatus> {
    QuestStatus::from_code(code).ok_or_else(|| anyhow!("unknown quest status {code}"))
}

pub fn parse_difficulty(value: &str) -> QuestDifficulty {
    QuestDifficulty::from_name(value)
}
