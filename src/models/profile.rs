use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub xp: u64,
    pub coins: u64,
    pub streak_days: u32,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            username: String::new(),
            xp: 0,
            coins: 0,
            streak_days: 0,
            created_at,
        }
    }

    pub fn rank(&self) -> &'static RankDefinition {
        &RANKS[rank_index(self.xp)]
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RankDefinition {
    pub title: &'static str,
    pub xp_required: u64,
}

const fn rank(title: &'static str, xp_required: u64) -> RankDefinition {
    RankDefinition { title, xp_required }
}

pub const RANKS: [RankDefinition; 15] = [
    rank("Wood I", 0),
    rank("Wood II", 100),
    rank("Wood III", 200),
    rank("Bronze I", 300),
    rank("Bronze II", 400),
    rank("Bronze III", 500),
    rank("Silver I", 600),
    rank("Silver II", 800),
    rank("Silver III", 1000),
    rank("Gold I", 1500),
    rank("Gold II", 2000),
    rank("Gold III", 2500),
    rank("Master I", 4000),
    rank("Master II", 6000),
    rank("Master III", 8000),
];

pub fn rank_index(xp: u64) -> usize {
    RANKS
        .iter()
        .rposition(|rank| rank.xp_required <= xp)
        .unwrap_or(0)
}

/// Fraction of the way from the current rank to the next, in `[0, 1]`.
pub fn rank_progress(xp: u64) -> f32 {
    let index = rank_index(xp);
    let Some(next) = RANKS.get(index + 1) else {
        return 1.0;
    };
    let current = RANKS[index].xp_required;
    let span = (next.xp_required - current) as f32;
    ((xp.saturating_sub(current)) as f32 / span).clamp(0.0, 1.0)
}
