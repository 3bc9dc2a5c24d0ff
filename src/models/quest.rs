use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum QuestDifficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl QuestDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestDifficulty::Easy => "Easy",
            QuestDifficulty::Medium => "Medium",
            QuestDifficulty::Hard => "Hard",
        }
    }

    /// Unknown names fall back to `Easy`.
    pub fn from_name(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "medium" => QuestDifficulty::Medium,
            "hard" => QuestDifficulty::Hard,
            _ => QuestDifficulty::Easy,
        }
    }

    pub fn xp_reward(&self) -> u32 {
        match self {
            QuestDifficulty::Easy => 100,
            QuestDifficulty::Medium => 250,
            QuestDifficulty::Hard => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum QuestStatus {
    #[default]
    Active,
    Completed,
}

impl QuestStatus {
    pub fn code(&self) -> i64 {
        match self {
            QuestStatus::Active => 0,
            QuestStatus::Completed => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(QuestStatus::Active),
            1 => Some(QuestStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubQuest {
    pub id: String,
    pub title: String,
    pub is_completed: bool,
}

impl SubQuest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            is_completed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub difficulty: QuestDifficulty,
    pub sub_quests: Vec<SubQuest>,
    pub status: QuestStatus,
    pub created_at: DateTime<Utc>,
}

impl Quest {
    pub fn new(
        title: impl Into<String>,
        difficulty: QuestDifficulty,
        sub_quest_titles: impl IntoIterator<Item = String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            difficulty,
            sub_quests: sub_quest_titles.into_iter().map(SubQuest::new).collect(),
            status: QuestStatus::Active,
            created_at,
        }
    }

    pub fn progress(&self) -> f32 {
        if self.sub_quests.is_empty() {
            return 0.0;
        }
        let done = self.sub_quests.iter().filter(|sub| sub.is_completed).count();
        done as f32 / self.sub_quests.len() as f32
    }

    pub fn all_sub_quests_completed(&self) -> bool {
        !self.sub_quests.is_empty() && self.sub_quests.iter().all(|sub| sub.is_completed)
    }

    /// Marks the matching sub-quests done and completes the quest once
    /// nothing is left. Returns true if any sub-quest belonged to this quest.
    pub fn apply_completions(&mut self, completed_ids: &BTreeSet<String>) -> bool {
        let mut touched = false;
        for sub in &mut self.sub_quests {
            if completed_ids.contains(&sub.id) {
                sub.is_completed = true;
                touched = true;
            }
        }
        if touched && self.all_sub_quests_completed() {
            self.status = QuestStatus::Completed;
        }
        touched
    }
}
