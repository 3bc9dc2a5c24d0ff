pub mod profile;
pub mod quest;

pub use profile::{rank_index, rank_progress, RankDefinition, UserProfile, RANKS};
pub use quest::{Quest, QuestDifficulty, QuestStatus, SubQuest};
