mod connection;
mod helpers;
mod migrations;
mod repositories;

pub use connection::Database;

use anyhow::Result;
use async_trait::async_trait;

use crate::persistence::Persistence;

#[async_trait]
impl Persistence for Database {
    async fn write_reward(&self, user_id: &str, xp_delta: u32, coin_delta: u32) -> Result<()> {
        self.add_reward(user_id, xp_delta, coin_delta).await
    }

    async fn mark_subtasks_completed(&self, quest_id: &str, subtask_ids: &[String]) -> Result<()> {
        self.mark_sub_quests_completed(quest_id, subtask_ids)
            .await
            .map(|_| ())
    }
}
