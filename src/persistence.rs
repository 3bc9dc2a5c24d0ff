//! Where session outcomes are written. The controller never waits on these
//! calls to finish a transition; failures are logged and dropped.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Adds the session's reward to the user's running totals.
    async fn write_reward(&self, user_id: &str, xp_delta: u32, coin_delta: u32) -> Result<()>;

    /// Marks sub-tasks of one quest done; the quest itself completes once
    /// all of its sub-tasks are done.
    async fn mark_subtasks_completed(&self, quest_id: &str, subtask_ids: &[String]) -> Result<()>;
}
