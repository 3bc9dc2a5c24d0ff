use std::collections::BTreeSet;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::info;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    db::{
        connection::Database,
        helpers::{parse_datetime, parse_difficulty, parse_status},
    },
    models::{Quest, QuestStatus, SubQuest},
};

fn load_sub_quests(conn: &Connection, quest_id: &str) -> Result<Vec<SubQuest>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, is_completed
         FROM sub_quests
         WHERE quest_id = ?1
         ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![quest_id], |row| {
        Ok(SubQuest {
            id: row.get(0)?,
            title: row.get(1)?,
            is_completed: row.get::<_, i64>(2)? != 0,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to load sub-quests")
}

fn load_quest(conn: &Connection, quest_id: &str) -> Result<Option<Quest>> {
    let header = conn
        .query_row(
            "SELECT id, title, difficulty, status, created_at FROM quests WHERE id = ?1",
            params![quest_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, title, difficulty, status, created_at)) = header else {
        return Ok(None);
    };

    Ok(Some(Quest {
        sub_quests: load_sub_quests(conn, &id)?,
        id,
        title,
        difficulty: parse_difficulty(&difficulty),
        status: parse_status(status)?,
        created_at: parse_datetime(&created_at, "created_at")?,
    }))
}

impl Database {
    pub async fn insert_quest(&self, user_id: &str, quest: &Quest) -> Result<()> {
        let user_id = user_id.to_string();
        let record = quest.clone();
        self.transaction(move |tx| {
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO quests (id, user_id, title, difficulty, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    user_id,
                    record.title,
                    record.difficulty.as_str(),
                    record.status.code(),
                    record.created_at.to_rfc3339(),
                    now,
                ],
            )
            .context("failed to insert quest")?;

            for (position, sub) in record.sub_quests.iter().enumerate() {
                tx.execute(
                    "INSERT INTO sub_quests (id, quest_id, title, is_completed, position)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![sub.id, record.id, sub.title, sub.is_completed, position as i64],
                )
                .context("failed to insert sub-quest")?;
            }
            Ok(())
        })
        .await
    }

    pub async fn get_quest(&self, quest_id: &str) -> Result<Option<Quest>> {
        let quest_id = quest_id.to_string();
        self.execute(move |conn| load_quest(conn, &quest_id)).await
    }

    pub async fn list_active_quests(&self, user_id: &str) -> Result<Vec<Quest>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let ids: Vec<String> = {
                let mut stmt = conn.prepare(
                    "SELECT id FROM quests
                     WHERE user_id = ?1 AND status = ?2
                     ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map(
                    params![user_id, QuestStatus::Active.code()],
                    |row| row.get::<_, String>(0),
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut quests = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(quest) = load_quest(conn, &id)? {
                    quests.push(quest);
                }
            }
            Ok(quests)
        })
        .await
    }

    /// Marks the given sub-quests done in one transaction and completes the
    /// quest when none remain open. Returns the quest as stored afterwards.
    pub async fn mark_sub_quests_completed(
        &self,
        quest_id: &str,
        sub_quest_ids: &[String],
    ) -> Result<Quest> {
        let quest_id = quest_id.to_string();
        let completed: BTreeSet<String> = sub_quest_ids.iter().cloned().collect();
        self.transaction(move |tx| {
            let mut quest =
                load_quest(tx, &quest_id)?.ok_or_else(|| anyhow!("quest {quest_id} not found"))?;

            quest.apply_completions(&completed);

            for sub in quest.sub_quests.iter().filter(|sub| completed.contains(&sub.id)) {
                tx.execute(
                    "UPDATE sub_quests SET is_completed = 1 WHERE id = ?1 AND quest_id = ?2",
                    params![sub.id, quest_id],
                )?;
            }
            tx.execute(
                "UPDATE quests SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![quest.status.code(), Utc::now().to_rfc3339(), quest_id],
            )?;

            if quest.status == QuestStatus::Completed {
                info!("Quest {} completed", quest.id);
            }
            Ok(quest)
        })
        .await
    }

    pub async fn delete_quest(&self, quest_id: &str) -> Result<bool> {
        let quest_id = quest_id.to_string();
        self.execute(move |conn| {
            let removed = conn.execute("DELETE FROM quests WHERE id = ?1", params![quest_id])?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::QuestDifficulty;

    async fn open() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("test.sqlite3")).unwrap();
        db.ensure_profile("u1", "ada").await.unwrap();
        (dir, db)
    }

    fn quest(title: &str) -> Quest {
        Quest::new(
            title,
            QuestDifficulty::Hard,
            vec!["read".to_string(), "practice".to_string()],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn round_trips_a_quest() {
        let (_dir, db) = open().await;
        let quest = quest("Async Rust");
        db.insert_quest("u1", &quest).await.unwrap();

        let stored = db.get_quest(&quest.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Async Rust");
        assert_eq!(stored.difficulty, QuestDifficulty::Hard);
        assert_eq!(stored.sub_quests, quest.sub_quests);
    }

    #[tokio::test]
    async fn completing_all_sub_quests_retires_the_quest() {
        let (_dir, db) = open().await;
        let quest = quest("Macros");
        db.insert_quest("u1", &quest).await.unwrap();

        let first = vec![quest.sub_quests[0].id.clone()];
        let partial = db.mark_sub_quests_completed(&quest.id, &first).await.unwrap();
        assert_eq!(partial.status, QuestStatus::Active);
        assert_eq!(db.list_active_quests("u1").await.unwrap().len(), 1);

        let second = vec![quest.sub_quests[1].id.clone()];
        let done = db.mark_sub_quests_completed(&quest.id, &second).await.unwrap();
        assert_eq!(done.status, QuestStatus::Completed);
        assert!(db.list_active_quests("u1").await.unwrap().is_empty());

        let stored = db.get_quest(&quest.id).await.unwrap().unwrap();
        assert!(stored.sub_quests.iter().all(|sub| sub.is_completed));
    }

    #[tokio::test]
    async fn failed_insert_leaves_nothing_behind() {
        let (_dir, db) = open().await;
        let mut quest = quest("Generics");
        quest.sub_quests[1].id = quest.sub_quests[0].id.clone();

        assert!(db.insert_quest("u1", &quest).await.is_err());
        assert!(db.get_quest(&quest.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_quest_is_an_error() {
        let (_dir, db) = open().await;
        let ids = vec!["x".to_string()];
        assert!(db.mark_sub_quests_completed("missing", &ids).await.is_err());
    }

    #[tokio::test]
    async fn delete_cascades_to_sub_quests() {
        let (_dir, db) = open().await;
        let quest = quest("Unsafe");
        db.insert_quest("u1", &quest).await.unwrap();

        assert!(db.delete_quest(&quest.id).await.unwrap());
        assert!(!db.delete_quest(&quest.id).await.unwrap());
        let orphans: i64 = db
            .execute(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM sub_quests", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
