use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{parse_datetime, to_u32, to_u64},
    },
    models::UserProfile,
};

fn row_to_profile(row: &Row) -> Result<UserProfile> {
    let xp: i64 = row.get("xp")?;
    let coins: i64 = row.get("coins")?;
    let streak_days: i64 = row.get("streak_days")?;
    let created_at: String = row.get("created_at")?;

    Ok(UserProfile {
        user_id: row.get("user_id")?,
        username: row.get("username")?,
        xp: to_u64(xp, "xp")?,
        coins: to_u64(coins, "coins")?,
        streak_days: to_u32(streak_days, "streak_days")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Creates the profile row on first use and returns the stored profile.
    pub async fn ensure_profile(&self, user_id: &str, username: &str) -> Result<UserProfile> {
        let user_id = user_id.to_string();
        let username = username.to_string();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT OR IGNORE INTO profiles (user_id, username, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![user_id, username, now],
            )
            .context("failed to create profile")?;

            conn.query_row(
                "SELECT user_id, username, xp, coins, streak_days, created_at
                 FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| Ok(row_to_profile(row)),
            )?
        })
        .await
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let profile = conn
                .query_row(
                    "SELECT user_id, username, xp, coins, streak_days, created_at
                     FROM profiles WHERE user_id = ?1",
                    params![user_id],
                    |row| Ok(row_to_profile(row)),
                )
                .optional()?;
            profile.transpose()
        })
        .await
    }

    /// Increments the stored totals; the deltas never decrease them.
    pub async fn add_reward(&self, user_id: &str, xp_delta: u32, coin_delta: u32) -> Result<()> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE profiles
                     SET xp = xp + ?1,
                         coins = coins + ?2,
                         updated_at = ?3
                     WHERE user_id = ?4",
                    params![xp_delta, coin_delta, Utc::now().to_rfc3339(), user_id],
                )
                .context("failed to add reward")?;
            if updated == 0 {
                return Err(anyhow!("no profile for user {user_id}"));
            }
            Ok(())
        })
        .await
    }
}
