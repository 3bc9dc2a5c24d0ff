use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RewardFormula {
    /// Per real-valued focus minute plus per correct answer.
    #[default]
    Linear,
    /// Per whole focus minute plus a flat bonus per correct answer.
    Legacy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub xp: u32,
    pub coins: u32,
}

impl RewardFormula {
    pub fn compute(&self, focus_seconds: u64, score: u32) -> Reward {
        let minutes = focus_seconds as f64 / 60.0;
        let score = f64::from(score);
        let coins = 1.0 * minutes + 1.5 * score;

        let xp = match self {
            RewardFormula::Linear => 0.95 * minutes + 1.0 * score,
            RewardFormula::Legacy => 10.0 * minutes.floor() + 50.0 * score,
        };

        Reward {
            xp: to_points(xp),
            coins: to_points(coins),
        }
    }
}

fn to_points(value: f64) -> u32 {
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}
