pub mod controller;
pub mod error;
pub mod reward;
pub mod state;

pub use controller::{SessionController, SessionDeps, SessionEvent, TimerKind};
pub use error::{SessionError, SessionResult};
pub use reward::{Reward, RewardFormula};
pub use state::{SessionSnapshot, SessionState, DEFAULT_DURATION_SECONDS};
