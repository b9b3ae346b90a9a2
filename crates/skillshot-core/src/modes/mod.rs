//! Built-in modes: reusable building blocks that games register with the
//! controller. They are library code, not machine policy; every tunable
//! lives in the per-mode config struct.

pub mod attract;
pub mod ball_search;
pub mod bonus;
pub mod drop_targets;
pub mod high_score;
pub mod service;
pub mod tilt;
pub mod trough;

pub use attract::{AttractConfig, AttractMode, GameOverMode};
pub use ball_search::{BallSearchConfig, BallSearchMode};
pub use bonus::{BonusConfig, BonusMode};
pub use drop_targets::{DropTargetBankConfig, DropTargetBankMode};
pub use high_score::HighScoreMode;
pub use service::{ServiceConfig, ServiceMode};
pub use tilt::{TiltConfig, TiltMode};
pub use trough::{TroughConfig, TroughMode};
