use serde::{Deserialize, Serialize};

use crate::persist::HighScore;

/// One line on the end-of-game scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub score: i64,
}

/// Outbound named events for display/sound layers. The serialized form is
/// the wire contract: `{"event":"tilt_warning","warning":1,"allowed":2}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MediaEvent {
    GameStarted { player: usize, balls_per_game: u32 },
    BallStarting { ball: u32, player: usize },
    BallEnded { ball: u32, player: usize, score: i64 },
    GameEnded { scores: Vec<ScoreEntry> },
    PlayerAdded { player: usize, total_players: usize },
    TiltWarning { warning: u32, allowed: u32 },
    Tilt,
    SlamTilt,
    AttractIdle,
    BallSaved,
    MultiballStarted { balls_in_play: u32 },
    MultiballEnded,
    BonusStarted { bonus: i64, multiplier: i64, total: i64 },
    BonusStep { awarded: i64, remaining: i64 },
    BonusCompleted { awarded: i64 },
    DropTargetHit { target: String },
    DropTargetBankComplete { targets: Vec<String> },
    DropTargetBankReset,
    BallSearchStarted,
    BallSearchStopped,
    ServiceModeEntered,
    ServiceModeExited,
    ServiceSwitchActivated { name: String },
    HighScoreUpdated { entries: Vec<HighScore> },
}

impl MediaEvent {
    /// The wire name of the event, for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            MediaEvent::GameStarted { .. } => "game_started",
            MediaEvent::BallStarting { .. } => "ball_starting",
            MediaEvent::BallEnded { .. } => "ball_ended",
            MediaEvent::GameEnded { .. } => "game_ended",
            MediaEvent::PlayerAdded { .. } => "player_added",
            MediaEvent::TiltWarning { .. } => "tilt_warning",
            MediaEvent::Tilt => "tilt",
            MediaEvent::SlamTilt => "slam_tilt",
            MediaEvent::AttractIdle => "attract_idle",
            MediaEvent::BallSaved => "ball_saved",
            MediaEvent::MultiballStarted { .. } => "multiball_started",
            MediaEvent::MultiballEnded => "multiball_ended",
            MediaEvent::BonusStarted { .. } => "bonus_started",
            MediaEvent::BonusStep { .. } => "bonus_step",
            MediaEvent::BonusCompleted { .. } => "bonus_completed",
            MediaEvent::DropTargetHit { .. } => "drop_target_hit",
            MediaEvent::DropTargetBankComplete { .. } => "drop_target_bank_complete",
            MediaEvent::DropTargetBankReset => "drop_target_bank_reset",
            MediaEvent::BallSearchStarted => "ball_search_started",
            MediaEvent::BallSearchStopped => "ball_search_stopped",
            MediaEvent::ServiceModeEntered => "service_mode_entered",
            MediaEvent::ServiceModeExited => "service_mode_exited",
            MediaEvent::ServiceSwitchActivated { .. } => "service_switch_activated",
            MediaEvent::HighScoreUpdated { .. } => "high_score_updated",
        }
    }
}

/// Outbound media hook. Called only from the game loop; implementations must
/// drop events silently on transport failure rather than erroring back into
/// the game.
pub trait MediaSink: Send {
    fn post(&mut self, event: &MediaEvent);
}

/// Sink that discards everything. Useful for headless tests and tools.
#[derive(Debug, Default)]
pub struct NullMediaSink;

impl MediaSink for NullMediaSink {
    fn post(&mut self, _event: &MediaEvent) {}
}
