use serde::{Deserialize, Serialize};

/// Operator-adjustable settings, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorSettings {
    pub balls_per_game: u32,
    pub max_players: usize,
    pub tilt_warnings: u32,
    pub ball_save_seconds: f64,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            balls_per_game: 3,
            max_players: 4,
            tilt_warnings: 2,
            ball_save_seconds: 8.0,
        }
    }
}

/// Store for operator settings. A missing store yields the defaults; save
/// failures are the implementation's to log and suppress.
pub trait SettingsStore: Send {
    fn load(&self) -> OperatorSettings;
    fn save(&self, settings: &OperatorSettings);
}

/// One persisted high-score entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighScore {
    pub name: String,
    pub score: i64,
    pub date: String,
}

/// Store for the high-score table. `load` returns entries ordered highest
/// first (empty on fresh storage); `save` receives an already ordered and
/// truncated list.
pub trait HighScoreStore: Send {
    fn load(&self) -> Vec<HighScore>;
    fn save(&self, entries: &[HighScore]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults() {
        let s = OperatorSettings::default();
        assert_eq!(s.balls_per_game, 3);
        assert_eq!(s.max_players, 4);
        assert_eq!(s.tilt_warnings, 2);
        assert_eq!(s.ball_save_seconds, 8.0);
    }

    #[test]
    fn settings_partial_json_fills_defaults() {
        let s: OperatorSettings = serde_json::from_str(r#"{ "balls_per_game": 5 }"#).unwrap();
        assert_eq!(s.balls_per_game, 5);
        assert_eq!(s.max_players, 4);
    }

    #[test]
    fn high_score_json_roundtrip() {
        let entry = HighScore {
            name: "Player 2".to_string(),
            score: 1_250_000,
            date: "1769904000Z".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: HighScore = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }
}
