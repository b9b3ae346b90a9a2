use std::cmp::Reverse;

use crate::clock::timestamp_now;
use crate::media::MediaEvent;
use crate::mode::{Lifecycle, Mode, ModeScope};
use crate::persist::{HighScore, HighScoreStore};

const DEFAULT_MAX_ENTRIES: usize = 10;

/// Maintains the persisted high-score table. At each game end every player
/// whose score qualifies (the table has room, or the score beats the lowest
/// kept entry) is inserted; the table stays sorted descending and capped.
pub struct HighScoreMode {
    store: Box<dyn HighScoreStore>,
    max_entries: usize,
    priority: i32,
}

impl HighScoreMode {
    pub fn new(store: Box<dyn HighScoreStore>) -> Self {
        Self {
            store,
            max_entries: DEFAULT_MAX_ENTRIES,
            priority: 50,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Insert `(name, score)` into `entries` if it qualifies, keeping the
    /// list sorted descending and truncated. Returns whether it was kept.
    fn qualify(entries: &mut Vec<HighScore>, name: &str, score: i64, max_entries: usize) -> bool {
        let qualifies = entries.len() < max_entries
            || entries.last().map(|lowest| score > lowest.score).unwrap_or(true);
        if !qualifies {
            return false;
        }
        entries.push(HighScore {
            name: name.to_string(),
            score,
            date: timestamp_now(),
        });
        // Stable sort: an equal score ranks below the entries already there.
        entries.sort_by_key(|e| Reverse(e.score));
        entries.truncate(max_entries);
        true
    }
}

impl Mode for HighScoreMode {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::System
    }

    fn game_ended(&mut self, scope: &mut ModeScope<'_, '_, Self>) {
        let mut entries = self.store.load();
        let mut changed = false;
        let finishers: Vec<(String, i64)> = scope
            .players()
            .iter()
            .map(|p| (p.name.clone(), p.score))
            .collect();
        for (name, score) in finishers {
            if Self::qualify(&mut entries, &name, score, self.max_entries) {
                tracing::info!("new high score: {name} with {score}");
                changed = true;
            }
        }
        if changed {
            self.store.save(&entries);
            scope.post(MediaEvent::HighScoreUpdated { entries });
        }
    }
}
