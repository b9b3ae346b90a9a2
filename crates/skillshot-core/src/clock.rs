use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source for the game loop and delay scheduler.
///
/// The default system clock reads `Instant::now()`. The manual clock is for
/// deterministic tests: it only moves when `advance` is called, and clones
/// share the same underlying offset.
#[derive(Debug, Clone)]
pub struct GameClock {
    kind: ClockKind,
}

#[derive(Debug, Clone)]
enum ClockKind {
    System,
    Manual {
        base: Instant,
        offset: Arc<Mutex<Duration>>,
    },
}

impl Default for GameClock {
    fn default() -> Self {
        Self::system()
    }
}

impl GameClock {
    pub fn system() -> Self {
        Self {
            kind: ClockKind::System,
        }
    }

    /// A clock that only moves via `advance`. Clones share the same time.
    pub fn manual() -> Self {
        Self {
            kind: ClockKind::Manual {
                base: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            },
        }
    }

    pub fn now(&self) -> Instant {
        match &self.kind {
            ClockKind::System => Instant::now(),
            ClockKind::Manual { base, offset } => *base + *offset.lock().expect("clock poisoned"),
        }
    }

    /// Advance a manual clock. No-op (with a warning) on the system clock.
    pub fn advance(&self, by: Duration) {
        match &self.kind {
            ClockKind::System => tracing::warn!("advance() called on the system clock"),
            ClockKind::Manual { offset, .. } => {
                *offset.lock().expect("clock poisoned") += by;
            },
        }
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs.max(0.0)));
    }
}

/// Simple ISO-8601-ish timestamp (Unix epoch seconds with a Z suffix), used
/// to date high-score entries without pulling in a calendar crate.
pub fn timestamp_now() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{secs}Z")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_frozen() {
        let clock = GameClock::manual();
        let a = clock.now();
        let b = clock.now();
        assert_eq!(a, b);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = GameClock::manual();
        let a = clock.now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - a, Duration::from_millis(250));
    }

    #[test]
    fn manual_clones_share_time() {
        let clock = GameClock::manual();
        let twin = clock.clone();
        clock.advance_secs(1.5);
        assert_eq!(clock.now(), twin.now());
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = GameClock::system();
        let a = clock.now();
        assert!(clock.now() >= a);
    }
}
