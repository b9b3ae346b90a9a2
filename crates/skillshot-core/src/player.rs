use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A heterogeneous value stored in a player's key/value state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Int(i64),
    Float(f64),
    Text(String),
    Flag(bool),
}

/// One seat in the current game: score, extra balls, accumulated play time,
/// and two key/value maps. Game state lives for the whole game; ball state
/// is cleared at the start of every new ball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub score: i64,
    pub extra_balls: u32,
    /// Seconds of play accumulated across this player's balls.
    pub game_time: f64,
    game_state: HashMap<String, StateValue>,
    ball_state: HashMap<String, StateValue>,
}

fn int_of(map: &HashMap<String, StateValue>, key: &str, default: i64) -> i64 {
    match map.get(key) {
        Some(StateValue::Int(v)) => *v,
        _ => default,
    }
}

fn float_of(map: &HashMap<String, StateValue>, key: &str, default: f64) -> f64 {
    match map.get(key) {
        Some(StateValue::Float(v)) => *v,
        _ => default,
    }
}

fn flag_of(map: &HashMap<String, StateValue>, key: &str, default: bool) -> bool {
    match map.get(key) {
        Some(StateValue::Flag(v)) => *v,
        _ => default,
    }
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score: 0,
            extra_balls: 0,
            game_time: 0.0,
            game_state: HashMap::new(),
            ball_state: HashMap::new(),
        }
    }

    pub fn add_score(&mut self, points: i64) {
        self.score += points;
    }

    // Game-scoped state.

    pub fn game_int(&self, key: &str, default: i64) -> i64 {
        int_of(&self.game_state, key, default)
    }

    pub fn set_game_int(&mut self, key: &str, value: i64) {
        self.game_state
            .insert(key.to_string(), StateValue::Int(value));
    }

    pub fn game_flag(&self, key: &str, default: bool) -> bool {
        flag_of(&self.game_state, key, default)
    }

    pub fn set_game_flag(&mut self, key: &str, value: bool) {
        self.game_state
            .insert(key.to_string(), StateValue::Flag(value));
    }

    pub fn game_float(&self, key: &str, default: f64) -> f64 {
        float_of(&self.game_state, key, default)
    }

    pub fn set_game_float(&mut self, key: &str, value: f64) {
        self.game_state
            .insert(key.to_string(), StateValue::Float(value));
    }

    pub fn game_text(&self, key: &str) -> Option<&str> {
        match self.game_state.get(key) {
            Some(StateValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn set_game_text(&mut self, key: &str, value: impl Into<String>) {
        self.game_state
            .insert(key.to_string(), StateValue::Text(value.into()));
    }

    // Ball-scoped state.

    pub fn ball_int(&self, key: &str, default: i64) -> i64 {
        int_of(&self.ball_state, key, default)
    }

    pub fn set_ball_int(&mut self, key: &str, value: i64) {
        self.ball_state
            .insert(key.to_string(), StateValue::Int(value));
    }

    /// Add `delta` to a ball-scoped integer, returning the new value. A
    /// missing or non-integer entry counts as zero.
    pub fn add_ball_int(&mut self, key: &str, delta: i64) -> i64 {
        let next = int_of(&self.ball_state, key, 0) + delta;
        self.set_ball_int(key, next);
        next
    }

    pub fn ball_flag(&self, key: &str, default: bool) -> bool {
        flag_of(&self.ball_state, key, default)
    }

    pub fn set_ball_flag(&mut self, key: &str, value: bool) {
        self.ball_state
            .insert(key.to_string(), StateValue::Flag(value));
    }

    pub fn ball_float(&self, key: &str, default: f64) -> f64 {
        float_of(&self.ball_state, key, default)
    }

    pub fn set_ball_float(&mut self, key: &str, value: f64) {
        self.ball_state
            .insert(key.to_string(), StateValue::Float(value));
    }

    /// Wipe ball-scoped state. Called by the controller at the start of each
    /// of this player's balls, before any handler runs.
    pub fn clear_ball_state(&mut self) {
        self.ball_state.clear();
    }
}
