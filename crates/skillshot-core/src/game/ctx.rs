use std::sync::Arc;
use std::time::Instant;

use crate::devices::{Coil, DeviceCollection, Led, Switch};
use crate::media::{MediaEvent, MediaSink};
use crate::mode::{Mode, ModeHost, ModeId, QueuedMode};
use crate::platform::{FlipperRule, Platform};
use crate::player::Player;

/// Queue and lifecycle mutations requested from inside a dispatch. The
/// controller applies these once the current pass is over, so callbacks never
/// observe the queue mid-mutation.
#[derive(Debug)]
pub(crate) enum GameAction {
    StartGame,
    AddPlayer,
    EndBall,
    EndGame,
    BallDrained,
    AddMode(Box<dyn QueuedMode>),
    AddChildMode {
        parent: ModeId,
        mode: Box<dyn QueuedMode>,
    },
    RemoveMode(ModeId),
}

/// The controller as modes see it: devices, players, media, and the
/// platform, but not the mode queue itself. Lifecycle transitions requested
/// here are deferred until the current dispatch pass completes; their
/// observable ordering is unchanged.
pub struct GameCtx<'g> {
    pub(crate) switches: &'g mut DeviceCollection<Switch>,
    pub(crate) coils: &'g mut DeviceCollection<Coil>,
    pub(crate) leds: &'g mut DeviceCollection<Led>,
    pub(crate) players: &'g mut Vec<Player>,
    pub(crate) current_player: usize,
    pub(crate) ball: u32,
    pub(crate) balls_per_game: u32,
    pub(crate) max_players: usize,
    pub(crate) media: &'g mut dyn MediaSink,
    pub(crate) platform: &'g Arc<dyn Platform>,
    pub(crate) flipper_rules: &'g [FlipperRule],
    pub(crate) actions: &'g mut Vec<GameAction>,
    pub(crate) now: Instant,
}

impl<'g> GameCtx<'g> {
    pub fn now(&self) -> Instant {
        self.now
    }

    // Devices.

    pub fn switch(&self, name: &str) -> Option<&Switch> {
        self.switches.get(name)
    }

    pub fn switches(&self) -> impl Iterator<Item = &Switch> {
        self.switches.iter()
    }

    pub fn coil(&self, name: &str) -> Option<&Coil> {
        self.coils.get(name)
    }

    pub fn coil_mut(&mut self, name: &str) -> Option<&mut Coil> {
        self.coils.get_mut(name)
    }

    pub fn coils_mut(&mut self) -> impl Iterator<Item = &mut Coil> {
        self.coils.iter_mut()
    }

    pub fn led(&self, name: &str) -> Option<&Led> {
        self.leds.get(name)
    }

    /// Pulse a coil by name for its default duration. Unknown names warn and
    /// drop.
    pub fn pulse(&self, name: &str) {
        match self.coils.get(name) {
            Some(coil) => coil.pulse(),
            None => tracing::warn!("pulse requested for unknown coil `{name}`"),
        }
    }

    pub fn pulse_for(&self, name: &str, ms: u32) {
        match self.coils.get(name) {
            Some(coil) => coil.pulse_for(ms),
            None => tracing::warn!("pulse requested for unknown coil `{name}`"),
        }
    }

    // Game state.

    /// Current ball number; 0 means no game is in progress.
    pub fn ball(&self) -> u32 {
        self.ball
    }

    pub fn game_in_progress(&self) -> bool {
        self.ball > 0
    }

    pub fn balls_per_game(&self) -> u32 {
        self.balls_per_game
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn players(&self) -> &[Player] {
        self.players.as_slice()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn current_player_index(&self) -> usize {
        self.current_player
    }

    /// The player whose ball is in progress. `None` outside a game.
    pub fn player(&self) -> Option<&Player> {
        self.players.get(self.current_player)
    }

    pub fn player_mut(&mut self) -> Option<&mut Player> {
        self.players.get_mut(self.current_player)
    }

    /// Score for the current player. Outside a game the points are dropped.
    pub fn add_score(&mut self, points: i64) {
        match self.players.get_mut(self.current_player) {
            Some(player) => player.add_score(points),
            None => tracing::trace!("score of {points} dropped; no player up"),
        }
    }

    // Media.

    pub fn post(&mut self, event: MediaEvent) {
        tracing::debug!("media event `{}`", event.name());
        self.media.post(&event);
    }

    // Lifecycle requests, applied after the current dispatch pass.

    pub fn start_game(&mut self) {
        self.actions.push(GameAction::StartGame);
    }

    pub fn add_player(&mut self) {
        self.actions.push(GameAction::AddPlayer);
    }

    pub fn end_ball(&mut self) {
        self.actions.push(GameAction::EndBall);
    }

    pub fn end_game(&mut self) {
        self.actions.push(GameAction::EndGame);
    }

    /// Announce that the last ball drained outside a save window. Modes get
    /// the `ball_drained` hook; if none handles it, the controller ends the
    /// ball.
    pub fn notify_ball_drained(&mut self) {
        self.actions.push(GameAction::BallDrained);
    }

    /// Add an unregistered mode to the queue.
    pub fn add_mode(&mut self, mode: impl Mode) {
        self.actions.push(GameAction::AddMode(ModeHost::boxed(mode)));
    }

    /// Remove a mode (and its children) from the queue. No-op if absent.
    pub fn remove_mode(&mut self, id: ModeId) {
        self.actions.push(GameAction::RemoveMode(id));
    }

    pub(crate) fn request_remove_mode(&mut self, id: ModeId) {
        self.actions.push(GameAction::RemoveMode(id));
    }

    pub(crate) fn request_add_child(&mut self, parent: ModeId, mode: Box<dyn QueuedMode>) {
        self.actions.push(GameAction::AddChildMode { parent, mode });
    }

    // Hardware rules. Only tilt removes and restores flipper rules; the
    // retained copies in the machine config are the restore source.

    /// Tear the configured flipper reflexes out of the hardware.
    pub fn remove_flipper_rules(&mut self) {
        for rule in self.flipper_rules {
            self.platform.remove_hardware_rule(rule.switch);
        }
    }

    /// Re-install every configured flipper reflex with its original
    /// parameters.
    pub fn restore_flipper_rules(&mut self) {
        for rule in self.flipper_rules {
            self.platform.configure_flipper_rule(*rule);
        }
    }
}
