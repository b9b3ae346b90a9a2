mod ctx;

pub use ctx::GameCtx;
pub(crate) use ctx::GameAction;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::clock::GameClock;
use crate::config::MachineConfig;
use crate::devices::SwitchState;
use crate::error::{ConfigError, GameError, ModeError, PlatformError};
use crate::media::{MediaEvent, MediaSink, ScoreEntry};
use crate::mode::{Lifecycle, Mode, ModeHost, ModeId, QueuedMode};
use crate::persist::OperatorSettings;
use crate::platform::{Platform, SwitchChange};
use crate::player::Player;
use crate::queue::ModeQueue;

/// Cooperative yield between loop iterations.
const LOOP_YIELD: Duration = Duration::from_millis(1);

struct Registration {
    id: ModeId,
    lifecycle: Lifecycle,
    /// The mode itself while it is *not* in the queue; `None` means queued.
    slot: Option<Box<dyn QueuedMode>>,
}

/// The runtime: owns the platform link, device tables, players, the mode
/// queue, and the lifecycle state machine.
///
/// Startup sequence: [`connect`](Self::connect), then
/// [`configure`](Self::configure), then [`register`](Self::register) the
/// machine's modes, then [`run`](Self::run) (which performs the rest: initial
/// switch states, system-mode insertion, the loop).
///
/// Everything but the switch-change producer runs on the loop task; tests can
/// drive the loop body directly with [`run_once`](Self::run_once).
pub struct GameController {
    platform: Arc<dyn Platform>,
    config: MachineConfig,
    players: Vec<Player>,
    current_player: usize,
    /// Current ball number; 0 means no game in progress.
    ball: u32,
    settings: OperatorSettings,
    media: Box<dyn MediaSink>,
    queue: ModeQueue,
    registrations: Vec<Registration>,
    next_mode_id: u64,
    events_rx: Option<mpsc::UnboundedReceiver<SwitchChange>>,
    actions: Vec<GameAction>,
    applying_actions: bool,
    clock: GameClock,
    last_tick: Option<Instant>,
    ball_started_at: Option<Instant>,
}

impl GameController {
    pub fn new(platform: Arc<dyn Platform>, media: Box<dyn MediaSink>) -> Self {
        let config = MachineConfig::new(Arc::clone(&platform));
        Self {
            platform,
            config,
            players: Vec::new(),
            current_player: 0,
            ball: 0,
            settings: OperatorSettings::default(),
            media,
            queue: ModeQueue::new(),
            registrations: Vec::new(),
            next_mode_id: 1,
            events_rx: None,
            actions: Vec::new(),
            applying_actions: false,
            clock: GameClock::system(),
            last_tick: None,
            ball_started_at: None,
        }
    }

    pub fn with_settings(mut self, settings: OperatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: GameClock) -> Self {
        self.clock = clock;
        self
    }

    // Startup.

    /// Connect the platform and take ownership of its switch-change stream.
    pub fn connect(&mut self, cancel: &CancellationToken) -> Result<(), PlatformError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.platform.connect(tx, cancel.child_token())?;
        self.events_rx = Some(rx);
        tracing::info!("platform connected");
        Ok(())
    }

    /// Run the machine's declarative device/rule registration, exactly once.
    pub fn configure(
        &mut self,
        define: impl FnOnce(&mut MachineConfig) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        self.config.mark_configured()?;
        define(&mut self.config)?;
        tracing::info!(
            "machine configured: {} switches, {} coils, {} leds",
            self.config.switches.len(),
            self.config.coils.len(),
            self.config.leds.len()
        );
        Ok(())
    }

    /// Record a mode under its (explicit or default) lifecycle. System modes
    /// are inserted at startup; Game/Ball modes ride the lifecycle
    /// transitions; Manual modes wait for [`add_mode`](Self::add_mode).
    pub fn register<M: Mode>(&mut self, mode: M, lifecycle: Option<Lifecycle>) -> ModeId {
        let host = ModeHost::boxed(mode);
        let lifecycle = lifecycle.unwrap_or_else(|| host.default_lifecycle());
        let id = self.alloc_mode_id();
        tracing::debug!("registered {} as {lifecycle:?}", host.label());
        self.registrations.push(Registration {
            id,
            lifecycle,
            slot: Some(host),
        });
        id
    }

    /// Fetch initial switch states, insert system modes, and arm the loop.
    /// Called by [`run`](Self::run); public so tests can drive the loop
    /// manually.
    pub fn startup(&mut self) -> Result<(), GameError> {
        let initial = self.platform.initial_switch_states()?;
        for (address, state) in initial {
            match self.config.switches.by_address_mut(address) {
                Some(switch) => switch.set_initial_state(state),
                None => tracing::warn!("initial state for unknown switch address {address}"),
            }
        }
        self.add_lifecycle_modes(Lifecycle::System);
        self.apply_actions();
        self.last_tick = Some(self.clock.now());
        tracing::info!("startup complete; {} modes in queue", self.queue.len());
        Ok(())
    }

    /// The main loop. Exits cleanly on cancellation, disconnecting the
    /// platform.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), GameError> {
        self.startup()?;
        while !cancel.is_cancelled() {
            self.run_once();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(LOOP_YIELD) => {},
            }
        }
        tracing::info!("game loop exiting");
        self.platform.disconnect()?;
        Ok(())
    }

    /// One loop iteration: drain switch events, fire due delays, tick modes.
    pub fn run_once(&mut self) {
        let now = self.clock.now();
        let dt = self
            .last_tick
            .map(|t| (now - t).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        self.drain_switch_events();

        let (queue, mut delay_ctx) = self.split();
        queue.service_delays(&mut delay_ctx, now);
        drop(delay_ctx);
        self.apply_actions();

        let (queue, mut tick_ctx) = self.split();
        queue.tick(&mut tick_ctx, dt);
        drop(tick_ctx);
        self.apply_actions();
    }

    // Switch-event pipeline.

    fn drain_switch_events(&mut self) {
        let Some(rx) = self.events_rx.as_mut() else {
            return;
        };
        let mut batch = Vec::new();
        while let Ok(change) = rx.try_recv() {
            batch.push(change);
        }
        for change in batch {
            self.handle_switch_event(change);
        }
    }

    fn handle_switch_event(&mut self, change: SwitchChange) {
        let now = self.clock.now();
        let Some(switch) = self.config.switches.by_address_mut(change.address) else {
            tracing::warn!("dropping event for unknown switch address {}", change.address);
            return;
        };
        if switch.state() == change.state {
            tracing::trace!("duplicate {:?} for `{}` dropped", change.state, switch.name());
            return;
        }
        switch.set_state(change.state, now);
        let snapshot = switch.clone();
        tracing::debug!(
            "switch `{}` -> {:?} (active: {})",
            snapshot.name(),
            snapshot.state(),
            snapshot.is_active()
        );
        let (queue, mut ctx) = self.split();
        queue.dispatch_switch(&mut ctx, &snapshot);
        drop(ctx);
        self.apply_actions();
    }

    /// Feed a switch transition by name, as if the platform had reported it.
    /// The sim harness and tests drive the pipeline through this.
    pub fn inject_switch(&mut self, name: &str, state: SwitchState) {
        match self.config.switches.get(name) {
            Some(switch) => {
                let change = SwitchChange {
                    address: switch.address(),
                    state,
                };
                self.handle_switch_event(change);
            },
            None => tracing::warn!("inject_switch: no switch named `{name}`"),
        }
    }

    // Lifecycle state machine.

    /// Idle -> ball 1. Idempotent while a game is in progress.
    pub fn start_game(&mut self) {
        if self.ball != 0 {
            tracing::debug!("start_game ignored; ball {} in progress", self.ball);
            return;
        }
        self.players.clear();
        self.current_player = 0;
        self.players.push(Player::new("Player 1"));
        self.ball = 1;
        tracing::info!("game started");
        self.post(MediaEvent::GameStarted {
            player: 1,
            balls_per_game: self.settings.balls_per_game,
        });
        self.add_lifecycle_modes(Lifecycle::Game);
        let (queue, mut hook_ctx) = self.split();
        queue.game_started(&mut hook_ctx);
        drop(hook_ctx);
        self.start_ball();
        self.apply_actions();
    }

    /// Append a player. Allowed any time a game is in progress and there is
    /// room; the "ball 1 before the first plunge" policy lives in the
    /// attract mode.
    pub fn add_player(&mut self) -> bool {
        if self.ball == 0 || self.players.len() >= self.settings.max_players {
            return false;
        }
        let number = self.players.len() + 1;
        self.players.push(Player::new(format!("Player {number}")));
        tracing::info!("player {number} added");
        self.post(MediaEvent::PlayerAdded {
            player: number,
            total_players: number,
        });
        self.apply_actions();
        true
    }

    fn start_ball(&mut self) {
        // Ball-scoped state is cleared before any handler can run this ball.
        if let Some(player) = self.players.get_mut(self.current_player) {
            player.clear_ball_state();
        }
        self.add_lifecycle_modes(Lifecycle::Ball);
        self.ball_started_at = Some(self.clock.now());
        let (ball, player) = (self.ball, self.current_player + 1);
        tracing::info!("ball {ball} starting for player {player}");
        self.post(MediaEvent::BallStarting { ball, player });
        let (queue, mut hook_ctx) = self.split();
        queue.ball_starting(&mut hook_ctx);
    }

    /// Close out the current ball: credit play time, run extra-ball and
    /// player-rotation bookkeeping, and either start the next ball or end
    /// the game.
    pub fn end_ball(&mut self) {
        if self.ball == 0 {
            return;
        }
        if let Some(started) = self.ball_started_at.take()
            && let Some(player) = self.players.get_mut(self.current_player)
        {
            player.game_time += (self.clock.now() - started).as_secs_f64();
        }
        let (ball, player_number) = (self.ball, self.current_player + 1);
        let score = self
            .players
            .get(self.current_player)
            .map(|p| p.score)
            .unwrap_or(0);
        tracing::info!("ball {ball} ended for player {player_number} (score {score})");
        self.post(MediaEvent::BallEnded {
            ball,
            player: player_number,
            score,
        });
        let (queue, mut hook_ctx) = self.split();
        queue.ball_ended(&mut hook_ctx);
        drop(hook_ctx);
        self.remove_lifecycle_modes(Lifecycle::Ball);

        if let Some(player) = self.players.get_mut(self.current_player)
            && player.extra_balls > 0
        {
            player.extra_balls -= 1;
            tracing::info!("extra ball for player {player_number}");
            self.start_ball();
            self.apply_actions();
            return;
        }

        if self.current_player + 1 < self.players.len() {
            self.current_player += 1;
        } else {
            self.current_player = 0;
            self.ball += 1;
        }
        if self.ball > self.settings.balls_per_game {
            self.end_game();
        } else {
            self.start_ball();
        }
        self.apply_actions();
    }

    /// BallInProgress -> Idle: remove game modes, publish the scoreboard,
    /// reset the ball counter.
    pub fn end_game(&mut self) {
        if self.ball == 0 {
            return;
        }
        tracing::info!("game ended");
        self.remove_lifecycle_modes(Lifecycle::Game);
        self.ball = 0;
        self.ball_started_at = None;
        let scores: Vec<ScoreEntry> = self
            .players
            .iter()
            .map(|p| ScoreEntry {
                name: p.name.clone(),
                score: p.score,
            })
            .collect();
        self.post(MediaEvent::GameEnded { scores });
        let (queue, mut hook_ctx) = self.split();
        queue.game_ended(&mut hook_ctx);
        drop(hook_ctx);
        self.apply_actions();
    }

    // Mode queue management.

    /// Manually add a registered mode. Errs if it is already queued.
    pub fn add_mode(&mut self, id: ModeId) -> Result<(), ModeError> {
        let registration = self
            .registrations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ModeError::Unregistered(id))?;
        let Some(mode) = registration.slot.take() else {
            return Err(ModeError::AlreadyQueued(id));
        };
        let (queue, mut ctx) = self.split();
        let result = queue.insert(id, None, mode, &mut ctx);
        drop(ctx);
        self.apply_actions();
        result
    }

    /// Remove a mode from the queue. Silent no-op for non-members.
    pub fn remove_mode(&mut self, id: ModeId) {
        self.remove_mode_by_id(id);
        self.apply_actions();
    }

    /// Run `f` against the game context from outside a dispatch. Deferred
    /// actions it requests are applied before returning.
    pub fn with_ctx<R>(&mut self, f: impl FnOnce(&mut GameCtx<'_>) -> R) -> R {
        let result = {
            let (_, mut ctx) = self.split();
            f(&mut ctx)
        };
        self.apply_actions();
        result
    }

    /// Run `f` against a queued mode and the game context together, from
    /// outside a dispatch. This is how application tasks poke a mode that
    /// needs hardware access (e.g. ask the trough for a multiball eject).
    pub fn with_mode_ctx<M: Mode, R>(
        &mut self,
        id: ModeId,
        f: impl FnOnce(&mut M, &mut GameCtx<'_>) -> R,
    ) -> Option<R> {
        let result = {
            let (queue, mut ctx) = self.split();
            queue.mode_mut::<M>(id).map(|mode| f(mode, &mut ctx))
        };
        self.apply_actions();
        result
    }

    /// Typed access to a registered mode's state, queued or not. For use
    /// outside a dispatch (wiring, tests, service tools).
    pub fn mode_mut<M: Mode>(&mut self, id: ModeId) -> Option<&mut M> {
        if self.queue.contains(id) {
            self.queue.mode_mut::<M>(id)
        } else {
            self.registrations
                .iter_mut()
                .find(|r| r.id == id)
                .and_then(|r| r.slot.as_mut())
                .and_then(|m| m.as_any_mut().downcast_mut::<M>())
        }
    }

    fn alloc_mode_id(&mut self) -> ModeId {
        let id = ModeId(self.next_mode_id);
        self.next_mode_id += 1;
        id
    }

    fn add_lifecycle_modes(&mut self, lifecycle: Lifecycle) {
        let queue = &self.queue;
        let pending: Vec<(ModeId, Box<dyn QueuedMode>)> = self
            .registrations
            .iter_mut()
            .filter(|r| r.lifecycle == lifecycle && !queue.contains(r.id))
            .filter_map(|r| r.slot.take().map(|mode| (r.id, mode)))
            .collect();
        if pending.is_empty() {
            return;
        }
        let (queue, mut ctx) = self.split();
        for (id, mode) in pending {
            if let Err(err) = queue.insert(id, None, mode, &mut ctx) {
                tracing::warn!("lifecycle add skipped: {err}");
            }
        }
    }

    fn remove_lifecycle_modes(&mut self, lifecycle: Lifecycle) {
        let ids: Vec<ModeId> = self
            .registrations
            .iter()
            .filter(|r| r.lifecycle == lifecycle && r.slot.is_none())
            .map(|r| r.id)
            .collect();
        if ids.is_empty() {
            return;
        }
        let mut returned: Vec<(ModeId, Box<dyn QueuedMode>)> = Vec::new();
        {
            let (queue, mut ctx) = self.split();
            for id in ids {
                if let Some(mode) = queue.remove(id, &mut ctx) {
                    returned.push((id, mode));
                }
            }
        }
        for (id, mode) in returned {
            if let Some(registration) = self.registrations.iter_mut().find(|r| r.id == id) {
                registration.slot = Some(mode);
            }
        }
    }

    fn remove_mode_by_id(&mut self, id: ModeId) {
        let removed = {
            let (queue, mut ctx) = self.split();
            queue.remove(id, &mut ctx)
        };
        if let Some(mode) = removed
            && let Some(registration) = self.registrations.iter_mut().find(|r| r.id == id)
        {
            registration.slot = Some(mode);
        }
    }

    // Deferred actions.

    fn apply_actions(&mut self) {
        if self.applying_actions {
            return;
        }
        self.applying_actions = true;
        while !self.actions.is_empty() {
            let batch = std::mem::take(&mut self.actions);
            for action in batch {
                self.apply_action(action);
            }
        }
        self.applying_actions = false;
    }

    fn apply_action(&mut self, action: GameAction) {
        match action {
            GameAction::StartGame => self.start_game(),
            GameAction::AddPlayer => {
                self.add_player();
            },
            GameAction::EndBall => self.end_ball(),
            GameAction::EndGame => self.end_game(),
            GameAction::BallDrained => self.handle_drain(),
            GameAction::AddMode(mode) => {
                let id = self.alloc_mode_id();
                let (queue, mut ctx) = self.split();
                if let Err(err) = queue.insert(id, None, mode, &mut ctx) {
                    tracing::warn!("ad-hoc mode add failed: {err}");
                }
            },
            GameAction::AddChildMode { parent, mode } => {
                if !self.queue.contains(parent) {
                    tracing::warn!("child mode dropped; parent {parent:?} left the queue");
                    return;
                }
                let id = self.alloc_mode_id();
                let (queue, mut ctx) = self.split();
                if let Err(err) = queue.insert(id, Some(parent), mode, &mut ctx) {
                    tracing::warn!("child mode add failed: {err}");
                }
            },
            GameAction::RemoveMode(id) => self.remove_mode_by_id(id),
        }
    }

    fn handle_drain(&mut self) {
        let handled = {
            let (queue, mut ctx) = self.split();
            queue.ball_drained(&mut ctx)
        };
        if !handled {
            self.end_ball();
        }
    }

    fn post(&mut self, event: MediaEvent) {
        tracing::debug!("media event `{}`", event.name());
        self.media.post(&event);
    }

    fn split(&mut self) -> (&mut ModeQueue, GameCtx<'_>) {
        let now = self.clock.now();
        (
            &mut self.queue,
            GameCtx {
                switches: &mut self.config.switches,
                coils: &mut self.config.coils,
                leds: &mut self.config.leds,
                players: &mut self.players,
                current_player: self.current_player,
                ball: self.ball,
                balls_per_game: self.settings.balls_per_game,
                max_players: self.settings.max_players,
                media: self.media.as_mut(),
                platform: &self.platform,
                flipper_rules: &self.config.flipper_rules,
                actions: &mut self.actions,
                now,
            },
        )
    }

    // Read-side accessors.

    pub fn ball(&self) -> u32 {
        self.ball
    }

    pub fn game_in_progress(&self) -> bool {
        self.ball > 0
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn current_player_index(&self) -> usize {
        self.current_player
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player)
    }

    pub fn current_player_mut(&mut self) -> Option<&mut Player> {
        self.players.get_mut(self.current_player)
    }

    pub fn settings(&self) -> &OperatorSettings {
        &self.settings
    }

    pub fn machine(&self) -> &MachineConfig {
        &self.config
    }

    pub fn queue(&self) -> &ModeQueue {
        &self.queue
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }
}
