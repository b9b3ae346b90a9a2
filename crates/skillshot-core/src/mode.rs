use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use crate::devices::{Activation, Switch, SwitchTag};
use crate::game::GameCtx;

/// Opaque identity of a mode in the registry and queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModeId(pub(crate) u64);

/// When the controller automatically inserts and removes a registered mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Added at startup, never removed.
    System,
    /// Added by `StartGame`, removed by `EndGame`.
    Game,
    /// Added by `StartBall`, removed by `EndBall`.
    Ball,
    /// Never touched by the controller; the caller owns queue membership.
    Manual,
}

/// What a switch handler tells the dispatch loop. `Stop` suppresses the
/// event for every lower-priority mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchResult {
    Continue,
    Stop,
}

/// Response to the ball-drained notification. A `Handled` subscriber takes
/// over responsibility for eventually calling `end_ball`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainResult {
    Unhandled,
    Handled,
}

/// Switch-handler callback. Plain function pointers keep handlers `Copy`,
/// which lets a hold-duration handler re-arm itself from a scheduled delay.
pub type SwitchFn<M> = for<'a, 'g> fn(&mut M, &mut ModeScope<'a, 'g, M>, &Switch) -> SwitchResult;

pub(crate) type DelayFn<M> = Box<dyn for<'a, 'g> FnOnce(&mut M, &mut ModeScope<'a, 'g, M>) + Send>;

/// A composable unit of game behavior, ranked by priority and driven by the
/// queue's hooks.
///
/// Modes are plain structs; the queue stores them inside a [`ModeHost`], so
/// none of these methods need to be object safe. Handlers may only be
/// registered from `mode_started`; they are discarded when the mode leaves
/// the queue, along with any pending delays.
pub trait Mode: Send + 'static {
    /// Dispatch rank. Higher priorities see switch events first.
    fn priority(&self) -> i32;

    fn default_lifecycle(&self) -> Lifecycle {
        Lifecycle::Manual
    }

    /// Called when the mode enters the queue. Register switch handlers and
    /// initial delays here.
    fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>)
    where
        Self: Sized,
    {
        let _ = api;
    }

    /// Called right after the mode leaves the queue.
    fn mode_stopped(&mut self, game: &mut GameCtx<'_>) {
        let _ = game;
    }

    /// Called every loop iteration with the elapsed seconds.
    fn tick(&mut self, scope: &mut ModeScope<'_, '_, Self>, dt: f64)
    where
        Self: Sized,
    {
        let _ = (scope, dt);
    }

    /// Catch-all invoked for every switch event the mode sees, after the
    /// registered handlers.
    fn handle_switch(&mut self, scope: &mut ModeScope<'_, '_, Self>, switch: &Switch) -> SwitchResult
    where
        Self: Sized,
    {
        let _ = (scope, switch);
        SwitchResult::Continue
    }

    fn game_started(&mut self, scope: &mut ModeScope<'_, '_, Self>)
    where
        Self: Sized,
    {
        let _ = scope;
    }

    fn ball_starting(&mut self, scope: &mut ModeScope<'_, '_, Self>)
    where
        Self: Sized,
    {
        let _ = scope;
    }

    fn ball_ended(&mut self, scope: &mut ModeScope<'_, '_, Self>)
    where
        Self: Sized,
    {
        let _ = scope;
    }

    fn game_ended(&mut self, scope: &mut ModeScope<'_, '_, Self>)
    where
        Self: Sized,
    {
        let _ = scope;
    }

    /// The last ball just drained with no save window open. Return
    /// `Handled` to defer `end_ball` (e.g. to run a bonus countdown first).
    fn ball_drained(&mut self, scope: &mut ModeScope<'_, '_, Self>) -> DrainResult
    where
        Self: Sized,
    {
        let _ = scope;
        DrainResult::Unhandled
    }
}

enum SwitchMatcher {
    Name(String),
    Tag(SwitchTag),
}

impl SwitchMatcher {
    fn matches(&self, switch: &Switch) -> bool {
        match self {
            SwitchMatcher::Name(name) => switch.name().eq_ignore_ascii_case(name),
            SwitchMatcher::Tag(tag) => switch.has_tag(*tag),
        }
    }
}

struct SwitchHandler<M> {
    matcher: SwitchMatcher,
    activation: Activation,
    hold_secs: Option<f64>,
    callback: SwitchFn<M>,
}

/// The key under which a hold-duration handler parks its pending fire.
fn hold_delay_name(switch: &str, activation: Activation, secs: f64) -> String {
    format!("sw_{switch}_{activation}_{secs}")
}

struct DelayEntry<M> {
    name: String,
    fire_at: Instant,
    seq: u64,
    cancel_on: Option<(String, Activation)>,
    callback: DelayFn<M>,
}

/// Pending delays of one mode. Names are stable keys: scheduling an existing
/// name replaces the prior entry.
struct DelayList<M> {
    entries: Vec<DelayEntry<M>>,
    next_seq: u64,
}

impl<M> DelayList<M> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    fn schedule(
        &mut self,
        name: &str,
        fire_at: Instant,
        cancel_on: Option<(String, Activation)>,
        callback: DelayFn<M>,
    ) {
        self.entries.retain(|e| e.name != name);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(DelayEntry {
            name: name.to_string(),
            fire_at,
            seq,
            cancel_on,
            callback,
        });
    }

    fn cancel(&mut self, name: &str) {
        self.entries.retain(|e| e.name != name);
    }

    fn is_pending(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Drop every entry whose cancel trigger matches the transition the
    /// switch just made.
    fn cancel_matching(&mut self, switch: &Switch) {
        self.entries.retain(|e| match &e.cancel_on {
            Some((name, activation)) => {
                !(switch.name().eq_ignore_ascii_case(name) && switch.matches(*activation))
            },
            None => true,
        });
    }

    /// Remove and return every entry due at `now`, ordered by fire-at with
    /// scheduling order breaking ties.
    fn take_due(&mut self, now: Instant) -> Vec<DelayEntry<M>> {
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].fire_at <= now {
                due.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.seq.cmp(&b.seq)));
        due
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-callback view handed to a running mode: the game context plus this
/// mode's delay scheduler. Derefs to [`GameCtx`], so device access, media
/// posts, and lifecycle requests read the same at both levels.
pub struct ModeScope<'a, 'g, M> {
    pub game: &'a mut GameCtx<'g>,
    delays: &'a mut DelayList<M>,
    mode_id: ModeId,
}

impl<'a, 'g, M> Deref for ModeScope<'a, 'g, M> {
    type Target = GameCtx<'g>;

    fn deref(&self) -> &GameCtx<'g> {
        self.game
    }
}

impl<'a, 'g, M> DerefMut for ModeScope<'a, 'g, M> {
    fn deref_mut(&mut self) -> &mut GameCtx<'g> {
        self.game
    }
}

impl<'a, 'g, M> ModeScope<'a, 'g, M> {
    pub fn mode_id(&self) -> ModeId {
        self.mode_id
    }

    /// Schedule a single-shot callback under a fresh unique name, returned
    /// to the caller for cancellation.
    pub fn delay<F>(&mut self, seconds: f64, callback: F) -> String
    where
        F: for<'x, 'y> FnOnce(&mut M, &mut ModeScope<'x, 'y, M>) + Send + 'static,
    {
        let name = format!("delay-{}", uuid::Uuid::new_v4());
        self.delay_named(&name, seconds, callback);
        name
    }

    /// Schedule a single-shot callback under `name`. An existing pending
    /// delay with the same name is replaced, restarting the timer.
    pub fn delay_named<F>(&mut self, name: &str, seconds: f64, callback: F)
    where
        F: for<'x, 'y> FnOnce(&mut M, &mut ModeScope<'x, 'y, M>) + Send + 'static,
    {
        self.schedule_with_cancel(name, seconds, None, callback);
    }

    /// Like [`delay_named`](Self::delay_named), but the pending fire is also
    /// dropped if `switch` transitions to `activation` first.
    pub fn delay_canceled_by<F>(
        &mut self,
        name: &str,
        seconds: f64,
        switch: &str,
        activation: Activation,
        callback: F,
    ) where
        F: for<'x, 'y> FnOnce(&mut M, &mut ModeScope<'x, 'y, M>) + Send + 'static,
    {
        self.schedule_with_cancel(name, seconds, Some((switch.to_string(), activation)), callback);
    }

    pub(crate) fn schedule_with_cancel<F>(
        &mut self,
        name: &str,
        seconds: f64,
        cancel_on: Option<(String, Activation)>,
        callback: F,
    ) where
        F: for<'x, 'y> FnOnce(&mut M, &mut ModeScope<'x, 'y, M>) + Send + 'static,
    {
        // A non-positive delay fires on the next tick.
        let fire_at = self.game.now() + Duration::from_secs_f64(seconds.max(0.0));
        self.delays
            .schedule(name, fire_at, cancel_on, Box::new(callback));
    }

    /// Remove any pending delays under `name`. No-op if none exist.
    pub fn cancel_delay(&mut self, name: &str) {
        self.delays.cancel(name);
    }

    pub fn is_delayed(&self, name: &str) -> bool {
        self.delays.is_pending(name)
    }

    /// Ask the controller to drop this mode from the queue after the current
    /// dispatch pass.
    pub fn remove_self(&mut self) {
        let id = self.mode_id;
        self.game.request_remove_mode(id);
    }

    /// Add a sub-mode owned by this mode. It is removed automatically when
    /// this mode leaves the queue.
    pub fn add_child(&mut self, child: impl Mode) {
        let parent = self.mode_id;
        self.game.request_add_child(parent, ModeHost::boxed(child));
    }
}

/// Registration surface available during `mode_started`. Derefs to
/// [`ModeScope`] so delays can be scheduled while registering.
pub struct ModeApi<'a, 'g, M> {
    scope: ModeScope<'a, 'g, M>,
    handlers: &'a mut Vec<SwitchHandler<M>>,
}

impl<'a, 'g, M> Deref for ModeApi<'a, 'g, M> {
    type Target = ModeScope<'a, 'g, M>;

    fn deref(&self) -> &ModeScope<'a, 'g, M> {
        &self.scope
    }
}

impl<'a, 'g, M> DerefMut for ModeApi<'a, 'g, M> {
    fn deref_mut(&mut self) -> &mut ModeScope<'a, 'g, M> {
        &mut self.scope
    }
}

impl<'a, 'g, M> ModeApi<'a, 'g, M> {
    /// Register a handler for a named switch reaching `activation`.
    pub fn on_switch(&mut self, switch: &str, activation: Activation, callback: SwitchFn<M>) {
        self.handlers.push(SwitchHandler {
            matcher: SwitchMatcher::Name(switch.to_string()),
            activation,
            hold_secs: None,
            callback,
        });
    }

    pub fn on_active(&mut self, switch: &str, callback: SwitchFn<M>) {
        self.on_switch(switch, Activation::Active, callback);
    }

    pub fn on_inactive(&mut self, switch: &str, callback: SwitchFn<M>) {
        self.on_switch(switch, Activation::Inactive, callback);
    }

    pub fn on_closed(&mut self, switch: &str, callback: SwitchFn<M>) {
        self.on_switch(switch, Activation::Closed, callback);
    }

    pub fn on_open(&mut self, switch: &str, callback: SwitchFn<M>) {
        self.on_switch(switch, Activation::Open, callback);
    }

    /// Register a hold handler: fires only if the switch stays in
    /// `activation` for `hold_secs`. The pending fire is cancelled
    /// automatically when the switch transitions the other way.
    pub fn on_held(
        &mut self,
        switch: &str,
        activation: Activation,
        hold_secs: f64,
        callback: SwitchFn<M>,
    ) {
        self.handlers.push(SwitchHandler {
            matcher: SwitchMatcher::Name(switch.to_string()),
            activation,
            hold_secs: Some(hold_secs),
            callback,
        });
    }

    pub fn on_active_for(&mut self, switch: &str, hold_secs: f64, callback: SwitchFn<M>) {
        self.on_held(switch, Activation::Active, hold_secs, callback);
    }

    /// Register a handler for every switch carrying `tag`.
    pub fn on_tag(&mut self, tag: SwitchTag, activation: Activation, callback: SwitchFn<M>) {
        self.handlers.push(SwitchHandler {
            matcher: SwitchMatcher::Tag(tag),
            activation,
            hold_secs: None,
            callback,
        });
    }
}

/// Type-erased interface the queue and controller drive modes through.
/// Implemented once, by [`ModeHost`].
pub trait QueuedMode: Send {
    fn priority(&self) -> i32;
    fn default_lifecycle(&self) -> Lifecycle;
    /// Short type name, for log lines.
    fn label(&self) -> &'static str;
    fn started(&mut self, id: ModeId, ctx: &mut GameCtx<'_>);
    fn stopped(&mut self, ctx: &mut GameCtx<'_>);
    fn dispatch_switch(&mut self, ctx: &mut GameCtx<'_>, switch: &Switch) -> SwitchResult;
    fn service_delays(&mut self, ctx: &mut GameCtx<'_>, now: Instant);
    fn tick(&mut self, ctx: &mut GameCtx<'_>, dt: f64);
    fn game_started(&mut self, ctx: &mut GameCtx<'_>);
    fn ball_starting(&mut self, ctx: &mut GameCtx<'_>);
    fn ball_ended(&mut self, ctx: &mut GameCtx<'_>);
    fn game_ended(&mut self, ctx: &mut GameCtx<'_>);
    fn ball_drained(&mut self, ctx: &mut GameCtx<'_>) -> DrainResult;
    /// The wrapped mode value, for typed access from outside a dispatch.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl fmt::Debug for dyn QueuedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(priority {})", self.label(), self.priority())
    }
}

/// Pairs a mode value with its handler table and pending delays. This is the
/// concrete object the queue owns.
pub struct ModeHost<M: Mode> {
    mode: M,
    handlers: Vec<SwitchHandler<M>>,
    delays: DelayList<M>,
    id: ModeId,
}

impl<M: Mode> ModeHost<M> {
    pub fn boxed(mode: M) -> Box<dyn QueuedMode> {
        Box::new(Self {
            mode,
            handlers: Vec::new(),
            delays: DelayList::new(),
            id: ModeId(0),
        })
    }
}

impl<M: Mode> QueuedMode for ModeHost<M> {
    fn priority(&self) -> i32 {
        self.mode.priority()
    }

    fn default_lifecycle(&self) -> Lifecycle {
        self.mode.default_lifecycle()
    }

    fn label(&self) -> &'static str {
        let full = std::any::type_name::<M>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn started(&mut self, id: ModeId, ctx: &mut GameCtx<'_>) {
        self.id = id;
        self.handlers.clear();
        self.delays.clear();
        let scope = ModeScope {
            game: ctx,
            delays: &mut self.delays,
            mode_id: id,
        };
        let mut api = ModeApi {
            scope,
            handlers: &mut self.handlers,
        };
        self.mode.mode_started(&mut api);
    }

    fn stopped(&mut self, ctx: &mut GameCtx<'_>) {
        self.delays.clear();
        self.mode.mode_stopped(ctx);
    }

    fn dispatch_switch(&mut self, ctx: &mut GameCtx<'_>, switch: &Switch) -> SwitchResult {
        self.delays.cancel_matching(switch);

        let mut result = SwitchResult::Continue;
        let mut scope = ModeScope {
            game: ctx,
            delays: &mut self.delays,
            mode_id: self.id,
        };
        for handler in self.handlers.iter() {
            if !handler.matcher.matches(switch) || !switch.matches(handler.activation) {
                continue;
            }
            match handler.hold_secs {
                Some(secs) => {
                    let name = hold_delay_name(switch.name(), handler.activation, secs);
                    let callback = handler.callback;
                    let snapshot = switch.clone();
                    scope.schedule_with_cancel(
                        &name,
                        secs,
                        Some((switch.name().to_string(), handler.activation.opposite())),
                        move |mode: &mut M, scope: &mut ModeScope<'_, '_, M>| {
                            callback(mode, scope, &snapshot);
                        },
                    );
                },
                None => {
                    if (handler.callback)(&mut self.mode, &mut scope, switch) == SwitchResult::Stop
                    {
                        result = SwitchResult::Stop;
                    }
                },
            }
        }
        if self.mode.handle_switch(&mut scope, switch) == SwitchResult::Stop {
            result = SwitchResult::Stop;
        }
        result
    }

    fn service_delays(&mut self, ctx: &mut GameCtx<'_>, now: Instant) {
        if self.delays.is_empty() {
            return;
        }
        for entry in self.delays.take_due(now) {
            tracing::trace!("delay `{}` firing in {}", entry.name, self.label());
            let mut scope = ModeScope {
                game: ctx,
                delays: &mut self.delays,
                mode_id: self.id,
            };
            (entry.callback)(&mut self.mode, &mut scope);
        }
    }

    fn tick(&mut self, ctx: &mut GameCtx<'_>, dt: f64) {
        let mut scope = ModeScope {
            game: ctx,
            delays: &mut self.delays,
            mode_id: self.id,
        };
        self.mode.tick(&mut scope, dt);
    }

    fn game_started(&mut self, ctx: &mut GameCtx<'_>) {
        let mut scope = ModeScope {
            game: ctx,
            delays: &mut self.delays,
            mode_id: self.id,
        };
        self.mode.game_started(&mut scope);
    }

    fn ball_starting(&mut self, ctx: &mut GameCtx<'_>) {
        let mut scope = ModeScope {
            game: ctx,
            delays: &mut self.delays,
            mode_id: self.id,
        };
        self.mode.ball_starting(&mut scope);
    }

    fn ball_ended(&mut self, ctx: &mut GameCtx<'_>) {
        let mut scope = ModeScope {
            game: ctx,
            delays: &mut self.delays,
            mode_id: self.id,
        };
        self.mode.ball_ended(&mut scope);
    }

    fn game_ended(&mut self, ctx: &mut GameCtx<'_>) {
        let mut scope = ModeScope {
            game: ctx,
            delays: &mut self.delays,
            mode_id: self.id,
        };
        self.mode.game_ended(&mut scope);
    }

    fn ball_drained(&mut self, ctx: &mut GameCtx<'_>) -> DrainResult {
        let mut scope = ModeScope {
            game: ctx,
            delays: &mut self.delays,
            mode_id: self.id,
        };
        self.mode.ball_drained(&mut scope)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.mode
    }
}
