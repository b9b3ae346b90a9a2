use std::time::Instant;

use crate::devices::Switch;
use crate::error::ModeError;
use crate::game::GameCtx;
use crate::mode::{DrainResult, Mode, ModeId, QueuedMode, SwitchResult};

struct QueueEntry {
    id: ModeId,
    priority: i32,
    parent: Option<ModeId>,
    mode: Box<dyn QueuedMode>,
}

/// The ordered collection of active modes, sorted by descending priority
/// with insertion order breaking ties. Every dispatch walks a snapshot of
/// ids, so membership changes requested mid-pass (which the controller
/// defers) never invalidate an in-flight iteration.
pub struct ModeQueue {
    entries: Vec<QueueEntry>,
}

impl Default for ModeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ModeId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Priorities in queue order, highest first.
    pub fn priorities(&self) -> Vec<i32> {
        self.entries.iter().map(|e| e.priority).collect()
    }

    /// Mode labels in queue order, for diagnostics.
    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.mode.label()).collect()
    }

    /// Typed access to a queued mode's state, for use outside a dispatch.
    pub fn mode_mut<M: Mode>(&mut self, id: ModeId) -> Option<&mut M> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .and_then(|e| e.mode.as_any_mut().downcast_mut::<M>())
    }

    /// Append a mode, re-sort, and invoke `mode_started`. A mode id may
    /// appear at most once; a duplicate add is an error.
    pub(crate) fn insert(
        &mut self,
        id: ModeId,
        parent: Option<ModeId>,
        mode: Box<dyn QueuedMode>,
        ctx: &mut GameCtx<'_>,
    ) -> Result<(), ModeError> {
        if self.contains(id) {
            return Err(ModeError::AlreadyQueued(id));
        }
        let priority = mode.priority();
        tracing::debug!("mode {} added (priority {priority})", mode.label());
        self.entries.push(QueueEntry {
            id,
            priority,
            parent,
            mode,
        });
        // Stable sort: equal priorities stay in insertion order.
        self.entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .expect("just inserted");
        entry.mode.started(id, ctx);
        Ok(())
    }

    /// Remove a mode, invoke `mode_stopped` (after removal), and cascade to
    /// any child modes it owns. Removing a non-member is a silent no-op.
    pub(crate) fn remove(
        &mut self,
        id: ModeId,
        ctx: &mut GameCtx<'_>,
    ) -> Option<Box<dyn QueuedMode>> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        let mut entry = self.entries.remove(pos);
        tracing::debug!("mode {} removed", entry.mode.label());
        entry.mode.stopped(ctx);
        let children: Vec<ModeId> = self
            .entries
            .iter()
            .filter(|e| e.parent == Some(id))
            .map(|e| e.id)
            .collect();
        for child in children {
            self.remove(child, ctx);
        }
        Some(entry.mode)
    }

    /// Offer a switch event to each mode in priority order. A `Stop` from
    /// any mode suppresses the event for everything below it.
    pub(crate) fn dispatch_switch(&mut self, ctx: &mut GameCtx<'_>, switch: &Switch) {
        for id in self.snapshot() {
            let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
                continue;
            };
            if entry.mode.dispatch_switch(ctx, switch) == SwitchResult::Stop {
                tracing::trace!(
                    "`{}` event consumed by {}",
                    switch.name(),
                    entry.mode.label()
                );
                break;
            }
        }
    }

    /// Fire due delays, mode by mode in priority order.
    pub(crate) fn service_delays(&mut self, ctx: &mut GameCtx<'_>, now: Instant) {
        for id in self.snapshot() {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                entry.mode.service_delays(ctx, now);
            }
        }
    }

    pub(crate) fn tick(&mut self, ctx: &mut GameCtx<'_>, dt: f64) {
        for id in self.snapshot() {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                entry.mode.tick(ctx, dt);
            }
        }
    }

    pub(crate) fn game_started(&mut self, ctx: &mut GameCtx<'_>) {
        for id in self.snapshot() {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                entry.mode.game_started(ctx);
            }
        }
    }

    pub(crate) fn ball_starting(&mut self, ctx: &mut GameCtx<'_>) {
        for id in self.snapshot() {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                entry.mode.ball_starting(ctx);
            }
        }
    }

    pub(crate) fn ball_ended(&mut self, ctx: &mut GameCtx<'_>) {
        for id in self.snapshot() {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                entry.mode.ball_ended(ctx);
            }
        }
    }

    pub(crate) fn game_ended(&mut self, ctx: &mut GameCtx<'_>) {
        for id in self.snapshot() {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                entry.mode.game_ended(ctx);
            }
        }
    }

    /// Broadcast the drain notification. True if any mode claimed it.
    pub(crate) fn ball_drained(&mut self, ctx: &mut GameCtx<'_>) -> bool {
        let mut handled = false;
        for id in self.snapshot() {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id)
                && entry.mode.ball_drained(ctx) == DrainResult::Handled
            {
                handled = true;
            }
        }
        handled
    }

    fn snapshot(&self) -> Vec<ModeId> {
        self.entries.iter().map(|e| e.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;

    use crate::devices::Switch;
    use crate::error::ModeError;
    use crate::mode::{Lifecycle, Mode, ModeApi, ModeScope, SwitchResult};
    use crate::test_helpers::TestRig;

    struct NullMode {
        priority: i32,
    }

    impl Mode for NullMode {
        fn priority(&self) -> i32 {
            self.priority
        }
    }

    /// Appends a tag to a shared log on every lifecycle event and every
    /// `target_a` activation, so tests can observe ordering.
    struct Probe {
        priority: i32,
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        stop: bool,
    }

    impl Probe {
        fn new(priority: i32, tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                priority,
                tag,
                log: Arc::clone(log),
                stop: false,
            }
        }

        fn push(&self, what: &str) {
            self.log.lock().unwrap().push(format!("{}:{what}", self.tag));
        }

        fn on_target(
            &mut self,
            _scope: &mut ModeScope<'_, '_, Self>,
            _switch: &Switch,
        ) -> SwitchResult {
            self.push("hit");
            if self.stop {
                SwitchResult::Stop
            } else {
                SwitchResult::Continue
            }
        }
    }

    impl Mode for Probe {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn mode_started(&mut self, api: &mut ModeApi<'_, '_, Self>) {
            self.push("started");
            api.on_active("target_a", Self::on_target);
        }

        fn mode_stopped(&mut self, _game: &mut crate::game::GameCtx<'_>) {
            self.push("stopped");
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn modes_sorted_by_descending_priority() {
        let mut rig = TestRig::new();
        for priority in [10, 50, 30] {
            let id = rig.game.register(NullMode { priority }, Some(Lifecycle::Manual));
            rig.game.add_mode(id).unwrap();
        }
        assert_eq!(rig.game.queue().priorities(), vec![50, 30, 10]);
    }

    #[test]
    fn equal_priorities_dispatch_in_insertion_order() {
        let mut rig = TestRig::new();
        let log = log();
        for tag in ["first", "second", "third"] {
            let id = rig
                .game
                .register(Probe::new(20, tag, &log), Some(Lifecycle::Manual));
            rig.game.add_mode(id).unwrap();
        }
        log.lock().unwrap().clear();
        rig.activate("target_a");
        assert_eq!(entries(&log), ["first:hit", "second:hit", "third:hit"]);
    }

    #[test]
    fn duplicate_add_is_an_error() {
        let mut rig = TestRig::new();
        let id = rig
            .game
            .register(NullMode { priority: 1 }, Some(Lifecycle::Manual));
        rig.game.add_mode(id).unwrap();
        assert_eq!(rig.game.add_mode(id), Err(ModeError::AlreadyQueued(id)));
        assert_eq!(rig.game.queue().len(), 1);
    }

    #[test]
    fn remove_of_nonmember_is_a_silent_noop() {
        let mut rig = TestRig::new();
        let id = rig
            .game
            .register(NullMode { priority: 1 }, Some(Lifecycle::Manual));
        // Never added.
        rig.game.remove_mode(id);
        assert!(rig.game.queue().is_empty());
    }

    #[test]
    fn started_and_stopped_fire_once_per_queue_entry() {
        let mut rig = TestRig::new();
        let log = log();
        let id = rig
            .game
            .register(Probe::new(5, "probe", &log), Some(Lifecycle::Manual));
        rig.game.add_mode(id).unwrap();
        rig.game.remove_mode(id);
        rig.game.add_mode(id).unwrap();
        rig.game.remove_mode(id);
        assert_eq!(
            entries(&log),
            ["probe:started", "probe:stopped", "probe:started", "probe:stopped"]
        );
    }

    #[test]
    fn stop_suppresses_lower_priority_modes() {
        let mut rig = TestRig::new();
        let log = log();
        let mut stopper = Probe::new(100, "high", &log);
        stopper.stop = true;
        for mode in [stopper, Probe::new(1, "low", &log)] {
            let id = rig.game.register(mode, Some(Lifecycle::Manual));
            rig.game.add_mode(id).unwrap();
        }
        log.lock().unwrap().clear();
        rig.activate("target_a");
        assert_eq!(entries(&log), ["high:hit"]);
    }

    proptest! {
        #[test]
        fn adjacent_priorities_never_ascend(priorities in proptest::collection::vec(-100i32..100, 0..12)) {
            let mut rig = TestRig::new();
            for priority in priorities {
                let id = rig.game.register(NullMode { priority }, Some(Lifecycle::Manual));
                rig.game.add_mode(id).unwrap();
            }
            let ordered = rig.game.queue().priorities();
            for pair in ordered.windows(2) {
                prop_assert!(pair[0] >= pair[1]);
            }
        }
    }
}
