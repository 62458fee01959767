//! Client-side smoothing of remote entity poses.
//!
//! Remote poses arrive at the sender's tick rate (20 Hz for avatars, 10 Hz
//! for agents). Each received pose becomes a target; the rendered pose eases
//! from wherever it currently is to that target over exactly one sender tick:
//!
//! ```text
//! rendered = lerp(previous, target, smoothstep(clamp(elapsed / tick_duration, 0, 1)))
//! ```
//!
//! # Phases
//!
//! - `Idle`: tracked, no target received yet; renders the spawn pose.
//! - `Interpolating`: a target is pending and the curve is running.
//! - `Settled`: the curve finished; renders the last target until the next
//!   pose arrives, which starts a new curve from the current rendered pose.
//!
//! The local avatar is never tracked; it renders from local state.

use std::collections::HashMap;

use crate::identity::NetworkId;
use crate::math::{smoothstep, Pose};

/// Clock drift tolerated when deciding a curve has reached its end.
const COMPLETION_EPSILON: f64 = 1e-9;

/// Where an interpolation state is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpolationPhase {
    /// No target received yet.
    Idle,
    /// Easing toward a target.
    Interpolating,
    /// Holding at the last target.
    Settled,
}

/// Per-entity interpolation state.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationState {
    previous: Pose,
    target: Pose,
    tick_start: f64,
    tick_duration: f32,
    has_target: bool,
    received_any: bool,
}

impl InterpolationState {
    /// Start tracking at a known pose.
    #[must_use]
    pub fn new(initial: Pose) -> Self {
        Self {
            previous: initial,
            target: initial,
            tick_start: 0.0,
            tick_duration: 0.0,
            has_target: false,
            received_any: false,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> InterpolationPhase {
        match (self.received_any, self.has_target) {
            (false, _) => InterpolationPhase::Idle,
            (true, true) => InterpolationPhase::Interpolating,
            (true, false) => InterpolationPhase::Settled,
        }
    }

    /// Pose the curve started from.
    #[must_use]
    pub fn previous(&self) -> Pose {
        self.previous
    }

    /// Pose the curve is heading to (or holding at).
    #[must_use]
    pub fn target(&self) -> Pose {
        self.target
    }

    /// Whether a target is still pending.
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.has_target
    }

    /// Normalized progress in `[0, 1]` at `now`.
    #[must_use]
    pub fn progress(&self, now: f64) -> f32 {
        if !self.has_target || self.tick_duration <= 0.0 {
            return 1.0;
        }
        let duration = f64::from(self.tick_duration);
        let elapsed = now - self.tick_start;
        if elapsed + COMPLETION_EPSILON >= duration {
            return 1.0;
        }
        (elapsed / duration).clamp(0.0, 1.0) as f32
    }

    /// Rendered pose at `now` without changing phase.
    #[must_use]
    pub fn sample(&self, now: f64) -> Pose {
        if !self.has_target {
            return self.target;
        }
        let progress = self.progress(now);
        if progress >= 1.0 {
            return self.target;
        }
        self.previous.interpolate(self.target, smoothstep(progress))
    }

    /// Accept a new target; the current rendered pose becomes `previous`.
    pub fn push_target(&mut self, pose: Pose, now: f64, tick_duration: f32) {
        self.previous = self.sample(now);
        self.target = pose;
        self.tick_start = now;
        self.tick_duration = tick_duration;
        self.has_target = true;
        self.received_any = true;
    }

    /// Sample at `now` and settle once the curve is complete.
    pub fn advance(&mut self, now: f64) -> Pose {
        let pose = self.sample(now);
        if self.has_target && self.progress(now) >= 1.0 {
            self.has_target = false;
            self.previous = self.target;
        }
        pose
    }
}

/// Interpolation states for every remote entity.
#[derive(Debug, Default)]
pub struct InterpolationEngine {
    states: HashMap<NetworkId, InterpolationState>,
}

impl InterpolationEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a remote entity at its spawn pose.
    pub fn track(&mut self, id: NetworkId, initial: Pose) {
        self.states
            .entry(id)
            .or_insert_with(|| InterpolationState::new(initial));
    }

    /// Stop tracking an entity and drop any pending target.
    pub fn forget(&mut self, id: NetworkId) -> bool {
        self.states.remove(&id).is_some()
    }

    /// Feed a received pose. Untracked entities start settled at the pose.
    pub fn push(&mut self, id: NetworkId, pose: Pose, now: f64, tick_duration: f32) {
        match self.states.get_mut(&id) {
            Some(state) => state.push_target(pose, now, tick_duration),
            None => {
                let mut state = InterpolationState::new(pose);
                state.push_target(pose, now, tick_duration);
                self.states.insert(id, state);
            }
        }
    }

    /// Rendered pose of one entity.
    #[must_use]
    pub fn sample(&self, id: NetworkId, now: f64) -> Option<Pose> {
        self.states.get(&id).map(|state| state.sample(now))
    }

    /// State of one entity.
    #[must_use]
    pub fn state(&self, id: NetworkId) -> Option<&InterpolationState> {
        self.states.get(&id)
    }

    /// Phase of one entity.
    #[must_use]
    pub fn phase(&self, id: NetworkId) -> Option<InterpolationPhase> {
        self.states.get(&id).map(InterpolationState::phase)
    }

    /// Advance every state and return rendered poses in id order.
    pub fn advance(&mut self, now: f64) -> Vec<(NetworkId, Pose)> {
        let mut poses: Vec<_> = self
            .states
            .iter_mut()
            .filter(|(_, state)| state.phase() != InterpolationPhase::Idle)
            .map(|(&id, state)| (id, state.advance(now)))
            .collect();
        poses.sort_unstable_by_key(|(id, _)| *id);
        poses
    }

    /// Whether an entity is tracked.
    #[must_use]
    pub fn is_tracked(&self, id: NetworkId) -> bool {
        self.states.contains_key(&id)
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;

    const TICK: f32 = 0.1;

    #[test]
    fn test_idle_holds_initial_pose() {
        let state = InterpolationState::new(Pose::at(100.0, 100.0));
        assert_eq!(state.phase(), InterpolationPhase::Idle);
        assert_eq!(state.sample(5.0), Pose::at(100.0, 100.0));
    }

    #[test]
    fn test_curve_endpoints() {
        let mut state = InterpolationState::new(Pose::at(100.0, 100.0));
        state.push_target(Pose::at(105.0, 100.0), 1.0, TICK);
        assert_eq!(state.phase(), InterpolationPhase::Interpolating);
        assert_eq!(state.sample(1.0), Pose::at(100.0, 100.0));
        assert_eq!(state.sample(1.0 + f64::from(TICK)), Pose::at(105.0, 100.0));
        let mid = state.sample(1.0 + f64::from(TICK) / 2.0);
        assert!((mid.position.x - 102.5).abs() < 1e-3);
    }

    #[test]
    fn test_settles_and_holds() {
        let mut state = InterpolationState::new(Pose::at(0.0, 0.0));
        state.push_target(Pose::at(10.0, 0.0), 0.0, TICK);
        state.advance(0.05);
        assert_eq!(state.phase(), InterpolationPhase::Interpolating);
        let settled = state.advance(0.2);
        assert_eq!(settled, Pose::at(10.0, 0.0));
        assert_eq!(state.phase(), InterpolationPhase::Settled);
        assert!(!state.has_target());
        assert_eq!(state.sample(50.0), Pose::at(10.0, 0.0));
    }

    #[test]
    fn test_new_target_starts_from_rendered_pose() {
        let mut state = InterpolationState::new(Pose::at(0.0, 0.0));
        state.push_target(Pose::at(10.0, 0.0), 0.0, TICK);
        let halfway = state.sample(0.05);
        state.push_target(Pose::at(20.0, 0.0), 0.05, TICK);
        assert_eq!(state.previous(), halfway);
        assert_eq!(state.sample(0.05), halfway);
    }

    #[test]
    fn test_zero_duration_snaps() {
        let mut state = InterpolationState::new(Pose::at(0.0, 0.0));
        state.push_target(Pose::at(3.0, 4.0), 0.0, 0.0);
        assert_eq!(state.sample(0.0), Pose::at(3.0, 4.0));
    }

    #[test]
    fn test_rotation_interpolates() {
        let mut state = InterpolationState::new(Pose::new(Vec2::ZERO, 0.0));
        state.push_target(Pose::new(Vec2::ZERO, 1.0), 0.0, TICK);
        let mid = state.sample(0.05);
        assert!((mid.rotation - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_engine_track_push_forget() {
        let mut engine = InterpolationEngine::new();
        let id = NetworkId(1001);
        engine.track(id, Pose::at(100.0, 100.0));
        assert_eq!(engine.phase(id), Some(InterpolationPhase::Idle));
        assert!(engine.advance(0.0).is_empty());

        engine.push(id, Pose::at(105.0, 100.0), 0.0, TICK);
        let poses = engine.advance(0.1);
        assert_eq!(poses, vec![(id, Pose::at(105.0, 100.0))]);
        assert_eq!(engine.phase(id), Some(InterpolationPhase::Settled));

        assert!(engine.forget(id));
        assert!(engine.sample(id, 0.2).is_none());
    }

    #[test]
    fn test_engine_push_untracked_starts_at_pose() {
        let mut engine = InterpolationEngine::new();
        engine.push(NetworkId(2), Pose::at(7.0, 7.0), 0.0, TICK);
        assert_eq!(engine.sample(NetworkId(2), 0.0), Some(Pose::at(7.0, 7.0)));
    }
}
