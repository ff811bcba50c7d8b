//! Mixer: clip playback slots, fades and the per-frame joint write.
//!
//! Methods:
//! - create_action, swap_clip, play / play_from_start, fade_out, stop, retire, remove
//! - update (advance time + fades → accumulate → write skeleton)
//!
//! Both the blend scheduler and the gesture queue drive clips through one mixer, so
//! overlapping fades between idle and gesture clips blend on the same joints.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::accumulate::RotationAccumulator;
use crate::clip::ClipData;
use crate::sampling::sample_rotation;
use crate::skeleton::{JointBindings, JointHandle, Skeleton};

/// Playback slot inside a [`Mixer`]. Ids are dense per mixer and never reused
/// until the counter wraps.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ActionId(pub u32);

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LoopMode {
    Once,
    Loop,
}

/// Discrete signals emitted by [`Mixer::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MixerEvent {
    /// A `Once` action reached its last frame.
    Finished { action: ActionId },
    /// A fade-out completed and the action stopped.
    FadedOut { action: ActionId },
}

#[derive(Clone, Copy, Debug)]
struct Fade {
    from: f32,
    to: f32,
    duration: f32,
    elapsed: f32,
}

/// One playback slot.
#[derive(Debug)]
pub struct ClipAction {
    pub id: ActionId,
    clip: Arc<ClipData>,
    pub time: f32,
    pub loop_mode: LoopMode,
    pub weight: f32,
    /// Freeze on the last frame instead of stopping when a `Once` clip ends.
    pub clamp_when_finished: bool,
    fade: Option<Fade>,
    fade_factor: f32,
    running: bool,
    paused: bool,
    finished: bool,
    discard_when_stopped: bool,
}

impl ClipAction {
    pub fn clip(&self) -> &Arc<ClipData> {
        &self.clip
    }

    pub fn effective_weight(&self) -> f32 {
        if self.running {
            self.weight * self.fade_factor
        } else {
            0.0
        }
    }

    fn restart(&mut self) {
        self.time = 0.0;
        self.finished = false;
        self.paused = false;
    }

    fn start_fade(&mut self, to: f32, duration: f32) {
        if duration <= 0.0 {
            self.fade = None;
            self.fade_factor = to;
        } else {
            self.fade = Some(Fade {
                from: self.fade_factor,
                to,
                duration,
                elapsed: 0.0,
            });
        }
    }
}

fn fmod(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        return 0.0;
    }
    let m = a % b;
    if (m < 0.0 && b > 0.0) || (m > 0.0 && b < 0.0) {
        m + b
    } else {
        m
    }
}

#[derive(Default, Debug)]
pub struct Mixer {
    next_id: u32,
    actions: Vec<ClipAction>,
    bindings: JointBindings,
    /// Rotation each touched joint returns to when no action drives it.
    rest: HashMap<JointHandle, [f32; 4]>,
    accum: RotationAccumulator,
    events: Vec<MixerEvent>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stopped action for `clip`.
    pub fn create_action(&mut self, clip: Arc<ClipData>, loop_mode: LoopMode, weight: f32) -> ActionId {
        let id = ActionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.actions.push(ClipAction {
            id,
            clip,
            time: 0.0,
            loop_mode,
            weight: weight.clamp(0.0, 1.0),
            clamp_when_finished: false,
            fade: None,
            fade_factor: 0.0,
            running: false,
            paused: false,
            finished: false,
            discard_when_stopped: false,
        });
        id
    }

    pub fn action(&self, id: ActionId) -> Option<&ClipAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn action_mut(&mut self, id: ActionId) -> Option<&mut ClipAction> {
        self.actions.iter_mut().find(|a| a.id == id)
    }

    /// Swap the underlying clip; the action is stopped and rewound.
    pub fn swap_clip(&mut self, id: ActionId, clip: Arc<ClipData>) {
        if let Some(a) = self.action_mut(id) {
            a.clip = clip;
            a.running = false;
            a.fade = None;
            a.fade_factor = 0.0;
            a.restart();
        }
    }

    /// Start (or keep) playing with a fade-in. A running action keeps its time;
    /// a stopped one restarts from the beginning.
    pub fn play(&mut self, id: ActionId, fade_in: f32) {
        if let Some(a) = self.action_mut(id) {
            if !a.running {
                a.restart();
                a.fade_factor = 0.0;
                a.running = true;
            }
            a.discard_when_stopped = false;
            a.start_fade(1.0, fade_in);
        }
    }

    /// Rewind and play, even if already running.
    pub fn play_from_start(&mut self, id: ActionId, fade_in: f32) {
        if let Some(a) = self.action_mut(id) {
            a.restart();
            a.running = true;
            a.discard_when_stopped = false;
            if fade_in <= 0.0 {
                a.fade = None;
                a.fade_factor = 1.0;
            } else {
                a.fade_factor = 0.0;
                a.start_fade(1.0, fade_in);
            }
        }
    }

    /// Fade a running action to zero; it stops when the fade completes.
    pub fn fade_out(&mut self, id: ActionId, duration: f32) {
        let mut stopped_now = false;
        if let Some(a) = self.action_mut(id) {
            if !a.running {
                return;
            }
            a.start_fade(0.0, duration);
            if a.fade.is_none() {
                a.running = false;
                stopped_now = a.discard_when_stopped;
            }
        }
        if stopped_now {
            self.remove(id);
        }
    }

    /// Stop immediately (no fade).
    pub fn stop(&mut self, id: ActionId) {
        if let Some(a) = self.action_mut(id) {
            a.running = false;
            a.fade = None;
            a.fade_factor = 0.0;
            a.paused = false;
        }
    }

    /// Fade out, then discard the action. `fade <= 0` discards immediately.
    pub fn retire(&mut self, id: ActionId, fade: f32) {
        let running = self.action(id).is_some_and(|a| a.running);
        if !running || fade <= 0.0 {
            self.remove(id);
            return;
        }
        if let Some(a) = self.action_mut(id) {
            a.discard_when_stopped = true;
            a.paused = a.finished && a.clamp_when_finished;
            a.start_fade(0.0, fade);
        }
    }

    pub fn remove(&mut self, id: ActionId) {
        self.actions.retain(|a| a.id != id);
    }

    pub fn is_running(&self, id: ActionId) -> bool {
        self.action(id).is_some_and(|a| a.running)
    }

    pub fn time(&self, id: ActionId) -> Option<f32> {
        self.action(id).map(|a| a.time)
    }

    pub fn effective_weight(&self, id: ActionId) -> f32 {
        self.action(id).map(|a| a.effective_weight()).unwrap_or(0.0)
    }

    pub fn set_weight(&mut self, id: ActionId, weight: f32) {
        if let Some(a) = self.action_mut(id) {
            a.weight = weight.clamp(0.0, 1.0);
        }
    }

    pub fn set_clamp_when_finished(&mut self, id: ActionId, clamp: bool) {
        if let Some(a) = self.action_mut(id) {
            a.clamp_when_finished = clamp;
        }
    }

    pub fn running_count(&self) -> usize {
        self.actions.iter().filter(|a| a.running).count()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn stop_all(&mut self) {
        for a in &mut self.actions {
            a.running = false;
            a.fade = None;
            a.fade_factor = 0.0;
        }
    }

    /// Drop every action and binding (teardown).
    pub fn clear(&mut self) {
        self.actions.clear();
        self.bindings.clear();
        self.rest.clear();
        self.accum.clear();
        self.events.clear();
    }

    /// Forget captured rest rotations and bindings; the next update re-captures
    /// them from the skeleton's current pose.
    pub fn recapture_rest(&mut self) {
        self.rest.clear();
        self.bindings.clear();
    }

    /// Advance every running action by `dt` seconds and write blended local
    /// rotations to the skeleton. Returns the events raised during this step.
    pub fn update(&mut self, dt: f32, skeleton: &mut dyn Skeleton) -> &[MixerEvent] {
        self.events.clear();
        self.advance(dt);

        // Accumulate contributions of every running action.
        self.accum.clear();
        for a in &self.actions {
            let w = a.effective_weight();
            if w <= 0.0 {
                continue;
            }
            for track in &a.clip.tracks {
                if track.keys.is_empty() {
                    continue;
                }
                let Some(handle) = self.bindings.resolve(&*skeleton, &track.joint) else {
                    continue;
                };
                self.rest
                    .entry(handle)
                    .or_insert_with(|| skeleton.local_rotation(handle));
                self.accum.add(handle, sample_rotation(track, a.time), w);
            }
        }

        // Write touched joints; untouched ones fall back to rest.
        for (handle, rest) in self.rest.iter() {
            let q = self.accum.resolve(*handle, *rest).unwrap_or(*rest);
            skeleton.set_local_rotation(*handle, q);
        }

        let stopped: Vec<ActionId> = self
            .actions
            .iter()
            .filter(|a| !a.running && a.discard_when_stopped)
            .map(|a| a.id)
            .collect();
        for id in stopped {
            self.remove(id);
        }

        &self.events
    }

    fn advance(&mut self, dt: f32) {
        for a in &mut self.actions {
            if !a.running {
                continue;
            }
            if let Some(mut fade) = a.fade {
                fade.elapsed += dt;
                let k = (fade.elapsed / fade.duration).min(1.0);
                a.fade_factor = fade.from + (fade.to - fade.from) * k;
                if k >= 1.0 {
                    a.fade = None;
                    if fade.to <= 0.0 {
                        a.running = false;
                        self.events.push(MixerEvent::FadedOut { action: a.id });
                        continue;
                    }
                } else {
                    a.fade = Some(fade);
                }
            }
            if a.paused {
                continue;
            }
            let duration = a.clip.duration_s;
            a.time += dt;
            match a.loop_mode {
                LoopMode::Loop => a.time = fmod(a.time, duration),
                LoopMode::Once => {
                    if a.time >= duration {
                        a.time = duration;
                        if !a.finished {
                            a.finished = true;
                            self.events.push(MixerEvent::Finished { action: a.id });
                        }
                        if a.clamp_when_finished {
                            a.paused = true;
                        } else {
                            a.running = false;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{JointTrack, RotationKey};

    fn clip(duration: f32) -> Arc<ClipData> {
        Arc::new(ClipData {
            name: "c".into(),
            duration_s: duration,
            tracks: vec![JointTrack {
                joint: "head".into(),
                keys: vec![RotationKey {
                    time: 0.0,
                    rotation: [0.0, 0.0, 0.0, 1.0],
                }],
            }],
            expressions: None,
        })
    }

    #[test]
    fn action_ids_are_not_reused_after_removal() {
        let mut m = Mixer::new();
        let a = m.create_action(clip(1.0), LoopMode::Once, 1.0);
        m.remove(a);
        let b = m.create_action(clip(1.0), LoopMode::Once, 1.0);
        assert_eq!(a, ActionId(0));
        assert_eq!(b, ActionId(1));
        assert!(m.action(a).is_none());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn loop_wraps_time() {
        let mut m = Mixer::new();
        let id = m.create_action(clip(1.0), LoopMode::Loop, 1.0);
        m.play(id, 0.0);
        m.advance(2.5);
        assert!((m.time(id).unwrap() - 0.5).abs() < 1e-5);
        assert!(m.is_running(id));
    }

    #[test]
    fn once_finishes_and_clamps() {
        let mut m = Mixer::new();
        let a = m.create_action(clip(1.0), LoopMode::Once, 1.0);
        let b = m.create_action(clip(1.0), LoopMode::Once, 1.0);
        m.set_clamp_when_finished(b, true);
        m.play(a, 0.0);
        m.play(b, 0.0);
        m.advance(1.5);
        assert_eq!(
            m.events,
            vec![
                MixerEvent::Finished { action: a },
                MixerEvent::Finished { action: b }
            ]
        );
        assert!(!m.is_running(a));
        assert!(m.is_running(b));
        assert_eq!(m.time(b), Some(1.0));
        m.events.clear();
        m.advance(10.0);
        assert!(m.events.is_empty(), "finished fires once");
        assert_eq!(m.time(b), Some(1.0));
    }

    #[test]
    fn fade_in_then_out() {
        let mut m = Mixer::new();
        let id = m.create_action(clip(2.0), LoopMode::Loop, 0.8);
        m.play(id, 0.5);
        m.advance(0.25);
        assert!((m.effective_weight(id) - 0.4).abs() < 1e-5);
        m.advance(0.5);
        assert!((m.effective_weight(id) - 0.8).abs() < 1e-5);
        m.fade_out(id, 0.5);
        m.advance(0.5);
        assert_eq!(m.events, vec![MixerEvent::FadedOut { action: id }]);
        assert!(!m.is_running(id));
        assert_eq!(m.effective_weight(id), 0.0);
    }

    #[test]
    fn replay_during_fade_out_keeps_time() {
        let mut m = Mixer::new();
        let id = m.create_action(clip(10.0), LoopMode::Loop, 1.0);
        m.play(id, 0.0);
        m.advance(1.0);
        m.fade_out(id, 1.0);
        m.advance(0.5);
        m.play(id, 1.0);
        assert!((m.time(id).unwrap() - 1.5).abs() < 1e-5);
        assert!((m.effective_weight(id) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn retire_discards_after_fade() {
        let mut m = Mixer::new();
        let id = m.create_action(clip(1.0), LoopMode::Loop, 1.0);
        m.play(id, 0.0);
        m.retire(id, 0.2);
        m.advance(0.3);
        assert!(!m.is_running(id));
        // Removed on the next full update pass.
        let stopped: Vec<_> = m
            .actions
            .iter()
            .filter(|a| !a.running && a.discard_when_stopped)
            .collect();
        assert_eq!(stopped.len(), 1);
    }
}
