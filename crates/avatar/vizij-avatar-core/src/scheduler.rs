//! AnimationBlendScheduler: named continuous clips gated by suspension priority.
//!
//! Every change of the suspension floor or of a clip's enabled flag re-evaluates
//! all handles: continuous clips fade in/out, trigger clips (e.g. a periodic blink)
//! are cut immediately when suspended. Trigger clips fire from [`tick`] on their
//! own cooldown, independent of the viseme blink signal.
//!
//! [`tick`]: AnimationBlendScheduler::tick

use std::sync::Arc;

use indexmap::IndexMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::clip::ClipData;
use crate::config::BlendConfig;
use crate::error::AvatarError;
use crate::mixer::{ActionId, LoopMode, Mixer, MixerEvent};
use crate::skeleton::Skeleton;
use crate::suspension::{SuspensionSet, SuspensionToken};

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClipMode {
    /// Plays whenever enabled and not suspended.
    Continuous,
    /// Fires once per cooldown interval (e.g. idle blink).
    Trigger,
}

/// Registration request for [`AnimationBlendScheduler::register_or_replace`].
#[derive(Clone, Debug)]
pub struct ContinuousClip {
    pub name: String,
    pub clip: Option<Arc<ClipData>>,
    pub priority: i32,
    pub weight: f32,
    pub loop_mode: LoopMode,
    pub enabled: bool,
    pub fade_in_sec: Option<f32>,
    pub fade_out_sec: Option<f32>,
    pub mode: ClipMode,
}

impl ContinuousClip {
    /// Looping, enabled, priority 0, full weight, config fades.
    pub fn new(name: impl Into<String>, clip: Option<Arc<ClipData>>) -> Self {
        Self {
            name: name.into(),
            clip,
            priority: 0,
            weight: 1.0,
            loop_mode: LoopMode::Loop,
            enabled: true,
            fade_in_sec: None,
            fade_out_sec: None,
            mode: ClipMode::Continuous,
        }
    }

    /// A trigger clip (always plays once per firing).
    pub fn trigger(name: impl Into<String>, clip: Option<Arc<ClipData>>) -> Self {
        Self {
            loop_mode: LoopMode::Once,
            mode: ClipMode::Trigger,
            ..Self::new(name, clip)
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_loop_mode(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn with_fades(mut self, fade_in_sec: f32, fade_out_sec: f32) -> Self {
        self.fade_in_sec = Some(fade_in_sec);
        self.fade_out_sec = Some(fade_out_sec);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Scheduling state for one named clip.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClipHandle {
    pub name: String,
    pub priority: i32,
    pub weight: f32,
    pub loop_mode: LoopMode,
    pub enabled: bool,
    pub playing: bool,
    pub fade_in_sec: f32,
    pub fade_out_sec: f32,
    pub mode: ClipMode,
    #[serde(skip)]
    pub action: ActionId,
    /// Seconds until a trigger clip fires again.
    #[serde(skip)]
    cooldown: f32,
}

#[derive(Debug)]
pub struct AnimationBlendScheduler {
    cfg: BlendConfig,
    handles: IndexMap<String, ClipHandle>,
    suspensions: SuspensionSet,
    mixer: Mixer,
    rng: SmallRng,
}

impl AnimationBlendScheduler {
    pub fn new(cfg: BlendConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            cfg,
            handles: IndexMap::new(),
            suspensions: SuspensionSet::new(),
            mixer: Mixer::new(),
            rng,
        }
    }

    /// Register a clip, or swap the source of an existing one with the same name.
    ///
    /// Replacing keeps the existing handle's priority, weight, enabled flag, fades
    /// and mode. A clip without a playable source is dropped (logged) and never
    /// enters the set. Returns whether the registration took effect.
    pub fn register_or_replace(&mut self, desc: ContinuousClip) -> bool {
        let Some(clip) = desc.clip.filter(|c| c.is_playable()) else {
            tracing::warn!(clip = %desc.name, "dropping clip without a playable animation source");
            return false;
        };

        let cooldown = self.next_trigger_interval();
        if let Some(handle) = self.handles.get_mut(&desc.name) {
            self.mixer.stop(handle.action);
            self.mixer.swap_clip(handle.action, clip);
            handle.playing = false;
            tracing::debug!(clip = %desc.name, "replaced clip source");
        } else {
            let loop_mode = match desc.mode {
                ClipMode::Trigger => LoopMode::Once,
                ClipMode::Continuous => desc.loop_mode,
            };
            let weight = desc.weight.clamp(0.0, 1.0);
            let action = self.mixer.create_action(clip, loop_mode, weight);
            let handle = ClipHandle {
                name: desc.name.clone(),
                priority: desc.priority,
                weight,
                loop_mode,
                enabled: desc.enabled,
                playing: false,
                fade_in_sec: desc.fade_in_sec.unwrap_or(self.cfg.fade_in_sec).max(0.0),
                fade_out_sec: desc.fade_out_sec.unwrap_or(self.cfg.fade_out_sec).max(0.0),
                mode: desc.mode,
                action,
                cooldown,
            };
            tracing::debug!(clip = %desc.name, priority = desc.priority, mode = ?desc.mode, "registered clip");
            self.handles.insert(desc.name, handle);
        }
        self.reevaluate();
        true
    }

    /// Explicit on/off switch. Disabling fades the clip out; only suspension
    /// cuts a trigger clip without a fade.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), AvatarError> {
        let handle = self
            .handles
            .get_mut(name)
            .ok_or_else(|| AvatarError::UnknownClip {
                name: name.to_string(),
            })?;
        handle.enabled = enabled;
        self.reevaluate();
        Ok(())
    }

    /// Raise the suspension floor. Release with [`release`](Self::release).
    pub fn suspend(&mut self, priority: i32) -> SuspensionToken {
        let token = self.suspensions.insert(priority);
        tracing::debug!(priority, floor = self.suspensions.floor(), "suspension raised");
        self.reevaluate();
        token
    }

    pub fn release(&mut self, token: SuspensionToken) {
        if self.suspensions.remove(token) {
            tracing::debug!(floor = self.suspensions.floor(), "suspension released");
            self.reevaluate();
        }
    }

    /// Effective floor: max priority among live tokens (0 if none).
    pub fn suspension_floor(&self) -> i32 {
        self.suspensions.floor()
    }

    pub fn is_suspended(&self, priority: i32) -> bool {
        self.suspensions.suspends(priority)
    }

    /// Advance trigger-clip cooldowns by `dt` seconds, firing any that are due.
    pub fn tick(&mut self, dt: f32) {
        let mut due = Vec::new();
        for handle in self.handles.values_mut() {
            if handle.mode != ClipMode::Trigger
                || !handle.enabled
                || self.suspensions.suspends(handle.priority)
            {
                continue;
            }
            handle.cooldown -= dt;
            if handle.cooldown <= 0.0 {
                due.push(handle.name.clone());
            }
        }
        for name in due {
            let interval = self.next_trigger_interval();
            if let Some(handle) = self.handles.get_mut(&name) {
                handle.cooldown = interval;
                handle.playing = true;
                self.mixer.play_from_start(handle.action, 0.0);
                tracing::trace!(clip = %name, "trigger clip fired");
            }
        }
    }

    /// Step the mixer and write joint rotations; syncs `playing` flags with
    /// actions that ended on their own.
    pub fn update(&mut self, dt: f32, skeleton: &mut dyn Skeleton) -> Vec<MixerEvent> {
        let events = self.mixer.update(dt, skeleton).to_vec();
        for handle in self.handles.values_mut() {
            if handle.playing && !self.mixer.is_running(handle.action) {
                handle.playing = false;
            }
        }
        events
    }

    pub fn handle(&self, name: &str) -> Option<&ClipHandle> {
        self.handles.get(name)
    }

    pub fn handles(&self) -> impl Iterator<Item = &ClipHandle> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    /// Stop every clip and clear all tokens. Handles stay registered but stopped.
    pub fn dispose(&mut self) {
        self.suspensions.clear();
        self.mixer.stop_all();
        for handle in self.handles.values_mut() {
            handle.playing = false;
        }
    }

    fn next_trigger_interval(&mut self) -> f32 {
        let lo = self.cfg.trigger_interval_min_sec.max(0.0);
        let hi = self.cfg.trigger_interval_max_sec.max(lo);
        self.rng.gen_range(lo..=hi)
    }

    /// Bring every handle in line with the current floor and enabled flags.
    fn reevaluate(&mut self) {
        for handle in self.handles.values_mut() {
            let suspended = self.suspensions.suspends(handle.priority);
            let should_play = handle.enabled && !suspended;
            match handle.mode {
                ClipMode::Continuous => {
                    if should_play && !handle.playing {
                        self.mixer.play(handle.action, handle.fade_in_sec);
                        handle.playing = true;
                    } else if !should_play && handle.playing {
                        self.mixer.fade_out(handle.action, handle.fade_out_sec);
                        handle.playing = false;
                    }
                }
                ClipMode::Trigger => {
                    if should_play || !(handle.playing || self.mixer.is_running(handle.action)) {
                        continue;
                    }
                    if suspended {
                        self.mixer.stop(handle.action);
                    } else {
                        self.mixer.fade_out(handle.action, handle.fade_out_sec);
                    }
                    handle.playing = false;
                }
            }
        }
    }
}
