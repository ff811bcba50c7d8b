//! Avatar: the per-frame driver composing every component.
//!
//! Frame order inside [`Avatar::update`]:
//! 1. viseme extraction, written to the viseme expression channels
//! 2. trigger-clip cooldowns
//! 3. mixer update (joint writes)
//! 4. gesture completion handling and queue advance
//! 5. expression keyframes of the active gesture clip

use std::sync::Arc;

use crate::audio::AudioSource;
use crate::clip::ClipData;
use crate::config::AvatarConfig;
use crate::error::AvatarError;
use crate::expression::{ExpressionKeyframeSampler, ExpressionTarget};
use crate::outputs::{AvatarEvent, AvatarFrame, Status};
use crate::queue::{GestureAnimationQueue, GestureCompletion, QueueState, QueuedAnimationRequest};
use crate::registry::{ClipLibrary, ClipRegistry, ClipStatus};
use crate::rest_pose::{normalize_arm_rest_pose, RestPoseReport};
use crate::scheduler::{AnimationBlendScheduler, ContinuousClip};
use crate::skeleton::Skeleton;
use crate::viseme::{apply_viseme, VisemeSignalExtractor};

/// Messages from the external cue bus.
#[derive(Debug)]
pub enum AvatarCue {
    Gesture(QueuedAnimationRequest),
    /// The foreground action finished; a held pose may be released.
    Response,
}

#[derive(Debug)]
pub struct Avatar {
    cfg: AvatarConfig,
    viseme: VisemeSignalExtractor,
    scheduler: AnimationBlendScheduler,
    queue: GestureAnimationQueue,
    library: ClipLibrary,
    expressions: ExpressionKeyframeSampler,
    frame: AvatarFrame,
    /// Events raised between frames, flushed into the next frame.
    deferred: Vec<AvatarEvent>,
    disposed: bool,
}

impl Avatar {
    /// Build an avatar from a validated config. Without a registry only clips
    /// added through [`insert_clip`](Self::insert_clip) are available.
    pub fn new(
        cfg: AvatarConfig,
        registry: Option<Box<dyn ClipRegistry>>,
    ) -> Result<Self, AvatarError> {
        cfg.validate()?;
        let library = match registry {
            Some(registry) => ClipLibrary::new(registry),
            None => ClipLibrary::detached(),
        };
        Ok(Self {
            viseme: VisemeSignalExtractor::new(cfg.viseme.clone()),
            scheduler: AnimationBlendScheduler::new(cfg.blend.clone()),
            queue: GestureAnimationQueue::new(cfg.queue.clone()),
            library,
            expressions: ExpressionKeyframeSampler::new(),
            frame: AvatarFrame::default(),
            deferred: Vec::new(),
            disposed: false,
            cfg,
        })
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.cfg
    }

    pub fn set_registry(&mut self, registry: Box<dyn ClipRegistry>) {
        self.library.set_registry(registry);
    }

    pub fn insert_clip(&mut self, slug: impl Into<String>, clip: ClipData) -> Arc<ClipData> {
        self.library.insert(slug, clip)
    }

    /// Start (or check) resolution of a clip without queuing it.
    pub fn preload_clip(&mut self, slug: &str) -> ClipStatus {
        let status = self.library.poll(slug);
        self.flush();
        status
    }

    /// A resolved clip, if loaded.
    pub fn clip(&self, slug: &str) -> Option<Arc<ClipData>> {
        self.library.get(slug)
    }

    pub fn register_continuous(&mut self, desc: ContinuousClip) -> bool {
        self.scheduler.register_or_replace(desc)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), AvatarError> {
        self.scheduler.set_enabled(name, enabled)
    }

    pub fn enqueue(
        &mut self,
        request: QueuedAnimationRequest,
    ) -> Result<GestureCompletion, AvatarError> {
        let completion = self
            .queue
            .enqueue(request, &mut self.scheduler, &mut self.library)?;
        self.flush();
        Ok(completion)
    }

    pub fn on_response_signal(&mut self) -> bool {
        let released = self
            .queue
            .on_response_signal(&mut self.scheduler, &mut self.library);
        self.flush();
        released
    }

    /// Route one cue-bus message. Gestures return their completion receiver.
    pub fn dispatch(&mut self, cue: AvatarCue) -> Result<Option<GestureCompletion>, AvatarError> {
        match cue {
            AvatarCue::Gesture(request) => self.enqueue(request).map(Some),
            AvatarCue::Response => {
                self.on_response_signal();
                Ok(None)
            }
        }
    }

    /// Attach an audio source, closing any previous one first. A failure is
    /// reported as an [`AvatarEvent::AudioError`] and the avatar runs silent.
    pub fn attach_audio<F>(&mut self, open: F) -> bool
    where
        F: FnOnce() -> Result<Box<dyn AudioSource>, AvatarError>,
    {
        match self.viseme.attach(open) {
            Ok(()) => true,
            Err(err) => {
                self.deferred.push(AvatarEvent::AudioError {
                    message: err.to_string(),
                });
                false
            }
        }
    }

    pub fn detach_audio(&mut self) {
        self.viseme.detach();
    }

    /// Solve both arms into the rest pose and make it the pose idle clips
    /// return to. Skipped limbs are reported on the next frame.
    pub fn normalize_rest_pose(&mut self, skeleton: &mut dyn Skeleton) -> RestPoseReport {
        let report = normalize_arm_rest_pose(skeleton, &self.cfg.rest_pose, &self.cfg.ik);
        for (limb, reason) in report.skipped() {
            self.deferred.push(AvatarEvent::LimbSkipped {
                limb: limb.to_string(),
                reason: reason.to_string(),
            });
        }
        self.scheduler.mixer_mut().recapture_rest();
        report
    }

    pub fn status(&self) -> &Status {
        self.library.status()
    }

    pub fn queue_state(&self) -> QueueState {
        self.queue.state()
    }

    pub fn scheduler(&self) -> &AnimationBlendScheduler {
        &self.scheduler
    }

    pub fn queue(&self) -> &GestureAnimationQueue {
        &self.queue
    }

    pub fn viseme(&self) -> &VisemeSignalExtractor {
        &self.viseme
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Advance one rendered frame by `dt` seconds.
    pub fn update(
        &mut self,
        dt: f32,
        skeleton: &mut dyn Skeleton,
        expressions: &mut dyn ExpressionTarget,
    ) -> &AvatarFrame {
        self.frame.clear();
        self.frame.events.append(&mut self.deferred);
        if self.disposed {
            return &self.frame;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let tick = self.viseme.tick(dt * 1000.0);
        if let Some(fault) = tick.fault {
            self.frame.push_event(AvatarEvent::AudioError {
                message: fault.to_string(),
            });
        }
        apply_viseme(&tick.frame, self.viseme.config(), expressions);
        self.frame.viseme = Some(tick.frame);

        self.scheduler.tick(dt);

        self.library.poll_pending();
        let mixer_events = self.scheduler.update(dt, skeleton);

        self.queue.tick(dt);
        self.queue
            .handle_mixer_events(&mixer_events, &mut self.scheduler, &mut self.library);

        self.expressions
            .apply(self.queue.active_expressions(self.scheduler.mixer()), expressions);

        self.flush();
        self.frame.events.append(&mut self.deferred);
        &self.frame
    }

    /// Release audio, stop every clip, clear tokens and cancel fetches.
    /// Safe to call repeatedly; also runs on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.viseme.dispose();
        self.queue.dispose(&mut self.scheduler);
        self.scheduler.dispose();
        self.library.cancel_pending();
        self.library.drain_status_changes();
        self.deferred.clear();
        self.disposed = true;
        tracing::debug!("avatar disposed");
    }

    /// Move library status changes and queue events into the deferred list.
    fn flush(&mut self) {
        for status in self.library.drain_status_changes() {
            self.deferred.push(AvatarEvent::StatusChanged { status });
        }
        self.deferred.extend(self.queue.drain_events());
    }
}

impl Drop for Avatar {
    fn drop(&mut self) {
        self.dispose();
    }
}
