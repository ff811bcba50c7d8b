//! GestureAnimationQueue: FIFO of discrete gesture/pose requests.
//!
//! States: `Idle → Loading → Playing → Idle` for `Play` requests and
//! `Idle → Loading → Playing → Held → Idle` for `Pose` requests. While anything
//! is active or waiting, the queue holds one suspension token against the blend
//! scheduler so idle clips stay faded out across back-to-back gestures.
//!
//! A head request whose clip is still being fetched waits at most
//! `load_timeout_sec` before it is dropped and the queue moves on.
//!
//! Every request gets a completion receiver resolving to a [`GestureOutcome`].

use std::collections::VecDeque;
use std::sync::Arc;

use futures::channel::oneshot;
use serde::{Deserialize, Serialize};

use crate::clip::{ClipData, ExpressionMetadata};
use crate::config::QueueConfig;
use crate::error::AvatarError;
use crate::mixer::{ActionId, LoopMode, Mixer, MixerEvent};
use crate::outputs::AvatarEvent;
use crate::registry::{ClipLibrary, ClipStatus};
use crate::scheduler::AnimationBlendScheduler;
use crate::suspension::SuspensionToken;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureIntent {
    /// Fire-and-forget; released when the clip ends.
    Play,
    /// Held on its last frame until a response signal.
    Pose,
}

/// How a queued request ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum GestureOutcome {
    Finished,
    Released,
    /// A held pose cleared by a newer request.
    Preempted,
    Dropped { reason: String },
    Cancelled,
}

pub type GestureCompletion = oneshot::Receiver<GestureOutcome>;

type StartCallback = Box<dyn FnOnce(&str)>;

pub struct QueuedAnimationRequest {
    pub slug: String,
    pub intent: GestureIntent,
    /// Free-form origin tag (e.g. which cue producer asked for it).
    pub source: Option<String>,
    on_start: Option<StartCallback>,
}

impl QueuedAnimationRequest {
    pub fn new(slug: impl Into<String>, intent: GestureIntent) -> Self {
        Self {
            slug: slug.into(),
            intent,
            source: None,
            on_start: None,
        }
    }

    pub fn play(slug: impl Into<String>) -> Self {
        Self::new(slug, GestureIntent::Play)
    }

    pub fn pose(slug: impl Into<String>) -> Self {
        Self::new(slug, GestureIntent::Pose)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Called with the slug when the clip actually starts.
    pub fn on_start(mut self, f: impl FnOnce(&str) + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for QueuedAnimationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedAnimationRequest")
            .field("slug", &self.slug)
            .field("intent", &self.intent)
            .field("source", &self.source)
            .field("on_start", &self.on_start.is_some())
            .finish()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Idle,
    /// Head request waits on an asset fetch.
    Loading,
    Playing,
    Held,
}

#[derive(Debug)]
struct Pending {
    request: QueuedAnimationRequest,
    done: oneshot::Sender<GestureOutcome>,
}

/// The single clip the queue is currently playing or holding.
#[derive(Debug)]
pub struct ActiveAnimation {
    slug: String,
    intent: GestureIntent,
    clip: Arc<ClipData>,
    action: ActionId,
    held: bool,
    done: oneshot::Sender<GestureOutcome>,
}

impl ActiveAnimation {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn intent(&self) -> GestureIntent {
        self.intent
    }

    pub fn clip(&self) -> &Arc<ClipData> {
        &self.clip
    }

    pub fn action(&self) -> ActionId {
        self.action
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn expressions(&self) -> Option<&ExpressionMetadata> {
        self.clip.expressions.as_ref()
    }
}

#[derive(Debug)]
pub struct GestureAnimationQueue {
    cfg: QueueConfig,
    pending: VecDeque<Pending>,
    active: Option<ActiveAnimation>,
    token: Option<SuspensionToken>,
    /// Seconds the head request has spent waiting on its clip.
    head_wait: f32,
    events: Vec<AvatarEvent>,
}

impl GestureAnimationQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        Self {
            cfg,
            pending: VecDeque::new(),
            active: None,
            token: None,
            head_wait: 0.0,
            events: Vec::new(),
        }
    }

    /// Append a request. A held `Pose` is cleared first, whatever the new
    /// request's intent. Empty slugs are rejected.
    pub fn enqueue(
        &mut self,
        request: QueuedAnimationRequest,
        scheduler: &mut AnimationBlendScheduler,
        library: &mut ClipLibrary,
    ) -> Result<GestureCompletion, AvatarError> {
        if request.slug.trim().is_empty() {
            return Err(AvatarError::EmptySlug);
        }
        if self.active.as_ref().is_some_and(|a| a.held) {
            self.clear_active(scheduler.mixer_mut(), GestureOutcome::Preempted);
        }
        tracing::debug!(
            slug = %request.slug,
            intent = ?request.intent,
            source = ?request.source,
            "gesture queued"
        );
        let (done, completion) = oneshot::channel();
        self.pending.push_back(Pending { request, done });
        self.advance(scheduler, library);
        Ok(completion)
    }

    /// Age the head request's fetch wait by `dt` seconds. Call once per frame
    /// before [`Self::handle_mixer_events`].
    pub fn tick(&mut self, dt: f32) {
        if self.active.is_none() && !self.pending.is_empty() {
            self.head_wait += dt;
        }
    }

    /// Start the next request if nothing is active. Requests whose clip is
    /// missing are dropped; a clip still being fetched keeps its place until
    /// the load timeout runs out.
    pub fn advance(&mut self, scheduler: &mut AnimationBlendScheduler, library: &mut ClipLibrary) {
        while self.active.is_none() {
            let Some(head) = self.pending.front() else {
                break;
            };
            let status = library.poll(&head.request.slug);
            let clip = match status {
                ClipStatus::Pending if self.head_wait >= self.cfg.load_timeout_sec => {
                    self.drop_head(format!(
                        "clip still loading after {:.1}s",
                        self.cfg.load_timeout_sec
                    ));
                    continue;
                }
                ClipStatus::Pending => break,
                ClipStatus::Missing(reason) => {
                    self.drop_head(reason);
                    continue;
                }
                ClipStatus::Ready(clip) => clip,
            };
            if let Err(err) = clip.validate_basic() {
                self.drop_head(err.to_string());
                continue;
            }
            if let Some(next) = self.pending.pop_front() {
                self.start(next, clip, scheduler);
            }
        }
        if self.active.is_none() && self.pending.is_empty() {
            if let Some(token) = self.token.take() {
                scheduler.release(token);
            }
        }
    }

    /// React to mixer events from this frame's update.
    pub fn handle_mixer_events(
        &mut self,
        events: &[MixerEvent],
        scheduler: &mut AnimationBlendScheduler,
        library: &mut ClipLibrary,
    ) {
        for event in events {
            let MixerEvent::Finished { action } = event else {
                continue;
            };
            let Some(active) = self.active.as_mut() else {
                continue;
            };
            if active.action != *action || active.held {
                continue;
            }
            match active.intent {
                GestureIntent::Play => {
                    tracing::debug!(slug = %active.slug, "gesture finished");
                    self.events.push(AvatarEvent::GestureFinished {
                        slug: active.slug.clone(),
                    });
                    self.clear_active(scheduler.mixer_mut(), GestureOutcome::Finished);
                }
                GestureIntent::Pose => {
                    active.held = true;
                    tracing::debug!(slug = %active.slug, "pose held");
                    self.events.push(AvatarEvent::GestureHeld {
                        slug: active.slug.clone(),
                    });
                }
            }
        }
        self.advance(scheduler, library);
    }

    /// The held pose may be released. No-op unless a pose is held.
    pub fn on_response_signal(
        &mut self,
        scheduler: &mut AnimationBlendScheduler,
        library: &mut ClipLibrary,
    ) -> bool {
        let Some(active) = self.active.as_ref().filter(|a| a.held) else {
            return false;
        };
        tracing::debug!(slug = %active.slug, "pose released");
        self.events.push(AvatarEvent::GestureReleased {
            slug: active.slug.clone(),
        });
        self.clear_active(scheduler.mixer_mut(), GestureOutcome::Released);
        self.advance(scheduler, library);
        true
    }

    pub fn state(&self) -> QueueState {
        match &self.active {
            Some(a) if a.held => QueueState::Held,
            Some(_) => QueueState::Playing,
            None if !self.pending.is_empty() => QueueState::Loading,
            None => QueueState::Idle,
        }
    }

    pub fn active(&self) -> Option<&ActiveAnimation> {
        self.active.as_ref()
    }

    /// Expression channels of the active clip and its current clip time.
    pub fn active_expressions<'a>(
        &'a self,
        mixer: &Mixer,
    ) -> Option<(&'a ExpressionMetadata, f32)> {
        let active = self.active.as_ref()?;
        let meta = active.expressions()?;
        Some((meta, mixer.time(active.action)?))
    }

    /// Requests waiting behind the active one.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn holds_suspension(&self) -> bool {
        self.token.is_some()
    }

    pub fn drain_events(&mut self) -> Vec<AvatarEvent> {
        std::mem::take(&mut self.events)
    }

    /// Cancel everything: pending requests, the active clip and the token.
    pub fn dispose(&mut self, scheduler: &mut AnimationBlendScheduler) {
        for pending in self.pending.drain(..) {
            let _ = pending.done.send(GestureOutcome::Cancelled);
        }
        if let Some(active) = self.active.take() {
            scheduler.mixer_mut().remove(active.action);
            let _ = active.done.send(GestureOutcome::Cancelled);
        }
        if let Some(token) = self.token.take() {
            scheduler.release(token);
        }
        self.head_wait = 0.0;
        self.events.clear();
    }

    fn start(
        &mut self,
        next: Pending,
        clip: Arc<ClipData>,
        scheduler: &mut AnimationBlendScheduler,
    ) {
        let Pending { mut request, done } = next;
        self.head_wait = 0.0;
        if self.token.is_none() {
            self.token = Some(scheduler.suspend(self.cfg.suspend_priority));
        }
        let mixer = scheduler.mixer_mut();
        let action = mixer.create_action(clip.clone(), LoopMode::Once, 1.0);
        // Both intents freeze on the last frame; `Play` is then faded out.
        mixer.set_clamp_when_finished(action, true);
        mixer.play_from_start(action, self.cfg.fade_in_sec);

        tracing::info!(slug = %request.slug, intent = ?request.intent, "gesture started");
        if let Some(on_start) = request.on_start.take() {
            on_start(&request.slug);
        }
        self.events.push(AvatarEvent::GestureStarted {
            slug: request.slug.clone(),
        });
        self.active = Some(ActiveAnimation {
            slug: request.slug,
            intent: request.intent,
            clip,
            action,
            held: false,
            done,
        });
    }

    fn drop_head(&mut self, reason: String) {
        let Some(dropped) = self.pending.pop_front() else {
            return;
        };
        self.head_wait = 0.0;
        tracing::warn!(slug = %dropped.request.slug, %reason, "dropping gesture request");
        self.events.push(AvatarEvent::GestureDropped {
            slug: dropped.request.slug,
            reason: reason.clone(),
        });
        let _ = dropped.done.send(GestureOutcome::Dropped { reason });
    }

    fn clear_active(&mut self, mixer: &mut Mixer, outcome: GestureOutcome) {
        if let Some(active) = self.active.take() {
            mixer.retire(active.action, self.cfg.fade_out_sec);
            let _ = active.done.send(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{JointTrack, RotationKey};
    use crate::config::BlendConfig;
    use crate::scheduler::ContinuousClip;
    use crate::skeleton::{JointHandle, Skeleton};

    struct NoJoints;

    impl Skeleton for NoJoints {
        fn joint(&self, _: &str) -> Option<JointHandle> {
            None
        }
        fn world_position(&self, _: JointHandle) -> [f32; 3] {
            [0.0; 3]
        }
        fn world_rotation(&self, _: JointHandle) -> [f32; 4] {
            [0.0, 0.0, 0.0, 1.0]
        }
        fn local_rotation(&self, _: JointHandle) -> [f32; 4] {
            [0.0, 0.0, 0.0, 1.0]
        }
        fn set_local_rotation(&mut self, _: JointHandle, _: [f32; 4]) {}
    }

    fn clip(name: &str, duration: f32) -> ClipData {
        ClipData {
            name: name.into(),
            duration_s: duration,
            tracks: vec![JointTrack {
                joint: "head".into(),
                keys: vec![RotationKey {
                    time: 0.0,
                    rotation: [0.0, 0.0, 0.0, 1.0],
                }],
            }],
            expressions: None,
        }
    }

    struct Rig {
        queue: GestureAnimationQueue,
        scheduler: AnimationBlendScheduler,
        library: ClipLibrary,
    }

    impl Rig {
        fn new() -> Self {
            let mut library = ClipLibrary::detached();
            library.insert("wave", clip("wave", 1.0));
            library.insert("nod", clip("nod", 0.5));
            library.insert("listen", clip("listen", 0.4));
            let mut scheduler = AnimationBlendScheduler::new(BlendConfig::default());
            let breathe = Arc::new(clip("breathe", 2.0));
            assert!(scheduler.register_or_replace(ContinuousClip::new("breathe", Some(breathe))));
            Self {
                queue: GestureAnimationQueue::new(QueueConfig::default()),
                scheduler,
                library,
            }
        }

        fn enqueue(&mut self, req: QueuedAnimationRequest) -> GestureCompletion {
            self.queue
                .enqueue(req, &mut self.scheduler, &mut self.library)
                .unwrap()
        }

        fn step(&mut self, dt: f32) {
            self.queue.tick(dt);
            let events = self.scheduler.update(dt, &mut NoJoints);
            self.queue
                .handle_mixer_events(&events, &mut self.scheduler, &mut self.library);
        }

        fn active_slug(&self) -> Option<String> {
            self.queue.active().map(|a| a.slug().to_string())
        }
    }

    #[test]
    fn empty_slug_is_rejected() {
        let mut rig = Rig::new();
        let err = rig
            .queue
            .enqueue(
                QueuedAnimationRequest::play("  "),
                &mut rig.scheduler,
                &mut rig.library,
            )
            .unwrap_err();
        assert_eq!(err, AvatarError::EmptySlug);
        assert_eq!(rig.queue.state(), QueueState::Idle);
    }

    #[test]
    fn plays_requests_in_fifo_order() {
        let mut rig = Rig::new();
        let mut a = rig.enqueue(QueuedAnimationRequest::play("nod"));
        let mut b = rig.enqueue(QueuedAnimationRequest::play("wave"));
        assert_eq!(rig.active_slug().as_deref(), Some("nod"));
        assert_eq!(rig.queue.len(), 1);

        for _ in 0..12 {
            rig.step(0.05);
        }
        assert_eq!(a.try_recv().unwrap(), Some(GestureOutcome::Finished));
        assert_eq!(rig.active_slug().as_deref(), Some("wave"));
        for _ in 0..40 {
            rig.step(0.05);
        }
        assert_eq!(b.try_recv().unwrap(), Some(GestureOutcome::Finished));
        assert_eq!(rig.queue.state(), QueueState::Idle);
        assert!(!rig.queue.holds_suspension());
    }

    #[test]
    fn suspension_spans_back_to_back_gestures() {
        let mut rig = Rig::new();
        rig.enqueue(QueuedAnimationRequest::play("nod"));
        rig.enqueue(QueuedAnimationRequest::play("nod"));
        assert!(rig.scheduler.is_suspended(0));
        for _ in 0..12 {
            rig.step(0.05);
            if rig.queue.state() != QueueState::Idle {
                assert!(rig.scheduler.is_suspended(0));
            }
        }
    }

    #[test]
    fn pose_is_held_until_response() {
        let mut rig = Rig::new();
        let mut done = rig.enqueue(QueuedAnimationRequest::pose("listen"));
        for _ in 0..400 {
            rig.step(0.05);
        }
        assert_eq!(rig.queue.state(), QueueState::Held);
        assert_eq!(done.try_recv().unwrap(), None);
        assert!(rig.scheduler.is_suspended(0));

        assert!(rig
            .queue
            .on_response_signal(&mut rig.scheduler, &mut rig.library));
        assert_eq!(done.try_recv().unwrap(), Some(GestureOutcome::Released));
        assert_eq!(rig.queue.state(), QueueState::Idle);
        assert!(!rig.scheduler.is_suspended(0));
    }

    #[test]
    fn new_request_preempts_held_pose() {
        let mut rig = Rig::new();
        let mut pose = rig.enqueue(QueuedAnimationRequest::pose("listen"));
        for _ in 0..20 {
            rig.step(0.05);
        }
        assert_eq!(rig.queue.state(), QueueState::Held);
        rig.enqueue(QueuedAnimationRequest::play("nod"));
        assert_eq!(pose.try_recv().unwrap(), Some(GestureOutcome::Preempted));
        assert_eq!(rig.active_slug().as_deref(), Some("nod"));
        assert!(rig.scheduler.is_suspended(0));
    }

    #[test]
    fn missing_clip_is_dropped_and_queue_moves_on() {
        let mut rig = Rig::new();
        let started = std::rc::Rc::new(std::cell::Cell::new(false));
        let flag = started.clone();
        let mut missing = rig.enqueue(QueuedAnimationRequest::play("shrug"));
        rig.enqueue(QueuedAnimationRequest::play("nod").on_start(move |_| flag.set(true)));
        assert!(matches!(
            missing.try_recv().unwrap(),
            Some(GestureOutcome::Dropped { .. })
        ));
        assert!(started.get());
        let events = rig.queue.drain_events();
        assert!(matches!(events[0], AvatarEvent::GestureDropped { .. }));
        assert!(matches!(events[1], AvatarEvent::GestureStarted { .. }));
    }

    #[test]
    fn dispose_cancels_everything() {
        let mut rig = Rig::new();
        let mut a = rig.enqueue(QueuedAnimationRequest::play("wave"));
        let mut b = rig.enqueue(QueuedAnimationRequest::play("nod"));
        rig.queue.dispose(&mut rig.scheduler);
        assert_eq!(a.try_recv().unwrap(), Some(GestureOutcome::Cancelled));
        assert_eq!(b.try_recv().unwrap(), Some(GestureOutcome::Cancelled));
        assert_eq!(rig.queue.state(), QueueState::Idle);
        assert_eq!(rig.scheduler.suspension_floor(), 0);
    }
}
