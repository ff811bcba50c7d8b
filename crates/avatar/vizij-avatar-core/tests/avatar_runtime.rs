use vizij_avatar_core::{
    AudioSource, Avatar, AvatarConfig, AvatarError, AvatarEvent, ContinuousClip, GestureOutcome,
    QueueState, QueuedAnimationRequest, Status,
};
use vizij_test_fixtures::{
    clips, ConstantAudio, DeferredRegistry, FixtureRegistry, MemoryExpressions, MemorySkeleton,
};

const DT: f32 = 1.0 / 60.0;

fn avatar() -> Avatar {
    let cfg = AvatarConfig::from_json_str(r#"{ "viseme": { "seed": 9 }, "blend": { "seed": 9 } }"#)
        .unwrap();
    Avatar::new(cfg, Some(Box::new(FixtureRegistry::new()))).unwrap()
}

fn run(avatar: &mut Avatar, skel: &mut MemorySkeleton, exprs: &mut MemoryExpressions, secs: f32) {
    for _ in 0..(secs / DT).round() as usize {
        avatar.update(DT, skel, exprs);
    }
}

#[test]
fn gesture_expressions_overlay_and_clear() {
    let mut avatar = avatar();
    let mut skel = MemorySkeleton::humanoid();
    let mut exprs = MemoryExpressions::new();

    avatar.enqueue(QueuedAnimationRequest::play("wave")).unwrap();
    run(&mut avatar, &mut skel, &mut exprs, 0.3);
    assert!((exprs.get("happy") - 0.8).abs() < 0.02, "happy={}", exprs.get("happy"));

    run(&mut avatar, &mut skel, &mut exprs, 0.45);
    let mid = exprs.get("happy");
    assert!(mid > 0.0 && mid < 0.8);

    run(&mut avatar, &mut skel, &mut exprs, 1.0);
    assert_eq!(avatar.queue_state(), QueueState::Idle);
    assert_eq!(exprs.get("happy"), 0.0);
}

#[test]
fn viseme_and_gesture_channels_do_not_interfere() {
    let mut avatar = avatar();
    let mut skel = MemorySkeleton::humanoid();
    let mut exprs = MemoryExpressions::new();
    let audio = ConstantAudio::new(0.9);
    assert!(avatar.attach_audio(|| Ok(Box::new(audio.clone()) as Box<dyn AudioSource>)));

    avatar.enqueue(QueuedAnimationRequest::pose("listen")).unwrap();
    run(&mut avatar, &mut skel, &mut exprs, 1.0);
    assert!(exprs.get("aa") > 0.9);
    assert!((exprs.get("relaxed") - 0.5).abs() < 1e-6);

    audio.set_level(0.0);
    run(&mut avatar, &mut skel, &mut exprs, 0.2);
    assert_eq!(exprs.get("aa"), 0.0);
    assert!((exprs.get("relaxed") - 0.5).abs() < 1e-6);
}

#[test]
fn blink_reaches_the_blink_channel_when_silent() {
    let mut avatar = avatar();
    let mut skel = MemorySkeleton::humanoid();
    let mut exprs = MemoryExpressions::new();
    let mut blinks = 0;
    for _ in 0..(10.0 / DT) as usize {
        let frame = avatar.update(DT, &mut skel, &mut exprs);
        if frame.viseme.is_some_and(|v| v.blink) {
            blinks += 1;
            assert_eq!(exprs.get("blink"), 1.0);
        }
    }
    assert!((2..=4).contains(&blinks), "blinks={blinks}");
}

#[test]
fn status_events_follow_asset_resolution() {
    let mut avatar = avatar();
    let mut skel = MemorySkeleton::humanoid();
    let mut exprs = MemoryExpressions::new();
    assert_eq!(avatar.status(), &Status::Idle);

    avatar.preload_clip("breathe");
    let frame = avatar.update(DT, &mut skel, &mut exprs);
    let statuses: Vec<Status> = frame
        .events
        .iter()
        .filter_map(|e| match e {
            AvatarEvent::StatusChanged { status } => Some(status.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![Status::Loading, Status::Ready]);

    let breathe = avatar.clip("breathe");
    assert!(avatar.register_continuous(ContinuousClip::new("breathe", breathe)));
    assert!(avatar.set_enabled("breathe", false).is_ok());
    assert!(avatar.set_enabled("missing", true).is_err());
}

#[test]
fn preloaded_clips_work_without_registry() {
    let mut avatar = Avatar::new(AvatarConfig::default(), None).unwrap();
    let mut skel = MemorySkeleton::humanoid();
    let mut exprs = MemoryExpressions::new();
    avatar.insert_clip("nod", clips::load("nod").unwrap());

    let mut done = avatar.enqueue(QueuedAnimationRequest::play("nod")).unwrap();
    run(&mut avatar, &mut skel, &mut exprs, 1.0);
    assert_eq!(done.try_recv().unwrap(), Some(GestureOutcome::Finished));
}

#[test]
fn dispose_releases_everything_and_is_idempotent() {
    let (registry, control) = DeferredRegistry::new();
    let mut avatar = Avatar::new(AvatarConfig::default(), Some(Box::new(registry))).unwrap();
    let mut skel = MemorySkeleton::humanoid();
    let mut exprs = MemoryExpressions::new();
    avatar.insert_clip("breathe", clips::load("breathe").unwrap());
    let breathe = avatar.clip("breathe");
    avatar.register_continuous(ContinuousClip::new("breathe", breathe));

    let audio = ConstantAudio::new(0.4);
    avatar.attach_audio(|| Ok(Box::new(audio.clone()) as Box<dyn AudioSource>));
    let mut done = avatar.enqueue(QueuedAnimationRequest::play("wave")).unwrap();
    run(&mut avatar, &mut skel, &mut exprs, 0.2);
    assert_eq!(control.waiting(), vec!["wave".to_string()]);

    avatar.dispose();
    avatar.dispose();
    assert!(avatar.is_disposed());
    assert_eq!(audio.closed(), 1);
    assert_eq!(done.try_recv().unwrap(), Some(GestureOutcome::Cancelled));
    assert_eq!(avatar.scheduler().mixer().running_count(), 0);
    assert_eq!(avatar.scheduler().suspension_floor(), 0);
    assert!(!control.complete("wave"), "fetch was cancelled");

    let frame = avatar.update(DT, &mut skel, &mut exprs);
    assert!(frame.is_empty());
    drop(avatar);
    assert_eq!(audio.closed(), 1);
}

#[test]
fn invalid_config_is_rejected() {
    let err = AvatarConfig::from_json_str(r#"{ "viseme": { "thresholds": [0.5, 0.2] } }"#).unwrap_err();
    assert!(matches!(err, AvatarError::Config { .. }));

    let mut cfg = AvatarConfig::default();
    cfg.ik.tolerance = 0.0;
    assert!(Avatar::new(cfg, None).is_err());
}
