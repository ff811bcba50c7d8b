use vizij_avatar_core::{
    viseme::{apply_viseme, rms_level, shape_level},
    AudioSource, Avatar, AvatarConfig, AvatarError, AvatarEvent, VisemeConfig,
    VisemeSignalExtractor,
};
use vizij_test_fixtures::{ConstantAudio, FailingAudio, MemoryExpressions, MemorySkeleton};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn seeded() -> VisemeConfig {
    VisemeConfig {
        seed: Some(11),
        ..VisemeConfig::default()
    }
}

fn boxed<S: AudioSource + 'static>(source: S) -> Result<Box<dyn AudioSource>, AvatarError> {
    Ok(Box::new(source))
}

#[test]
fn loud_speech_maps_to_top_viseme() {
    let audio = ConstantAudio::new(0.9);
    let mut ex = VisemeSignalExtractor::new(seeded());
    ex.attach(|| boxed(audio.clone())).unwrap();

    let tick = ex.tick(30.0);
    assert!(tick.fault.is_none());
    let expected = ((0.9_f32 - 0.02) / 0.98).powf(0.55);
    approx(tick.frame.intensity, expected, 1e-4);
    assert_eq!(tick.frame.index, 4);
    assert!(!tick.frame.blink);
}

#[test]
fn shaping_floor_and_reference() {
    assert_eq!(rms_level(&[], 1.0), 0.0);
    approx(rms_level(&[0.5, -0.5, 0.5, -0.5], 1.0), 0.5, 1e-6);
    approx(rms_level(&[0.5; 8], 0.25), 1.0, 1e-6);
    assert_eq!(shape_level(0.02, 0.02, 0.55), 0.0);
    assert_eq!(shape_level(0.0, 0.02, 0.55), 0.0);
    approx(shape_level(1.0, 0.02, 0.55), 1.0, 1e-6);
}

#[test]
fn attaching_closes_previous_source_even_on_error() {
    let first = ConstantAudio::new(0.3);
    let second = ConstantAudio::new(0.3);
    let mut ex = VisemeSignalExtractor::new(seeded());

    ex.attach(|| boxed(first.clone())).unwrap();
    ex.attach(|| boxed(second.clone())).unwrap();
    assert_eq!(first.closed(), 1);
    assert_eq!(second.closed(), 0);

    let err = ex
        .attach(|| Err(AvatarError::audio("no input device")))
        .unwrap_err();
    assert_eq!(err.category(), "audio");
    assert_eq!(second.closed(), 1);
    assert!(!ex.is_attached());
}

#[test]
fn read_failure_is_reported_and_treated_as_silence() {
    let failing = FailingAudio::new();
    let mut ex = VisemeSignalExtractor::new(seeded());
    ex.process(&[0.8; 64], 30.0);
    ex.attach(|| boxed(failing.clone())).unwrap();

    let tick = ex.tick(60.0);
    assert!(matches!(tick.fault, Some(AvatarError::Audio { .. })));
    assert_eq!(tick.frame.intensity, 0.0);
    assert_eq!(tick.frame.index, 0);

    ex.dispose();
    assert_eq!(failing.closed(), 1);
}

#[test]
fn viseme_frame_drives_bucket_channels() {
    let cfg = seeded();
    let mut ex = VisemeSignalExtractor::new(cfg.clone());
    let mut exprs = MemoryExpressions::new();

    let frame = ex.process(&[0.9; 128], 30.0);
    apply_viseme(&frame, &cfg, &mut exprs);
    approx(exprs.get("aa"), frame.intensity, 1e-6);
    for quiet in ["ih", "ou", "ee", "oh"] {
        assert_eq!(exprs.get(quiet), 0.0, "{quiet}");
    }
    assert_eq!(exprs.get("blink"), 0.0);

    let frame = ex.process(&[0.0; 128], 60.0);
    apply_viseme(&frame, &cfg, &mut exprs);
    assert_eq!(exprs.get("aa"), 0.0);
    assert_eq!(exprs.get("ih"), 0.0);
}

#[test]
fn avatar_reports_audio_problems_as_events() {
    let mut cfg = AvatarConfig::default();
    cfg.viseme.seed = Some(5);
    let mut avatar = Avatar::new(cfg, None).unwrap();
    let mut skel = MemorySkeleton::humanoid();
    let mut exprs = MemoryExpressions::new();

    assert!(!avatar.attach_audio(|| Err(AvatarError::audio("permission denied"))));
    let frame = avatar.update(1.0 / 60.0, &mut skel, &mut exprs);
    assert!(frame
        .events
        .iter()
        .any(|e| matches!(e, AvatarEvent::AudioError { message } if message.contains("permission denied"))));

    let audio = ConstantAudio::new(0.9);
    assert!(avatar.attach_audio(|| boxed(audio.clone())));
    let frame = avatar.update(0.03, &mut skel, &mut exprs);
    let viseme = frame.viseme.expect("viseme frame every update");
    assert_eq!(viseme.index, 4);
    approx(exprs.get("aa"), viseme.intensity, 1e-6);

    avatar.detach_audio();
    assert_eq!(audio.closed(), 1);
}
