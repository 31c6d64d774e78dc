mod common;

use common::{FakeCard, Output};
use linux_kms_flip::modeset::{
    AtomicCommitFlags, ConnectorId, CrtcId, FramebufferId, ObjectId, PlaneId,
};
use linux_kms_flip::{
    DisplayOutputChain, Error, FlipPolicy, FrameState, KernelError, PresentConfig, PresentState,
    Presenter, Renderer,
};

const PLANE: ObjectId = ObjectId::Plane(PlaneId(43));
const CRTC: ObjectId = ObjectId::Crtc(CrtcId(42));

/// Alternates between framebuffers 10 and 11, counting its calls.
#[derive(Debug, Default)]
struct TwoBuffers {
    calls: usize,
    stop_after: Option<usize>,
}

impl Renderer for TwoBuffers {
    fn render(&mut self, frame: &mut FrameState) {
        self.calls += 1;
        frame.buffer_index = (frame.buffer_index + 1) % 2;
        frame.fb_id = FramebufferId(10 + u32::from(frame.buffer_index));
        if self.stop_after.is_some_and(|n| self.calls >= n) {
            frame.running = false;
        }
    }
}

fn first_frame() -> FrameState {
    FrameState::new(FramebufferId(10))
}

fn plane_fb(card: &FakeCard, presenter_req: &linux_kms_flip::modeset::AtomicRequest) -> u64 {
    presenter_req
        .property(PLANE, card.prop_id("FB_ID"))
        .expect("no FB_ID in request")
}

#[test_log::test]
fn prepare_writes_the_whole_chain_state() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let blob = chain.mode.blob.id();
    let mut p = Presenter::build(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    p.prepare(FramebufferId(10));
    let req = p.request();
    assert_eq!(req.len(), 11);

    let get = |obj: ObjectId, name: &str| req.property(obj, card.prop_id(name));
    let conn = ObjectId::Connector(ConnectorId(40));
    assert_eq!(get(conn, "CRTC_ID"), Some(42));
    assert_eq!(get(CRTC, "MODE_ID"), Some(u64::from(blob.0)));
    assert_eq!(get(CRTC, "ACTIVE"), Some(1));
    assert_eq!(get(PLANE, "FB_ID"), Some(10));
    assert_eq!(get(PLANE, "CRTC_ID"), Some(42));
    assert_eq!(get(PLANE, "SRC_X"), Some(0));
    assert_eq!(get(PLANE, "SRC_Y"), Some(0));
    assert_eq!(get(PLANE, "SRC_W"), Some(1920 << 16));
    assert_eq!(get(PLANE, "SRC_H"), Some(1080 << 16));
    assert_eq!(get(PLANE, "CRTC_X"), Some(0));
    assert_eq!(get(PLANE, "CRTC_Y"), Some(0));
    assert_eq!(get(PLANE, "CRTC_W"), Some(1920));
    assert_eq!(get(PLANE, "CRTC_H"), Some(1080));
    assert!(card.commits().is_empty());
    assert_eq!(p.state(), PresentState::Built);
}

#[test_log::test]
fn prepare_is_idempotent() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::build(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    p.prepare(FramebufferId(10));
    let once = p.request().clone();
    p.prepare(FramebufferId(10));
    assert_eq!(p.request(), &once);

    p.prepare(FramebufferId(11));
    assert_eq!(p.request().len(), 11);
    p.prepare(FramebufferId(10));
    assert_eq!(p.request(), &once);
}

#[test_log::test]
fn initial_commit_tests_before_setting_the_mode() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let p = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    assert_eq!(p.state(), PresentState::Modeset);
    let commits = card.commits();
    assert_eq!(commits.len(), 2);
    assert_eq!(
        commits[0].flags,
        AtomicCommitFlags::TEST_ONLY | AtomicCommitFlags::ALLOW_MODESET
    );
    assert_eq!(
        commits[1].flags,
        AtomicCommitFlags::ALLOW_MODESET | AtomicCommitFlags::PAGE_FLIP_EVENT
    );
    assert_eq!(commits[0].req, commits[1].req);
    assert_eq!(card.pending_events(), 1);
}

#[test_log::test]
fn rejected_test_commit_prevents_the_mode_set() {
    let card = FakeCard::with_output(Output::new(40));
    card.reject_commits(AtomicCommitFlags::TEST_ONLY, 1);
    let mut chain = DisplayOutputChain::discover(&card).unwrap();

    let err = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap_err();
    assert!(
        matches!(
            err,
            Error::AtomicCommitRejected {
                stage: "test-only",
                source: KernelError::Invalid
            }
        ),
        "{err}"
    );

    let commits = card.commits();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].flags.contains(AtomicCommitFlags::TEST_ONLY));
    assert_eq!(card.pending_events(), 0);
}

#[test_log::test]
fn rejected_mode_set_leaves_test_committed_state() {
    let card = FakeCard::with_output(Output::new(40));
    card.reject_commits(AtomicCommitFlags::PAGE_FLIP_EVENT, 1);
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::build(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();
    p.prepare(FramebufferId(10));

    let err = p.commit_initial().unwrap_err();
    assert!(
        matches!(err, Error::AtomicCommitRejected { stage: "mode-set", .. }),
        "{err}"
    );
    assert_eq!(p.state(), PresentState::TestCommitted);
}

#[test_log::test]
fn flips_alternate_between_two_buffers() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    assert_eq!(p.handle_event().unwrap(), 1);
    assert_eq!(p.frame().buffer_index, 1);
    assert_eq!(plane_fb(&card, p.request()), 11);
    let flip = card.last_commit().unwrap();
    assert_eq!(
        flip.flags,
        AtomicCommitFlags::PAGE_FLIP_EVENT | AtomicCommitFlags::NONBLOCK
    );
    assert_eq!(plane_fb(&card, &flip.req), 11);
    assert_eq!(flip.req.len(), 11);
    assert_eq!(p.state(), PresentState::Flipping);

    assert_eq!(p.handle_event().unwrap(), 1);
    assert_eq!(p.frame().buffer_index, 0);
    assert_eq!(plane_fb(&card, &card.last_commit().unwrap().req), 10);
}

#[test_log::test]
fn buffer_index_tracks_flip_count() {
    const FLIPS: usize = 7;
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    for _ in 0..FLIPS {
        assert_eq!(p.handle_event().unwrap(), 1);
    }
    assert_eq!(usize::from(p.frame().buffer_index), FLIPS % 2);
    // One flip is always in flight.
    assert_eq!(card.pending_events(), 1);
    assert_eq!(p.destroy().calls, FLIPS);
}

#[test_log::test]
fn clearing_running_stops_presentation() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let renderer = TwoBuffers {
        stop_after: Some(3),
        ..TwoBuffers::default()
    };
    let mut p = Presenter::start(&mut chain, renderer, first_frame(), PresentConfig::default())
        .unwrap();

    while p.state() != PresentState::Stopped {
        assert_eq!(p.handle_event().unwrap(), 1);
    }
    assert!(!p.frame().running);
    // Mode set plus the two flips before the renderer stopped.
    assert_eq!(card.commits().len(), 2 + 2);
    assert_eq!(card.pending_events(), 0);

    card.queue_flip(CrtcId(42));
    assert_eq!(p.handle_event().unwrap(), 0);
    assert_eq!(p.renderer().calls, 3);
}

#[test_log::test]
fn closure_renderer() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::start(
        &mut chain,
        |frame: &mut FrameState| frame.fb_id = FramebufferId(77),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    p.handle_event().unwrap();
    assert_eq!(plane_fb(&card, &card.last_commit().unwrap().req), 77);
}

#[test_log::test]
fn rejected_flip_stalls_by_default() {
    let card = FakeCard::with_output(Output::new(40));
    card.reject_commits(AtomicCommitFlags::NONBLOCK, 1);
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    assert_eq!(p.handle_event().unwrap(), 1);
    assert_eq!(p.state(), PresentState::Stalled);
    assert_eq!(card.pending_events(), 0);
    assert_eq!(card.commits().len(), 3);
    assert_eq!(p.handle_event().unwrap(), 0);
}

#[test_log::test]
fn retry_once_recovers_from_one_rejection() {
    let card = FakeCard::with_output(Output::new(40));
    card.reject_commits(AtomicCommitFlags::NONBLOCK, 1);
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let config = PresentConfig {
        flip_policy: FlipPolicy::RetryOnce,
        ..PresentConfig::default()
    };
    let mut p = Presenter::start(&mut chain, TwoBuffers::default(), first_frame(), config).unwrap();

    assert_eq!(p.handle_event().unwrap(), 1);
    assert_eq!(p.state(), PresentState::Flipping);
    let commits = card.commits();
    assert_eq!(commits.len(), 4);
    assert!(!commits[2].accepted);
    assert!(commits[3].accepted);
    assert_eq!(commits[2].req, commits[3].req);
    assert_eq!(card.pending_events(), 1);
}

#[test_log::test]
fn retry_once_stalls_after_two_rejections() {
    let card = FakeCard::with_output(Output::new(40));
    card.reject_commits(AtomicCommitFlags::NONBLOCK, 2);
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let config = PresentConfig {
        flip_policy: FlipPolicy::RetryOnce,
        ..PresentConfig::default()
    };
    let mut p = Presenter::start(&mut chain, TwoBuffers::default(), first_frame(), config).unwrap();

    assert_eq!(p.handle_event().unwrap(), 1);
    assert_eq!(p.state(), PresentState::Stalled);
    assert_eq!(card.commits().len(), 4);
}

#[test_log::test]
fn fail_fast_reports_the_rejected_flip() {
    let card = FakeCard::with_output(Output::new(40));
    card.reject_commits(AtomicCommitFlags::NONBLOCK, 1);
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let config = PresentConfig {
        flip_policy: FlipPolicy::FailFast,
        ..PresentConfig::default()
    };
    let mut p = Presenter::start(&mut chain, TwoBuffers::default(), first_frame(), config).unwrap();

    let err = p.handle_event().unwrap_err();
    assert!(
        matches!(err, Error::AtomicCommitRejected { stage: "flip", .. }),
        "{err}"
    );
    assert_eq!(p.state(), PresentState::Stopped);
    assert_eq!(p.handle_event().unwrap(), 0);
}

#[test_log::test]
fn flips_can_allow_mode_sets() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let config = PresentConfig {
        allow_modeset_on_flip: true,
        ..PresentConfig::default()
    };
    let mut p = Presenter::start(&mut chain, TwoBuffers::default(), first_frame(), config).unwrap();

    p.handle_event().unwrap();
    let flags = card.last_commit().unwrap().flags;
    assert!(flags.contains(AtomicCommitFlags::ALLOW_MODESET));
    assert!(flags.contains(AtomicCommitFlags::NONBLOCK));
}

#[test_log::test]
fn flips_on_other_crtcs_are_ignored() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    card.queue_flip(CrtcId(99));
    assert_eq!(p.handle_event().unwrap(), 1);
    assert_eq!(p.renderer().calls, 1);
}

#[test_log::test]
fn flips_without_crtc_id_are_taken_as_ours() {
    let mut card = FakeCard::with_output(Output::new(40));
    card.crtc_in_vblank_event = false;
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    assert_eq!(p.handle_event().unwrap(), 1);
    assert_eq!(p.frame().buffer_index, 1);
}

#[test_log::test]
fn flip_before_mode_set_is_ignored() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::build(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    card.queue_flip(CrtcId(42));
    assert_eq!(p.handle_event().unwrap(), 0);
    assert_eq!(p.state(), PresentState::Built);
    assert!(card.commits().is_empty());
}

#[test_log::test]
fn event_read_failure_is_reported() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    card.fail_reads(KernelError::Busy);
    let err = p.handle_event().unwrap_err();
    assert!(matches!(err, Error::EventRead(KernelError::Busy)), "{err}");
}

#[test_log::test]
fn destroy_leaves_the_chain_usable() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let p = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();
    let renderer = p.destroy();
    assert_eq!(renderer.calls, 0);

    chain.reset_mode().unwrap();
    assert_eq!(card.live_blobs(), 1);
    drop(chain);
    assert_eq!(card.live_blobs(), 0);
}

#[test_log::test]
fn empty_read_keeps_the_flip_pending() {
    let card = FakeCard::with_output(Output::new(40));
    let mut chain = DisplayOutputChain::discover(&card).unwrap();
    let mut p = Presenter::start(
        &mut chain,
        TwoBuffers::default(),
        first_frame(),
        PresentConfig::default(),
    )
    .unwrap();

    let flip = card.take_events();
    assert_eq!(flip.len(), 1);
    assert_eq!(p.handle_event().unwrap(), 0);
    assert_eq!(p.state(), PresentState::Modeset);
    assert_eq!(p.renderer().calls, 0);

    card.queue_flip(CrtcId(42));
    assert_eq!(p.handle_event().unwrap(), 1);
    assert_eq!(p.state(), PresentState::Flipping);
}
