//! Flips between framebuffers on the first connected output.
//!
//! Usage: `flip-loop [FRAMES] [FB_ID...]`
//!
//! With no framebuffer ids this re-presents whatever the primary plane is
//! already showing, which still exercises the whole mode-set and flip path.

use std::ffi::CString;

use linux_kms_flip::modeset::{FramebufferId, PlaneProp};
use linux_kms_flip::{
    Card, DeviceCapabilities, DisplayOutputChain, FrameState, PresentConfig, PresentState,
    Presenter,
};

/// Parse framebuffer ids, no more than `FrameState::buffer_index` can address.
fn parse_pool(
    args: impl Iterator<Item = String>,
) -> Result<Vec<FramebufferId>, Box<dyn std::error::Error>> {
    let pool: Vec<FramebufferId> = args
        .map(|id| id.parse().map(FramebufferId))
        .collect::<Result<_, _>>()?;
    if pool.len() > usize::from(u8::MAX) + 1 {
        return Err(format!("at most 256 framebuffers, got {}", pool.len()).into());
    }
    Ok(pool)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let frames: u32 = match args.next() {
        Some(n) => n.parse()?,
        None => 300,
    };
    let mut pool = parse_pool(args)?;

    let path = std::env::var("DRM_CARD").unwrap_or_else(|_| "/dev/dri/card0".into());
    let card = Card::open(&CString::new(path)?)?;
    card.become_master()?;
    let name = card.driver_name()?;
    log::info!("driver: {}", String::from_utf8_lossy(&name));

    let caps = DeviceCapabilities::probe(&card);
    if !caps.crtc_in_vblank_event {
        log::warn!("this driver doesn't tag flips with their CRTC");
    }

    let mut chain = DisplayOutputChain::discover(&card)?;
    if pool.is_empty() {
        let current = chain.plane.get(PlaneProp::FbId).value;
        pool.push(FramebufferId(u32::try_from(current)?));
    }
    log::info!("presenting {pool:?} on {chain:?}");

    let first = FrameState::new(pool[0]);
    let mut remaining = frames;
    let renderer = move |frame: &mut FrameState| {
        frame.buffer_index = ((usize::from(frame.buffer_index) + 1) % pool.len()) as u8;
        frame.fb_id = pool[usize::from(frame.buffer_index)];
        remaining = remaining.saturating_sub(1);
        frame.running = remaining > 0;
    };
    let mut presenter = Presenter::start(&mut chain, renderer, first, PresentConfig::default())?;

    let mut flips = 0;
    while !matches!(
        presenter.state(),
        PresentState::Stopped | PresentState::Stalled
    ) {
        flips += presenter.handle_event()?;
    }
    log::info!("{flips} flips, finished {:?}", presenter.state());
    drop(presenter);

    chain.close()?;
    card.drop_master()?;
    Ok(())
}
