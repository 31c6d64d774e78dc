//! Atomic mode-set and the page-flip loop that follows it.

use core::fmt;

use alloc::vec::Vec;
use log::{debug, error, info, trace, warn};

use crate::caps::DeviceCapabilities;
use crate::chain::DisplayOutputChain;
use crate::device::KmsDevice;
use crate::event::{raw::events_from_bytes, DrmEvent, DrmVblankEvent};
use crate::ioctl::fixedu16_16;
use crate::modeset::{
    AtomicCommitFlags, AtomicRequest, ConnectorProp, CrtcProp, FramebufferId, PlaneProp,
};
use crate::result::{Error, KernelError};
use crate::util::vec_zeroed;

/// Room for one flip-complete event, the smallest read the kernel accepts.
const MIN_EVENT_BUFFER_LEN: usize = 32;

/// The state shared between a [`Presenter`] and its [`Renderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameState {
    /// Cleared by the renderer to stop presenting. No flip is scheduled
    /// after the frame in which it's cleared.
    pub running: bool,
    /// Index of the buffer being presented, which the renderer advances
    /// modulo its pool size.
    pub buffer_index: u8,
    /// The framebuffer to present next. The renderer must leave a valid,
    /// fully drawn framebuffer here.
    pub fb_id: FramebufferId,
}

impl FrameState {
    /// A running frame state presenting buffer 0 as `fb_id`.
    pub fn new(fb_id: FramebufferId) -> Self {
        Self {
            running: true,
            buffer_index: 0,
            fb_id,
        }
    }
}

/// Produces the next frame each time the previous one reaches the screen.
///
/// This runs inside event handling, so it delays every other event until it
/// returns.
pub trait Renderer {
    fn render(&mut self, frame: &mut FrameState);
}

impl<F: FnMut(&mut FrameState)> Renderer for F {
    fn render(&mut self, frame: &mut FrameState) {
        self(frame)
    }
}

/// What to do when the kernel rejects a page-flip commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlipPolicy {
    /// Log the failure and stop flipping. [`Presenter::state`] reports
    /// [`PresentState::Stalled`], since no completion event will follow.
    #[default]
    LogAndStall,
    /// Resubmit the same commit once, then stall if that fails too.
    RetryOnce,
    /// Stop presenting and return the error from [`Presenter::handle_event`].
    FailFast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PresentConfig {
    pub flip_policy: FlipPolicy,
    /// Include `ALLOW_MODESET` in every flip commit, not just the first.
    pub allow_modeset_on_flip: bool,
    /// Size of the buffer events are read into.
    pub event_buffer_len: usize,
}

impl Default for PresentConfig {
    fn default() -> Self {
        Self {
            flip_policy: FlipPolicy::LogAndStall,
            allow_modeset_on_flip: false,
            event_buffer_len: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentState {
    /// Nothing committed yet.
    Built,
    /// The kernel accepted the configuration in a test-only commit.
    TestCommitted,
    /// The mode is set and the first flip is pending.
    Modeset,
    /// A flip commit is pending.
    Flipping,
    /// A flip commit was rejected; no completion event will arrive.
    Stalled,
    Stopped,
}

/// Drives atomic commits for one [`DisplayOutputChain`].
///
/// The presenter holds the chain exclusively for as long as it lives, and
/// reuses one [`AtomicRequest`] for every commit.
pub struct Presenter<'c, 'd, D: KmsDevice + ?Sized, R: Renderer> {
    chain: &'c mut DisplayOutputChain<'d, D>,
    renderer: R,
    frame: FrameState,
    req: AtomicRequest,
    config: PresentConfig,
    state: PresentState,
    event_buf: Vec<u8>,
    /// Without CRTC ids in flip events every flip is taken to be ours.
    any_crtc: bool,
}

impl<'c, 'd, D: KmsDevice + ?Sized, R: Renderer> Presenter<'c, 'd, D, R> {
    /// Set up a presenter without committing anything.
    pub fn build(
        chain: &'c mut DisplayOutputChain<'d, D>,
        renderer: R,
        frame: FrameState,
        config: PresentConfig,
    ) -> Result<Self, Error> {
        let caps = DeviceCapabilities::probe(chain.device());
        if !caps.crtc_in_vblank_event {
            warn!("flip events don't identify their CRTC; treating every flip as ours");
        }
        let event_buf = vec_zeroed::<u8>(config.event_buffer_len.max(MIN_EVENT_BUFFER_LEN))
            .map_err(Error::query("event buffer"))?;
        Ok(Self {
            chain,
            renderer,
            frame,
            req: AtomicRequest::new(),
            config,
            state: PresentState::Built,
            event_buf,
            any_crtc: !caps.crtc_in_vblank_event,
        })
    }

    /// Build a presenter and mode-set the chain to show `frame.fb_id`.
    pub fn start(
        chain: &'c mut DisplayOutputChain<'d, D>,
        renderer: R,
        frame: FrameState,
        config: PresentConfig,
    ) -> Result<Self, Error> {
        let mut presenter = Self::build(chain, renderer, frame, config)?;
        presenter.prepare(frame.fb_id);
        presenter.commit_initial()?;
        Ok(presenter)
    }

    /// Write the complete chain state for presenting `fb` into the request.
    ///
    /// Atomic commits aren't incremental, so this always sets all eleven
    /// properties rather than just the framebuffer.
    pub fn prepare(&mut self, fb: FramebufferId) {
        let chain = &*self.chain;
        let req = &mut self.req;

        let conn = chain.connector.object_id();
        let crtc = chain.crtc.object_id();
        let plane = chain.plane.object_id();
        let crtc_id = u64::from(chain.crtc.id());
        let mode = &chain.mode.mode_info;

        req.set_property(conn, chain.connector.property_id(ConnectorProp::CrtcId), crtc_id);

        req.set_property(
            crtc,
            chain.crtc.property_id(CrtcProp::ModeId),
            chain.mode.blob.id().0.into(),
        );
        req.set_property(crtc, chain.crtc.property_id(CrtcProp::Active), 1);

        let props = &chain.plane;
        req.set_property(plane, props.property_id(PlaneProp::FbId), fb.0.into());
        req.set_property(plane, props.property_id(PlaneProp::CrtcId), crtc_id);
        req.set_property(plane, props.property_id(PlaneProp::SrcX), 0);
        req.set_property(plane, props.property_id(PlaneProp::SrcY), 0);
        req.set_property(
            plane,
            props.property_id(PlaneProp::SrcW),
            fixedu16_16::from_u16(mode.hdisplay).as_raw_u32().into(),
        );
        req.set_property(
            plane,
            props.property_id(PlaneProp::SrcH),
            fixedu16_16::from_u16(mode.vdisplay).as_raw_u32().into(),
        );
        req.set_property(plane, props.property_id(PlaneProp::CrtcX), 0);
        req.set_property(plane, props.property_id(PlaneProp::CrtcY), 0);
        req.set_property(plane, props.property_id(PlaneProp::CrtcW), chain.width.into());
        req.set_property(plane, props.property_id(PlaneProp::CrtcH), chain.height.into());
    }

    /// Check the prepared request with a test-only commit and, if the
    /// kernel accepts it, commit it for real with a flip event armed.
    pub fn commit_initial(&mut self) -> Result<(), Error> {
        self.commit(AtomicCommitFlags::TEST_ONLY | AtomicCommitFlags::ALLOW_MODESET)
            .map_err(|source| Error::AtomicCommitRejected {
                stage: "test-only",
                source,
            })?;
        self.state = PresentState::TestCommitted;

        self.commit(AtomicCommitFlags::ALLOW_MODESET | AtomicCommitFlags::PAGE_FLIP_EVENT)
            .map_err(|source| Error::AtomicCommitRejected {
                stage: "mode-set",
                source,
            })?;
        self.state = PresentState::Modeset;
        info!(
            "mode set on CRTC {} with framebuffer {}",
            self.chain.crtc_id(),
            self.frame.fb_id
        );
        Ok(())
    }

    /// Submit the prepared request as the next page flip.
    ///
    /// What happens when the kernel rejects it depends on
    /// [`PresentConfig::flip_policy`]; only [`FlipPolicy::FailFast`]
    /// returns an error.
    pub fn commit_flip(&mut self) -> Result<(), Error> {
        let mut flags = AtomicCommitFlags::PAGE_FLIP_EVENT | AtomicCommitFlags::NONBLOCK;
        if self.config.allow_modeset_on_flip {
            flags = flags | AtomicCommitFlags::ALLOW_MODESET;
        }

        let err = match self.commit(flags) {
            Ok(()) => {
                self.state = PresentState::Flipping;
                return Ok(());
            }
            Err(e) => e,
        };
        warn!("flip commit on CRTC {} rejected: {err}", self.chain.crtc_id());

        match self.config.flip_policy {
            FlipPolicy::LogAndStall => self.stall(err),
            FlipPolicy::RetryOnce => match self.commit(flags) {
                Ok(()) => {
                    debug!("flip commit accepted on retry");
                    self.state = PresentState::Flipping;
                }
                Err(e) => self.stall(e),
            },
            FlipPolicy::FailFast => {
                self.state = PresentState::Stopped;
                return Err(Error::AtomicCommitRejected {
                    stage: "flip",
                    source: err,
                });
            }
        }
        Ok(())
    }

    /// Read one batch of pending events from the device and, for each
    /// completed flip on our CRTC, render and schedule the next frame.
    ///
    /// Returns the number of flips handled. Fails only if reading fails,
    /// or if a flip is rejected under [`FlipPolicy::FailFast`].
    pub fn handle_event(&mut self) -> Result<usize, Error> {
        if self.state == PresentState::Stopped {
            return Ok(0);
        }

        let len = self
            .chain
            .device()
            .read_event_bytes(&mut self.event_buf)
            .map_err(Error::EventRead)?;
        let flips: Vec<DrmVblankEvent> = events_from_bytes(&self.event_buf[..len])
            .filter_map(|raw| DrmEvent::from_raw(&raw).as_flip_complete().copied())
            .collect();

        let mut handled = 0;
        for flip in flips {
            if !self.any_crtc && !flip.crtc_id.is_none() && flip.crtc_id != self.chain.crtc_id() {
                trace!("ignoring flip on CRTC {}", flip.crtc_id);
                continue;
            }
            if matches!(self.state, PresentState::Built | PresentState::TestCommitted) {
                warn!("flip event {} before the mode was set", flip.sequence);
                continue;
            }
            handled += 1;
            if !self.on_flip_complete(&flip)? {
                break;
            }
        }
        Ok(handled)
    }

    /// Returns whether presentation continues.
    fn on_flip_complete(&mut self, flip: &DrmVblankEvent) -> Result<bool, Error> {
        trace!(
            "flip {} complete at {}.{:06}",
            flip.sequence,
            flip.tv_sec,
            flip.tv_usec
        );
        self.renderer.render(&mut self.frame);
        if !self.frame.running {
            info!("renderer stopped presentation");
            self.state = PresentState::Stopped;
            return Ok(false);
        }
        self.prepare(self.frame.fb_id);
        self.commit_flip()?;
        Ok(true)
    }

    fn stall(&mut self, err: KernelError) {
        error!(
            "presentation on CRTC {} stalled after rejected flip: {err}",
            self.chain.crtc_id()
        );
        self.state = PresentState::Stalled;
    }

    fn commit(&self, flags: AtomicCommitFlags) -> Result<(), KernelError> {
        trace!(
            "atomic commit of {} properties with {flags:?}",
            self.req.len()
        );
        self.chain.device().atomic_commit(&self.req, flags, 0)
    }

    /// Release the request and hand back the renderer. The chain stays
    /// as it is.
    pub fn destroy(self) -> R {
        self.renderer
    }

    #[inline]
    pub fn state(&self) -> PresentState {
        self.state
    }

    #[inline]
    pub fn frame(&self) -> &FrameState {
        &self.frame
    }

    /// The request as last prepared.
    #[inline]
    pub fn request(&self) -> &AtomicRequest {
        &self.req
    }

    #[inline]
    pub fn chain(&self) -> &DisplayOutputChain<'d, D> {
        &*self.chain
    }

    #[inline]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    #[inline]
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    #[inline]
    pub fn config(&self) -> &PresentConfig {
        &self.config
    }
}

impl<D: KmsDevice + ?Sized, R: Renderer> fmt::Debug for Presenter<'_, '_, D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Presenter")
            .field("chain", &self.chain)
            .field("frame", &self.frame)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
