//! Finding one live connector→encoder→CRTC→plane chain to present on.

use log::{debug, info, warn};

use crate::device::{CrtcConfig, KmsDevice};
use crate::modeset::{
    BlobHandle, ConnectionState, ConnectorId, ConnectorProps, ConnectorState, CrtcId, CrtcProps,
    CrtcState, FramebufferId, ModeInfo, PlaneId, PlaneProps, PlaneState,
};
use crate::result::{Error, KernelError};
use crate::ClientCap;

/// The operating mode of a chain and the kernel blob holding it.
pub struct DisplayModeData<'d, D: KmsDevice + ?Sized> {
    pub blob: BlobHandle<'d, D>,
    pub mode_info: ModeInfo,
}

/// One connector, CRTC and plane bound together, with the property ids
/// needed to commit to them.
pub struct DisplayOutputChain<'d, D: KmsDevice + ?Sized> {
    device: &'d D,
    pub width: u32,
    pub height: u32,
    pub mode: DisplayModeData<'d, D>,
    pub connector: ConnectorProps,
    pub crtc: CrtcProps,
    pub plane: PlaneProps,
}

impl<D: KmsDevice + ?Sized> core::fmt::Debug for DisplayModeData<'_, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DisplayModeData")
            .field("blob", &self.blob)
            .field("mode_info", &self.mode_info)
            .finish()
    }
}

impl<D: KmsDevice + ?Sized> core::fmt::Debug for DisplayOutputChain<'_, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DisplayOutputChain")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mode", &self.mode)
            .field("connector", &self.connector)
            .field("crtc", &self.crtc)
            .field("plane", &self.plane)
            .finish_non_exhaustive()
    }
}

/// The objects a chain is made of, before any kernel resources are taken.
struct ChainCandidate {
    connector: ConnectorState,
    crtc: CrtcState,
    plane: PlaneId,
}

impl<'d, D: KmsDevice + ?Sized> DisplayOutputChain<'d, D> {
    /// Walk the device's connectors and take the first one that's connected
    /// and already driven by an active CRTC.
    ///
    /// The operating mode is the connector's first advertised mode, not
    /// necessarily its preferred one. Only one chain is ever produced;
    /// further connected connectors are ignored.
    pub fn discover(device: &'d D) -> Result<Self, Error> {
        device
            .set_client_cap(ClientCap::UniversalPlanes, 1)
            .map_err(Error::query("universal planes client capability"))?;
        device
            .set_client_cap(ClientCap::Atomic, 1)
            .map_err(Error::query("atomic client capability"))?;

        let candidate = find_candidate(device)?;
        let conn_id = candidate.connector.id;
        let crtc_id = candidate.crtc.crtc_id;
        // find_candidate only accepts connectors with at least one mode.
        let Some(mode_info) = candidate.connector.modes.into_iter().next() else {
            return Err(Error::NoDisplayChain);
        };

        let raw_mode = crate::ioctl::DrmModeInfo::from(&mode_info);
        let blob = BlobHandle::create(device, raw_mode.as_bytes()).map_err(Error::ModeBlob)?;

        // From here on, returning early drops the blob and so destroys it.
        let connector = ConnectorProps::resolve(device, conn_id.0)?;
        let crtc = CrtcProps::resolve(device, crtc_id.0)?;
        let plane = PlaneProps::resolve(device, candidate.plane.0)?;

        info!(
            "using connector {conn_id}, CRTC {crtc_id}, plane {} with mode {mode_info}",
            candidate.plane
        );
        Ok(Self {
            device,
            width: mode_info.hdisplay.into(),
            height: mode_info.vdisplay.into(),
            mode: DisplayModeData { blob, mode_info },
            connector,
            crtc,
            plane,
        })
    }

    #[inline(always)]
    pub fn device(&self) -> &'d D {
        self.device
    }

    /// Release the chain's kernel resources, reporting whether the mode
    /// blob was destroyed cleanly. Dropping the chain does the same but
    /// only logs a failure.
    pub fn close(self) -> Result<(), KernelError> {
        self.mode.blob.destroy()
    }

    /// Program the CRTC with the legacy (non-atomic) interface, scanning
    /// out `fb` on the chain's connector in the chain's mode.
    ///
    /// This needs exclusive access because it must not race a
    /// [`crate::Presenter`], which holds the chain for as long as it lives.
    pub fn set_mode(&mut self, fb: FramebufferId) -> Result<(), Error> {
        let connectors = [self.connector_id()];
        let config = CrtcConfig {
            crtc_id: self.crtc_id(),
            fb_id: fb,
            connectors: &connectors,
            mode: Some(&self.mode.mode_info),
        };
        debug!("legacy mode set of CRTC {} to framebuffer {fb}", config.crtc_id);
        self.device.set_crtc(&config).map_err(Error::ModeSet)
    }

    /// Turn the CRTC off with the legacy interface.
    pub fn reset_mode(&mut self) -> Result<(), Error> {
        let config = CrtcConfig {
            crtc_id: self.crtc_id(),
            fb_id: FramebufferId(0),
            connectors: &[],
            mode: None,
        };
        debug!("legacy mode reset of CRTC {}", config.crtc_id);
        self.device.set_crtc(&config).map_err(Error::ModeSet)
    }

    #[inline]
    pub fn connector_id(&self) -> ConnectorId {
        ConnectorId(self.connector.id())
    }

    #[inline]
    pub fn crtc_id(&self) -> CrtcId {
        CrtcId(self.crtc.id())
    }

    #[inline]
    pub fn plane_id(&self) -> PlaneId {
        PlaneId(self.plane.id())
    }
}

fn find_candidate<D: KmsDevice + ?Sized>(device: &D) -> Result<ChainCandidate, Error> {
    let resources = device
        .resources()
        .map_err(Error::query("card resources"))?;

    for id in resources.connector_ids.iter().copied() {
        let conn = match device.connector_state(id) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("skipping connector {id}: {e}");
                continue;
            }
        };
        if conn.connection_state != ConnectionState::Connected {
            debug!("skipping unconnected connector {id}");
            continue;
        }
        if conn.current_encoder_id.is_none() {
            debug!("skipping encoderless connector {id}");
            continue;
        }
        if conn.modes.is_empty() {
            debug!("skipping modeless connector {id}");
            continue;
        }

        let enc = device
            .encoder_state(conn.current_encoder_id)
            .map_err(Error::query("encoder"))?;
        if enc.current_crtc_id.is_none() {
            debug!("skipping connector {id}: encoder {} drives no CRTC", enc.encoder_id);
            continue;
        }

        let crtc = device
            .crtc_state(enc.current_crtc_id)
            .map_err(Error::query("CRTC"))?;
        if !crtc.is_active() {
            debug!("skipping connector {id}: CRTC {} is inactive", crtc.crtc_id);
            continue;
        }

        let Some(plane) = primary_plane(device, &crtc)? else {
            debug!("skipping connector {id}: no plane scans out CRTC {}", crtc.crtc_id);
            continue;
        };

        return Ok(ChainCandidate {
            connector: conn,
            crtc,
            plane: plane.id,
        });
    }

    Err(Error::NoDisplayChain)
}

/// The kernel doesn't say which plane is a CRTC's primary, so we take the
/// one currently showing the CRTC's framebuffer on that CRTC.
fn primary_plane<D: KmsDevice + ?Sized>(
    device: &D,
    crtc: &CrtcState,
) -> Result<Option<PlaneState>, Error> {
    let plane_ids = device.plane_ids().map_err(Error::query("plane resources"))?;
    for id in plane_ids {
        let plane = device.plane_state(id).map_err(Error::query("plane"))?;
        if plane.crtc_id == crtc.crtc_id && plane.fb_id == crtc.fb_id {
            return Ok(Some(plane));
        }
    }
    Ok(None)
}
