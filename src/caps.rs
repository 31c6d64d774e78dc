use log::{debug, info};

use crate::device::KmsDevice;
use crate::DeviceCap;

/// What a device's driver supports, as far as presentation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    /// Framebuffers can be created with explicit format modifiers.
    pub addfb2_modifiers: bool,
    /// Event timestamps use `CLOCK_MONOTONIC`.
    pub timestamp_monotonic: bool,
    /// Flip-complete events say which CRTC flipped.
    pub crtc_in_vblank_event: bool,
    pub dumb_buffer: bool,
}

impl DeviceCapabilities {
    /// Query all four capabilities. A query the driver rejects counts as
    /// "not supported", so this never fails.
    pub fn probe<D: KmsDevice + ?Sized>(dev: &D) -> Self {
        let supported = |cap: DeviceCap| match dev.device_cap(cap) {
            Ok(value) => value != 0,
            Err(e) => {
                debug!("capability {cap:?} query failed, assuming unsupported: {e}");
                false
            }
        };
        let caps = Self {
            addfb2_modifiers: supported(DeviceCap::AddFb2Modifiers),
            timestamp_monotonic: supported(DeviceCap::TimestampMonotonic),
            crtc_in_vblank_event: supported(DeviceCap::CrtcInVblankEvent),
            dumb_buffer: supported(DeviceCap::DumbBuffer),
        };
        info!("device capabilities: {caps:?}");
        caps
    }
}
