use alloc::vec::Vec;

use crate::modeset::{
    AtomicCommitFlags, AtomicRequest, BlobId, CardResources, ConnectorId, ConnectorState, CrtcId,
    CrtcState, EncoderId, EncoderState, FramebufferId, ModeInfo, ModeProp, ObjectId, PlaneId,
    PlaneState, PropertyId, PropertyName,
};
use crate::result::KernelError;
use crate::{ClientCap, DeviceCap};

/// Arguments for a legacy (non-atomic) CRTC configuration.
#[derive(Debug, Clone, Copy)]
pub struct CrtcConfig<'a> {
    pub crtc_id: CrtcId,
    /// Zero detaches the CRTC from any framebuffer.
    pub fb_id: FramebufferId,
    pub connectors: &'a [ConnectorId],
    /// `None` turns the CRTC off.
    pub mode: Option<&'a ModeInfo>,
}

/// The kernel mode-setting requests that output discovery and presentation
/// rely on.
///
/// [`crate::Card`] implements this with ioctls on a DRM device node. Anything
/// else that implements it (a recording wrapper, an in-memory fake for tests)
/// can stand in for a real device.
pub trait KmsDevice {
    /// Read a device capability value. Unknown capabilities fail with
    /// [`KernelError::Invalid`].
    fn device_cap(&self, cap: DeviceCap) -> Result<u64, KernelError>;

    fn set_client_cap(&self, cap: ClientCap, value: u64) -> Result<(), KernelError>;

    fn resources(&self) -> Result<CardResources, KernelError>;

    /// Ids of all planes, which [`KmsDevice::resources`] doesn't report.
    fn plane_ids(&self) -> Result<Vec<PlaneId>, KernelError>;

    fn connector_state(&self, id: ConnectorId) -> Result<ConnectorState, KernelError>;

    fn encoder_state(&self, id: EncoderId) -> Result<EncoderState, KernelError>;

    fn crtc_state(&self, id: CrtcId) -> Result<CrtcState, KernelError>;

    fn plane_state(&self, id: PlaneId) -> Result<PlaneState, KernelError>;

    /// The ids and current values of all properties of an object.
    fn object_properties(&self, obj: ObjectId) -> Result<Vec<ModeProp>, KernelError>;

    fn property_name(&self, prop: PropertyId) -> Result<PropertyName, KernelError>;

    fn create_property_blob(&self, data: &[u8]) -> Result<BlobId, KernelError>;

    fn destroy_property_blob(&self, id: BlobId) -> Result<(), KernelError>;

    fn atomic_commit(
        &self,
        req: &AtomicRequest,
        flags: AtomicCommitFlags,
        user_data: u64,
    ) -> Result<(), KernelError>;

    fn set_crtc(&self, config: &CrtcConfig<'_>) -> Result<(), KernelError>;

    /// Read whatever pending events fit into `buf`, returning the number of
    /// bytes written. Blocks if there are none, unless the device was
    /// opened non-blocking, in which case it returns `Ok(0)`.
    fn read_event_bytes(&self, buf: &mut [u8]) -> Result<usize, KernelError>;
}
