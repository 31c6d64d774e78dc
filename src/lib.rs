//! Output discovery and atomic page-flip presentation for Linux DRM/KMS.
//!
//! The usual sequence is:
//!
//! 1. open a [`Card`] and [`Card::become_master`];
//! 2. [`DeviceCapabilities::probe`] to learn what the driver offers;
//! 3. [`DisplayOutputChain::discover`] one connected connector, its encoder,
//!    CRTC and primary plane;
//! 4. [`Presenter::start`] to mode-set the chain with a first framebuffer;
//! 5. call [`Presenter::handle_event`] whenever the device becomes readable.
//!    Each completed page flip asks the [`Renderer`] for the next framebuffer
//!    and schedules it for the following vblank.
#![no_std]

extern crate alloc;

use alloc::vec::Vec;

pub mod caps;
pub mod chain;
pub mod device;
pub mod event;
pub mod ioctl;
pub mod modeset;
pub mod present;
pub mod result;
mod util;

pub use caps::DeviceCapabilities;
pub use chain::{DisplayModeData, DisplayOutputChain};
pub use device::{CrtcConfig, KmsDevice};
pub use present::{FlipPolicy, FrameState, PresentConfig, PresentState, Presenter, Renderer};
pub use result::{Error, InitError, KernelError};

use modeset::{
    AtomicCommitFlags, AtomicRequest, BlobId, CardResources, ConnectorId, ConnectorState, CrtcId,
    CrtcState, EncoderId, EncoderState, FramebufferId, ModeProp, ObjectId, PlaneId, PlaneState,
    PropertyId, PropertyName,
};
use util::{retry_eintr, vec_zeroed};

/// Device capabilities that can be queried with [`KmsDevice::device_cap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceCap {
    DumbBuffer,
    TimestampMonotonic,
    AddFb2Modifiers,
    CrtcInVblankEvent,
}

impl From<DeviceCap> for ioctl::DrmCap {
    fn from(value: DeviceCap) -> Self {
        match value {
            DeviceCap::DumbBuffer => ioctl::DRM_CAP_DUMB_BUFFER,
            DeviceCap::TimestampMonotonic => ioctl::DRM_CAP_TIMESTAMP_MONOTONIC,
            DeviceCap::AddFb2Modifiers => ioctl::DRM_CAP_ADDFB2_MODIFIERS,
            DeviceCap::CrtcInVblankEvent => ioctl::DRM_CAP_CRTC_IN_VBLANK_EVENT,
        }
    }
}

/// Client capabilities that can be enabled with [`KmsDevice::set_client_cap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClientCap {
    UniversalPlanes,
    Atomic,
}

impl From<ClientCap> for ioctl::DrmClientCap {
    fn from(value: ClientCap) -> Self {
        match value {
            ClientCap::UniversalPlanes => ioctl::DRM_CLIENT_CAP_UNIVERSAL_PLANES,
            ClientCap::Atomic => ioctl::DRM_CLIENT_CAP_ATOMIC,
        }
    }
}

#[repr(transparent)]
pub struct Card {
    f: linux_io::File<ioctl::DrmCardDevice>,
}

impl Card {
    pub fn open(path: &core::ffi::CStr) -> Result<Self, InitError> {
        let f = linux_io::File::open(path, linux_io::OpenOptions::read_write())?;
        Self::from_file(f)
    }

    pub fn from_file<D>(f: linux_io::File<D>) -> Result<Self, InitError> {
        // We'll use the VERSION ioctl to decide whether this file
        // seems to be a DRM card device. To do that we need to
        // first optimistically convert it to a DrmCardDevice,
        // so that our ioctl constant will be compatible.
        // Safety: We'll return this new f only if our ioctl
        // probe is successful, which therefore suggests that
        // this ought to be a DRM card device.
        let f: linux_io::File<ioctl::DrmCardDevice> = unsafe { f.to_device(ioctl::DrmCardDevice) };
        let mut v = ioctl::DrmVersion::zeroed();
        f.ioctl(ioctl::DRM_IOCTL_VERSION, &mut v)?;
        Ok(Self { f })
    }

    /// # Safety
    ///
    /// `f` must be a DRM card device.
    pub unsafe fn from_file_unchecked<D>(f: linux_io::File<D>) -> Self {
        let f: linux_io::File<ioctl::DrmCardDevice> = unsafe { f.to_device(ioctl::DrmCardDevice) };
        Self { f }
    }

    /// Take DRM master, which atomic mode-setting requires.
    pub fn become_master(&self) -> Result<(), KernelError> {
        self.f.ioctl(ioctl::DRM_IOCTL_SET_MASTER, ())?;
        Ok(())
    }

    pub fn drop_master(&self) -> Result<(), KernelError> {
        self.f.ioctl(ioctl::DRM_IOCTL_DROP_MASTER, ())?;
        Ok(())
    }

    pub fn driver_name(&self) -> Result<Vec<u8>, KernelError> {
        let mut v = ioctl::DrmVersion::zeroed();
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_VERSION, &mut v))?;
        let len = v.name_len();
        let mut name = vec_zeroed::<u8>(len)?;

        let mut v = ioctl::DrmVersion::zeroed();
        // Safety: name has exactly len bytes and outlives the request.
        unsafe { v.set_name_ptr(name.as_mut_ptr() as *mut i8, len) };
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_VERSION, &mut v))?;
        name.truncate(v.name_len());
        v.clear_name_ptr();
        Ok(name)
    }

    pub fn close(self) -> linux_io::result::Result<()> {
        let f = self.take_file();
        f.close()
    }

    pub fn take_file(self) -> linux_io::File<ioctl::DrmCardDevice> {
        self.f
    }

    pub fn borrow_file(&self) -> &linux_io::File<ioctl::DrmCardDevice> {
        &self.f
    }
}

impl KmsDevice for Card {
    fn device_cap(&self, cap: DeviceCap) -> Result<u64, KernelError> {
        let mut tmp = ioctl::DrmGetCap {
            capability: cap.into(),
            value: 0,
        };
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_GET_CAP, &mut tmp))?;
        Ok(tmp.value)
    }

    fn set_client_cap(&self, cap: ClientCap, value: u64) -> Result<(), KernelError> {
        let tmp = ioctl::DrmSetClientCap {
            capability: cap.into(),
            value,
        };
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_SET_CLIENT_CAP, &tmp))?;
        Ok(())
    }

    fn resources(&self) -> Result<CardResources, KernelError> {
        // Connectors can be hotplugged between our two requests, in which
        // case the counts change and we start over.
        loop {
            let mut tmp = ioctl::DrmModeCardRes::zeroed();
            retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETRESOURCES, &mut tmp))?;
            let counts = tmp.counts();
            let (n_fbs, n_crtcs, n_conns, n_encs) = counts;

            let mut fb_ids = vec_zeroed::<u32>(n_fbs as usize)?;
            let mut crtc_ids = vec_zeroed::<u32>(n_crtcs as usize)?;
            let mut connector_ids = vec_zeroed::<u32>(n_conns as usize)?;
            let mut encoder_ids = vec_zeroed::<u32>(n_encs as usize)?;

            let mut tmp = ioctl::DrmModeCardRes::zeroed();
            // Safety: each vec has exactly the length we report for it.
            unsafe {
                tmp.set_id_ptrs(
                    (fb_ids.as_mut_ptr(), n_fbs),
                    (crtc_ids.as_mut_ptr(), n_crtcs),
                    (connector_ids.as_mut_ptr(), n_conns),
                    (encoder_ids.as_mut_ptr(), n_encs),
                )
            };
            retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETRESOURCES, &mut tmp))?;
            if tmp.counts() != counts {
                continue;
            }

            return Ok(CardResources {
                fb_ids: fb_ids.into_iter().map(FramebufferId).collect(),
                crtc_ids: crtc_ids.into_iter().map(CrtcId).collect(),
                connector_ids: connector_ids.into_iter().map(ConnectorId).collect(),
                encoder_ids: encoder_ids.into_iter().map(EncoderId).collect(),
                min_width: tmp.min_width,
                max_width: tmp.max_width,
                min_height: tmp.min_height,
                max_height: tmp.max_height,
            });
        }
    }

    fn plane_ids(&self) -> Result<Vec<PlaneId>, KernelError> {
        loop {
            let mut tmp = ioctl::DrmModeGetPlaneRes::zeroed();
            retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETPLANERESOURCES, &mut tmp))?;
            let count = tmp.count_planes();
            let mut ids = vec_zeroed::<u32>(count as usize)?;

            let mut tmp = ioctl::DrmModeGetPlaneRes::zeroed();
            // Safety: ids has exactly count elements.
            unsafe { tmp.set_plane_id_ptr(ids.as_mut_ptr(), count) };
            retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETPLANERESOURCES, &mut tmp))?;
            if tmp.count_planes() != count {
                continue;
            }
            return Ok(ids.into_iter().map(PlaneId).collect());
        }
    }

    fn connector_state(&self, id: ConnectorId) -> Result<ConnectorState, KernelError> {
        loop {
            let mut tmp = ioctl::DrmModeGetConnector::zeroed();
            tmp.connector_id = id.0;
            retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETCONNECTOR, &mut tmp))?;
            let n_modes = tmp.count_modes();
            let n_props = tmp.count_props();
            let n_encs = tmp.count_encoders();

            let mut modes = vec_zeroed::<ioctl::DrmModeInfo>(n_modes as usize)?;
            let mut prop_ids = vec_zeroed::<u32>(n_props as usize)?;
            let mut prop_values = vec_zeroed::<u64>(n_props as usize)?;
            let mut encoder_ids = vec_zeroed::<u32>(n_encs as usize)?;

            let mut tmp = ioctl::DrmModeGetConnector::zeroed();
            tmp.connector_id = id.0;
            // Safety: each vec has exactly the length we report for it.
            unsafe {
                tmp.set_modes_ptr(modes.as_mut_ptr(), n_modes);
                tmp.set_props_ptrs(prop_ids.as_mut_ptr(), prop_values.as_mut_ptr(), n_props);
                tmp.set_encoders_ptr(encoder_ids.as_mut_ptr(), n_encs);
            }
            retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETCONNECTOR, &mut tmp))?;
            if tmp.count_modes() != n_modes
                || tmp.count_props() != n_props
                || tmp.count_encoders() != n_encs
            {
                continue;
            }

            return Ok(ConnectorState {
                id: ConnectorId(tmp.connector_id),
                current_encoder_id: EncoderId(tmp.encoder_id),
                connector_type: tmp.connector_type.into(),
                connector_type_id: tmp.connector_type_id,
                connection_state: tmp.connection.into(),
                width_mm: tmp.mm_width,
                height_mm: tmp.mm_height,
                modes: modes.into_iter().map(Into::into).collect(),
                props: prop_ids
                    .into_iter()
                    .zip(prop_values)
                    .map(|(id, value)| ModeProp {
                        prop_id: PropertyId(id),
                        value,
                    })
                    .collect(),
                available_encoder_ids: encoder_ids.into_iter().map(EncoderId).collect(),
            });
        }
    }

    fn encoder_state(&self, id: EncoderId) -> Result<EncoderState, KernelError> {
        let mut tmp = ioctl::DrmModeGetEncoder::zeroed();
        tmp.encoder_id = id.0;
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETENCODER, &mut tmp))?;
        Ok(tmp.into())
    }

    fn crtc_state(&self, id: CrtcId) -> Result<CrtcState, KernelError> {
        let mut tmp = ioctl::DrmModeCrtc::zeroed();
        tmp.crtc_id = id.0;
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETCRTC, &mut tmp))?;
        Ok(tmp.into())
    }

    fn plane_state(&self, id: PlaneId) -> Result<PlaneState, KernelError> {
        let mut tmp = ioctl::DrmModeGetPlane::zeroed();
        tmp.plane_id = id.0;
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETPLANE, &mut tmp))?;
        Ok(tmp.into())
    }

    fn object_properties(&self, obj: ObjectId) -> Result<Vec<ModeProp>, KernelError> {
        let (obj_type, obj_id) = obj.as_raw_type_and_id();
        loop {
            let mut tmp = ioctl::DrmModeObjGetProperties::zeroed();
            tmp.obj_id = obj_id;
            tmp.obj_type = obj_type;
            retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_OBJ_GETPROPERTIES, &mut tmp))?;
            let count = tmp.count_props();
            let mut ids = vec_zeroed::<u32>(count as usize)?;
            let mut values = vec_zeroed::<u64>(count as usize)?;

            let mut tmp = ioctl::DrmModeObjGetProperties::zeroed();
            tmp.obj_id = obj_id;
            tmp.obj_type = obj_type;
            // Safety: both vecs have exactly count elements.
            unsafe { tmp.set_prop_ptrs(ids.as_mut_ptr(), values.as_mut_ptr(), count) };
            retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_OBJ_GETPROPERTIES, &mut tmp))?;
            if tmp.count_props() != count {
                continue;
            }

            return Ok(ids
                .into_iter()
                .zip(values)
                .map(|(id, value)| ModeProp {
                    prop_id: PropertyId(id),
                    value,
                })
                .collect());
        }
    }

    fn property_name(&self, prop: PropertyId) -> Result<PropertyName, KernelError> {
        let mut tmp = ioctl::DrmModeGetProperty::zeroed();
        tmp.prop_id = prop.0;
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_GETPROPERTY, &mut tmp))?;
        Ok(PropertyName::from_raw(tmp.name))
    }

    fn create_property_blob(&self, data: &[u8]) -> Result<BlobId, KernelError> {
        let len = u32::try_from(data.len()).map_err(|_| KernelError::Invalid)?;
        let mut tmp = ioctl::DrmModeCreateBlob::zeroed();
        // Safety: data outlives the request and has exactly len bytes.
        unsafe { tmp.set_data(data.as_ptr(), len) };
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_CREATEPROPBLOB, &mut tmp))?;
        Ok(BlobId(tmp.blob_id))
    }

    fn destroy_property_blob(&self, id: BlobId) -> Result<(), KernelError> {
        let mut tmp = ioctl::DrmModeDestroyBlob { blob_id: id.0 };
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_DESTROYPROPBLOB, &mut tmp))?;
        Ok(())
    }

    fn atomic_commit(
        &self,
        req: &AtomicRequest,
        flags: AtomicCommitFlags,
        user_data: u64,
    ) -> Result<(), KernelError> {
        let raw = req.for_ioctl_req();
        let mut tmp = ioctl::DrmModeAtomic::zeroed();
        tmp.flags = flags.bits();
        tmp.user_data = user_data;
        // Safety: raw owns all four arrays until after the request, and
        // for_ioctl_req keeps their lengths consistent with each other.
        unsafe {
            tmp.set_ptrs(ioctl::DrmModeAtomicPtrs {
                objs_ptr: raw.obj_ids.as_ptr(),
                count_props_ptr: raw.obj_prop_counts.as_ptr(),
                count_objs: raw.obj_ids.len() as u32,
                props_ptr: raw.prop_ids.as_ptr(),
                prop_values_ptr: raw.prop_values.as_ptr(),
            })
        };
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_ATOMIC, &mut tmp))?;
        Ok(())
    }

    fn set_crtc(&self, config: &CrtcConfig<'_>) -> Result<(), KernelError> {
        let n_conns = u32::try_from(config.connectors.len()).map_err(|_| KernelError::Invalid)?;
        let mut tmp = ioctl::DrmModeCrtc::zeroed();
        tmp.crtc_id = config.crtc_id.0;
        tmp.fb_id = config.fb_id.0;
        if let Some(mode) = config.mode {
            tmp.mode = mode.into();
            tmp.mode_valid = 1;
        }
        // Safety: ConnectorId is a transparent u32, and the slice outlives
        // the request.
        unsafe { tmp.set_set_connectors_ptr(config.connectors.as_ptr() as *const u32, n_conns) };
        retry_eintr!(self.f.ioctl(ioctl::DRM_IOCTL_MODE_SETCRTC, &mut tmp))?;
        Ok(())
    }

    fn read_event_bytes(&self, buf: &mut [u8]) -> Result<usize, KernelError> {
        // EAGAIN only means a non-blocking descriptor has nothing queued.
        loop {
            match self.f.read(buf) {
                Err(linux_io::result::EINTR) => continue,
                Err(linux_io::result::EAGAIN) => return Ok(0),
                other => return Ok(other?),
            }
        }
    }
}
