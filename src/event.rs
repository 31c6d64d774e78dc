pub mod raw;

use alloc::vec::Vec;

use crate::modeset::CrtcId;

#[derive(Debug, Clone)]
pub enum DrmEvent {
    /// An event of a generic type that's defined for all DRM drivers.
    Generic(GenericDrmEvent),

    /// An event of a driver-specific type.
    Driver(UnsupportedDrmEvent),

    /// An event that is neither driver-specific nor recognized as a
    /// supported generic event type, or a generic event whose body is
    /// too short for its type.
    Unsupported(UnsupportedDrmEvent),
}

impl DrmEvent {
    pub fn from_raw(raw: &raw::DrmEvent<'_>) -> Self {
        if raw.hdr.typ >= raw::DRM_EVENT_DRIVER_BASE {
            Self::Driver(UnsupportedDrmEvent::from_raw(raw))
        } else if let Some(evt) = GenericDrmEvent::try_from_raw(raw) {
            Self::Generic(evt)
        } else {
            Self::Unsupported(UnsupportedDrmEvent::from_raw(raw))
        }
    }

    /// The flip that completed, if this is a page-flip completion.
    pub fn as_flip_complete(&self) -> Option<&DrmVblankEvent> {
        match self {
            Self::Generic(GenericDrmEvent::FlipComplete(evt)) => Some(evt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub enum GenericDrmEvent {
    VBlank(DrmVblankEvent),
    FlipComplete(DrmVblankEvent),
    CrtcSequence(DrmCrtcSequenceEvent),
}

impl GenericDrmEvent {
    pub fn try_from_raw(raw: &raw::DrmEvent<'_>) -> Option<Self> {
        match raw.hdr.typ {
            raw::DRM_EVENT_VBLANK => {
                // Safety: All bit patterns are defined for DrmEventVblank
                let body = unsafe { raw.body_as::<raw::DrmEventVblank>() }?;
                Some(Self::VBlank(body.into()))
            }
            raw::DRM_EVENT_FLIP_COMPLETE => {
                // Safety: All bit patterns are defined for DrmEventVblank
                let body = unsafe { raw.body_as::<raw::DrmEventVblank>() }?;
                Some(Self::FlipComplete(body.into()))
            }
            raw::DRM_EVENT_CRTC_SEQUENCE => {
                // Safety: All bit patterns are defined for DrmEventCrtcSequence
                let body = unsafe { raw.body_as::<raw::DrmEventCrtcSequence>() }?;
                Some(Self::CrtcSequence(body.into()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrmVblankEvent {
    pub user_data: u64,
    pub tv_sec: u32,
    pub tv_usec: u32,
    pub sequence: u32,
    /// Zero on kernels without [`crate::DeviceCap::CrtcInVblankEvent`].
    pub crtc_id: CrtcId,
}

impl From<raw::DrmEventVblank> for DrmVblankEvent {
    fn from(value: raw::DrmEventVblank) -> Self {
        Self {
            user_data: value.user_data,
            tv_sec: value.tv_sec,
            tv_usec: value.tv_usec,
            sequence: value.sequence,
            crtc_id: CrtcId(value.crtc_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrmCrtcSequenceEvent {
    pub user_data: u64,
    pub time_ns: i64,
    pub sequence: u64,
}

impl From<raw::DrmEventCrtcSequence> for DrmCrtcSequenceEvent {
    fn from(value: raw::DrmEventCrtcSequence) -> Self {
        Self {
            user_data: value.user_data,
            time_ns: value.time_ns,
            sequence: value.sequence,
        }
    }
}

/// Raw owned representation of a DRM event of a type that this
/// crate doesn't directly support.
#[derive(Debug, Clone)]
pub struct UnsupportedDrmEvent {
    typ: u32,
    body: Vec<u8>,
}

impl UnsupportedDrmEvent {
    pub fn from_raw(raw: &raw::DrmEvent<'_>) -> Self {
        Self {
            typ: raw.hdr.typ,
            body: raw.body_bytes().to_vec(),
        }
    }

    #[inline(always)]
    pub fn typ(&self) -> u32 {
        self.typ
    }

    /// Get the body of the event as a raw byte slice.
    #[inline(always)]
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }
}
