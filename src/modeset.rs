use alloc::vec::Vec;
use core::fmt;

mod atomic;
mod blob;
mod props;

pub use atomic::*;
pub use blob::*;
pub use props::*;

macro_rules! object_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Whether this is the zero id, which the kernel uses for "none".
            #[inline(always)]
            pub const fn is_none(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

object_id!(FramebufferId);
object_id!(CrtcId);
object_id!(ConnectorId);
object_id!(EncoderId);
object_id!(PlaneId);
object_id!(PropertyId);
object_id!(BlobId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ObjectId {
    Crtc(CrtcId),
    Connector(ConnectorId),
    Encoder(EncoderId),
    Property(PropertyId),
    Framebuffer(FramebufferId),
    Blob(BlobId),
    Plane(PlaneId),
}

impl ObjectId {
    pub fn as_raw_type_and_id(self) -> (u32, u32) {
        use crate::ioctl;
        match self {
            ObjectId::Crtc(id) => (ioctl::DRM_MODE_OBJECT_CRTC, id.0),
            ObjectId::Connector(id) => (ioctl::DRM_MODE_OBJECT_CONNECTOR, id.0),
            ObjectId::Encoder(id) => (ioctl::DRM_MODE_OBJECT_ENCODER, id.0),
            ObjectId::Property(id) => (ioctl::DRM_MODE_OBJECT_PROPERTY, id.0),
            ObjectId::Framebuffer(id) => (ioctl::DRM_MODE_OBJECT_FB, id.0),
            ObjectId::Blob(id) => (ioctl::DRM_MODE_OBJECT_BLOB, id.0),
            ObjectId::Plane(id) => (ioctl::DRM_MODE_OBJECT_PLANE, id.0),
        }
    }

    #[inline]
    pub fn raw_id(self) -> u32 {
        self.as_raw_type_and_id().1
    }
}

macro_rules! object_id_from {
    ($t:ident, $variant:ident) => {
        impl From<$t> for ObjectId {
            fn from(value: $t) -> Self {
                Self::$variant(value)
            }
        }
    };
}

object_id_from!(CrtcId, Crtc);
object_id_from!(ConnectorId, Connector);
object_id_from!(EncoderId, Encoder);
object_id_from!(PropertyId, Property);
object_id_from!(FramebufferId, Framebuffer);
object_id_from!(BlobId, Blob);
object_id_from!(PlaneId, Plane);

#[derive(Debug, Clone, Default)]
pub struct CardResources {
    pub fb_ids: Vec<FramebufferId>,
    pub crtc_ids: Vec<CrtcId>,
    pub connector_ids: Vec<ConnectorId>,
    pub encoder_ids: Vec<EncoderId>,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

#[derive(Debug, Clone)]
pub struct ConnectorState {
    pub id: ConnectorId,
    pub current_encoder_id: EncoderId,
    pub connector_type: ConnectorType,
    pub connector_type_id: u32,
    pub connection_state: ConnectionState,
    pub width_mm: u32,
    pub height_mm: u32,
    pub modes: Vec<ModeInfo>,
    pub props: Vec<ModeProp>,
    pub available_encoder_ids: Vec<EncoderId>,
}

impl ConnectorState {
    pub fn preferred_mode(&self) -> Option<&ModeInfo> {
        self.modes
            .iter()
            .find(|mode| (mode.typ & crate::ioctl::DRM_MODE_TYPE_PREFERRED) != 0)
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u32)]
pub enum ConnectionState {
    Connected = 1,
    Disconnected = 2,
    Unknown = 3,
}

impl From<u32> for ConnectionState {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Disconnected,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum ConnectorType {
    Unknown = 0,
    Vga = 1,
    DviI = 2,
    DviD = 3,
    DviA = 4,
    Composite = 5,
    SVideo = 6,
    Lvds = 7,
    Component = 8,
    NinePinDin = 9,
    DisplayPort = 10,
    HdmiA = 11,
    HdmiB = 12,
    Tv = 13,
    Edp = 14,
    Virtual = 15,
    Dsi = 16,
    Dpi = 17,
    Writeback = 18,
    Spi = 19,
    Usb = 20,
    Other = !0, // not a kernel value; stands in for types newer than this list
}

impl From<u32> for ConnectorType {
    #[inline]
    fn from(value: u32) -> Self {
        if value < 21 {
            // Safety: all values in this range are valid representations
            // of this enum, as described above.
            unsafe { core::mem::transmute::<u32, Self>(value) }
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncoderState {
    pub encoder_id: EncoderId,
    pub encoder_type: u32,
    pub current_crtc_id: CrtcId,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

impl From<crate::ioctl::DrmModeGetEncoder> for EncoderState {
    fn from(value: crate::ioctl::DrmModeGetEncoder) -> Self {
        Self {
            encoder_id: EncoderId(value.encoder_id),
            encoder_type: value.encoder_type,
            current_crtc_id: CrtcId(value.crtc_id),
            possible_crtcs: value.possible_crtcs,
            possible_clones: value.possible_clones,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrtcState {
    pub crtc_id: CrtcId,
    pub fb_id: FramebufferId,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: ModeInfo,
}

impl CrtcState {
    /// A CRTC is scanning out when it has a framebuffer bound.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.fb_id.is_none()
    }
}

impl From<crate::ioctl::DrmModeCrtc> for CrtcState {
    fn from(value: crate::ioctl::DrmModeCrtc) -> Self {
        Self {
            crtc_id: CrtcId(value.crtc_id),
            fb_id: FramebufferId(value.fb_id),
            x: value.x,
            y: value.y,
            gamma_size: value.gamma_size,
            mode_valid: value.mode_valid,
            mode: value.mode.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaneState {
    pub id: PlaneId,
    pub crtc_id: CrtcId,
    pub fb_id: FramebufferId,
    pub possible_crtcs: u32,
    pub gamma_size: u32,
}

impl From<crate::ioctl::DrmModeGetPlane> for PlaneState {
    fn from(value: crate::ioctl::DrmModeGetPlane) -> Self {
        Self {
            id: PlaneId(value.plane_id),
            crtc_id: CrtcId(value.crtc_id),
            fb_id: FramebufferId(value.fb_id),
            possible_crtcs: value.possible_crtcs,
            gamma_size: value.gamma_size,
        }
    }
}

/// A display mode, as advertised by a connector or programmed into a CRTC.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModeInfo {
    pub name: Vec<u8>,
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub typ: u32,
}

impl ModeInfo {
    /// The name as text, or `"?"` if the kernel gave us something that
    /// isn't UTF-8.
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name).unwrap_or("?")
    }
}

impl fmt::Display for ModeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}@{}Hz)",
            self.name_str(),
            self.hdisplay,
            self.vdisplay,
            self.vrefresh
        )
    }
}

impl From<crate::ioctl::DrmModeInfo> for ModeInfo {
    fn from(value: crate::ioctl::DrmModeInfo) -> Self {
        let name = value
            .name
            .iter()
            .take_while(|c| **c != 0)
            .map(|c| *c as u8)
            .collect();
        Self {
            name,
            clock: value.clock,
            hdisplay: value.hdisplay,
            hsync_start: value.hsync_start,
            hsync_end: value.hsync_end,
            htotal: value.htotal,
            hskew: value.hskew,
            vdisplay: value.vdisplay,
            vsync_start: value.vsync_start,
            vsync_end: value.vsync_end,
            vtotal: value.vtotal,
            vscan: value.vscan,
            vrefresh: value.vrefresh,
            flags: value.flags,
            typ: value.typ,
        }
    }
}

impl From<&ModeInfo> for crate::ioctl::DrmModeInfo {
    fn from(value: &ModeInfo) -> Self {
        let mut name: [core::ffi::c_char; 32] = [0; 32];
        // The last byte always stays zero so the kernel sees a terminated string.
        for (dst, src) in name[..31].iter_mut().zip(value.name.iter()) {
            *dst = *src as core::ffi::c_char;
        }
        Self {
            clock: value.clock,
            hdisplay: value.hdisplay,
            hsync_start: value.hsync_start,
            hsync_end: value.hsync_end,
            htotal: value.htotal,
            hskew: value.hskew,
            vdisplay: value.vdisplay,
            vsync_start: value.vsync_start,
            vsync_end: value.vsync_end,
            vtotal: value.vtotal,
            vscan: value.vscan,
            vrefresh: value.vrefresh,
            flags: value.flags,
            typ: value.typ,
            name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn mode_name_survives_kernel_representation() {
        let mode = ModeInfo {
            name: b"1920x1080".to_vec(),
            hdisplay: 1920,
            vdisplay: 1080,
            vrefresh: 60,
            ..ModeInfo::default()
        };
        let raw = crate::ioctl::DrmModeInfo::from(&mode);
        assert_eq!(raw.as_bytes().len(), 68);
        assert_eq!(ModeInfo::from(raw), mode);
    }

    #[test]
    fn overlong_mode_name_is_truncated_and_terminated() {
        let mode = ModeInfo {
            name: vec![b'x'; 40],
            ..ModeInfo::default()
        };
        let raw = crate::ioctl::DrmModeInfo::from(&mode);
        assert_eq!(raw.name[31], 0);
        assert_eq!(ModeInfo::from(raw).name.len(), 31);
    }

    #[test]
    fn preferred_mode_uses_type_flag() {
        let plain = ModeInfo {
            hdisplay: 640,
            ..ModeInfo::default()
        };
        let preferred = ModeInfo {
            hdisplay: 1280,
            typ: crate::ioctl::DRM_MODE_TYPE_PREFERRED,
            ..ModeInfo::default()
        };
        let conn = ConnectorState {
            id: ConnectorId(1),
            current_encoder_id: EncoderId(2),
            connector_type: ConnectorType::from(11),
            connector_type_id: 1,
            connection_state: ConnectionState::from(1),
            width_mm: 0,
            height_mm: 0,
            modes: vec![plain, preferred],
            props: vec![],
            available_encoder_ids: vec![],
        };
        assert_eq!(conn.connector_type, ConnectorType::HdmiA);
        assert_eq!(conn.preferred_mode().map(|m| m.hdisplay), Some(1280));
    }
}
