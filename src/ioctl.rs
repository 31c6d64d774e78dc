use core::ffi::c_ulong as ulong;
use core::ptr::null_mut;

use linux_io::fd::ioctl::{
    ioctl_no_arg, ioctl_write, ioctl_writeread, IoDevice, IoctlReqNoArgs, IoctlReqWrite,
    IoctlReqWriteRead,
};
use linux_unsafe::int;

pub struct DrmCardDevice;

impl IoDevice for DrmCardDevice {}

const DRM_IOCTL_BASE: ulong = 100;

#[allow(non_snake_case)]
const fn _IO(nr: ulong) -> ulong {
    linux_io::fd::ioctl::_IO(DRM_IOCTL_BASE, nr)
}

#[allow(non_snake_case)]
const fn _IOW<T>(nr: ulong) -> ulong {
    linux_io::fd::ioctl::_IOW(DRM_IOCTL_BASE, nr, core::mem::size_of::<T>() as _)
}

#[allow(non_snake_case)]
const fn _IOWR<T>(nr: ulong) -> ulong {
    linux_io::fd::ioctl::_IOWR(DRM_IOCTL_BASE, nr, core::mem::size_of::<T>() as _)
}

/// Fixed-point unsigned 16.16-bit number type, represented as [`u32`].
///
/// Plane source rectangles (`SRC_X`, `SRC_Y`, `SRC_W`, `SRC_H`) use this
/// representation.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct fixedu16_16(u32);

impl fixedu16_16 {
    #[inline(always)]
    pub const fn from_u16(v: u16) -> Self {
        Self((v as u32) << 16)
    }

    #[inline(always)]
    pub const fn as_raw_u32(self) -> u32 {
        self.0
    }
}

impl From<u16> for fixedu16_16 {
    #[inline(always)]
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

macro_rules! impl_zeroed {
    ($t:ty) => {
        impl $t {
            #[inline(always)]
            pub const fn zeroed() -> Self {
                // Safety: All of the field types in $t must
                // treat all-zeroes as a valid bit pattern.
                unsafe { ::core::mem::zeroed() }
            }
        }

        /// The default value is the result of [`Self::zeroed`].
        impl ::core::default::Default for $t {
            #[inline(always)]
            fn default() -> Self {
                Self::zeroed()
            }
        }
    };
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmVersion {
    pub version_major: int,
    pub version_minor: int,
    pub version_patchlevel: int,
    name_len: usize,
    name: *mut i8,
    date_len: usize,
    date: *mut i8,
    desc_len: usize,
    desc: *mut i8,
}

impl_zeroed!(DrmVersion);

impl DrmVersion {
    /// # Safety
    ///
    /// `ptr` must point to at least `len` writable bytes that remain valid
    /// for any subsequent ioctl call using this object.
    #[inline(always)]
    pub unsafe fn set_name_ptr(&mut self, ptr: *mut i8, len: usize) {
        self.name = ptr;
        self.name_len = len;
    }

    #[inline(always)]
    pub fn clear_name_ptr(&mut self) {
        self.name = null_mut();
        self.name_len = 0;
    }

    #[inline(always)]
    pub fn name_len(&self) -> usize {
        self.name_len
    }
}

pub const DRM_IOCTL_VERSION: IoctlReqWriteRead<DrmCardDevice, DrmVersion, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmVersion>(0x00)) };

pub const DRM_IOCTL_SET_MASTER: IoctlReqNoArgs<DrmCardDevice, int> =
    unsafe { ioctl_no_arg(_IO(0x1e)) };

pub const DRM_IOCTL_DROP_MASTER: IoctlReqNoArgs<DrmCardDevice, int> =
    unsafe { ioctl_no_arg(_IO(0x1f)) };

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmGetCap {
    pub capability: DrmCap,
    pub value: u64,
}

impl_zeroed!(DrmGetCap);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct DrmCap(pub u64);

pub const DRM_IOCTL_GET_CAP: IoctlReqWriteRead<DrmCardDevice, DrmGetCap, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmGetCap>(0x0c)) };

/// If set to 1, the driver supports creating "dumb buffers".
pub const DRM_CAP_DUMB_BUFFER: DrmCap = DrmCap(0x1);
/// If set to 1, the kernel reports event timestamps with `CLOCK_MONOTONIC`
/// rather than `CLOCK_REALTIME`.
pub const DRM_CAP_TIMESTAMP_MONOTONIC: DrmCap = DrmCap(0x6);
/// If set to 1, the driver accepts format modifiers when adding framebuffers.
pub const DRM_CAP_ADDFB2_MODIFIERS: DrmCap = DrmCap(0x10);
/// If set to 1, vblank and flip-complete events carry the id of the CRTC
/// they belong to.
///
/// Starting kernel version 4.12, this capability is always set to 1.
pub const DRM_CAP_CRTC_IN_VBLANK_EVENT: DrmCap = DrmCap(0x12);

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmSetClientCap {
    pub capability: DrmClientCap,
    pub value: u64,
}

impl_zeroed!(DrmSetClientCap);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct DrmClientCap(pub u64);

pub const DRM_IOCTL_SET_CLIENT_CAP: IoctlReqWrite<DrmCardDevice, DrmSetClientCap, int> =
    unsafe { ioctl_write(_IOW::<DrmSetClientCap>(0x0d)) };

/// If set to 1, the DRM core will expose all planes (overlay, primary, and
/// cursor) to userspace.
pub const DRM_CLIENT_CAP_UNIVERSAL_PLANES: DrmClientCap = DrmClientCap(2);

/// If set to 1, the DRM core will expose atomic properties to userspace.
pub const DRM_CLIENT_CAP_ATOMIC: DrmClientCap = DrmClientCap(3);

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeCardRes {
    fb_id_ptr: u64,
    crtc_id_ptr: u64,
    connector_id_ptr: u64,
    encoder_id_ptr: u64,
    count_fbs: u32,
    count_crtcs: u32,
    count_connectors: u32,
    count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl_zeroed!(DrmModeCardRes);

impl DrmModeCardRes {
    /// Point all four id arrays at caller-owned storage.
    ///
    /// # Safety
    ///
    /// Each pointer must refer to an array of `u32` at least as long as its
    /// count, valid for any subsequent ioctl call using this object.
    #[inline(always)]
    pub unsafe fn set_id_ptrs(
        &mut self,
        fbs: (*mut u32, u32),
        crtcs: (*mut u32, u32),
        connectors: (*mut u32, u32),
        encoders: (*mut u32, u32),
    ) {
        self.fb_id_ptr = fbs.0 as u64;
        self.count_fbs = fbs.1;
        self.crtc_id_ptr = crtcs.0 as u64;
        self.count_crtcs = crtcs.1;
        self.connector_id_ptr = connectors.0 as u64;
        self.count_connectors = connectors.1;
        self.encoder_id_ptr = encoders.0 as u64;
        self.count_encoders = encoders.1;
    }

    #[inline(always)]
    pub fn counts(&self) -> (u32, u32, u32, u32) {
        (
            self.count_fbs,
            self.count_crtcs,
            self.count_connectors,
            self.count_encoders,
        )
    }
}

pub const DRM_IOCTL_MODE_GETRESOURCES: IoctlReqWriteRead<DrmCardDevice, DrmModeCardRes, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmModeCardRes>(0xa0)) };

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DrmModeInfo {
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
    pub name: [core::ffi::c_char; 32],
}

impl_zeroed!(DrmModeInfo);

impl DrmModeInfo {
    /// The raw bytes of this mode, as expected in a `MODE_ID` property blob.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // Safety: DrmModeInfo is repr(C), has no padding, and every byte of
        // it is initialized.
        unsafe {
            core::slice::from_raw_parts(
                self as *const Self as *const u8,
                core::mem::size_of::<Self>(),
            )
        }
    }
}

pub const DRM_MODE_TYPE_PREFERRED: u32 = 1 << 3;

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetConnector {
    encoders_ptr: u64,
    modes_ptr: u64,
    props_ptr: u64,
    prop_values_ptr: u64,
    count_modes: u32,
    count_props: u32,
    count_encoders: u32,
    pub encoder_id: u32,
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: u32,
    pub mm_width: u32,
    pub mm_height: u32,
    pub subpixel: u32,
    #[doc(hidden)]
    pub _pad: u32,
}

impl_zeroed!(DrmModeGetConnector);

impl DrmModeGetConnector {
    /// # Safety
    ///
    /// `ptr` must point to at least `len` writable `u32` values.
    #[inline(always)]
    pub unsafe fn set_encoders_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.encoders_ptr = ptr as u64;
        self.count_encoders = len;
    }

    #[inline(always)]
    pub fn count_encoders(&self) -> u32 {
        self.count_encoders
    }

    /// # Safety
    ///
    /// `ptr` must point to at least `len` writable [`DrmModeInfo`] values.
    #[inline(always)]
    pub unsafe fn set_modes_ptr(&mut self, ptr: *mut DrmModeInfo, len: u32) {
        self.modes_ptr = ptr as u64;
        self.count_modes = len;
    }

    #[inline(always)]
    pub fn count_modes(&self) -> u32 {
        self.count_modes
    }

    /// # Safety
    ///
    /// `ids_ptr` and `vals_ptr` must each point to at least `len` writable
    /// elements.
    #[inline(always)]
    pub unsafe fn set_props_ptrs(&mut self, ids_ptr: *mut u32, vals_ptr: *mut u64, len: u32) {
        self.props_ptr = ids_ptr as u64;
        self.prop_values_ptr = vals_ptr as u64;
        self.count_props = len;
    }

    #[inline(always)]
    pub fn count_props(&self) -> u32 {
        self.count_props
    }
}

pub const DRM_IOCTL_MODE_GETCONNECTOR: IoctlReqWriteRead<DrmCardDevice, DrmModeGetConnector, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmModeGetConnector>(0xa7)) };

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

impl_zeroed!(DrmModeGetEncoder);

pub const DRM_IOCTL_MODE_GETENCODER: IoctlReqWriteRead<DrmCardDevice, DrmModeGetEncoder, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmModeGetEncoder>(0xa6)) };

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeCrtc {
    set_connectors_ptr: u64,
    count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: DrmModeInfo,
}

impl_zeroed!(DrmModeCrtc);

impl DrmModeCrtc {
    /// # Safety
    ///
    /// `ptr` must point to at least `len` readable `u32` connector ids.
    pub unsafe fn set_set_connectors_ptr(&mut self, ptr: *const u32, len: u32) {
        self.set_connectors_ptr = ptr as u64;
        self.count_connectors = len;
    }
}

pub const DRM_IOCTL_MODE_GETCRTC: IoctlReqWriteRead<DrmCardDevice, DrmModeCrtc, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmModeCrtc>(0xa1)) };

pub const DRM_IOCTL_MODE_SETCRTC: IoctlReqWriteRead<DrmCardDevice, DrmModeCrtc, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmModeCrtc>(0xa2)) };

/// Request that the kernel sends back a vblank event with the
/// [`crate::event::raw::DRM_EVENT_FLIP_COMPLETE`] type when the flip is done.
pub const DRM_MODE_PAGE_FLIP_EVENT: u32 = 0x01;
/// Request that the flip happens as soon as possible, without waiting for
/// vblank. This may tear.
pub const DRM_MODE_PAGE_FLIP_ASYNC: u32 = 0x02;

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeAtomic {
    pub flags: u32,
    count_objs: u32,
    objs_ptr: u64,
    count_props_ptr: u64,
    props_ptr: u64,
    prop_values_ptr: u64,
    pub reserved: u64,
    pub user_data: u64,
}

pub struct DrmModeAtomicPtrs {
    pub objs_ptr: *const u32,
    pub count_props_ptr: *const u32,
    pub count_objs: u32,

    pub props_ptr: *const u32,
    pub prop_values_ptr: *const u64,
}

impl_zeroed!(DrmModeAtomic);

impl DrmModeAtomic {
    /// # Safety
    ///
    /// The arrays behind `ptrs` must be consistent with each other and stay
    /// valid for any subsequent ioctl call using this object.
    #[inline(always)]
    pub unsafe fn set_ptrs(&mut self, ptrs: DrmModeAtomicPtrs) {
        self.objs_ptr = ptrs.objs_ptr as u64;
        self.count_props_ptr = ptrs.count_props_ptr as u64;
        self.count_objs = ptrs.count_objs;
        self.props_ptr = ptrs.props_ptr as u64;
        self.prop_values_ptr = ptrs.prop_values_ptr as u64;
    }
}

pub const DRM_IOCTL_MODE_ATOMIC: IoctlReqWriteRead<DrmCardDevice, DrmModeAtomic, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmModeAtomic>(0xbc)) };

/// Check whether the hardware accepts the configuration without applying it.
pub const DRM_MODE_ATOMIC_TEST_ONLY: u32 = 0x0100;

/// Return as soon as the kernel has validated the update instead of waiting
/// for it to reach the hardware.
pub const DRM_MODE_ATOMIC_NONBLOCK: u32 = 0x0200;

/// Allow the update to cause transient visible artifacts, which a full
/// mode-set requires. Without this flag such updates fail with `EINVAL`.
pub const DRM_MODE_ATOMIC_ALLOW_MODESET: u32 = 0x0400;

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeObjGetProperties {
    props_ptr: u64,
    prop_values_ptr: u64,
    count_props: u32,
    pub obj_id: u32,
    pub obj_type: u32,
}

impl_zeroed!(DrmModeObjGetProperties);

impl DrmModeObjGetProperties {
    /// # Safety
    ///
    /// `ids_ptr` and `values_ptr` must each point to at least `len` writable
    /// elements.
    pub unsafe fn set_prop_ptrs(&mut self, ids_ptr: *mut u32, values_ptr: *mut u64, len: u32) {
        self.props_ptr = ids_ptr as u64;
        self.prop_values_ptr = values_ptr as u64;
        self.count_props = len;
    }

    pub fn count_props(&self) -> u32 {
        self.count_props
    }
}

pub const DRM_IOCTL_MODE_OBJ_GETPROPERTIES: IoctlReqWriteRead<
    DrmCardDevice,
    DrmModeObjGetProperties,
    int,
> = unsafe { ioctl_writeread(_IOWR::<DrmModeObjGetProperties>(0xb9)) };

pub const DRM_MODE_OBJECT_CRTC: u32 = 0xcccccccc;
pub const DRM_MODE_OBJECT_CONNECTOR: u32 = 0xc0c0c0c0;
pub const DRM_MODE_OBJECT_ENCODER: u32 = 0xe0e0e0e0;
pub const DRM_MODE_OBJECT_PROPERTY: u32 = 0xb0b0b0b0;
pub const DRM_MODE_OBJECT_FB: u32 = 0xfbfbfbfb;
pub const DRM_MODE_OBJECT_BLOB: u32 = 0xbbbbbbbb;
pub const DRM_MODE_OBJECT_PLANE: u32 = 0xeeeeeeee;

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetPlaneRes {
    plane_id_ptr: u64,
    count_planes: u32,
}

impl_zeroed!(DrmModeGetPlaneRes);

impl DrmModeGetPlaneRes {
    /// # Safety
    ///
    /// `ptr` must point to at least `len` writable `u32` values.
    #[inline(always)]
    pub unsafe fn set_plane_id_ptr(&mut self, ptr: *mut u32, len: u32) {
        self.plane_id_ptr = ptr as u64;
        self.count_planes = len;
    }

    #[inline(always)]
    pub fn count_planes(&self) -> u32 {
        self.count_planes
    }
}

pub const DRM_IOCTL_MODE_GETPLANERESOURCES: IoctlReqWriteRead<
    DrmCardDevice,
    DrmModeGetPlaneRes,
    int,
> = unsafe { ioctl_writeread(_IOWR::<DrmModeGetPlaneRes>(0xb5)) };

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeGetPlane {
    pub plane_id: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub possible_crtcs: u32,
    pub gamma_size: u32,
    count_format_types: u32,
    format_type_ptr: u64,
}

impl_zeroed!(DrmModeGetPlane);

pub const DRM_IOCTL_MODE_GETPLANE: IoctlReqWriteRead<DrmCardDevice, DrmModeGetPlane, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmModeGetPlane>(0xb6)) };

#[repr(C)]
#[derive(Debug, Clone)]
pub struct DrmModeGetProperty {
    values_ptr: u64,
    enum_blob_ptr: u64,
    pub prop_id: u32,
    pub flags: u32,
    pub name: [u8; DRM_PROP_NAME_LEN],
    count_values: u32,
    count_enum_blobs: u32,
}

impl_zeroed!(DrmModeGetProperty);

/// Describes a property. Leaving both counts at zero retrieves just the
/// name and flags, which is all property resolution needs.
pub const DRM_IOCTL_MODE_GETPROPERTY: IoctlReqWriteRead<DrmCardDevice, DrmModeGetProperty, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmModeGetProperty>(0xaa)) };

pub const DRM_PROP_NAME_LEN: usize = 32;

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeCreateBlob {
    data: u64,
    length: u32,
    pub blob_id: u32,
}

impl_zeroed!(DrmModeCreateBlob);

impl DrmModeCreateBlob {
    /// Set the `data` and `length` fields.
    ///
    /// # Safety
    ///
    /// `ptr` must point to the start of an array of bytes of length `len`,
    /// and that pointer must remain valid throughout any subsequent ioctl
    /// calls using this object.
    pub unsafe fn set_data(&mut self, ptr: *const u8, len: u32) {
        self.data = ptr as u64;
        self.length = len;
    }
}

pub const DRM_IOCTL_MODE_CREATEPROPBLOB: IoctlReqWriteRead<DrmCardDevice, DrmModeCreateBlob, int> =
    unsafe { ioctl_writeread(_IOWR::<DrmModeCreateBlob>(0xbd)) };

#[repr(C)]
#[derive(Debug)]
pub struct DrmModeDestroyBlob {
    pub blob_id: u32,
}

impl_zeroed!(DrmModeDestroyBlob);

pub const DRM_IOCTL_MODE_DESTROYPROPBLOB: IoctlReqWriteRead<
    DrmCardDevice,
    DrmModeDestroyBlob,
    int,
> = unsafe { ioctl_writeread(_IOWR::<DrmModeDestroyBlob>(0xbe)) };
