/// A raw DRM event borrowed from a buffer read from a card device.
///
/// DRM returns events of varying sizes. Use [`DrmEvent::from_bytes`] or
/// [`events_from_bytes`] to split a buffer into events.
#[derive(Clone, Copy, Debug)]
pub struct DrmEvent<'a> {
    pub hdr: DrmEventHeader,
    body: &'a [u8],
}

impl<'a> DrmEvent<'a> {
    pub const HEADER_LEN: usize = core::mem::size_of::<DrmEventHeader>();

    /// Given a byte slice that contains zero or more DRM
    /// events, obtain the first event and a slice of the remaining
    /// bytes, or `None` if there aren't enough bytes left to extract
    /// even one event.
    ///
    /// The returned event does not necessarily have valid
    /// content. The only checking done by this function is
    /// that the length claimed in the header covers at least the
    /// header itself and fits in the slice.
    pub fn from_bytes(buf: &'a [u8]) -> Option<(Self, &'a [u8])> {
        if buf.len() < Self::HEADER_LEN {
            return None;
        }
        let hdr = DrmEventHeader {
            typ: u32::from_ne_bytes(buf[0..4].try_into().ok()?),
            len: u32::from_ne_bytes(buf[4..8].try_into().ok()?),
        };
        let claimed_len = hdr.len as usize;
        if claimed_len < Self::HEADER_LEN || buf.len() < claimed_len {
            // Either the header is nonsense or it claims more bytes than
            // we have left. We treat both as the end of the events.
            return None;
        }
        let body = &buf[Self::HEADER_LEN..claimed_len];
        Some((Self { hdr, body }, &buf[claimed_len..]))
    }

    /// Get the length of the body in bytes.
    #[inline(always)]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Get the body of the event as a raw byte slice.
    #[inline(always)]
    pub fn body_bytes(&self) -> &'a [u8] {
        self.body
    }

    /// Copy the body out as a value of `T`, if it's long enough.
    ///
    /// # Safety
    ///
    /// Caller must ensure that the raw body is a valid
    /// representation of `T`. If all bit patterns are
    /// valid representations of `T` then this is always
    /// safe but the result might still be nonsense.
    pub unsafe fn body_as<T: Copy>(&self) -> Option<T> {
        if self.body.len() < core::mem::size_of::<T>() {
            return None;
        }
        // The read buffer has no particular alignment, hence the unaligned read.
        Some(unsafe { core::ptr::read_unaligned(self.body.as_ptr() as *const T) })
    }
}

/// Raw DRM event header.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrmEventHeader {
    pub typ: u32,
    pub len: u32,
}

/// Vertical blanking event, sent in response to `DRM_IOCTL_WAIT_VBLANK`.
///
/// The event body type is [`DrmEventVblank`].
pub const DRM_EVENT_VBLANK: u32 = 0x01;

/// Page-flip completion event, sent for an atomic commit or legacy page
/// flip requested with the `DRM_MODE_PAGE_FLIP_EVENT` flag.
///
/// The event body type is [`DrmEventVblank`].
pub const DRM_EVENT_FLIP_COMPLETE: u32 = 0x02;

/// CRTC sequence event, sent in response to `DRM_IOCTL_CRTC_QUEUE_SEQUENCE`.
///
/// The event body type is [`DrmEventCrtcSequence`].
pub const DRM_EVENT_CRTC_SEQUENCE: u32 = 0x03;

/// Event types at or above this value are driver-specific.
pub const DRM_EVENT_DRIVER_BASE: u32 = 0x80000000;

/// The body of a [`DRM_EVENT_VBLANK`] or [`DRM_EVENT_FLIP_COMPLETE`] event.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmEventVblank {
    pub user_data: u64,
    pub tv_sec: u32,
    pub tv_usec: u32,
    pub sequence: u32,
    pub crtc_id: u32, // always zero in older kernels that don't support this
}

/// The body of a [`DRM_EVENT_CRTC_SEQUENCE`] event.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DrmEventCrtcSequence {
    pub user_data: u64,
    pub time_ns: i64,
    pub sequence: u64,
}

pub fn events_from_bytes<'a>(buf: &'a [u8]) -> impl Iterator<Item = DrmEvent<'a>> + 'a {
    DrmEventsFromBytes { remain: buf }
}

struct DrmEventsFromBytes<'a> {
    remain: &'a [u8],
}

impl<'a> Iterator for DrmEventsFromBytes<'a> {
    type Item = DrmEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (ret, remain) = DrmEvent::from_bytes(self.remain)?;
        self.remain = remain;
        Some(ret)
    }
}
