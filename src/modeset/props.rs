use core::fmt;
use core::marker::PhantomData;

use log::{debug, trace, warn};

use super::{ConnectorId, CrtcId, ObjectId, PlaneId, PropertyId};
use crate::device::KmsDevice;
use crate::ioctl::DRM_PROP_NAME_LEN;
use crate::result::Error;

/// A property id and its current value, as reported for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProp {
    pub prop_id: PropertyId,
    pub value: u64,
}

/// A property name as reported by the kernel: at most 31 bytes of ASCII,
/// zero-padded.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PropertyName([u8; DRM_PROP_NAME_LEN]);

impl PropertyName {
    pub const fn from_raw(raw: [u8; DRM_PROP_NAME_LEN]) -> Self {
        Self(raw)
    }

    /// Builds a name from text, truncating anything that wouldn't fit in
    /// the kernel's representation.
    pub fn new(name: &str) -> Self {
        let mut raw = [0_u8; DRM_PROP_NAME_LEN];
        for (dst, src) in raw[..DRM_PROP_NAME_LEN - 1]
            .iter_mut()
            .zip(name.bytes())
        {
            *dst = src;
        }
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|c| *c == 0).unwrap_or(self.0.len());
        &self.0[..len]
    }

    /// The name as text, or `None` if the kernel returned something that
    /// isn't UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }
}

impl PartialEq<str> for PropertyName {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => fmt::Debug::fmt(s, f),
            None => fmt::Debug::fmt(self.as_bytes(), f),
        }
    }
}

/// The kinds of KMS object whose properties we track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Connector,
    Crtc,
    Plane,
}

impl ObjectKind {
    pub fn object_id(self, id: u32) -> ObjectId {
        match self {
            ObjectKind::Connector => ObjectId::Connector(ConnectorId(id)),
            ObjectKind::Crtc => ObjectId::Crtc(CrtcId(id)),
            ObjectKind::Plane => ObjectId::Plane(PlaneId(id)),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectKind::Connector => "connector",
            ObjectKind::Crtc => "CRTC",
            ObjectKind::Plane => "plane",
        })
    }
}

/// Enumerates the properties we care about for one kind of object.
///
/// Each slot has a fixed index into [`KmsObjectProps`], so lookups after
/// resolution never go back to the kernel.
pub trait PropertySlot: Copy + fmt::Debug + PartialEq + 'static {
    const KIND: ObjectKind;
    const ALL: &'static [Self];

    /// The kernel's name for this property.
    fn name(self) -> &'static str;

    fn index(self) -> usize;

    /// Required slots must resolve, since a commit that names property id
    /// zero is invalid.
    #[inline]
    fn is_required(self) -> bool {
        true
    }
}

/// Upper bound on [`PropertySlot::ALL`] for any slot type.
pub const MAX_PROPERTY_SLOTS: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorProp {
    CrtcId,
}

impl PropertySlot for ConnectorProp {
    const KIND: ObjectKind = ObjectKind::Connector;
    const ALL: &'static [Self] = &[Self::CrtcId];

    fn name(self) -> &'static str {
        match self {
            Self::CrtcId => "CRTC_ID",
        }
    }

    #[inline(always)]
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrtcProp {
    Active,
    ModeId,
}

impl PropertySlot for CrtcProp {
    const KIND: ObjectKind = ObjectKind::Crtc;
    const ALL: &'static [Self] = &[Self::Active, Self::ModeId];

    fn name(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::ModeId => "MODE_ID",
        }
    }

    #[inline(always)]
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneProp {
    FbId,
    CrtcId,
    SrcX,
    SrcY,
    SrcW,
    SrcH,
    CrtcX,
    CrtcY,
    CrtcW,
    CrtcH,
    Type,
}

impl PropertySlot for PlaneProp {
    const KIND: ObjectKind = ObjectKind::Plane;
    const ALL: &'static [Self] = &[
        Self::FbId,
        Self::CrtcId,
        Self::SrcX,
        Self::SrcY,
        Self::SrcW,
        Self::SrcH,
        Self::CrtcX,
        Self::CrtcY,
        Self::CrtcW,
        Self::CrtcH,
        Self::Type,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::FbId => "FB_ID",
            Self::CrtcId => "CRTC_ID",
            Self::SrcX => "SRC_X",
            Self::SrcY => "SRC_Y",
            Self::SrcW => "SRC_W",
            Self::SrcH => "SRC_H",
            Self::CrtcX => "CRTC_X",
            Self::CrtcY => "CRTC_Y",
            Self::CrtcW => "CRTC_W",
            Self::CrtcH => "CRTC_H",
            Self::Type => "type",
        }
    }

    #[inline(always)]
    fn index(self) -> usize {
        self as usize
    }

    fn is_required(self) -> bool {
        !matches!(self, Self::Type)
    }
}

/// One resolved property. An unresolved slot is all zeroes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KmsObjectProperty {
    pub id: PropertyId,
    pub value: u64,
}

impl KmsObjectProperty {
    #[inline(always)]
    pub fn is_resolved(&self) -> bool {
        !self.id.is_none()
    }
}

/// The properties of one connector, CRTC or plane, indexed by slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsObjectProps<S: PropertySlot> {
    id: u32,
    props: [KmsObjectProperty; MAX_PROPERTY_SLOTS],
    _slots: PhantomData<S>,
}

pub type ConnectorProps = KmsObjectProps<ConnectorProp>;
pub type CrtcProps = KmsObjectProps<CrtcProp>;
pub type PlaneProps = KmsObjectProps<PlaneProp>;

impl<S: PropertySlot> KmsObjectProps<S> {
    /// Fetch the property list of object `object_id` and sort the ones we
    /// know about into their slots.
    pub fn resolve<D: KmsDevice + ?Sized>(dev: &D, object_id: u32) -> Result<Self, Error> {
        let obj = S::KIND.object_id(object_id);
        let list = dev
            .object_properties(obj)
            .map_err(Error::query("object properties"))?;

        let mut props = [KmsObjectProperty::default(); MAX_PROPERTY_SLOTS];
        for prop in list {
            let name = match dev.property_name(prop.prop_id) {
                Ok(name) => name,
                Err(e) => {
                    warn!("{} {object_id}: can't read name of property {}: {e}", S::KIND, prop.prop_id);
                    continue;
                }
            };
            let Some(slot) = S::ALL.iter().copied().find(|s| name == *s.name()) else {
                continue;
            };
            trace!(
                "{} {object_id}: {} is property {} = {}",
                S::KIND,
                slot.name(),
                prop.prop_id,
                prop.value
            );
            props[slot.index()] = KmsObjectProperty {
                id: prop.prop_id,
                value: prop.value,
            };
        }

        for slot in S::ALL.iter().copied() {
            if props[slot.index()].is_resolved() {
                continue;
            }
            if slot.is_required() {
                return Err(Error::MissingProperty {
                    kind: S::KIND,
                    object_id,
                    name: slot.name(),
                });
            }
            debug!("{} {object_id} has no {} property", S::KIND, slot.name());
        }

        Ok(Self {
            id: object_id,
            props,
            _slots: PhantomData,
        })
    }

    /// The driver-assigned id of the object these properties belong to.
    #[inline(always)]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline(always)]
    pub fn object_id(&self) -> ObjectId {
        S::KIND.object_id(self.id)
    }

    #[inline(always)]
    pub fn kind(&self) -> ObjectKind {
        S::KIND
    }

    #[inline(always)]
    pub fn get(&self, slot: S) -> KmsObjectProperty {
        self.props[slot.index()]
    }

    #[inline(always)]
    pub fn property_id(&self, slot: S) -> PropertyId {
        self.get(slot).id
    }
}
