use core::fmt;
use core::ops::BitOr;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::{ObjectId, PropertyId};

/// An atomic modesetting commit request.
///
/// Setting a property that's already in the request overwrites its value in
/// place, so a request can be built once and refreshed before every commit
/// without growing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicRequest {
    objs: BTreeMap<u32, AtomicRequestObj>,
    total_props: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AtomicRequestObj {
    prop_ids: Vec<u32>,
    prop_values: Vec<u64>,
}

impl AtomicRequest {
    pub fn new() -> Self {
        Self {
            objs: BTreeMap::new(),
            total_props: 0,
        }
    }

    pub fn set_property(&mut self, obj_id: ObjectId, prop_id: PropertyId, value: u64) {
        let obj_id = obj_id.raw_id();
        let obj = self.objs.entry(obj_id).or_default();

        if let Some(idx) = obj.prop_ids.iter().position(|id| *id == prop_id.0) {
            obj.prop_values[idx] = value;
            return;
        }

        // We'll reserve first to make sure that running out of memory can't
        // cause these two vecs to end up with different lengths when we're done.
        obj.prop_ids.reserve(1);
        obj.prop_values.reserve(1);

        obj.prop_ids.push(prop_id.0);
        obj.prop_values.push(value);
        self.total_props += 1; // panics if request contains more than u32::MAX total properties
        if self.objs.len() > (u32::MAX as usize) {
            panic!("too many distinct objects in request");
        }
    }

    /// The value this request sets for the given property, if any.
    pub fn property(&self, obj_id: ObjectId, prop_id: PropertyId) -> Option<u64> {
        let obj = self.objs.get(&obj_id.raw_id())?;
        let idx = obj.prop_ids.iter().position(|id| *id == prop_id.0)?;
        Some(obj.prop_values[idx])
    }

    /// Total number of (object, property, value) triples in the request.
    #[inline]
    pub fn len(&self) -> usize {
        self.total_props as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_props == 0
    }

    pub fn clear(&mut self) {
        self.objs.clear();
        self.total_props = 0;
    }

    /// Iterate the raw `(object id, property id, value)` triples, grouped by
    /// object in ascending object id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, PropertyId, u64)> + '_ {
        self.objs.iter().flat_map(|(obj_id, obj)| {
            obj.prop_ids
                .iter()
                .zip(obj.prop_values.iter())
                .map(move |(prop_id, value)| (*obj_id, PropertyId(*prop_id), *value))
        })
    }

    pub(crate) fn for_ioctl_req(&self) -> AtomicRequestRawParts {
        let obj_count = self.objs.len();
        let mut obj_ids = Vec::<u32>::with_capacity(obj_count);
        let mut obj_prop_counts = Vec::<u32>::with_capacity(obj_count);
        let total_prop_count = self.total_props as usize;
        let mut prop_ids = Vec::<u32>::with_capacity(total_prop_count);
        let mut prop_values = Vec::<u64>::with_capacity(total_prop_count);

        for (obj_id, obj) in self.objs.iter() {
            obj_ids.push(*obj_id);
            obj_prop_counts.push(obj.prop_ids.len() as u32);
            prop_ids.extend_from_slice(&obj.prop_ids);
            prop_values.extend_from_slice(&obj.prop_values);
        }

        AtomicRequestRawParts {
            obj_ids,
            obj_prop_counts,
            prop_ids,
            prop_values,
        }
    }
}

pub(crate) struct AtomicRequestRawParts {
    pub(crate) obj_ids: Vec<u32>,
    pub(crate) obj_prop_counts: Vec<u32>,
    pub(crate) prop_ids: Vec<u32>,
    pub(crate) prop_values: Vec<u64>,
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct AtomicCommitFlags(pub(crate) u32);

impl AtomicCommitFlags {
    pub const NONE: Self = Self(0);
    pub const TEST_ONLY: Self = Self(crate::ioctl::DRM_MODE_ATOMIC_TEST_ONLY);
    pub const NONBLOCK: Self = Self(crate::ioctl::DRM_MODE_ATOMIC_NONBLOCK);
    pub const ALLOW_MODESET: Self = Self(crate::ioctl::DRM_MODE_ATOMIC_ALLOW_MODESET);
    pub const PAGE_FLIP_EVENT: Self = Self(crate::ioctl::DRM_MODE_PAGE_FLIP_EVENT);
    pub const ASYNC: Self = Self(crate::ioctl::DRM_MODE_PAGE_FLIP_ASYNC);

    #[inline(always)]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for AtomicCommitFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for AtomicCommitFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(AtomicCommitFlags, &str); 5] = [
            (AtomicCommitFlags::TEST_ONLY, "TEST_ONLY"),
            (AtomicCommitFlags::NONBLOCK, "NONBLOCK"),
            (AtomicCommitFlags::ALLOW_MODESET, "ALLOW_MODESET"),
            (AtomicCommitFlags::PAGE_FLIP_EVENT, "PAGE_FLIP_EVENT"),
            (AtomicCommitFlags::ASYNC, "ASYNC"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("NONE")?;
        }
        Ok(())
    }
}
