//! An in-memory stand-in for a DRM card, just capable enough to drive
//! discovery and presentation.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};

use linux_kms_flip::modeset::{
    AtomicCommitFlags, AtomicRequest, BlobId, CardResources, ConnectionState, ConnectorId,
    ConnectorState, ConnectorType, CrtcId, CrtcState, EncoderId, EncoderState, FramebufferId,
    ModeInfo, ModeProp, ObjectId, PlaneId, PlaneState, PropertyId, PropertyName,
};
use linux_kms_flip::{ClientCap, CrtcConfig, DeviceCap, KernelError, KmsDevice};

pub fn mode(w: u16, h: u16, refresh: u32) -> ModeInfo {
    ModeInfo {
        name: format!("{w}x{h}").into_bytes(),
        clock: u32::from(w) * u32::from(h) * refresh / 1000,
        hdisplay: w,
        hsync_start: w + 88,
        hsync_end: w + 132,
        htotal: w + 280,
        vdisplay: h,
        vsync_start: h + 4,
        vsync_end: h + 9,
        vtotal: h + 45,
        vrefresh: refresh,
        ..ModeInfo::default()
    }
}

/// One connector driven through an encoder by an active CRTC, whose primary
/// plane scans out `fb`. Ids are allocated upwards from `base`; an idle
/// overlay plane gets `base + 4`.
#[derive(Debug, Clone)]
pub struct Output {
    pub connector: ConnectorId,
    pub encoder: EncoderId,
    pub crtc: CrtcId,
    pub plane: PlaneId,
    pub overlay: PlaneId,
    pub fb: FramebufferId,
    pub connected: bool,
    pub crtc_active: bool,
    /// The connector names its encoder as current.
    pub encoder_bound: bool,
    /// The encoder names its CRTC as current.
    pub crtc_bound: bool,
    /// The primary plane scans out the CRTC's framebuffer.
    pub plane_bound: bool,
    pub modes: Vec<ModeInfo>,
}

impl Output {
    pub fn new(base: u32) -> Self {
        Self {
            connector: ConnectorId(base),
            encoder: EncoderId(base + 1),
            crtc: CrtcId(base + 2),
            plane: PlaneId(base + 3),
            overlay: PlaneId(base + 4),
            fb: FramebufferId(10),
            connected: true,
            crtc_active: true,
            encoder_bound: true,
            crtc_bound: true,
            plane_bound: true,
            modes: vec![mode(1920, 1080, 60), mode(1280, 720, 60)],
        }
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.crtc_active = false;
        self
    }

    pub fn without_encoder(mut self) -> Self {
        self.encoder_bound = false;
        self
    }

    pub fn without_crtc(mut self) -> Self {
        self.crtc_bound = false;
        self
    }

    pub fn without_primary_plane(mut self) -> Self {
        self.plane_bound = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Commit {
    pub flags: AtomicCommitFlags,
    pub req: AtomicRequest,
    pub accepted: bool,
}

#[derive(Debug, Clone)]
pub struct SetCrtcCall {
    pub crtc_id: CrtcId,
    pub fb_id: FramebufferId,
    pub connectors: Vec<ConnectorId>,
    pub mode: Option<ModeInfo>,
}

struct RejectRule {
    flags: AtomicCommitFlags,
    remaining: usize,
}

#[derive(Default)]
pub struct FakeCard {
    connectors: Vec<ConnectorState>,
    encoders: Vec<EncoderState>,
    crtcs: Vec<CrtcState>,
    planes: Vec<PlaneState>,
    props: BTreeMap<(u32, u32), Vec<(&'static str, u64)>>,
    prop_ids: BTreeMap<&'static str, PropertyId>,
    broken_connectors: Vec<ConnectorId>,
    pub crtc_in_vblank_event: bool,

    client_caps: RefCell<Vec<(ClientCap, u64)>>,
    next_blob: Cell<u32>,
    blobs: RefCell<BTreeMap<BlobId, Vec<u8>>>,
    commits: RefCell<Vec<Commit>>,
    reject_rules: RefCell<Vec<RejectRule>>,
    set_crtc_calls: RefCell<Vec<SetCrtcCall>>,
    events: RefCell<VecDeque<[u8; 32]>>,
    sequence: Cell<u32>,
    read_error: Cell<Option<KernelError>>,
}

impl FakeCard {
    pub fn new() -> Self {
        Self {
            crtc_in_vblank_event: true,
            next_blob: Cell::new(500),
            ..Self::default()
        }
    }

    pub fn with_output(output: Output) -> Self {
        let mut card = Self::new();
        card.add_output(&output);
        card
    }

    pub fn add_output(&mut self, o: &Output) {
        self.connectors.push(ConnectorState {
            id: o.connector,
            current_encoder_id: if o.encoder_bound {
                o.encoder
            } else {
                EncoderId(0)
            },
            connector_type: ConnectorType::HdmiA,
            connector_type_id: 1,
            connection_state: if o.connected {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            },
            width_mm: 520,
            height_mm: 290,
            modes: o.modes.clone(),
            props: Vec::new(),
            available_encoder_ids: vec![o.encoder],
        });
        self.encoders.push(EncoderState {
            encoder_id: o.encoder,
            encoder_type: 2,
            current_crtc_id: if o.crtc_bound { o.crtc } else { CrtcId(0) },
            possible_crtcs: 1,
            possible_clones: 0,
        });
        let scanout_fb = if o.crtc_active { o.fb } else { FramebufferId(0) };
        self.crtcs.push(CrtcState {
            crtc_id: o.crtc,
            fb_id: scanout_fb,
            x: 0,
            y: 0,
            gamma_size: 256,
            mode_valid: u32::from(o.crtc_active),
            mode: o.modes.first().cloned().unwrap_or_default(),
        });
        let (plane_crtc, plane_fb) = if o.plane_bound {
            (o.crtc, scanout_fb)
        } else {
            (CrtcId(0), FramebufferId(0))
        };
        self.planes.push(PlaneState {
            id: o.plane,
            crtc_id: plane_crtc,
            fb_id: plane_fb,
            possible_crtcs: 1,
            gamma_size: 0,
        });
        self.planes.push(PlaneState {
            id: o.overlay,
            crtc_id: CrtcId(0),
            fb_id: FramebufferId(0),
            possible_crtcs: 1,
            gamma_size: 0,
        });

        self.set_props(
            o.connector.into(),
            &[("DPMS", 0), ("CRTC_ID", o.crtc.0.into())],
        );
        self.set_props(
            o.crtc.into(),
            &[
                ("ACTIVE", o.crtc_active.into()),
                ("MODE_ID", 0),
                ("OUT_FENCE_PTR", 0),
            ],
        );
        let (w, h) = o
            .modes
            .first()
            .map(|m| (u64::from(m.hdisplay), u64::from(m.vdisplay)))
            .unwrap_or_default();
        for (plane, crtc, fb, typ) in [
            (o.plane, plane_crtc.0, plane_fb.0, 1),
            (o.overlay, 0, 0, 0),
        ] {
            self.set_props(
                plane.into(),
                &[
                    ("type", typ),
                    ("FB_ID", fb.into()),
                    ("CRTC_ID", crtc.into()),
                    ("SRC_X", 0),
                    ("SRC_Y", 0),
                    ("SRC_W", w << 16),
                    ("SRC_H", h << 16),
                    ("CRTC_X", 0),
                    ("CRTC_Y", 0),
                    ("CRTC_W", w),
                    ("CRTC_H", h),
                    ("zpos", 0),
                ],
            );
        }
    }

    fn set_props(&mut self, obj: ObjectId, props: &[(&'static str, u64)]) {
        for (name, _) in props {
            let next = PropertyId(1000 + self.prop_ids.len() as u32);
            self.prop_ids.entry(*name).or_insert(next);
        }
        self.props.insert(obj.as_raw_type_and_id(), props.to_vec());
    }

    /// The id this device gives the property named `name`.
    pub fn prop_id(&self, name: &str) -> PropertyId {
        self.prop_ids.get(name).copied().unwrap_or_default()
    }

    pub fn remove_property(&mut self, obj: ObjectId, name: &str) {
        if let Some(props) = self.props.get_mut(&obj.as_raw_type_and_id()) {
            props.retain(|(n, _)| *n != name);
        }
    }

    /// Make reading this connector's state fail.
    pub fn break_connector(&mut self, id: ConnectorId) {
        self.broken_connectors.push(id);
    }

    /// Reject the next `times` commits whose flags include all of `flags`.
    pub fn reject_commits(&self, flags: AtomicCommitFlags, times: usize) {
        self.reject_rules.borrow_mut().push(RejectRule {
            flags,
            remaining: times,
        });
    }

    pub fn fail_reads(&self, err: KernelError) {
        self.read_error.set(Some(err));
    }

    /// Queue a flip-complete event as if `crtc` had just flipped.
    pub fn queue_flip(&self, crtc: CrtcId) {
        let seq = self.sequence.get() + 1;
        self.sequence.set(seq);
        let crtc = if self.crtc_in_vblank_event { crtc.0 } else { 0 };

        let mut evt = [0_u8; 32];
        evt[0..4].copy_from_slice(&2_u32.to_ne_bytes());
        evt[4..8].copy_from_slice(&32_u32.to_ne_bytes());
        evt[8..16].copy_from_slice(&0_u64.to_ne_bytes());
        evt[16..20].copy_from_slice(&(seq / 60).to_ne_bytes());
        evt[20..24].copy_from_slice(&((seq % 60) * 16_666).to_ne_bytes());
        evt[24..28].copy_from_slice(&seq.to_ne_bytes());
        evt[28..32].copy_from_slice(&crtc.to_ne_bytes());
        self.events.borrow_mut().push_back(evt);
    }

    /// Drain the event queue, as if another reader had consumed it.
    pub fn take_events(&self) -> Vec<[u8; 32]> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn pending_events(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn live_blobs(&self) -> usize {
        self.blobs.borrow().len()
    }

    pub fn blob_data(&self, id: BlobId) -> Option<Vec<u8>> {
        self.blobs.borrow().get(&id).cloned()
    }

    pub fn commits(&self) -> Vec<Commit> {
        self.commits.borrow().clone()
    }

    pub fn last_commit(&self) -> Option<Commit> {
        self.commits.borrow().last().cloned()
    }

    pub fn set_crtc_calls(&self) -> Vec<SetCrtcCall> {
        self.set_crtc_calls.borrow().clone()
    }

    pub fn client_caps(&self) -> Vec<(ClientCap, u64)> {
        self.client_caps.borrow().clone()
    }

    fn should_reject(&self, flags: AtomicCommitFlags) -> bool {
        let mut rules = self.reject_rules.borrow_mut();
        for rule in rules.iter_mut() {
            if rule.remaining > 0 && flags.contains(rule.flags) {
                rule.remaining -= 1;
                return true;
            }
        }
        false
    }
}

impl KmsDevice for FakeCard {
    fn device_cap(&self, cap: DeviceCap) -> Result<u64, KernelError> {
        match cap {
            DeviceCap::DumbBuffer | DeviceCap::TimestampMonotonic => Ok(1),
            DeviceCap::CrtcInVblankEvent => Ok(self.crtc_in_vblank_event.into()),
            _ => Err(KernelError::Invalid),
        }
    }

    fn set_client_cap(&self, cap: ClientCap, value: u64) -> Result<(), KernelError> {
        self.client_caps.borrow_mut().push((cap, value));
        Ok(())
    }

    fn resources(&self) -> Result<CardResources, KernelError> {
        Ok(CardResources {
            fb_ids: vec![FramebufferId(10), FramebufferId(11)],
            crtc_ids: self.crtcs.iter().map(|c| c.crtc_id).collect(),
            connector_ids: self.connectors.iter().map(|c| c.id).collect(),
            encoder_ids: self.encoders.iter().map(|e| e.encoder_id).collect(),
            min_width: 0,
            max_width: 8192,
            min_height: 0,
            max_height: 8192,
        })
    }

    fn plane_ids(&self) -> Result<Vec<PlaneId>, KernelError> {
        Ok(self.planes.iter().map(|p| p.id).collect())
    }

    fn connector_state(&self, id: ConnectorId) -> Result<ConnectorState, KernelError> {
        if self.broken_connectors.contains(&id) {
            return Err(KernelError::Invalid);
        }
        self.connectors
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(KernelError::NonExist)
    }

    fn encoder_state(&self, id: EncoderId) -> Result<EncoderState, KernelError> {
        self.encoders
            .iter()
            .find(|e| e.encoder_id == id)
            .cloned()
            .ok_or(KernelError::NonExist)
    }

    fn crtc_state(&self, id: CrtcId) -> Result<CrtcState, KernelError> {
        self.crtcs
            .iter()
            .find(|c| c.crtc_id == id)
            .cloned()
            .ok_or(KernelError::NonExist)
    }

    fn plane_state(&self, id: PlaneId) -> Result<PlaneState, KernelError> {
        self.planes
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(KernelError::NonExist)
    }

    fn object_properties(&self, obj: ObjectId) -> Result<Vec<ModeProp>, KernelError> {
        let props = self
            .props
            .get(&obj.as_raw_type_and_id())
            .ok_or(KernelError::NonExist)?;
        Ok(props
            .iter()
            .map(|(name, value)| ModeProp {
                prop_id: self.prop_id(name),
                value: *value,
            })
            .collect())
    }

    fn property_name(&self, prop: PropertyId) -> Result<PropertyName, KernelError> {
        self.prop_ids
            .iter()
            .find(|(_, id)| **id == prop)
            .map(|(name, _)| PropertyName::new(name))
            .ok_or(KernelError::NonExist)
    }

    fn create_property_blob(&self, data: &[u8]) -> Result<BlobId, KernelError> {
        let id = BlobId(self.next_blob.get());
        self.next_blob.set(id.0 + 1);
        self.blobs.borrow_mut().insert(id, data.to_vec());
        Ok(id)
    }

    fn destroy_property_blob(&self, id: BlobId) -> Result<(), KernelError> {
        self.blobs
            .borrow_mut()
            .remove(&id)
            .map(|_| ())
            .ok_or(KernelError::NonExist)
    }

    fn atomic_commit(
        &self,
        req: &AtomicRequest,
        flags: AtomicCommitFlags,
        _user_data: u64,
    ) -> Result<(), KernelError> {
        let accepted = !self.should_reject(flags);
        self.commits.borrow_mut().push(Commit {
            flags,
            req: req.clone(),
            accepted,
        });
        if !accepted {
            return Err(KernelError::Invalid);
        }
        if flags.contains(AtomicCommitFlags::PAGE_FLIP_EVENT)
            && !flags.contains(AtomicCommitFlags::TEST_ONLY)
        {
            let flipped: Vec<CrtcId> = self
                .crtcs
                .iter()
                .map(|c| c.crtc_id)
                .filter(|id| req.iter().any(|(obj, _, _)| obj == id.0))
                .collect();
            for crtc in flipped {
                self.queue_flip(crtc);
            }
        }
        Ok(())
    }

    fn set_crtc(&self, config: &CrtcConfig<'_>) -> Result<(), KernelError> {
        self.set_crtc_calls.borrow_mut().push(SetCrtcCall {
            crtc_id: config.crtc_id,
            fb_id: config.fb_id,
            connectors: config.connectors.to_vec(),
            mode: config.mode.cloned(),
        });
        Ok(())
    }

    fn read_event_bytes(&self, buf: &mut [u8]) -> Result<usize, KernelError> {
        if let Some(err) = self.read_error.get() {
            return Err(err);
        }
        let mut events = self.events.borrow_mut();
        let mut len = 0;
        while let Some(evt) = events.front() {
            if buf.len() - len < evt.len() {
                break;
            }
            buf[len..len + evt.len()].copy_from_slice(evt);
            len += evt.len();
            events.pop_front();
        }
        Ok(len)
    }
}
