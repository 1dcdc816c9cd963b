//! PnP state machine (`spec.md` §3 invariants, §4.5 table).

/// Lifecycle state of `DiskDevice`. Read and written only from PnP dispatch
/// in the real driver; here it's the single source of truth gating every
/// Create/Read/Write/DeviceControl path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpState {
    NotStarted,
    Started,
    StopPending,
    Stopped,
    RemovePending,
    SurpriseRemovePending,
    Deleted,
}

impl Default for PnpState {
    fn default() -> Self {
        PnpState::NotStarted
    }
}

impl PnpState {
    /// Whether Create/Read/Write/DeviceControl may be accepted.
    pub fn accepts_io(&self) -> bool {
        matches!(self, PnpState::Started)
    }
}
