use crate::modeset::ObjectKind;

/// A failed kernel request, classified by errno.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("invalid argument")]
    Invalid,
    #[error("no such object")]
    NonExist,
    #[error("out of system memory")]
    SystemMem,
    #[error("out of graphics memory")]
    GraphicsMem,
    #[error("permission denied")]
    Permission,
    #[error("device disconnected")]
    Disconnected,
    #[error("operation not supported")]
    NotSupported,
    #[error("remote failure")]
    RemoteFailure,
    #[error("device died")]
    Died,
    #[error("device busy")]
    Busy,
    #[error("kernel error {0:?}")]
    Other(linux_io::result::Error),
}

impl From<linux_io::result::Error> for KernelError {
    fn from(value: linux_io::result::Error) -> Self {
        match value {
            linux_io::result::EINVAL => Self::Invalid,
            linux_io::result::ENOENT => Self::NonExist,
            linux_io::result::ENOMEM => Self::SystemMem,
            linux_io::result::ENOSPC => Self::GraphicsMem,
            linux_io::result::EPERM | linux_io::result::EACCES => Self::Permission,
            linux_io::result::ENODEV => Self::Disconnected,
            linux_io::result::EOPNOTSUPP => Self::NotSupported,
            linux_io::result::ENXIO => Self::RemoteFailure,
            linux_io::result::EIO => Self::Died,
            linux_io::result::EBUSY => Self::Busy,
            _ => Self::Other(value),
        }
    }
}

impl From<KernelError> for linux_io::result::Error {
    fn from(value: KernelError) -> Self {
        match value {
            KernelError::Invalid => linux_io::result::EINVAL,
            KernelError::NonExist => linux_io::result::ENOENT,
            KernelError::SystemMem => linux_io::result::ENOMEM,
            KernelError::GraphicsMem => linux_io::result::ENOSPC,
            KernelError::Permission => linux_io::result::EPERM,
            KernelError::Disconnected => linux_io::result::ENODEV,
            KernelError::NotSupported => linux_io::result::EOPNOTSUPP,
            KernelError::RemoteFailure => linux_io::result::ENXIO,
            KernelError::Died => linux_io::result::EIO,
            KernelError::Busy => linux_io::result::EBUSY,
            KernelError::Other(v) => v,
        }
    }
}

impl From<alloc::collections::TryReserveError> for KernelError {
    #[inline(always)]
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Self::SystemMem
    }
}

/// Errors from discovering an output chain and driving presentation on it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to query {what}: {source}")]
    KernelQuery {
        what: &'static str,
        #[source]
        source: KernelError,
    },

    #[error("no connected display output chain found")]
    NoDisplayChain,

    /// The driver doesn't expose a property that every commit sets.
    #[error("{kind} {object_id} has no {name} property")]
    MissingProperty {
        kind: ObjectKind,
        object_id: u32,
        name: &'static str,
    },

    #[error("failed to create mode property blob: {0}")]
    ModeBlob(#[source] KernelError),

    #[error("legacy mode set failed: {0}")]
    ModeSet(#[source] KernelError),

    #[error("{stage} atomic commit rejected: {source}")]
    AtomicCommitRejected {
        stage: &'static str,
        #[source]
        source: KernelError,
    },

    #[error("failed to read DRM events: {0}")]
    EventRead(#[source] KernelError),
}

impl Error {
    #[inline]
    pub(crate) fn query(what: &'static str) -> impl FnOnce(KernelError) -> Self {
        move |source| Self::KernelQuery { what, source }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("not a DRM card device")]
    NotDrmCard,
    #[error("failed to open DRM device: {0:?}")]
    Other(linux_io::result::Error),
}

impl From<InitError> for linux_io::result::Error {
    fn from(value: InitError) -> Self {
        match value {
            InitError::NotDrmCard => linux_io::result::ENOTTY,
            InitError::Other(e) => e,
        }
    }
}

impl From<linux_io::result::Error> for InitError {
    fn from(value: linux_io::result::Error) -> Self {
        match value {
            linux_io::result::ENOTTY => InitError::NotDrmCard,
            _ => InitError::Other(value),
        }
    }
}
