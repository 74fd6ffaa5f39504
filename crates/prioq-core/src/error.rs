use prioq_dsa::QueueError;

/// Service-level failure kinds.
///
/// Each kind maps to a distinct errno, surfaced on the wire as the negative
/// selector returned in place of a byte count.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PqError {
    #[error("no session exists for the calling client")]
    NotAttached,
    #[error("client already holds a session")]
    AlreadyAttached,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("priority queue is full")]
    CapacityExceeded,
    #[error("priority queue is empty")]
    Empty,
    #[error("priority queue capacity has not been set")]
    QueueUninitialized,
    #[error("allocation failed")]
    ResourceExhausted,
    #[error("copy to or from the client buffer failed")]
    TransferFailed,
    #[error("command is not supported")]
    Unsupported,
}

impl PqError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        PqError::InvalidArgument(reason.into())
    }

    /// Positive errno for this kind.
    pub fn errno(&self) -> i32 {
        match self {
            PqError::NotAttached => libc::EBADF,
            PqError::AlreadyAttached => libc::EBUSY,
            PqError::InvalidArgument(_) => libc::EINVAL,
            PqError::CapacityExceeded => libc::ENOSPC,
            PqError::Empty => libc::ENODATA,
            PqError::QueueUninitialized => libc::EACCES,
            PqError::ResourceExhausted => libc::ENOMEM,
            PqError::TransferFailed => libc::EFAULT,
            PqError::Unsupported => libc::ENOTTY,
        }
    }

    /// The negative selector reported to clients.
    pub fn selector(&self) -> i32 {
        -self.errno()
    }

    /// Inverse of [`PqError::selector`]. The reason text of `InvalidArgument` does not
    /// survive the trip.
    pub fn from_selector(selector: i32) -> Option<Self> {
        let err = match selector.checked_neg()? {
            libc::EBADF => PqError::NotAttached,
            libc::EBUSY => PqError::AlreadyAttached,
            libc::EINVAL => PqError::InvalidArgument("rejected by service".to_string()),
            libc::ENOSPC => PqError::CapacityExceeded,
            libc::ENODATA => PqError::Empty,
            libc::EACCES => PqError::QueueUninitialized,
            libc::ENOMEM => PqError::ResourceExhausted,
            libc::EFAULT => PqError::TransferFailed,
            libc::ENOTTY => PqError::Unsupported,
            _ => return None,
        };
        Some(err)
    }
}

impl From<QueueError> for PqError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::CapacityExceeded => PqError::CapacityExceeded,
            QueueError::Empty => PqError::Empty,
            QueueError::ResourceExhausted => PqError::ResourceExhausted,
            QueueError::InvalidPriority(_)
            | QueueError::InsertionPending
            | QueueError::NoPendingValue => PqError::InvalidArgument(e.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown log_level {0:?}")]
    LogLevel(String),
}
