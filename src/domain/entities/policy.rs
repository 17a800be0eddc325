//! Cache policies and request priority.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Controls how the in-memory cache participates in a request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MemoryPolicy: u8 {
        /// Skip the memory cache lookup when serving the request.
        const NO_CACHE = 1 << 0;
        /// Do not store the final image in the memory cache.
        const NO_STORE = 1 << 1;
    }
}

impl MemoryPolicy {
    /// Returns true if the memory cache may be consulted.
    #[must_use]
    pub const fn should_read_from_memory_cache(self) -> bool {
        !self.contains(Self::NO_CACHE)
    }

    /// Returns true if the result may be written to the memory cache.
    #[must_use]
    pub const fn should_write_to_memory_cache(self) -> bool {
        !self.contains(Self::NO_STORE)
    }
}

bitflags! {
    /// Controls how the disk cache and network participate in a request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct NetworkPolicy: u8 {
        /// Skip the disk cache and force a network load.
        const NO_CACHE = 1 << 0;
        /// Do not store the downloaded bytes in the disk cache.
        const NO_STORE = 1 << 1;
        /// Serve from the disk cache only, never touching the network.
        const OFFLINE = 1 << 2;
    }
}

impl NetworkPolicy {
    /// Returns true if the disk cache may be consulted.
    #[must_use]
    pub const fn should_read_from_disk_cache(self) -> bool {
        !self.contains(Self::NO_CACHE)
    }

    /// Returns true if downloaded bytes may be stored on disk.
    #[must_use]
    pub const fn should_write_to_disk_cache(self) -> bool {
        !self.contains(Self::NO_STORE)
    }

    /// Returns true if only cached bytes may be used.
    #[must_use]
    pub const fn is_offline_only(self) -> bool {
        self.contains(Self::OFFLINE)
    }
}

/// Scheduling priority of a request.
///
/// When several callers join the same in-flight work, the highest priority wins.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background prefetching.
    Low = 0,
    /// Regular loads.
    #[default]
    Normal = 1,
    /// Loads that should jump the queue.
    High = 2,
}

impl Priority {
    /// Converts the stored discriminant back into a priority.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Low,
            2 => Self::High,
            _ => Self::Normal,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}
