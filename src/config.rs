//! Typed configuration for the cache/state core (spec §6's knob table).
//!
//! The config *loader* (reading a file, watching for SIGHUP, merging CLI
//! overrides) is an external collaborator; this module only owns the typed
//! value the rest of the core consumes, deserialized with `serde`/`toml` the
//! way the teacher's example binaries load their own settings.

use serde::Deserialize;

/// LRU/reclaimer sizing knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LruConfig {
    /// Entry count above which the reclaimer marks the cache as reclaiming.
    pub entries_hiwat: usize,
    /// Entry count below which the reclaimer clears the reclaiming flag.
    pub entries_lowat: usize,
    /// Open file descriptor count above which the reclaimer closes fds.
    pub fd_hiwat: usize,
    /// Entries examined per lane on each reclaimer wake.
    pub work_per_wake: usize,
    /// Lane count. Should be prime (spec §6 "lru.lanes (prime)").
    pub lanes: usize,
}

impl Default for LruConfig {
    fn default() -> Self {
        LruConfig { entries_hiwat: 100_000, entries_lowat: 90_000, fd_hiwat: 4_096, work_per_wake: 64, lanes: 17 }
    }
}

/// Reaper cadence knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Base wake interval for the reclaimer thread, in seconds.
    pub interval_seconds: u64,
    /// Number of reclaimer cycles between memory-trim attempts.
    pub trim_interval_cycles: u32,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        ReaperConfig { interval_seconds: 300, trim_interval_cycles: 12 }
    }
}

/// Client lease knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Lease duration in seconds.
    pub lifetime_seconds: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        LeaseConfig { lifetime_seconds: 90 }
    }
}

/// Delegation grant heuristic knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// Minimum average prior delegation hold time, in milliseconds, required
    /// before granting another.
    pub min_avg_hold_ms: u64,
    /// Opens-per-second above which a file is considered too hot to delegate.
    pub max_open_frequency_hz: f64,
    /// Maximum tolerated fraction of a client's recent recalls that failed.
    pub acceptable_recall_failure_ratio: f64,
    /// Per-attempt recall timeout, in milliseconds.
    pub recall_timeout_ms: u64,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        DelegationConfig {
            min_avg_hold_ms: 2_000,
            max_open_frequency_hz: 1.0,
            acceptable_recall_failure_ratio: 0.1,
            recall_timeout_ms: 5_000,
        }
    }
}

/// Permission engine knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Evaluate an entry's ACL, when present, instead of its POSIX mode.
    pub use_ace_when_present: bool,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        PermissionConfig { use_ace_when_present: true }
    }
}

/// Readdir cookie-verification knob.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaddirConfig {
    /// Reject stale cookies against a mutated directory generation.
    pub use_cookie_verifier: bool,
}

impl Default for ReaddirConfig {
    fn default() -> Self {
        ReaddirConfig { use_cookie_verifier: true }
    }
}

/// Top-level configuration, matching spec §6's enumerated knobs 1:1.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lru: LruConfig,
    pub reaper: ReaperConfig,
    pub lease: LeaseConfig,
    pub deleg: DelegationConfig,
    pub permission: PermissionConfig,
    pub readdir: ReaddirConfig,
}

impl Config {
    /// Parses a TOML document into a [`Config`], filling in defaults for
    /// anything the document omits.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
