//! Per-request operation context (spec §6).
//!
//! Wire dispatch (out of scope) decodes RPC credentials and populates one of
//! these per request; every operation in [`crate::ops`] takes a `&Context`.

use std::net::IpAddr;

/// Authenticated caller identity and per-request hints.
#[derive(Debug, Clone)]
pub struct Context {
    /// Authenticated principal name, when the RPC security flavor supplies one.
    pub principal: Option<String>,
    /// Effective user id.
    pub uid: u32,
    /// Effective group id.
    pub gid: u32,
    /// Supplementary group ids, used by the permission engine's group check.
    pub groups: Vec<u32>,
    /// Which export the current file handle resolves under.
    pub export_id: u32,
    /// Client network address, used for lease/delegation bookkeeping.
    pub client_addr: IpAddr,
    /// True if the client has an open write descriptor on the target entry
    /// already, relaxing the `WRITE_DATA` requirement for a `SIZE` setattr
    /// (spec §4.I).
    pub already_open_for_write: bool,
}

impl Context {
    /// Context for the privileged local principal (root), mostly useful in
    /// tests and for operations the core itself originates (e.g. reclaimer
    /// cleanup paths that must never be access-checked).
    pub fn root() -> Self {
        Context {
            principal: None,
            uid: 0,
            gid: 0,
            groups: Vec::new(),
            export_id: 0,
            client_addr: IpAddr::from([127, 0, 0, 1]),
            already_open_for_write: false,
        }
    }

    /// True if this caller is the privileged user.
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }

    /// True if `gid` is the caller's primary or a supplementary group.
    pub fn in_group(&self, gid: u32) -> bool {
        self.gid == gid || self.groups.contains(&gid)
    }
}
