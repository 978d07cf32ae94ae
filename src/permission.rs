//! Permission engine (spec §4.I): POSIX mode bits plus an optional ACL
//! overlay, and the companion `setattr` authorization rules.
//!
//! Grounded on `examples/original_source/src/Cache_inode/cache_inode_access.c`'s
//! owner/group/other bit selection and root bypass; ACE evaluation order
//! (deny-before-allow, first match per principal) follows the same file's
//! NFSv4 ACL branch, gated here by `permission.use_ace_when_present`.

use crate::backing::{SetAttrs, TimeChange};
use crate::config::PermissionConfig;
use crate::context::Context;
use crate::entry::{Ace, AceWho, Attributes, Kind};
use crate::error::{Error, Result};

/// Requested-rights bitmask (spec §4.I `access`), modeled on NFSv3 ACCESS3
/// bits without importing a wire-protocol crate for six constants.
pub mod mask {
    pub const READ: u32 = 1 << 0;
    pub const LOOKUP: u32 = 1 << 1;
    pub const MODIFY: u32 = 1 << 2;
    pub const EXTEND: u32 = 1 << 3;
    pub const DELETE: u32 = 1 << 4;
    pub const EXECUTE: u32 = 1 << 5;
}

const S_IRUSR: u32 = 0o400;
const S_IWUSR: u32 = 0o200;
const S_IXUSR: u32 = 0o100;
const S_IRGRP: u32 = 0o040;
const S_IWGRP: u32 = 0o020;
const S_IXGRP: u32 = 0o010;
const S_IROTH: u32 = 0o004;
const S_IWOTH: u32 = 0o002;
const S_IXOTH: u32 = 0o001;
const S_ISVTX: u32 = 0o1000;

/// Returns `true` when a nanosecond field is out of the valid `[0, 1e9)`
/// range for an explicit timestamp (spec §4.I `setattr` "nanoseconds").
fn nanos_out_of_range(change: &TimeChange) -> bool {
    matches!(change, TimeChange::Explicit { nanos, .. } if *nanos >= 1_000_000_000)
}

/// Returns the subset of `requested` that `ctx` is allowed on `attrs` (spec
/// §4.I `access`). Root is granted everything except execute on a file with
/// no execute bit set anywhere (the one POSIX right root does not bypass).
pub fn check_access(ctx: &Context, attrs: &Attributes, requested: u32, config: &PermissionConfig) -> u32 {
    if config.use_ace_when_present {
        if let Some(acl) = &attrs.acl {
            return check_acl(ctx, acl, requested);
        }
    }

    if ctx.is_root() {
        let any_exec = attrs.mode & (S_IXUSR | S_IXGRP | S_IXOTH) != 0;
        return if any_exec { requested } else { requested & !mask::EXECUTE };
    }

    let (r, w, x) = if ctx.uid == attrs.uid {
        (attrs.mode & S_IRUSR != 0, attrs.mode & S_IWUSR != 0, attrs.mode & S_IXUSR != 0)
    } else if ctx.in_group(attrs.gid) {
        (attrs.mode & S_IRGRP != 0, attrs.mode & S_IWGRP != 0, attrs.mode & S_IXGRP != 0)
    } else {
        (attrs.mode & S_IROTH != 0, attrs.mode & S_IWOTH != 0, attrs.mode & S_IXOTH != 0)
    };

    let mut granted = 0;
    if r {
        granted |= mask::READ | mask::LOOKUP;
    }
    if w {
        granted |= mask::MODIFY | mask::EXTEND | mask::DELETE;
    }
    if x {
        granted |= mask::EXECUTE;
    }
    granted & requested
}

/// Errors out unless every bit in `needed` is granted (spec §4.I, used by
/// operations that require a specific right rather than reporting a mask).
pub fn require(ctx: &Context, attrs: &Attributes, needed: u32, config: &PermissionConfig) -> Result<()> {
    let granted = check_access(ctx, attrs, needed, config);
    if granted == needed {
        Ok(())
    } else {
        Err(Error::AccessDenied)
    }
}

fn check_acl(ctx: &Context, acl: &[Ace], requested: u32) -> u32 {
    let mut granted = 0u32;
    let mut decided = 0u32;
    for ace in acl {
        let applies = match ace.who {
            AceWho::Owner => true, // caller already resolved ownership into entries if needed
            AceWho::Everyone => true,
            AceWho::Uid(uid) => uid == ctx.uid,
            AceWho::Gid(gid) => ctx.in_group(gid),
            AceWho::Group => false,
        };
        if !applies {
            continue;
        }
        let undecided_bits = requested & !decided;
        if undecided_bits == 0 {
            break;
        }
        let relevant = ace.mask & undecided_bits;
        if relevant == 0 {
            continue;
        }
        if ace.allow {
            granted |= relevant;
        }
        decided |= relevant;
    }
    granted
}

/// Authorizes a `setattr` request (spec §4.I `check_setattr`):
/// - `mode`/`uid`/`gid` changes require ownership or root; chown to a
///   different uid additionally requires root.
/// - `size` changes require write access.
/// - setting a timestamp to an explicit value requires ownership or root;
///   setting it to "now" only requires write access.
pub fn check_setattr(ctx: &Context, attrs: &Attributes, changes: &SetAttrs, config: &PermissionConfig) -> Result<()> {
    let is_owner = ctx.uid == attrs.uid;

    if changes.mode.is_some() && !(is_owner || ctx.is_root()) {
        return Err(Error::PermissionDenied);
    }
    if let Some(uid) = changes.uid {
        if uid != attrs.uid && !ctx.is_root() {
            return Err(Error::PermissionDenied);
        }
    }
    if let Some(gid) = changes.gid {
        if gid != attrs.gid && !ctx.is_root() && !(is_owner && ctx.in_group(gid)) {
            return Err(Error::PermissionDenied);
        }
    }
    if changes.size.is_some() {
        if attrs.kind != Kind::Regular {
            return Err(Error::InvalidArgument);
        }
        if !ctx.already_open_for_write {
            require(ctx, attrs, mask::MODIFY, config)?;
        }
    }
    if let Some(atime) = &changes.atime {
        if nanos_out_of_range(atime) {
            return Err(Error::InvalidArgument);
        }
        if !is_owner && !ctx.is_root() {
            require(ctx, attrs, mask::MODIFY, config)?;
        }
    }
    if let Some(mtime) = &changes.mtime {
        if nanos_out_of_range(mtime) {
            return Err(Error::InvalidArgument);
        }
        if !is_owner && !ctx.is_root() {
            require(ctx, attrs, mask::MODIFY, config)?;
        }
    }
    Ok(())
}

/// Enforces the sticky bit (`S_ISVTX`, mode `01000`) on a directory from
/// which `target` is being removed or renamed away (spec §4.J `remove`,
/// `rename`): with the bit set, only the directory's owner, the target's
/// owner, or root may proceed, regardless of the directory's write mode.
pub fn check_sticky_delete(ctx: &Context, dir_attrs: &Attributes, target_uid: u32) -> Result<()> {
    if dir_attrs.mode & S_ISVTX == 0 {
        return Ok(());
    }
    if ctx.is_root() || ctx.uid == dir_attrs.uid || ctx.uid == target_uid {
        return Ok(());
    }
    Err(Error::PermissionDenied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::TimeChange;
    use crate::entry::test_support::sample_attrs;
    use std::net::{IpAddr, Ipv4Addr};

    fn ctx(uid: u32, gid: u32) -> Context {
        Context {
            principal: None,
            uid,
            gid,
            groups: vec![gid],
            export_id: 1,
            client_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            already_open_for_write: false,
        }
    }

    fn attrs_with_mode(mode: u32) -> Attributes {
        let mut attrs = Attributes::from_backing(&sample_attrs(crate::backing::Kind::Regular));
        attrs.mode = mode;
        attrs.uid = 10;
        attrs.gid = 20;
        attrs
    }

    #[test]
    fn owner_gets_owner_bits_only() {
        let attrs = attrs_with_mode(0o640);
        let config = PermissionConfig::default();
        let granted = check_access(&ctx(10, 20), &attrs, mask::READ | mask::MODIFY, &config);
        assert_eq!(granted, mask::READ | mask::MODIFY);
    }

    #[test]
    fn stranger_denied_when_no_other_bits() {
        let attrs = attrs_with_mode(0o640);
        let config = PermissionConfig::default();
        let granted = check_access(&ctx(99, 99), &attrs, mask::READ, &config);
        assert_eq!(granted, 0);
    }

    #[test]
    fn root_bypasses_mode_but_not_execute_with_no_x_bit() {
        let attrs = attrs_with_mode(0o600);
        let config = PermissionConfig::default();
        let granted = check_access(&ctx(0, 0), &attrs, mask::READ | mask::EXECUTE, &config);
        assert_eq!(granted, mask::READ);
    }

    #[test]
    fn chown_to_other_uid_requires_root() {
        let attrs = attrs_with_mode(0o644);
        let config = PermissionConfig::default();
        let changes = SetAttrs { uid: Some(5), ..Default::default() };
        assert!(check_setattr(&ctx(10, 20), &attrs, &changes, &config).is_err());
        assert!(check_setattr(&ctx(0, 0), &attrs, &changes, &config).is_ok());
    }

    #[test]
    fn owner_may_set_explicit_mtime_without_write_bit() {
        let attrs = attrs_with_mode(0o444);
        let config = PermissionConfig::default();
        let changes = SetAttrs { mtime: Some(TimeChange::Explicit { seconds: 0, nanos: 0 }), ..Default::default() };
        assert!(check_setattr(&ctx(10, 20), &attrs, &changes, &config).is_ok());
    }

    #[test]
    fn stranger_cannot_set_mtime_without_write_access() {
        let attrs = attrs_with_mode(0o444);
        let config = PermissionConfig::default();
        let changes = SetAttrs { mtime: Some(TimeChange::ServerNow), ..Default::default() };
        assert!(check_setattr(&ctx(99, 99), &attrs, &changes, &config).is_err());
    }

    #[test]
    fn truncating_a_directory_is_rejected() {
        let mut attrs = attrs_with_mode(0o755);
        attrs.kind = crate::entry::Kind::Directory;
        attrs.uid = 10;
        let config = PermissionConfig::default();
        let changes = SetAttrs { size: Some(0), ..Default::default() };
        let err = check_setattr(&ctx(10, 20), &attrs, &changes, &config).unwrap_err();
        assert_eq!(err, Error::InvalidArgument);
    }

    #[test]
    fn size_change_skips_write_check_when_already_open_for_write() {
        let attrs = attrs_with_mode(0o000);
        let config = PermissionConfig::default();
        let changes = SetAttrs { size: Some(0), ..Default::default() };
        let mut owner = ctx(10, 20);
        owner.already_open_for_write = true;
        assert!(check_setattr(&owner, &attrs, &changes, &config).is_ok());
    }

    #[test]
    fn explicit_time_with_overflowing_nanos_is_rejected() {
        let attrs = attrs_with_mode(0o644);
        let config = PermissionConfig::default();
        let changes = SetAttrs { mtime: Some(TimeChange::Explicit { seconds: 0, nanos: 1_000_000_000 }), ..Default::default() };
        let err = check_setattr(&ctx(10, 20), &attrs, &changes, &config).unwrap_err();
        assert_eq!(err, Error::InvalidArgument);
    }

    #[test]
    fn sticky_bit_blocks_non_owner_but_allows_target_owner() {
        let mut dir_attrs = attrs_with_mode(0o1777);
        dir_attrs.uid = 1;
        let target_uid = 10;
        assert!(check_sticky_delete(&ctx(99, 99), &dir_attrs, target_uid).is_err());
        assert!(check_sticky_delete(&ctx(10, 20), &dir_attrs, target_uid).is_ok());
        assert!(check_sticky_delete(&ctx(1, 1), &dir_attrs, target_uid).is_ok());
        assert!(check_sticky_delete(&ctx(0, 0), &dir_attrs, target_uid).is_ok());
    }

    #[test]
    fn sticky_bit_absent_allows_anyone_with_write_access() {
        let dir_attrs = attrs_with_mode(0o777);
        assert!(check_sticky_delete(&ctx(99, 99), &dir_attrs, 10).is_ok());
    }
}
