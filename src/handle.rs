//! Opaque file handle codec (spec §4.A, wire formats in spec §6).
//!
//! Two kinds of handle share one fixed-size wire envelope: a *backing*
//! handle wraps an export id and the backing adapter's own opaque identifier;
//! a *pseudo* handle carries the stable hash of a pseudo-filesystem path plus
//! a truncated copy of the path itself, so the hash plus prefix
//! collision-resistantly identifies the node (spec §4.A, §4.K).

use byteorder::{ByteOrder, LittleEndian};

use crate::cityhash::city_hash64;
use crate::error::{Error, Result};

/// Fixed handle size in bytes. Must be at least 64 (spec §6).
pub const HANDLE_LEN: usize = 64;

const VERSION: u8 = 1;
const PSEUDO_EXPORT_ID: u32 = 0;

const VERSION_OFF: usize = 0;
const EXPORT_ID_OFF: usize = 1;
const PAYLOAD_OFF: usize = 5;

/// Opaque, fixed-size wire handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub [u8; HANDLE_LEN]);

/// The two handle shapes a decoded [`Handle`] can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A handle rooted in one export's backing filesystem.
    Backing { export_id: u32, opaque: Vec<u8> },
    /// A handle identifying a pseudo-filesystem node.
    Pseudo { hash: u64, path_prefix: Vec<u8> },
}

/// Encodes a backing-rooted handle: `version | export_id | opaque_len | opaque | pad`.
pub fn encode_backing(export_id: u32, opaque: &[u8]) -> Result<Handle> {
    if opaque.len() > HANDLE_LEN - PAYLOAD_OFF - 2 {
        return Err(Error::InvalidArgument);
    }
    let mut buf = [0u8; HANDLE_LEN];
    buf[VERSION_OFF] = VERSION;
    LittleEndian::write_u32(&mut buf[EXPORT_ID_OFF..PAYLOAD_OFF], export_id);
    LittleEndian::write_u16(&mut buf[PAYLOAD_OFF..PAYLOAD_OFF + 2], opaque.len() as u16);
    buf[PAYLOAD_OFF + 2..PAYLOAD_OFF + 2 + opaque.len()].copy_from_slice(opaque);
    Ok(Handle(buf))
}

/// Encodes a pseudo-filesystem handle: `version | export_id=0 | hash | path_len | path_prefix | pad`.
pub fn encode_pseudo(full_path: &[u8]) -> Handle {
    let hash = city_hash64(full_path);
    let mut buf = [0u8; HANDLE_LEN];
    buf[VERSION_OFF] = VERSION;
    LittleEndian::write_u32(&mut buf[EXPORT_ID_OFF..PAYLOAD_OFF], PSEUDO_EXPORT_ID);
    LittleEndian::write_u64(&mut buf[PAYLOAD_OFF..PAYLOAD_OFF + 8], hash);
    let prefix_cap = HANDLE_LEN - PAYLOAD_OFF - 8 - 2;
    let prefix_len = full_path.len().min(prefix_cap);
    LittleEndian::write_u16(
        &mut buf[PAYLOAD_OFF + 8..PAYLOAD_OFF + 10],
        full_path.len() as u16,
    );
    buf[PAYLOAD_OFF + 10..PAYLOAD_OFF + 10 + prefix_len].copy_from_slice(&full_path[..prefix_len]);
    Handle(buf)
}

/// Decodes a wire handle back into its backing or pseudo shape.
pub fn decode(handle: &Handle) -> Result<Decoded> {
    let buf = &handle.0;
    if buf[VERSION_OFF] != VERSION {
        return Err(Error::MalformedRequest);
    }
    let export_id = LittleEndian::read_u32(&buf[EXPORT_ID_OFF..PAYLOAD_OFF]);
    if export_id == PSEUDO_EXPORT_ID {
        let hash = LittleEndian::read_u64(&buf[PAYLOAD_OFF..PAYLOAD_OFF + 8]);
        let declared_len = LittleEndian::read_u16(&buf[PAYLOAD_OFF + 8..PAYLOAD_OFF + 10]) as usize;
        let prefix_cap = HANDLE_LEN - PAYLOAD_OFF - 8 - 2;
        let stored_len = declared_len.min(prefix_cap);
        let path_prefix = buf[PAYLOAD_OFF + 10..PAYLOAD_OFF + 10 + stored_len].to_vec();
        Ok(Decoded::Pseudo { hash, path_prefix })
    } else {
        let len = LittleEndian::read_u16(&buf[PAYLOAD_OFF..PAYLOAD_OFF + 2]) as usize;
        if PAYLOAD_OFF + 2 + len > HANDLE_LEN {
            return Err(Error::MalformedRequest);
        }
        let opaque = buf[PAYLOAD_OFF + 2..PAYLOAD_OFF + 2 + len].to_vec();
        Ok(Decoded::Backing { export_id, opaque })
    }
}

/// Stable hash of a backing handle's opaque bytes, used for cache-index and
/// weak-reference table shard selection.
pub fn hash_opaque(opaque: &[u8]) -> u64 {
    city_hash64(opaque)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_backing_handle() {
        let h = encode_backing(7, b"inode-1234").unwrap();
        match decode(&h).unwrap() {
            Decoded::Backing { export_id, opaque } => {
                assert_eq!(export_id, 7);
                assert_eq!(opaque, b"inode-1234");
            }
            Decoded::Pseudo { .. } => panic!("expected backing handle"),
        }
    }

    #[test]
    fn round_trips_pseudo_handle_short_path() {
        let h = encode_pseudo(b"/export/a/b");
        match decode(&h).unwrap() {
            Decoded::Pseudo { hash, path_prefix } => {
                assert_eq!(hash, city_hash64(b"/export/a/b"));
                assert_eq!(path_prefix, b"/export/a/b");
            }
            Decoded::Backing { .. } => panic!("expected pseudo handle"),
        }
    }

    #[test]
    fn truncates_long_pseudo_paths_but_keeps_hash() {
        let long_path = "/export/".to_string() + &"segment/".repeat(20);
        let h = encode_pseudo(long_path.as_bytes());
        match decode(&h).unwrap() {
            Decoded::Pseudo { hash, path_prefix } => {
                assert_eq!(hash, city_hash64(long_path.as_bytes()));
                assert!(path_prefix.len() < long_path.len());
            }
            Decoded::Backing { .. } => panic!("expected pseudo handle"),
        }
    }

    #[test]
    fn rejects_unknown_version() {
        let mut h = encode_backing(1, b"x").unwrap();
        h.0[VERSION_OFF] = 9;
        assert!(decode(&h).is_err());
    }

    #[test]
    fn opaque_too_long_is_rejected() {
        let too_long = vec![0u8; HANDLE_LEN];
        assert!(encode_backing(1, &too_long).is_err());
    }
}
