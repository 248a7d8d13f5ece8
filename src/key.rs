//! Type-Group-Instance keys
//!
//! Every record in a container is addressed by a 128-bit key made of a
//! 32-bit type, a 32-bit group and a 64-bit instance. All three parts are
//! unsigned: `0xFFFF_FFFF` sorts after `0`.

use std::fmt;
use std::str::FromStr;

use crate::error::{PadError, Result};

/// Encoded size of a key inside an index entry: type (4) + group (4) + instance (8)
pub const KEY_SIZE: usize = 16;

/// Identifier of one record
///
/// Ordering compares type, then group, then instance. The derived `Ord`
/// follows field declaration order, so keep the fields in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Key {
    type_id: u32,
    group_id: u32,
    instance_id: u64,
}

impl Key {
    /// The all-zero key
    pub const ZERO: Key = Key::new(0, 0, 0);

    pub const fn new(type_id: u32, group_id: u32, instance_id: u64) -> Self {
        Self {
            type_id,
            group_id,
            instance_id,
        }
    }

    /// What kind of asset this is
    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    /// Which group the asset belongs to
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    /// Which asset within its type and group
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Big-endian wire form: type (4), group (4), instance (8)
    pub fn to_be_bytes(&self) -> [u8; KEY_SIZE] {
        let mut out = [0u8; KEY_SIZE];
        out[0..4].copy_from_slice(&self.type_id.to_be_bytes());
        out[4..8].copy_from_slice(&self.group_id.to_be_bytes());
        out[8..16].copy_from_slice(&self.instance_id.to_be_bytes());
        out
    }

    pub fn from_be_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let mut type_id = [0u8; 4];
        let mut group_id = [0u8; 4];
        let mut instance_id = [0u8; 8];
        type_id.copy_from_slice(&bytes[0..4]);
        group_id.copy_from_slice(&bytes[4..8]);
        instance_id.copy_from_slice(&bytes[8..16]);
        Self::new(
            u32::from_be_bytes(type_id),
            u32::from_be_bytes(group_id),
            u64::from_be_bytes(instance_id),
        )
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[0x{:08X} 0x{:08X} 0x{:016X}]",
            self.type_id, self.group_id, self.instance_id
        )
    }
}

impl From<(u32, u32, u64)> for Key {
    fn from((type_id, group_id, instance_id): (u32, u32, u64)) -> Self {
        Self::new(type_id, group_id, instance_id)
    }
}

/// Parses `type:group:instance`, each part hexadecimal with an optional
/// `0x` prefix, e.g. `0x5EB4B100:DEADBEEF:123456789ABCDEF0`.
impl FromStr for Key {
    type Err = PadError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(PadError::InvalidArgument(format!(
                "Key must look like type:group:instance, got {:?}",
                s
            )));
        }

        let type_id = parse_hex(parts[0])?;
        let group_id = parse_hex(parts[1])?;
        let instance_id = parse_hex(parts[2])?;

        let type_id = u32::try_from(type_id).map_err(|_| {
            PadError::InvalidArgument(format!("Type id out of range: {}", parts[0]))
        })?;
        let group_id = u32::try_from(group_id).map_err(|_| {
            PadError::InvalidArgument(format!("Group id out of range: {}", parts[1]))
        })?;

        Ok(Self::new(type_id, group_id, instance_id))
    }
}

fn parse_hex(part: &str) -> Result<u64> {
    let digits = part
        .strip_prefix("0x")
        .or_else(|| part.strip_prefix("0X"))
        .unwrap_or(part);
    u64::from_str_radix(digits, 16)
        .map_err(|e| PadError::InvalidArgument(format!("Bad hex value {:?}: {}", part, e)))
}
