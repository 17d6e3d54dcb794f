//! Binary header of the index manifest.

use crate::error::{IvfPqError, Result};

/// Magic bytes identifying a forge-ivfpq manifest: "IVFPQMF\0"
pub const MAGIC: [u8; 8] = *b"IVFPQMF\0";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Manifest flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags {
    bits: u32,
}

impl FormatFlags {
    /// No special flags.
    pub const NONE: u32 = 0;
    /// Code shards hold residual codes.
    pub const RESIDUAL: u32 = 1 << 0;

    /// Create new flags from bits.
    pub fn new(bits: u32) -> Self {
        Self { bits }
    }

    /// Get the raw bits.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Check if a flag is set.
    pub fn has(&self, flag: u32) -> bool {
        self.bits & flag != 0
    }

    /// Set a flag.
    pub fn set(&mut self, flag: u32) {
        self.bits |= flag;
    }
}

/// File header structure.
///
/// Total size: 20 bytes
/// ```text
/// [MAGIC 8B][VERSION u32][FLAGS u32][CHECKSUM u32]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Magic bytes (must be MAGIC)
    pub magic: [u8; 8],
    /// Format version
    pub version: u32,
    /// Format flags
    pub flags: FormatFlags,
    /// CRC32 checksum of the body (everything after header)
    pub checksum: u32,
}

impl FileHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 20;

    /// Create a new header with flags.
    pub fn new(flags: FormatFlags, checksum: u32) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            flags,
            checksum,
        }
    }

    /// Serialize header to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.magic);
        bytes[8..12].copy_from_slice(&self.version.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.flags.bits().to_le_bytes());
        bytes[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(IvfPqError::invalid_format("header too small"));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);

        if magic != MAGIC {
            return Err(IvfPqError::invalid_format("invalid magic bytes"));
        }

        let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let flags_raw = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let checksum = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);

        Ok(Self {
            magic,
            version,
            flags: FormatFlags::new(flags_raw),
            checksum,
        })
    }

    /// Verify the header is one this build can read.
    pub fn verify(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(IvfPqError::invalid_format("invalid magic bytes"));
        }

        if self.version > FORMAT_VERSION {
            return Err(IvfPqError::invalid_format(format!(
                "unsupported version {} (max supported: {})",
                self.version, FORMAT_VERSION
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        let mut flags = FormatFlags::default();
        flags.set(FormatFlags::RESIDUAL);
        let header = FileHeader::new(flags, 0xDEADBEEF);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..8], b"IVFPQMF\0");

        let parsed = FileHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.flags.has(FormatFlags::RESIDUAL));
        assert!(parsed.verify().is_ok());
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = [0u8; FileHeader::SIZE];
        bytes[0..8].copy_from_slice(b"FORGEDB\0");
        assert!(FileHeader::from_bytes(&bytes).is_err());
        assert!(FileHeader::from_bytes(&bytes[..4]).is_err());
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut header = FileHeader::new(FormatFlags::default(), 0);
        header.version = FORMAT_VERSION + 1;
        assert!(matches!(header.verify(), Err(IvfPqError::InvalidFormat(_))));
    }
}
