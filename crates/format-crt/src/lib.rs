//! CRT cartridge container parser.
//!
//! The CRT format wraps cartridge ROM images with a 64-byte header
//! describing the hardware type and EXROM/GAME line configuration. ROM
//! data follows in CHIP packets, each carrying a bank number and load
//! address. All multi-byte fields are big-endian.
//!
//! Header:
//!   $00-$0F: "C64 CARTRIDGE   "
//!   $10-$13: header length
//!   $14-$15: version (major, minor)
//!   $16-$17: hardware type
//!   $18:     EXROM line
//!   $19:     GAME line
//!   $20-$3F: name, zero-padded
//!
//! CHIP packet:
//!   +$00: "CHIP"
//!   +$04: total packet length
//!   +$08: chip type (0 = ROM, 1 = RAM, 2 = Flash)
//!   +$0A: bank number
//!   +$0C: load address
//!   +$0E: ROM size
//!   +$10: ROM data
//!
//! Only the container is parsed; banking behaviour belongs to the host.

mod error;

use std::fs;
use std::path::Path;

pub use error::{CrtError, Result};

/// CRT file signature.
const CRT_SIGNATURE: &[u8; 16] = b"C64 CARTRIDGE   ";
/// CHIP packet signature.
const CHIP_SIGNATURE: &[u8; 4] = b"CHIP";
/// Fixed header size; the header length field may claim more.
const HEADER_SIZE: usize = 0x40;
/// CHIP packet header size.
const CHIP_HEADER_SIZE: usize = 0x10;

/// Read a big-endian u16 from a byte slice.
fn read_be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Read a big-endian u32 from a byte slice.
fn read_be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Memory a CHIP packet provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipType {
    Rom,
    Ram,
    Flash,
    Unknown(u16),
}

impl From<u16> for ChipType {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::Rom,
            1 => Self::Ram,
            2 => Self::Flash,
            other => Self::Unknown(other),
        }
    }
}

/// The 64-byte CRT header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtHeader {
    /// Version as (major, minor).
    pub version: (u8, u8),
    /// Hardware type (0 = normal cartridge).
    pub hardware_type: u16,
    /// EXROM line state (active low: false = asserted).
    pub exrom: bool,
    /// GAME line state (active low: false = asserted).
    pub game: bool,
    /// Cartridge name, zero padding stripped.
    pub name: String,
}

/// One CHIP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipPacket {
    pub chip_type: ChipType,
    pub bank: u16,
    pub load_address: u16,
    pub data: Vec<u8>,
}

/// A parsed CRT file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crt {
    pub header: CrtHeader,
    pub chips: Vec<ChipPacket>,
}

impl Crt {
    /// Parse a CRT file.
    ///
    /// # Errors
    ///
    /// Fails on a bad signature, a header length that runs past the file,
    /// or a malformed or truncated CHIP packet.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CrtError::TooShort(data.len()));
        }
        if &data[..16] != CRT_SIGNATURE {
            return Err(CrtError::Signature);
        }

        let header_len = read_be_u32(data, 0x10) as usize;
        if !(0x20..=data.len()).contains(&header_len) {
            return Err(CrtError::HeaderLength(header_len));
        }

        let name_bytes = &data[0x20..0x40];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let header = CrtHeader {
            version: (data[0x14], data[0x15]),
            hardware_type: read_be_u16(data, 0x16),
            exrom: data[0x18] != 0,
            game: data[0x19] != 0,
            name: String::from_utf8_lossy(&name_bytes[..end]).trim().to_string(),
        };

        // Some writers store $20 here though the header is always 64 bytes.
        let mut offset = header_len.max(HEADER_SIZE);
        let mut chips = Vec::new();
        while offset + CHIP_HEADER_SIZE <= data.len() {
            chips.push(Self::parse_chip(data, offset)?);
            offset += read_be_u32(data, offset + 4) as usize;
        }
        if offset < data.len() {
            log::warn!("CRT: {} trailing bytes ignored", data.len() - offset);
        }
        if chips.is_empty() {
            return Err(CrtError::NoChips);
        }

        log::debug!(
            "parsed CRT \"{}\": type {}, {} CHIP packets",
            header.name,
            header.hardware_type,
            chips.len()
        );
        Ok(Self { header, chips })
    }

    /// Read and parse a CRT file.
    ///
    /// # Errors
    ///
    /// I/O failures and every error [`Crt::parse`] reports.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    /// CHIP packets mapped at `load_address`, in bank order.
    pub fn chips_at(&self, load_address: u16) -> impl Iterator<Item = &ChipPacket> {
        let mut chips: Vec<&ChipPacket> = self
            .chips
            .iter()
            .filter(|c| c.load_address == load_address)
            .collect();
        chips.sort_by_key(|c| c.bank);
        chips.into_iter()
    }

    fn parse_chip(data: &[u8], offset: usize) -> Result<ChipPacket> {
        let signature = &data[offset..offset + 4];
        if signature != CHIP_SIGNATURE {
            let mut found = [0u8; 4];
            found.copy_from_slice(signature);
            return Err(CrtError::ChipSignature { offset, found });
        }

        let length = read_be_u32(data, offset + 4) as usize;
        if length < CHIP_HEADER_SIZE || offset + length > data.len() {
            return Err(CrtError::ChipLength { offset, length });
        }

        let rom_size = read_be_u16(data, offset + 0x0E) as usize;
        if CHIP_HEADER_SIZE + rom_size > length {
            return Err(CrtError::ChipData { offset });
        }
        let rom_start = offset + CHIP_HEADER_SIZE;

        Ok(ChipPacket {
            chip_type: ChipType::from(read_be_u16(data, offset + 0x08)),
            bank: read_be_u16(data, offset + 0x0A),
            load_address: read_be_u16(data, offset + 0x0C),
            data: data[rom_start..rom_start + rom_size].to_vec(),
        })
    }
}
