//! Directory and file chains.
//!
//! Every block starts with a two-byte link: next track, next sector. A zero
//! track ends the chain; on the final block the sector byte instead holds
//! the offset of the last valid byte.

use std::collections::HashSet;

use crate::{D64, D64Error, DIRECTORY_TRACK, Result, SECTOR_SIZE};

/// File types in directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Del,
    Seq,
    Prg,
    Usr,
    Rel,
    Unknown(u8),
}

impl From<u8> for FileType {
    fn from(value: u8) -> Self {
        match value & 0x07 {
            0 => FileType::Del,
            1 => FileType::Seq,
            2 => FileType::Prg,
            3 => FileType::Usr,
            4 => FileType::Rel,
            x => FileType::Unknown(x),
        }
    }
}

/// A directory entry from a D64 disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File type.
    pub file_type: FileType,
    /// Whether file is "closed" (write complete).
    pub closed: bool,
    /// Whether file is "locked" (protected).
    pub locked: bool,
    /// First track of file data.
    pub first_track: u8,
    /// First sector of file data.
    pub first_sector: u8,
    /// Filename (16 chars, PETSCII, padded with 0xA0).
    pub name: [u8; 16],
    /// File size in sectors.
    pub size_sectors: u16,
}

impl DirEntry {
    /// Parse a 32-byte directory slot. Empty slots yield `None`.
    fn parse(slot: &[u8]) -> Option<Self> {
        let type_byte = slot[2];
        if type_byte == 0 {
            return None;
        }
        let mut name = [0u8; 16];
        name.copy_from_slice(&slot[5..21]);
        Some(Self {
            file_type: FileType::from(type_byte),
            closed: type_byte & 0x80 != 0,
            locked: type_byte & 0x40 != 0,
            first_track: slot[3],
            first_sector: slot[4],
            name,
            size_sectors: u16::from_le_bytes([slot[30], slot[31]]),
        })
    }

    /// Get filename as a string (strips padding).
    #[must_use]
    pub fn name_string(&self) -> String {
        let end = self.name.iter().position(|&c| c == 0xA0).unwrap_or(16);
        self.name[..end].iter().map(|&c| petscii_to_ascii(c)).collect()
    }
}

/// Convert PETSCII to ASCII (basic conversion).
fn petscii_to_ascii(c: u8) -> char {
    match c {
        0x41..=0x5A => (c + 0x20) as char, // Upper to lower
        0x61..=0x7A => (c - 0x20) as char, // Lower to upper
        0x20..=0x3F => c as char,          // Punctuation/numbers
        _ => '?',
    }
}

/// Walks a block chain, rejecting bad links and loops.
struct Chain<'a> {
    d64: &'a D64,
    kind: &'static str,
    next: Option<(u8, u8)>,
    visited: HashSet<(u8, u8)>,
}

impl<'a> Chain<'a> {
    fn new(d64: &'a D64, kind: &'static str, track: u8, sector: u8) -> Self {
        Self {
            d64,
            kind,
            next: Some((track, sector)),
            visited: HashSet::new(),
        }
    }
}

impl<'a> Iterator for Chain<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let (track, sector) = self.next.take()?;
        if !self.visited.insert((track, sector)) {
            return Some(Err(D64Error::ChainLoop {
                chain: self.kind,
                track,
                sector,
            }));
        }
        let d64 = self.d64;
        let Ok(block) = d64.read_sector(track, sector) else {
            return Some(Err(D64Error::BadLink {
                chain: self.kind,
                track,
                sector,
            }));
        };
        if block[0] != 0 {
            self.next = Some((block[0], block[1]));
        }
        Some(Ok(block))
    }
}

impl D64 {
    /// Read the directory entries.
    ///
    /// A directory chain that leaves the disk or loops is a load failure.
    pub fn read_directory(&self) -> Result<Vec<DirEntry>> {
        let bam = self.read_sector(DIRECTORY_TRACK, 0)?;
        let mut entries = Vec::new();
        for block in Chain::new(self, "directory", bam[0], bam[1]) {
            let block = block?;
            entries.extend(block.chunks_exact(32).filter_map(DirEntry::parse));
        }
        Ok(entries)
    }

    /// Find a file by name (case-insensitive).
    pub fn find_file(&self, name: &str) -> Result<Option<DirEntry>> {
        let wanted = name.to_uppercase();
        Ok(self
            .read_directory()?
            .into_iter()
            .find(|e| e.name_string().to_uppercase() == wanted))
    }

    /// Load a file's data by following its track/sector chain.
    pub fn read_file(&self, entry: &DirEntry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.size_sectors as usize * (SECTOR_SIZE - 2));
        for block in Chain::new(self, "file", entry.first_track, entry.first_sector) {
            let block = block?;
            if block[0] == 0 {
                // Final block: byte 1 is the offset of the last valid byte.
                let last = (block[1] as usize).max(1);
                data.extend_from_slice(&block[2..=last]);
            } else {
                data.extend_from_slice(&block[2..]);
            }
        }
        Ok(data)
    }
}
