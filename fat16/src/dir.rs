// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! 32-byte directory entries: iteration over the root directory or a
//! subdirectory cluster chain, 8.3 name packing/formatting, FAT
//! date/time codecs, and entry creation/tombstoning.

use fat16_err::{FsError, Result};
use fat16_io::ImageDevice;
use log::{debug, warn};
use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, IntoBytes, KnownLayout,
};

use crate::fat_table::FatTable;
use crate::layout::{Layout, DIR_ENTRY_SIZE};

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_LABEL: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;

const UNUSED: u8 = 0x00;
const DELETED: u8 = 0xE5;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout)]
pub struct DirEntry {
    pub name: [u8; 8],
    pub ext: [u8; 3],
    pub attributes: u8,
    pub reserved: [u8; 10],
    pub modify_time: U16,
    pub modify_date: U16,
    pub starting_cluster: U16,
    pub file_size: U32,
}

impl DirEntry {
    pub fn empty() -> Self {
        Self {
            name: [0; 8],
            ext: [0; 3],
            attributes: 0,
            reserved: [0; 10],
            modify_time: U16::new(0),
            modify_date: U16::new(0),
            starting_cluster: U16::new(0),
            file_size: U32::new(0),
        }
    }

    pub fn is_unused(&self) -> bool {
        self.name[0] == UNUSED
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes & ATTR_VOLUME_LABEL != 0
    }

    pub fn is_system(&self) -> bool {
        self.attributes & ATTR_SYSTEM != 0
    }

    pub fn is_dot_entry(&self) -> bool {
        self.name[0] == b'.'
    }

    pub fn starting_cluster(&self) -> u32 {
        self.starting_cluster.get() as u32
    }

    pub fn file_size(&self) -> u32 {
        self.file_size.get()
    }

    pub fn formatted_name(&self) -> String {
        format_name(&self.name, &self.ext)
    }
}

/// Formats an 8.3 name as `"NAME.EXT"`, or just `"NAME"` when the
/// extension is empty. Both halves are uppercase; trailing padding
/// spaces are trimmed.
pub fn format_name(name: &[u8; 8], ext: &[u8; 3]) -> String {
    let base = std::str::from_utf8(name).unwrap_or_default().trim_end();
    let extension = std::str::from_utf8(ext).unwrap_or_default().trim_end();
    if extension.is_empty() {
        base.to_uppercase()
    } else {
        format!("{}.{}", base.to_uppercase(), extension.to_uppercase())
    }
}

/// Splits `name` at the last `.`, left-justifies and space-pads each
/// half, uppercases, and truncates to 8/3 bytes.
pub fn pack_name(name: &str) -> ([u8; 8], [u8; 3]) {
    let upper = name.to_uppercase();
    let (base, ext) = match upper.rsplit_once('.') {
        Some((base, ext)) => (base, ext),
        None => (upper.as_str(), ""),
    };

    let mut packed_name = [b' '; 8];
    for (slot, byte) in packed_name.iter_mut().zip(base.as_bytes().iter().take(8)) {
        *slot = *byte;
    }
    let mut packed_ext = [b' '; 3];
    for (slot, byte) in packed_ext.iter_mut().zip(ext.as_bytes().iter().take(3)) {
        *slot = *byte;
    }
    (packed_name, packed_ext)
}

/// Case-insensitive match between a query string and a directory
/// entry's formatted 8.3 name.
pub fn name_matches(query: &str, entry: &DirEntry) -> bool {
    entry.formatted_name() == query.to_uppercase()
}

pub fn encode_date(year: u32, month: u32, day: u32) -> u16 {
    (((year.saturating_sub(1980)) << 9) | (month << 5) | day) as u16
}

pub fn encode_time(hour: u32, minute: u32, second: u32) -> u16 {
    ((hour << 11) | (minute << 5) | (second / 2)) as u16
}

pub fn decode_date(value: u16) -> (u32, u32, u32) {
    let value = value as u32;
    (((value >> 9) & 0x7F) + 1980, (value >> 5) & 0x0F, value & 0x1F)
}

pub fn decode_time(value: u16) -> (u32, u32, u32) {
    let value = value as u32;
    ((value >> 11) & 0x1F, (value >> 5) & 0x3F, (value & 0x1F) * 2)
}

/// Where a directory's 32-byte entries live: the fixed-size root
/// region, or a subdirectory's cluster chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLocation {
    Root,
    Sub(u32),
}

/// All candidate slot offsets for a directory, bounded by the
/// directory's own capacity — never borrowed from a different
/// directory's entry count.
fn slot_offsets(location: DirLocation, layout: &Layout, fat: &FatTable) -> Result<Vec<u64>> {
    match location {
        DirLocation::Root => Ok((0..layout.root_dir_entries)
            .map(|i| layout.root_dir_offset + i * DIR_ENTRY_SIZE)
            .collect()),
        DirLocation::Sub(head) => {
            let entries_per_cluster = layout.cluster_bytes() / DIR_ENTRY_SIZE;
            let mut offsets = Vec::new();
            for cluster in fat.walk(head) {
                let cluster = cluster?;
                let base = layout.cluster_offset(cluster);
                for i in 0..entries_per_cluster {
                    offsets.push(base + i * DIR_ENTRY_SIZE);
                }
            }
            Ok(offsets)
        }
    }
}

fn read_entry(device: &dyn ImageDevice, offset: u64) -> Result<DirEntry> {
    let mut buf = [0u8; DIR_ENTRY_SIZE as usize];
    device.read(offset, &mut buf)?;
    Ok(DirEntry::read_from_bytes(&buf).expect("slice is exactly DIR_ENTRY_SIZE bytes"))
}

/// Live (non-deleted) entries of a directory, in slot order, stopping
/// at the first never-used sentinel.
pub fn live_entries(
    location: DirLocation,
    device: &dyn ImageDevice,
    layout: &Layout,
    fat: &FatTable,
) -> Result<Vec<(u64, DirEntry)>> {
    let mut out = Vec::new();
    for offset in slot_offsets(location, layout, fat)? {
        let entry = read_entry(device, offset)?;
        if entry.is_unused() {
            break;
        }
        if entry.is_deleted() {
            continue;
        }
        out.push((offset, entry));
    }
    Ok(out)
}

/// Finds an entry by 8.3 name, applying `filter` to exclude entries
/// the calling operation does not consider eligible (e.g. directories
/// and volume labels when reading/writing/deleting a file).
pub fn find_entry(
    location: DirLocation,
    name: &str,
    device: &dyn ImageDevice,
    layout: &Layout,
    fat: &FatTable,
    filter: impl Fn(&DirEntry) -> bool,
) -> Result<Option<(u64, DirEntry)>> {
    for (offset, entry) in live_entries(location, device, layout, fat)? {
        if filter(&entry) && name_matches(name, &entry) {
            return Ok(Some((offset, entry)));
        }
    }
    Ok(None)
}

/// First offset whose entry is unused or tombstoned, bounded by this
/// directory's own capacity.
pub fn find_free_slot(
    location: DirLocation,
    device: &dyn ImageDevice,
    layout: &Layout,
    fat: &FatTable,
) -> Result<u64> {
    for offset in slot_offsets(location, layout, fat)? {
        let entry = read_entry(device, offset)?;
        if entry.is_unused() || entry.is_deleted() {
            return Ok(offset);
        }
    }
    warn!("directory has no free slot");
    Err(FsError::DirectoryFull.into())
}

pub fn write_entry(device: &dyn ImageDevice, offset: u64, entry: &DirEntry) -> Result<()> {
    device.write(offset, entry.as_bytes())?;
    debug!("wrote directory entry {:?} at offset {offset}", entry.formatted_name());
    Ok(())
}

pub fn tombstone(device: &dyn ImageDevice, offset: u64) -> Result<()> {
    device.write(offset, &[DELETED])?;
    debug!("tombstoned directory entry at offset {offset}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_name_with_extension() {
        let name = *b"HELLO   ";
        let ext = *b"TXT";
        assert_eq!(format_name(&name, &ext), "HELLO.TXT");
    }

    #[test]
    fn formats_name_without_extension() {
        let name = *b"README  ";
        let ext = *b"   ";
        assert_eq!(format_name(&name, &ext), "README");
    }

    #[test]
    fn pack_then_format_round_trips() {
        for candidate in ["hello.txt", "readme", "a.b", "longname.ext"] {
            let (name, ext) = pack_name(candidate);
            let round_tripped = format_name(&name, &ext);
            assert_eq!(round_tripped, candidate.to_uppercase());
        }
    }

    #[test]
    fn date_time_round_trip_matches_scenario_6() {
        let date = encode_date(2024, 3, 15);
        let time = encode_time(10, 30, 0);
        assert_eq!(date, 0x586F);
        assert_eq!(time, 0x53C0);
        assert_eq!(decode_date(date), (2024, 3, 15));
        assert_eq!(decode_time(time), (10, 30, 0));
    }

    #[test]
    fn time_round_trip_truncates_odd_seconds() {
        let time = encode_time(23, 59, 59);
        let (h, m, s) = decode_time(time);
        assert_eq!((h, m, s), (23, 59, 58));
    }
}
