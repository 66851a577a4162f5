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

//! MBR partition table and FAT16 boot sector decoding, and the derived
//! byte offsets of the FAT region, root directory region, and data
//! region (§3-4.2 of the volume layout).

use fat16_err::{FsError, Result};
use log::{debug, error};
use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, IntoBytes, KnownLayout,
};

pub const SECTOR_SIZE: usize = 512;
pub const MBR_PARTITION_TABLE_OFFSET: usize = 0x1BE;
pub const MBR_PARTITION_COUNT: usize = 4;
pub const DIR_ENTRY_SIZE: u64 = 32;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout)]
pub struct Partition {
    pub boot_indicator: u8,
    pub start_chs: [u8; 3],
    pub partition_type: u8,
    pub end_chs: [u8; 3],
    pub start_sector: U32,
    pub length_sectors: U32,
}

/// Reads the four 16-byte partition entries at offset 0x1BE of a 512-byte
/// MBR sector.
pub fn parse_mbr(buf: &[u8; SECTOR_SIZE]) -> [Partition; MBR_PARTITION_COUNT] {
    let table = &buf[MBR_PARTITION_TABLE_OFFSET..MBR_PARTITION_TABLE_OFFSET + 16 * MBR_PARTITION_COUNT];
    std::array::from_fn(|i| {
        Partition::read_from_bytes(&table[i * 16..(i + 1) * 16]).expect("slice is exactly 16 bytes")
    })
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout)]
pub struct BootSector {
    pub jump: [u8; 3],
    pub oem_name: [u8; 8],
    pub sector_size: U16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: U16,
    pub num_fats: u8,
    pub root_dir_entries: U16,
    pub total_sectors_short: U16,
    pub media_descriptor: u8,
    pub fat_size_sectors: U16,
    pub sectors_per_track: U16,
    pub heads: U16,
    pub hidden_sectors: U32,
    pub total_sectors_long: U32,
    pub drive_number: u8,
    pub flags: u8,
    pub boot_signature: u8,
    pub volume_id: U32,
    pub volume_label: [u8; 11],
    pub filesystem_type: [u8; 8],
    pub boot_code: [u8; 448],
    pub signature_word: [u8; 2],
}

impl BootSector {
    /// Decodes the fixed 512-byte boot sector, validating the sanity
    /// checks required before any layout arithmetic is trusted.
    pub fn parse(buf: &[u8; SECTOR_SIZE]) -> Result<Self> {
        let bs = Self::read_from_bytes(buf.as_slice()).expect("slice is exactly SECTOR_SIZE bytes");

        let sector_size = bs.sector_size.get() as u32;
        if sector_size == 0 || !sector_size.is_power_of_two() {
            error!("sector size ({sector_size}) is not a positive power of two");
            return Err(FsError::InvalidLayout("sector size must be a positive power of two").into());
        }
        if bs.sectors_per_cluster == 0 {
            error!("sectors per cluster is zero");
            return Err(FsError::InvalidLayout("sectors per cluster must be at least 1").into());
        }
        if bs.num_fats == 0 {
            error!("number of FATs is zero");
            return Err(FsError::InvalidLayout("number of FATs must be at least 1").into());
        }

        debug!(
            "boot sector: sector_size={} sectors_per_cluster={} reserved_sectors={} num_fats={} root_dir_entries={}",
            sector_size, bs.sectors_per_cluster, bs.reserved_sectors, bs.num_fats, bs.root_dir_entries
        );
        Ok(bs)
    }

    pub fn sector_size(&self) -> u64 {
        self.sector_size.get() as u64
    }

    pub fn sectors_per_cluster(&self) -> u64 {
        self.sectors_per_cluster as u64
    }

    pub fn cluster_bytes(&self) -> u64 {
        self.sector_size() * self.sectors_per_cluster()
    }

    pub fn num_fats(&self) -> u64 {
        self.num_fats as u64
    }

    pub fn fat_size_sectors(&self) -> u64 {
        self.fat_size_sectors.get() as u64
    }

    pub fn fat_size_bytes(&self) -> u64 {
        self.fat_size_sectors() * self.sector_size()
    }

    pub fn root_dir_entries(&self) -> u64 {
        self.root_dir_entries.get() as u64
    }

    pub fn root_dir_bytes(&self) -> u64 {
        self.root_dir_entries() * DIR_ENTRY_SIZE
    }

    pub fn total_sectors(&self) -> u64 {
        if self.total_sectors_short.get() != 0 {
            self.total_sectors_short.get() as u64
        } else {
            self.total_sectors_long.get() as u64
        }
    }
}

/// Absolute sector/byte offsets derived from the partition start and the
/// boot sector, per §3 "Derived offsets".
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub partition_start_sector: u64,
    pub sector_size: u64,
    pub sectors_per_cluster: u64,
    pub fat_region_offset: u64,
    pub root_dir_offset: u64,
    pub root_dir_bytes: u64,
    pub data_start_sector: u64,
    pub num_fats: u64,
    pub fat_size_bytes: u64,
    pub root_dir_entries: u64,
    pub total_clusters: u64,
}

impl Layout {
    pub fn new(partition_start_sector: u64, bs: &BootSector) -> Self {
        let sector_size = bs.sector_size();
        let sectors_per_cluster = bs.sectors_per_cluster();
        let reserved_sectors = bs.reserved_sectors.get() as u64;
        let num_fats = bs.num_fats();
        let fat_size_sectors = bs.fat_size_sectors();

        let fat_region_offset = (partition_start_sector + reserved_sectors) * sector_size;
        let root_dir_offset = fat_region_offset + num_fats * fat_size_sectors * sector_size;
        let root_dir_bytes = bs.root_dir_bytes();
        let root_dir_sectors = root_dir_bytes.div_ceil(sector_size);
        let data_start_sector =
            partition_start_sector + reserved_sectors + num_fats * fat_size_sectors + root_dir_sectors;

        let data_sectors = bs.total_sectors().saturating_sub(
            reserved_sectors + num_fats * fat_size_sectors + root_dir_sectors,
        );
        let total_clusters = data_sectors / sectors_per_cluster.max(1);

        Self {
            partition_start_sector,
            sector_size,
            sectors_per_cluster,
            fat_region_offset,
            root_dir_offset,
            root_dir_bytes,
            data_start_sector,
            num_fats,
            fat_size_bytes: bs.fat_size_bytes(),
            root_dir_entries: bs.root_dir_entries(),
            total_clusters,
        }
    }

    pub fn cluster_bytes(&self) -> u64 {
        self.sector_size * self.sectors_per_cluster
    }

    /// Byte offset of cluster `cluster` (cluster numbers start at 2).
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        debug_assert!(cluster >= 2);
        (self.data_start_sector + (cluster as u64 - 2) * self.sectors_per_cluster) * self.sector_size
    }

    pub fn fat_copy_offset(&self, index: u64) -> u64 {
        self.fat_region_offset + index * self.fat_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_boot_sector() -> BootSector {
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
        buf[0x0D] = 4; // sectors per cluster
        buf[0x0E..0x10].copy_from_slice(&1u16.to_le_bytes()); // reserved sectors
        buf[0x10] = 2; // number of FATs
        buf[0x11..0x13].copy_from_slice(&512u16.to_le_bytes()); // root dir entries
        buf[0x16..0x18].copy_from_slice(&32u16.to_le_bytes()); // fat size sectors
        buf[0x13..0x15].copy_from_slice(&20480u16.to_le_bytes()); // total sectors short
        BootSector::parse(&buf).unwrap()
    }

    #[test]
    fn decode_then_reencode_is_byte_identical() {
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
        buf[0x0D] = 4;
        buf[0x0E..0x10].copy_from_slice(&1u16.to_le_bytes());
        buf[0x10] = 2;
        buf[0x11..0x13].copy_from_slice(&512u16.to_le_bytes());
        buf[0x16..0x18].copy_from_slice(&32u16.to_le_bytes());
        buf[510] = 0x55;
        buf[511] = 0xAA;

        let bs = BootSector::parse(&buf).unwrap();
        assert_eq!(bs.as_bytes(), &buf[..]);
    }

    #[test]
    fn rejects_non_power_of_two_sector_size() {
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0x0B..0x0D].copy_from_slice(&513u16.to_le_bytes());
        buf[0x0D] = 1;
        buf[0x10] = 1;
        assert!(BootSector::parse(&buf).is_err());
    }

    #[test]
    fn cluster_2_offset_matches_scenario_1() {
        let bs = sample_boot_sector();
        let layout = Layout::new(0, &bs);
        assert_eq!(layout.cluster_offset(2), (1 + 64 + 32) * 512);
    }

    #[test]
    fn cluster_offsets_are_evenly_spaced() {
        let bs = sample_boot_sector();
        let layout = Layout::new(0, &bs);
        for c in 3u32..10 {
            assert_eq!(
                layout.cluster_offset(c),
                layout.cluster_offset(c - 1) + layout.cluster_bytes()
            );
        }
    }
}
