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

//! The in-memory FAT: get/set of chain links, allocation of free
//! clusters, chain walking with cycle detection, and mirrored
//! write-back to every FAT copy on the image.

use fat16_err::{FsError, Result};
use fat16_io::ImageDevice;
use log::{debug, warn};

use crate::layout::Layout;

pub const FREE: u16 = 0x0000;
pub const END_OF_CHAIN: u16 = 0xFFFF;
const CHAIN_MIN: u16 = 0x0002;
const CHAIN_MAX: u16 = 0xFFEF;

/// The primary FAT, loaded once and mutated in memory until `flush`
/// mirrors it back to every FAT copy on the image.
pub struct FatTable {
    slots: Vec<u16>,
    /// Clusters beyond `2 + data_cluster_count` fall outside the data
    /// region even though the FAT itself (rounded up to whole sectors)
    /// may have room for more entries; allocation must never hand one
    /// of those out.
    data_cluster_count: u64,
    loaded: bool,
}

impl FatTable {
    pub fn new(layout: &Layout) -> Self {
        let slot_count = (layout.fat_size_bytes / 2) as usize;
        Self {
            slots: vec![0u16; slot_count],
            data_cluster_count: layout.total_clusters,
            loaded: false,
        }
    }

    /// Reads the primary FAT (copy 0) from the image. Idempotent.
    pub fn load(&mut self, device: &dyn ImageDevice, layout: &Layout) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        let mut bytes = vec![0u8; layout.fat_size_bytes as usize];
        device.read(layout.fat_copy_offset(0), &mut bytes)?;
        for (slot, chunk) in self.slots.iter_mut().zip(bytes.chunks_exact(2)) {
            *slot = u16::from_le_bytes([chunk[0], chunk[1]]);
        }
        self.loaded = true;
        debug!("loaded FAT ({} bytes, {} slots)", layout.fat_size_bytes, self.slots.len());
        Ok(())
    }

    /// Fails with `CycleDetected` rather than panicking when `cluster`
    /// lies outside the loaded FAT — e.g. a chain link or a directory
    /// entry's `starting_cluster` read off a malformed image.
    pub fn get(&self, cluster: u32) -> Result<u16> {
        self.slots
            .get(cluster as usize)
            .copied()
            .ok_or_else(|| FsError::CycleDetected.into())
    }

    pub fn set(&mut self, cluster: u32, value: u16) -> Result<()> {
        match self.slots.get_mut(cluster as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(FsError::CycleDetected.into()),
        }
    }

    /// Scans from cluster 2 for the first free slot, tentatively marks
    /// it end-of-chain, and returns it.
    pub fn allocate_free(&mut self) -> Result<u32> {
        let last_valid = 2 + self.data_cluster_count as usize;
        for cluster in 2..last_valid.min(self.slots.len()) {
            if self.slots[cluster] == FREE {
                self.slots[cluster] = END_OF_CHAIN;
                debug!("allocated cluster {cluster}");
                return Ok(cluster as u32);
            }
        }
        warn!("no free cluster available ({} data clusters)", self.data_cluster_count);
        Err(FsError::NoSpace.into())
    }

    /// Yields `head`, then successors while the link is a valid
    /// in-chain pointer, bounded by the total cluster count to detect
    /// cycles in malformed chains.
    pub fn walk(&self, head: u32) -> ChainWalk<'_> {
        ChainWalk {
            table: self,
            next: if head == 0 { None } else { Some(head) },
            steps_left: self.slots.len(),
        }
    }

    /// Walks the chain starting at `head`, zeroing every link.
    pub fn free_chain(&mut self, head: u32) -> Result<()> {
        let clusters: Vec<u32> = self.walk(head).collect::<Result<_>>()?;
        for cluster in clusters {
            self.set(cluster, FREE)?;
        }
        Ok(())
    }

    /// Writes the in-memory FAT to every FAT copy on the image.
    pub fn flush(&self, device: &dyn ImageDevice, layout: &Layout) -> Result<()> {
        let mut bytes = Vec::with_capacity(layout.fat_size_bytes as usize);
        for slot in &self.slots {
            bytes.extend_from_slice(&slot.to_le_bytes());
        }
        for i in 0..layout.num_fats {
            device.write(layout.fat_copy_offset(i), &bytes)?;
        }
        debug!("flushed FAT to {} copies ({} bytes each)", layout.num_fats, bytes.len());
        Ok(())
    }
}

pub struct ChainWalk<'a> {
    table: &'a FatTable,
    next: Option<u32>,
    steps_left: usize,
}

impl Iterator for ChainWalk<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        let cluster = self.next?;
        if self.steps_left == 0 {
            warn!("cluster chain exceeded {} steps, treating as cyclic", self.table.slots.len());
            self.next = None;
            return Some(Err(FsError::CycleDetected.into()));
        }
        self.steps_left -= 1;

        let link = match self.table.get(cluster) {
            Ok(link) => link,
            Err(err) => {
                self.next = None;
                return Some(Err(err));
            }
        };
        self.next = if (CHAIN_MIN..=CHAIN_MAX).contains(&link) {
            Some(link as u32)
        } else {
            None
        };
        Some(Ok(cluster))
    }
}
