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

//! The mounted engine and the thin command surface exposed to an
//! external shell: `list`, `tree`, `cd`/`cd_up`/`cd_self`, `read`,
//! `write`, `delete`.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDateTime, Timelike};
use fat16_err::{FsError, Result};
use fat16_io::ImageDevice;
use fat16_io_std::StdImage;
use log::{debug, warn};

use zerocopy::little_endian::{U16, U32};

use crate::dir::{
    self, decode_date, decode_time, encode_date, encode_time, pack_name, DirEntry, DirLocation,
    ATTR_ARCHIVE,
};
use crate::fat_table::FatTable;
use crate::layout::{parse_mbr, BootSector, Layout, Partition, SECTOR_SIZE};
use crate::session::Session;

/// Construction-time configuration: which image to mount and which
/// MBR partition on it carries the FAT16 volume.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub image_path: PathBuf,
    pub partition: usize,
}

impl EngineConfig {
    pub fn new(image_path: impl Into<PathBuf>, partition: usize) -> Self {
        Self {
            image_path: image_path.into(),
            partition,
        }
    }
}

/// One entry as surfaced by `list`/`tree`: the external shell decides
/// how to render it.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    pub name: String,
    pub is_directory: bool,
    pub is_volume_label: bool,
    pub size: u32,
    pub modified: Option<NaiveDateTime>,
    pub starting_cluster: u32,
}

impl From<&DirEntry> for ListingEntry {
    fn from(entry: &DirEntry) -> Self {
        let (year, month, day) = decode_date(entry.modify_date.get());
        let (hour, minute, second) = decode_time(entry.modify_time.get());
        let modified = chrono::NaiveDate::from_ymd_opt(year as i32, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second));
        Self {
            name: entry.formatted_name(),
            is_directory: entry.is_directory(),
            is_volume_label: entry.is_volume_label(),
            size: entry.file_size(),
            modified,
            starting_cluster: entry.starting_cluster(),
        }
    }
}

/// A directory and its (already recursively collected) children, as
/// returned by `tree`.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub entry: ListingEntry,
    pub children: Vec<TreeNode>,
}

/// The mounted FAT16 volume: layout, the primary FAT, the backing
/// image, and the navigation session — generic over the image
/// backend so tests can mount an in-memory device.
pub struct Fat16Volume<D: ImageDevice> {
    device: D,
    #[allow(dead_code)]
    partitions: [Partition; 4],
    boot_sector: BootSector,
    layout: Layout,
    fat: FatTable,
    session: Session,
}

impl Fat16Volume<StdImage> {
    /// Opens a FAT16 volume on a real file per `cfg`.
    pub fn open(cfg: &EngineConfig) -> Result<Self> {
        let device = StdImage::open(&cfg.image_path)?;
        Self::new(device, cfg.partition)
    }
}

impl<D: ImageDevice> Fat16Volume<D> {
    /// Mounts a FAT16 volume on any backing device: reads the MBR,
    /// selects `partition_index`, and decodes its boot sector.
    pub fn new(device: D, partition_index: usize) -> Result<Self> {
        let mut mbr = [0u8; SECTOR_SIZE];
        device.read(0, &mut mbr)?;
        let partitions = parse_mbr(&mbr);

        let partition = partitions
            .get(partition_index)
            .ok_or(FsError::InvalidLayout("partition index out of range"))?;
        let partition_start = partition.start_sector.get() as u64;
        debug!("mounting partition {partition_index} at sector {partition_start}");

        let mut boot = [0u8; SECTOR_SIZE];
        device.read(partition_start * SECTOR_SIZE as u64, &mut boot)?;
        let boot_sector = BootSector::parse(&boot)?;
        let layout = Layout::new(partition_start, &boot_sector);
        let fat = FatTable::new(&layout);

        Ok(Self {
            device,
            partitions,
            boot_sector,
            layout,
            fat,
            session: Session::default(),
        })
    }

    pub fn current_path(&self) -> &str {
        self.session.current_path()
    }

    pub fn volume_label(&self) -> String {
        String::from_utf8_lossy(&self.boot_sector.volume_label)
            .trim_end()
            .to_string()
    }

    fn ensure_fat_loaded(&mut self) -> Result<()> {
        self.fat.load(&self.device, &self.layout)
    }

    fn find(
        &self,
        name: &str,
        filter: impl Fn(&DirEntry) -> bool,
    ) -> Result<(u64, DirEntry)> {
        dir::find_entry(self.session.location(), name, &self.device, &self.layout, &self.fat, filter)?
            .ok_or_else(|| FsError::NotFound(name.to_string()).into())
    }

    /// `list`: the current directory's live entries.
    pub fn list(&mut self) -> Result<Vec<ListingEntry>> {
        self.ensure_fat_loaded()?;
        let entries = dir::live_entries(self.session.location(), &self.device, &self.layout, &self.fat)?;
        Ok(entries.iter().map(|(_, entry)| entry.into()).collect())
    }

    /// `tree`: a recursive listing from the root, skipping volume
    /// labels and `.`/`..` self-references, with cycle protection.
    pub fn tree(&mut self) -> Result<TreeNode> {
        self.ensure_fat_loaded()?;
        let mut visited = HashSet::new();
        visited.insert(0u32);
        let root = ListingEntry {
            name: self.volume_label(),
            is_directory: true,
            is_volume_label: false,
            size: 0,
            modified: None,
            starting_cluster: 0,
        };
        let children = self.tree_children(DirLocation::Root, 0, &mut visited)?;
        Ok(TreeNode {
            entry: root,
            children,
        })
    }

    fn tree_children(
        &self,
        location: DirLocation,
        head: u32,
        visited: &mut HashSet<u32>,
    ) -> Result<Vec<TreeNode>> {
        let mut nodes = Vec::new();
        for (_, entry) in dir::live_entries(location, &self.device, &self.layout, &self.fat)? {
            if entry.is_volume_label() || entry.is_dot_entry() {
                continue;
            }
            let listing: ListingEntry = (&entry).into();
            if entry.is_directory() {
                let child_cluster = entry.starting_cluster();
                if child_cluster == head || !visited.insert(child_cluster) {
                    nodes.push(TreeNode {
                        entry: listing,
                        children: Vec::new(),
                    });
                    continue;
                }
                let children = self.tree_children(DirLocation::Sub(child_cluster), child_cluster, visited)?;
                nodes.push(TreeNode {
                    entry: listing,
                    children,
                });
            } else {
                nodes.push(TreeNode {
                    entry: listing,
                    children: Vec::new(),
                });
            }
        }
        Ok(nodes)
    }

    /// `cd <path>`: descends through `/`-separated subdirectory
    /// components, each resolved against the directory current at
    /// that point in the traversal.
    pub fn cd(&mut self, path: &str) -> Result<()> {
        self.ensure_fat_loaded()?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let (_, entry) = self.find(component, DirEntry::is_directory)?;
            self.session.descend(&entry.formatted_name(), entry.starting_cluster());
        }
        Ok(())
    }

    /// `cd ..`: resets to the root directory (see `Session::ascend`).
    pub fn cd_up(&mut self) {
        self.session.ascend();
    }

    /// `cd .`: no effect.
    pub fn cd_self(&self) {
        self.session.stay();
    }

    /// `read <name>`: the file's full contents.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        self.ensure_fat_loaded()?;
        let (_, entry) = self.find(name, |e| !e.is_directory() && !e.is_volume_label())?;

        let mut remaining = entry.file_size() as usize;
        let mut out = Vec::with_capacity(remaining);
        let cluster_bytes = self.layout.cluster_bytes() as usize;

        for cluster in self.fat.walk(entry.starting_cluster()) {
            if remaining == 0 {
                break;
            }
            let cluster = cluster?;
            let to_read = remaining.min(cluster_bytes);
            let mut buf = vec![0u8; to_read];
            self.device.read(self.layout.cluster_offset(cluster), &mut buf)?;
            out.extend_from_slice(&buf);
            remaining -= to_read;
        }

        if remaining != 0 {
            warn!("chain for {name} ended with {remaining} bytes still unread");
            return Err(FsError::TruncatedChain.into());
        }
        Ok(out)
    }

    /// `write <name> <bytes>`: creates a new file with the given
    /// contents, stamped with `modified`.
    pub fn write(&mut self, name: &str, bytes: &[u8], modified: NaiveDateTime) -> Result<()> {
        self.ensure_fat_loaded()?;
        if dir::find_entry(self.session.location(), name, &self.device, &self.layout, &self.fat, |_| true)?
            .is_some()
        {
            return Err(FsError::AlreadyExists(name.to_string()).into());
        }

        let head = match self.allocate_chain(bytes.len()) {
            Ok(head) => head,
            Err(err) => return Err(err),
        };

        if let Some(head) = head {
            let cluster_bytes = self.layout.cluster_bytes() as usize;
            let mut cluster = head;
            for chunk in bytes.chunks(cluster_bytes) {
                self.device.write(self.layout.cluster_offset(cluster), chunk)?;
                let next = self.fat.get(cluster)?;
                if (0x0002..=0xFFEF).contains(&next) {
                    cluster = next as u32;
                }
            }
        }

        let (base, ext) = pack_name(name);
        let mut entry = DirEntry::empty();
        entry.name = base;
        entry.ext = ext;
        entry.attributes = ATTR_ARCHIVE;
        entry.starting_cluster = U16::new(head.unwrap_or(0) as u16);
        entry.file_size = U32::new(bytes.len() as u32);
        entry.modify_date =
            U16::new(encode_date(modified.year() as u32, modified.month(), modified.day()));
        entry.modify_time =
            U16::new(encode_time(modified.hour(), modified.minute(), modified.second()));

        let slot = match dir::find_free_slot(self.session.location(), &self.device, &self.layout, &self.fat) {
            Ok(slot) => slot,
            Err(err) => {
                if let Some(head) = head {
                    let _ = self.fat.free_chain(head);
                }
                return Err(err);
            }
        };
        dir::write_entry(&self.device, slot, &entry)?;
        self.fat.flush(&self.device, &self.layout)?;
        debug!("wrote file {name} ({} bytes)", bytes.len());
        Ok(())
    }

    /// Allocates a cluster chain long enough for `len` bytes, linking
    /// each cluster forward. Returns `None` for a zero-length file
    /// (no clusters allocated). On failure, frees whatever was
    /// allocated so far before propagating the error.
    fn allocate_chain(&mut self, len: usize) -> Result<Option<u32>> {
        if len == 0 {
            return Ok(None);
        }
        let cluster_bytes = self.layout.cluster_bytes() as usize;
        let clusters_needed = len.div_ceil(cluster_bytes);

        let head = match self.fat.allocate_free() {
            Ok(head) => head,
            Err(err) => return Err(err),
        };
        let mut previous = head;
        for _ in 1..clusters_needed {
            match self.fat.allocate_free() {
                Ok(next) => {
                    self.fat.set(previous, next as u16)?;
                    previous = next;
                }
                Err(err) => {
                    let _ = self.fat.free_chain(head);
                    return Err(err);
                }
            }
        }
        Ok(Some(head))
    }

    /// `delete <name>`: frees the file's cluster chain and tombstones
    /// its directory entry.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.ensure_fat_loaded()?;
        let (offset, entry) = self.find(name, |e| !e.is_directory() && !e.is_volume_label())?;

        if entry.starting_cluster() != 0 {
            self.fat.free_chain(entry.starting_cluster())?;
        }
        dir::tombstone(&self.device, offset)?;
        self.fat.flush(&self.device, &self.layout)?;
        debug!("deleted file {name}");
        Ok(())
    }
}
