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

//! A read/write FAT16 volume engine over an MBR-partitioned disk
//! image: decode the partition table and boot sector, walk and mutate
//! the FAT, and expose a small directory-navigation command surface
//! (`list`, `tree`, `cd`, `read`, `write`, `delete`).

pub mod dir;
pub mod fat_table;
pub mod layout;
pub mod session;
pub mod volume;

pub use fat16_err::{Error, FsError, IoError, Result};
pub use layout::{BootSector, Layout, Partition};
pub use session::Session;
pub use volume::{EngineConfig, Fat16Volume, ListingEntry, TreeNode};
