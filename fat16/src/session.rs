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

//! Navigation state: the current directory cluster and the textual
//! path stack. Separate from the on-disk filesystem state because it
//! changes on every `cd` without touching the image.

use crate::dir::DirLocation;

pub const ROOT_TOKEN: &str = "Groot";

#[derive(Debug, Clone)]
pub struct Session {
    current_cluster: u32,
    current_path: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            current_cluster: 0,
            current_path: ROOT_TOKEN.to_string(),
        }
    }
}

impl Session {
    pub fn location(&self) -> DirLocation {
        if self.current_cluster == 0 {
            DirLocation::Root
        } else {
            DirLocation::Sub(self.current_cluster)
        }
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn is_root(&self) -> bool {
        self.current_cluster == 0
    }

    /// Descends into `name`, whose starting cluster is `cluster`.
    pub fn descend(&mut self, name: &str, cluster: u32) {
        self.current_cluster = cluster;
        self.current_path.push('/');
        self.current_path.push_str(name);
    }

    /// `cd ..`: truncates the path at its last `/` and resets to the
    /// root cluster, matching the reference engine's root-shortcut
    /// behavior rather than following the `..` entry's own starting
    /// cluster.
    pub fn ascend(&mut self) {
        self.current_cluster = 0;
        match self.current_path.rfind('/') {
            Some(idx) if idx > 0 => self.current_path.truncate(idx),
            _ => self.current_path = ROOT_TOKEN.to_string(),
        }
    }

    /// `cd .`: no effect.
    pub fn stay(&self) {}
}
