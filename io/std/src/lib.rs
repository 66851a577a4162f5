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

use std::{fs::File, os::unix::fs::FileExt, path::Path};

use fat16_err::{IoError, Result};
use fat16_io::ImageDevice;
use log::debug;

/// Backing image opened read+write over a real file, addressed with
/// positioned I/O so no seek state is shared across calls.
pub struct StdImage {
    file: File,
}

impl StdImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .map_err(IoError::from)?;
        debug!("opened image {}", path.display());
        Ok(Self { file })
    }
}

impl ImageDevice for StdImage {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        self.file
            .read_exact_at(buffer, offset)
            .map_err(IoError::from)?;
        Ok(())
    }

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        self.file
            .write_all_at(buffer, offset)
            .map_err(IoError::from)?;
        Ok(())
    }
}
