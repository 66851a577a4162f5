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

use std::cell::RefCell;

use fat16_err::{IoError, Result};

/// Positioned read/write over a flat byte-addressable device.
///
/// Every higher layer of the volume engine addresses the backing
/// image by absolute byte offset computed from the on-disk layout;
/// no buffering is assumed or provided here.
pub trait ImageDevice {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()>;

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()>;
}

/// In-memory backend, mainly for unit and integration tests: a fixed-size
/// byte buffer that reports short reads/writes instead of panicking or
/// silently growing.
pub struct MemImage {
    bytes: RefCell<Vec<u8>>,
}

impl MemImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RefCell::new(bytes),
        }
    }

    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes.into_inner()
    }
}

impl ImageDevice for MemImage {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.borrow();
        let start = offset as usize;
        let end = start + buffer.len();
        let available = bytes.len().saturating_sub(start);
        if end > bytes.len() {
            return Err(IoError::ShortRead {
                offset,
                wanted: buffer.len(),
                got: available,
            }
            .into());
        }
        buffer.copy_from_slice(&bytes[start..end]);
        Ok(())
    }

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.borrow_mut();
        let start = offset as usize;
        let end = start + buffer.len();
        if end > bytes.len() {
            return Err(IoError::ShortWrite {
                offset,
                wanted: buffer.len(),
                wrote: bytes.len().saturating_sub(start),
            }
            .into());
        }
        bytes[start..end].copy_from_slice(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_mem_image() {
        let image = MemImage::zeroed(16);
        image.write(4, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 3];
        image.read(4, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn short_read_past_end_is_an_error() {
        let image = MemImage::zeroed(4);
        let mut buf = [0u8; 8];
        assert!(image.read(0, &mut buf).is_err());
    }
}
