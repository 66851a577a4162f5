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

//! End-to-end exercise of the command surface against a hand-built
//! in-memory FAT16 image: one partition starting at sector 1, 512-byte
//! sectors, one sector per cluster, a single FAT copy, and a 16-entry
//! root directory.

use chrono::NaiveDate;
use fat16::{Fat16Volume, FsError};
use fat16_io::MemImage;

const SECTOR: usize = 512;
const PARTITION_START: u64 = 1;
const TOTAL_SECTORS: usize = 19; // reserved(1) + fat(1) + root dir(1) + data(16)
const IMAGE_SECTORS: usize = PARTITION_START as usize + TOTAL_SECTORS;

fn build_image() -> Vec<u8> {
    let mut image = vec![0u8; IMAGE_SECTORS * SECTOR];

    // MBR partition entry 0: type 0x06, starts at sector 1, 19 sectors long.
    let entry = 0x1BE;
    image[entry] = 0x00; // boot indicator
    image[entry + 4] = 0x06; // partition type
    image[entry + 8..entry + 12].copy_from_slice(&(PARTITION_START as u32).to_le_bytes());
    image[entry + 12..entry + 16].copy_from_slice(&(TOTAL_SECTORS as u32).to_le_bytes());

    // Boot sector at the partition's first sector.
    let boot = PARTITION_START as usize * SECTOR;
    image[boot + 0x0B..boot + 0x0D].copy_from_slice(&512u16.to_le_bytes()); // sector size
    image[boot + 0x0D] = 1; // sectors per cluster
    image[boot + 0x0E..boot + 0x10].copy_from_slice(&1u16.to_le_bytes()); // reserved sectors
    image[boot + 0x10] = 1; // number of FATs
    image[boot + 0x11..boot + 0x13].copy_from_slice(&16u16.to_le_bytes()); // root dir entries
    image[boot + 0x13..boot + 0x15].copy_from_slice(&(TOTAL_SECTORS as u16).to_le_bytes());
    image[boot + 0x16..boot + 0x18].copy_from_slice(&1u16.to_le_bytes()); // FAT size sectors
    image[boot + 0x2B..boot + 0x36].copy_from_slice(b"TESTVOL    "); // volume label
    image[boot + 0x1FE] = 0x55;
    image[boot + 0x1FF] = 0xAA;

    image
}

fn mount() -> Fat16Volume<MemImage> {
    let device = MemImage::new(build_image());
    Fat16Volume::new(device, 0).expect("mount should succeed on a well-formed image")
}

fn stamp() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(10, 30, 0)
        .unwrap()
}

#[test]
fn fresh_volume_has_empty_root() {
    let mut volume = mount();
    assert_eq!(volume.list().unwrap().len(), 0);
    assert_eq!(volume.volume_label(), "TESTVOL");
    assert_eq!(volume.current_path(), "Groot");
}

#[test]
fn write_then_read_then_delete_round_trips() {
    let mut volume = mount();

    volume.write("HELLO.TXT", b"hello world", stamp()).unwrap();

    let listing = volume.list().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "HELLO.TXT");
    assert_eq!(listing[0].size, 11);
    assert!(!listing[0].is_directory);
    assert_eq!(listing[0].modified.unwrap(), stamp());

    let contents = volume.read("HELLO.TXT").unwrap();
    assert_eq!(contents, b"hello world");

    volume.delete("HELLO.TXT").unwrap();
    assert_eq!(volume.list().unwrap().len(), 0);
    assert!(matches!(
        volume.read("HELLO.TXT"),
        Err(fat16::Error::Fs(FsError::NotFound(_)))
    ));
}

#[test]
fn duplicate_name_is_rejected() {
    let mut volume = mount();
    volume.write("A.TXT", b"one", stamp()).unwrap();
    let err = volume.write("A.TXT", b"two", stamp()).unwrap_err();
    assert!(matches!(err, fat16::Error::Fs(FsError::AlreadyExists(_))));
}

#[test]
fn multi_cluster_file_round_trips() {
    let mut volume = mount();
    let payload: Vec<u8> = (0..1200u32).map(|i| (i % 251) as u8).collect();

    volume.write("BIG.BIN", &payload, stamp()).unwrap();
    let read_back = volume.read("BIG.BIN").unwrap();
    assert_eq!(read_back, payload);

    let listing = volume.list().unwrap();
    assert_eq!(listing[0].size, 1200);
}

#[test]
fn empty_file_allocates_no_cluster() {
    let mut volume = mount();
    volume.write("EMPTY.TXT", b"", stamp()).unwrap();
    let listing = volume.list().unwrap();
    assert_eq!(listing[0].starting_cluster, 0);
    assert_eq!(volume.read("EMPTY.TXT").unwrap(), Vec::<u8>::new());
}

#[test]
fn running_out_of_clusters_reports_no_space() {
    let mut volume = mount();
    // The data region holds 16 one-sector clusters; ask for far more
    // than that in one file.
    let payload = vec![0xAAu8; 16 * SECTOR + 1];
    let err = volume.write("TOOBIG.BIN", &payload, stamp()).unwrap_err();
    assert!(matches!(err, fat16::Error::Fs(FsError::NoSpace)));

    // The failed write must not have left a dangling file entry.
    assert_eq!(volume.list().unwrap().len(), 0);
}
