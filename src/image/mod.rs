// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Component A: boot image model & validator (spec.md §3, §4.A).

pub mod chunk;
pub mod header;
pub mod validate;

pub use chunk::{BootChunkDesc, BootZIChunkDesc, ANCILLIARY_DATA};
pub use header::{Header, HartEntry, HartFlags};
pub use validate::{validate_crc, validate_image, verify_magic};

use crate::limits::N_APP;

const CHUNK_ENTRY_LEN: usize = 4 + 8 + 8 + 8;
const ZI_CHUNK_ENTRY_LEN: usize = 4 + 8 + 8;

fn read_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes(bytes[off..off + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], off: usize) -> u64 {
    u64::from_ne_bytes(bytes[off..off + 8].try_into().unwrap())
}

/// A registered boot image: the decoded header plus the raw bytes backing
/// the chunk tables (spec.md §3). Read-only after construction — nothing in
/// this crate ever mutates `bytes` or `header` (spec.md §8 invariant 6).
#[derive(Debug, Clone, Copy)]
pub struct BootImage<'a> {
    bytes: &'a [u8],
    /// Physical address `bytes[0]` is mapped at. Chunk `load_addr` values
    /// are relative to this base (spec.md §3: "the chunk lives at
    /// `image_base + loadAddr`").
    base_addr: u64,
    pub header: Header,
}

/// Why `BootImage::parse` rejected the buffer — a decode failure, distinct
/// from `ValidateImage` semantic failures (bad magic/signature/CRC), which
/// are reported by `validate::validate_image` on an already-decoded image.
pub use header::DecodeError;

impl<'a> BootImage<'a> {
    /// Decode `bytes` (`image_base` onward) into a `BootImage`. Does not
    /// validate magic/signature/CRC — call `validate::validate_image`
    /// separately, as spec.md §4.E's control surface does before trusting a
    /// newly-registered image.
    pub fn parse(bytes: &'a [u8], base_addr: u64) -> Result<Self, DecodeError> {
        let header = Header::decode(bytes)?;
        Ok(Self { bytes, base_addr, header })
    }

    pub fn base_addr(&self) -> u64 {
        self.base_addr
    }

    /// The source address `DmaMemcpy` reads a chunk's bytes from.
    pub fn chunk_load_addr(&self, chunk: &BootChunkDesc) -> u64 {
        self.base_addr + chunk.load_addr
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn hart(&self, id: usize) -> &HartEntry {
        &self.header.hart[id]
    }

    /// Typed, bounds-checked lookup into the chunk table at
    /// `chunkTableOffset + index * sizeof(BootChunkDesc)` (spec.md §9 design
    /// note: "an arena with typed indexed lookups that bounds-check at the
    /// boundary once").
    pub fn chunk(&self, index: usize) -> Option<BootChunkDesc> {
        let base = self.header.chunk_table_offset as usize + index * CHUNK_ENTRY_LEN;
        if base + CHUNK_ENTRY_LEN > self.bytes.len() {
            return None;
        }
        let owner = read_u32(self.bytes, base);
        let load_addr = read_u64(self.bytes, base + 4);
        let exec_addr = read_u64(self.bytes, base + 12);
        let size = read_u64(self.bytes, base + 20);
        Some(BootChunkDesc {
            owner,
            load_addr,
            exec_addr,
            size,
        })
    }

    pub fn zi_chunk(&self, index: usize) -> Option<BootZIChunkDesc> {
        let base = self.header.zi_chunk_table_offset as usize + index * ZI_CHUNK_ENTRY_LEN;
        if base + ZI_CHUNK_ENTRY_LEN > self.bytes.len() {
            return None;
        }
        let owner = read_u32(self.bytes, base);
        let exec_addr = read_u64(self.bytes, base + 4);
        let size = read_u64(self.bytes, base + 12);
        Some(BootZIChunkDesc {
            owner,
            exec_addr,
            size,
        })
    }

    /// Every hart sharing `hart[id]`'s entry point, `id` itself excluded
    /// (spec.md §4.B `registerHarts`, `OpenSbiInit.handler`).
    pub fn peers_sharing_entry(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        let entry = self.header.hart[id].entry_point;
        (0..N_APP).filter(move |&p| p != id && self.header.hart[p].entry_point == entry)
    }
}
