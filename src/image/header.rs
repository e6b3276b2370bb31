// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Boot image header layout (spec.md §6).
//!
//! The header is decoded with explicit little-endian cursor reads rather
//! than a `#[repr(C)]` pointer overlay: spec.md's own design notes (§9) call
//! for "an arena with typed indexed lookups that bounds-check at the
//! boundary once" in a systems-language rewrite, which a cursor parser gives
//! for free without `unsafe`.

use bitflags::bitflags;

use crate::limits::{N_APP, N_NAME, N_SET, N_SIGNATURE};

/// Plain-text magic accepted by `VerifyMagic` (spec.md §4.A, §6).
pub const MAGIC_PLAIN: u32 = 0x424F_4F54; // "BOOT"
/// Compressed-image magic: accepted by `VerifyMagic`, decoding happens
/// upstream of the core (spec.md §6).
pub const MAGIC_COMPRESSED: u32 = 0x5A4F_4F54; // "ZOOT"

bitflags! {
    /// Per-hart flags (spec.md §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HartFlags: u32 {
        const SKIP_OPENSBI      = 1 << 0;
        const SKIP_AUTOBOOT     = 1 << 1;
        const ALLOW_COLD_REBOOT = 1 << 2;
        const ALLOW_WARM_REBOOT = 1 << 3;
    }
}

/// One `hart[N_APP]` entry (spec.md §3, §6).
#[derive(Debug, Clone, Copy)]
pub struct HartEntry {
    pub name: [u8; N_NAME],
    pub entry_point: u64,
    pub priv_mode: u8,
    pub first_chunk: u32,
    pub last_chunk: u32,
    pub num_chunks: u32,
    pub flags: HartFlags,
}

impl HartEntry {
    const fn zeroed() -> Self {
        Self {
            name: [0; N_NAME],
            entry_point: 0,
            priv_mode: 0,
            first_chunk: 0,
            last_chunk: 0,
            num_chunks: 0,
            flags: HartFlags::empty(),
        }
    }

    /// A hart with a nonzero entry point is eligible to be jumped to
    /// (spec.md §4.B `Wait.handler`, `OpenSbiInit.exit`).
    pub fn has_entry_point(&self) -> bool {
        self.entry_point != 0
    }

    /// A "primary boot hart" has both chunks to download and an entry
    /// point (spec.md §4.B `OpenSbiInit.entry`).
    pub fn is_primary_boot_hart(&self) -> bool {
        self.num_chunks > 0 && self.has_entry_point()
    }
}

const HART_ENTRY_LEN: usize = N_NAME + 8 + 1 + 4 + 4 + 4 + 4;
const HEADER_FIXED_LEN: usize = 4 + N_SET + 4 + 4 + 4 + 4 + 4;

/// `sizeof(HeaderV0)`: the CRC prefix length for `version == 0` images
/// (spec.md §4.A).
pub const HEADER_V0_LEN: usize = HEADER_FIXED_LEN + N_APP * HART_ENTRY_LEN;
/// `sizeof(HeaderVCurrent)`: the CRC prefix length for `version >= 1` images.
pub const HEADER_VCURRENT_LEN: usize = HEADER_V0_LEN + N_SIGNATURE;

/// Byte offset of the `headerCrc` field, zeroed in the CRC scratch copy
/// before recomputation (spec.md §4.A).
pub const HEADER_CRC_OFFSET: usize = 4 + N_SET + 4 + 4;
/// Byte offset of the optional `signature` field.
pub const SIGNATURE_OFFSET: usize = HEADER_V0_LEN;

/// The decoded, fixed-size header (spec.md §3 `BootImage`, minus the chunk
/// tables which are read lazily via `image::BootImage::chunk`/`zi_chunk`).
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub magic: u32,
    pub set_name: [u8; N_SET],
    pub version: u32,
    pub header_length: u32,
    pub header_crc: u32,
    pub chunk_table_offset: u32,
    pub zi_chunk_table_offset: u32,
    pub hart: [HartEntry; N_APP],
    pub signature: Option<[u8; N_SIGNATURE]>,
}

/// Reasons header decoding can fail before any validity check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    TooShort,
}

fn read_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes(bytes[off..off + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], off: usize) -> u64 {
    u64::from_ne_bytes(bytes[off..off + 8].try_into().unwrap())
}

impl Header {
    /// `crcLen` for this header's version (spec.md §4.A).
    pub fn crc_len(&self) -> usize {
        if self.version == 0 {
            HEADER_V0_LEN
        } else {
            HEADER_VCURRENT_LEN
        }
    }

    /// Decode the fixed-size header prefix of `bytes` (`image_base` onward).
    pub fn decode(bytes: &[u8]) -> Result<Header, DecodeError> {
        if bytes.len() < HEADER_V0_LEN {
            return Err(DecodeError::TooShort);
        }

        let mut off = 0usize;
        let magic = read_u32(bytes, off);
        off += 4;
        let mut set_name = [0u8; N_SET];
        set_name.copy_from_slice(&bytes[off..off + N_SET]);
        off += N_SET;
        let version = read_u32(bytes, off);
        off += 4;
        let header_length = read_u32(bytes, off);
        off += 4;
        let header_crc = read_u32(bytes, off);
        off += 4;
        let chunk_table_offset = read_u32(bytes, off);
        off += 4;
        let zi_chunk_table_offset = read_u32(bytes, off);
        off += 4;

        let mut hart = [HartEntry::zeroed(); N_APP];
        for slot in hart.iter_mut() {
            let mut name = [0u8; N_NAME];
            name.copy_from_slice(&bytes[off..off + N_NAME]);
            off += N_NAME;
            let entry_point = read_u64(bytes, off);
            off += 8;
            let priv_mode = bytes[off];
            off += 1;
            let first_chunk = read_u32(bytes, off);
            off += 4;
            let last_chunk = read_u32(bytes, off);
            off += 4;
            let num_chunks = read_u32(bytes, off);
            off += 4;
            let flags = HartFlags::from_bits_truncate(read_u32(bytes, off));
            off += 4;
            *slot = HartEntry {
                name,
                entry_point,
                priv_mode,
                first_chunk,
                last_chunk,
                num_chunks,
                flags,
            };
        }
        debug_assert_eq!(off, HEADER_V0_LEN);

        let signature = if version >= 1 && bytes.len() >= HEADER_VCURRENT_LEN {
            let mut sig = [0u8; N_SIGNATURE];
            sig.copy_from_slice(&bytes[off..off + N_SIGNATURE]);
            Some(sig)
        } else {
            None
        };

        Ok(Header {
            magic,
            set_name,
            version,
            header_length,
            header_crc,
            chunk_table_offset,
            zi_chunk_table_offset,
            hart,
            signature,
        })
    }
}
