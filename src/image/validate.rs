// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! `VerifyMagic` / `ValidateImage` (spec.md §4.A).
//!
//! Pure with respect to the image: nothing here mutates `bytes`. The CRC
//! scratch copy lives on the stack, never touching the caller's buffer.

use crate::image::header::{Header, HEADER_CRC_OFFSET, MAGIC_COMPRESSED, MAGIC_PLAIN, SIGNATURE_OFFSET};
use crate::limits::N_SIGNATURE;
use crate::platform::Platform;

pub fn verify_magic(header: &Header) -> bool {
    header.magic == MAGIC_PLAIN || header.magic == MAGIC_COMPRESSED
}

/// Recompute the header CRC over a zeroed-`headerCrc`/zeroed-`signature`
/// scratch copy of the first `crcLen` bytes, where `crcLen` is
/// version-selected (spec.md §4.A). `bytes` must be the raw image header
/// region `Header::decode` was called on. `None` if `bytes` is too short to
/// hold `crcLen` bytes — a truncated `version >= 1` image decodes fine
/// (`Header::decode` falls back to `signature = None` below
/// `HEADER_VCURRENT_LEN`) but still reports `crc_len() ==
/// HEADER_VCURRENT_LEN`, so the caller must reject it rather than index past
/// the end of `bytes`.
fn recompute_header_crc<P: Platform>(platform: &P, bytes: &[u8], header: &Header) -> Option<u32> {
    let crc_len = header.crc_len();
    if bytes.len() < crc_len {
        return None;
    }
    let mut scratch = [0u8; crate::image::header::HEADER_VCURRENT_LEN];
    let scratch = &mut scratch[..crc_len];
    scratch.copy_from_slice(&bytes[..crc_len]);

    scratch[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].fill(0);
    if header.version >= 1 && crc_len >= SIGNATURE_OFFSET + N_SIGNATURE {
        scratch[SIGNATURE_OFFSET..SIGNATURE_OFFSET + N_SIGNATURE].fill(0);
    }

    Some(platform.crc32(scratch))
}

/// `validateCrc_` (spec.md §8 testable property 7): `true` iff
/// `header.headerCrc` matches the recomputed CRC32. `false` (not a panic) if
/// `bytes` is too short for `header`'s `crcLen` — spec.md §4.A's "ValidateImage
/// fails if ..." list covers exactly this kind of malformed image.
pub fn validate_crc<P: Platform>(platform: &P, bytes: &[u8], header: &Header) -> bool {
    recompute_header_crc(platform, bytes, header) == Some(header.header_crc)
}

/// `ValidateImage` (spec.md §4.A): fails if the magic is wrong, the
/// optional signature check fails, or the header CRC does not match.
pub fn validate_image<P: Platform>(platform: &P, bytes: &[u8], header: &Header) -> bool {
    if !verify_magic(header) {
        return false;
    }
    if let Some(sig) = header.signature {
        let crc_len = header.crc_len();
        if !platform.verify_signature(&bytes[..crc_len], &sig) {
            return false;
        }
    }
    validate_crc(platform, bytes, header)
}
