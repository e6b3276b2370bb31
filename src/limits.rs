// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Compile-time constants for this design instance (spec.md §1, §4.B, §6).
//!
//! `N_APP` plays the role of the teacher's `PLATFORM_CPU_NUM_MAX`: every
//! fixed-size array in this crate (`CPU_IF_LIST`-equivalents, the per-hart
//! machine table, the boot-complete flag bank) is sized by it. spec.md is
//! explicit that this design targets "a fixed small number of application
//! harts in one design instance" (Non-goals, §1), so it is a `const`, not a
//! runtime-configured value.

/// Number of application harts this monitor boots.
pub const N_APP: usize = 4;

/// Fixed width of a hart/image name field in the boot image layout.
pub const N_NAME: usize = 16;

/// Fixed width of the image `set_name` field.
pub const N_SET: usize = 16;

/// Fixed capacity reserved for an optional header signature (version >= 1).
pub const N_SIGNATURE: usize = 64;

/// Per-tick DMA copy unit for `DownloadChunks` (spec.md §4.B).
pub const BOOT_SUB_CHUNK_SIZE: u64 = 256;

/// `SetupPmpComplete` ack timeout, in the platform's monotonic-time unit.
pub const BOOT_SETUP_PMP_COMPLETE_TIMEOUT: u64 = 1_000;

/// `Wait` ack timeout, in the platform's monotonic-time unit.
pub const BOOT_WAIT_TIMEOUT: u64 = 5_000;

/// `extra` word reported via `Platform::hart_state_set_ex` once
/// `PMPSetupHandler` has programmed and locked a hart's PMP registers (bit 0)
/// and configured its APB bus control register (bit 1) from platform
/// configuration (spec.md §4.E).
pub const PMP_LOCKED_APB_CONFIGURED: u64 = 0b01 | 0b10;
