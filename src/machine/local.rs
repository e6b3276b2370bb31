// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Per-machine mutable work set (spec.md §3 `PerHartMachine.local`).
//!
//! Exclusively owned by one `Machine`; the scheduler never aliases two
//! machines' `Local` records (spec.md §9 "no aliasing across machines").

use crate::ipi::IpiSlots;

/// Work-in-progress state for one application hart's boot sequence.
#[derive(Debug, Clone, Copy)]
pub struct Local<const N_APP: usize> {
    /// Index of the chunk table entry `DownloadChunks` is currently on.
    pub chunk_idx: u32,
    /// Index of the ZI chunk table entry `ZeroInitChunks` is currently on.
    pub zi_chunk_idx: u32,
    /// Number of chunks already closed (copied or skipped) this pass.
    pub processed_chunks: u32,
    /// Byte offset already copied within the current chunk.
    pub sub_chunk_offset: u64,
    /// Outstanding IPI slots owned by this machine.
    pub slots: IpiSlots<N_APP>,
    /// Co-boot peer set built by `registerHarts`.
    pub hart_mask: u32,
    /// Walk position over application harts during `OpenSbiInit.handler`.
    pub iterator: usize,
    /// Supervisor-init argument, if a chunk tagged `ANCILLIARY_DATA` was seen.
    pub ancilliary_data: Option<u64>,
    /// Performance-counter handle allocated at `Initialization`.
    pub perf_ctr: Option<u32>,
}

impl<const N_APP: usize> Default for Local<N_APP> {
    fn default() -> Self {
        Self {
            chunk_idx: 0,
            zi_chunk_idx: 0,
            processed_chunks: 0,
            sub_chunk_offset: 0,
            slots: IpiSlots::new(),
            hart_mask: 0,
            iterator: 0,
            ancilliary_data: None,
            perf_ctr: None,
        }
    }
}

impl<const N_APP: usize> Local<N_APP> {
    pub fn reset_for_new_boot(&mut self) {
        *self = Self::default();
    }
}
