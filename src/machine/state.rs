// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! `BootState` (spec.md §4.B): a fixed sum type over the ten per-hart
//! states, dispatched by a `match` in `machine::mod` rather than a vtable —
//! spec.md §9 calls for "a fixed-size match" over polymorphic dispatch to
//! keep the binary small and predictable for an embedded target.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Initialization,
    SetupPmp,
    SetupPmpComplete,
    ZeroInitChunks,
    DownloadChunks,
    OpenSbiInit,
    Wait,
    Complete,
    Idle,
    Error,
}

impl BootState {
    pub fn name(self) -> &'static str {
        match self {
            BootState::Initialization => "Initialization",
            BootState::SetupPmp => "SetupPmp",
            BootState::SetupPmpComplete => "SetupPmpComplete",
            BootState::ZeroInitChunks => "ZeroInitChunks",
            BootState::DownloadChunks => "DownloadChunks",
            BootState::OpenSbiInit => "OpenSbiInit",
            BootState::Wait => "Wait",
            BootState::Complete => "Complete",
            BootState::Idle => "Idle",
            BootState::Error => "Error",
        }
    }
}
