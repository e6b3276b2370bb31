// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Process-wide state (spec.md §3 "Process-wide state", §5 "Shared-resource
//! policy"): `pmpSetupFlag[hart]`, `bootComplete[hart]`, and the two system
//! status registers. Zero-initialised at monitor reset, never freed — held
//! for the lifetime of the `Monitor` (spec.md §3 Lifecycle).
//!
//! `bootComplete` uses release-store / acquire-load (spec.md §5: "Release-
//! store, acquire-load semantics are sufficient"); everything else here is
//! touched only from the single monitor hart, so `Ordering::Relaxed` is
//! enough — there is no cross-hart reader.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// `pmpSetupFlag[hart]`, `bootComplete[hart]`, `BOOT_FAIL_CR`, and
/// `MSS_STATUS:BOOT_STATUS`.
pub struct Registers<const N_APP: usize> {
    boot_fail: AtomicBool,
    boot_status: AtomicU32,
    boot_complete: [AtomicBool; N_APP],
    pmp_setup_flag: [AtomicBool; N_APP],
}

impl<const N_APP: usize> Default for Registers<N_APP> {
    fn default() -> Self {
        Self {
            boot_fail: AtomicBool::new(false),
            boot_status: AtomicU32::new(0),
            boot_complete: core::array::from_fn(|_| AtomicBool::new(false)),
            pmp_setup_flag: core::array::from_fn(|_| AtomicBool::new(false)),
        }
    }
}

impl<const N_APP: usize> Registers<N_APP> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_boot_fail(&self) {
        self.boot_fail.store(false, Ordering::Relaxed);
    }

    pub fn set_boot_fail(&self) {
        self.boot_fail.store(true, Ordering::Relaxed);
    }

    pub fn boot_fail(&self) -> bool {
        self.boot_fail.load(Ordering::Relaxed)
    }

    /// Sets hart `target`'s indicator bit in `MSS_STATUS:BOOT_STATUS`
    /// (spec.md §4.B `Wait.handler`: "indicator-only, not functional").
    pub fn set_boot_status_bit(&self, target: usize) {
        self.boot_status.fetch_or(1 << target, Ordering::Relaxed);
    }

    pub fn boot_status(&self) -> u32 {
        self.boot_status.load(Ordering::Relaxed)
    }

    /// `bootComplete[target] = 1`, release-store (spec.md §4.B
    /// `Complete.entry`, §5).
    pub fn publish_boot_complete(&self, target: usize) {
        self.boot_complete[target].store(true, Ordering::Release);
    }

    /// `true` iff every application hart's `bootComplete` flag is set
    /// (spec.md §4.B `Complete.handler`, §8 invariant 5).
    pub fn all_boot_complete(&self) -> bool {
        self.boot_complete.iter().all(|f| f.load(Ordering::Acquire))
    }

    /// `true` at most once per hart between resets (spec.md §4.E
    /// `PMPSetupHandler`, §8 invariant 1). Sets the flag as a side effect of
    /// the first call that observes it clear.
    pub fn try_claim_pmp_setup(&self, hart: usize) -> bool {
        self.pmp_setup_flag[hart]
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

}
