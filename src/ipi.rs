// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Component D: IPI request tracker (spec.md §4.D, §8 invariant 3).
//!
//! Grounded on `kernel::ipi`'s `IpiType`/`IpiMessage` split in the teacher
//! crate (a message-kind enum plus a slot-indexed delivery path), adapted
//! from "deliver into a per-cpu queue" to "allocate a bounded transport slot
//! and poll it for completion", which is what spec.md §4.D actually
//! describes.

use crate::platform::Platform;

/// Message kinds the core emits or consumes over the IPI transport
/// (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpiOp {
    PmpSetup,
    OpenSbiInit,
    Goto,
    BootRequest,
}

/// Maximum number of simultaneously outstanding IPI slots the transport
/// offers. `IpiSlot::UNUSED` is defined to equal this bound (spec.md §4.D:
/// "Sentinel value UNUSED equals the max-outstanding limit of the
/// transport"), so slot indices are always in `0..MAX_OUTSTANDING`.
pub const MAX_OUTSTANDING: usize = 16;

/// A transport-allocated message slot, or the `UNUSED` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpiSlot(usize);

impl IpiSlot {
    pub const UNUSED: IpiSlot = IpiSlot(MAX_OUTSTANDING);

    pub fn new(index: usize) -> Self {
        debug_assert!(index < MAX_OUTSTANDING);
        IpiSlot(index)
    }

    pub fn is_unused(&self) -> bool {
        *self == Self::UNUSED
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl Default for IpiSlot {
    fn default() -> Self {
        Self::UNUSED
    }
}

/// One machine's outstanding IPI slots: a primary slot for messages this
/// machine sends to its own `target` hart, and one auxiliary slot per peer
/// hart for fan-out during `OpenSbiInit` (spec.md §3 `local.msgIndex`,
/// `local.msgIndexAux[peer]`).
#[derive(Debug, Clone, Copy)]
pub struct IpiSlots<const N_APP: usize> {
    primary: IpiSlot,
    aux: [IpiSlot; N_APP],
}

impl<const N_APP: usize> Default for IpiSlots<N_APP> {
    fn default() -> Self {
        Self {
            primary: IpiSlot::UNUSED,
            aux: [IpiSlot::UNUSED; N_APP],
        }
    }
}

impl<const N_APP: usize> IpiSlots<N_APP> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary(&self) -> IpiSlot {
        self.primary
    }

    /// Allocate and deliver a message on the primary slot, unless one is
    /// already outstanding (spec.md §4.B `SetupPmp.entry`: "If already
    /// sent, skip."). Returns `false` on allocation or delivery failure —
    /// the caller (machine handler) maps that to `Error` (spec.md §7
    /// `DeliveryFailed`).
    pub fn request_primary<P: Platform>(
        &mut self,
        platform: &P,
        target: usize,
        op: IpiOp,
        priv_mode: u8,
        entry: u64,
        arg: u64,
    ) -> bool {
        if !self.primary.is_unused() {
            return true;
        }
        let Some(slot) = platform.ipi_alloc() else {
            return false;
        };
        if platform.ipi_deliver(slot, target, op, priv_mode, entry, arg) {
            self.primary = slot;
            true
        } else {
            platform.ipi_free(slot);
            false
        }
    }

    /// Allocate and deliver a message on `peer`'s auxiliary slot
    /// (spec.md §4.B `OpenSbiInit.handler` fan-out).
    pub fn request_aux<P: Platform>(
        &mut self,
        platform: &P,
        peer: usize,
        op: IpiOp,
        priv_mode: u8,
        entry: u64,
        arg: u64,
    ) -> bool {
        if !self.aux[peer].is_unused() {
            return true;
        }
        let Some(slot) = platform.ipi_alloc() else {
            return false;
        };
        if platform.ipi_deliver(slot, peer, op, priv_mode, entry, arg) {
            self.aux[peer] = slot;
            true
        } else {
            platform.ipi_free(slot);
            false
        }
    }

    /// Poll every outstanding slot; free any that just completed. Returns
    /// `true` iff every non-sentinel slot has completed (spec.md §4.D:
    /// "a machine is 'all-acked' iff every one of its non-sentinel slots
    /// reports complete; on each slot transitioning complete, that slot is
    /// freed"). Logical `&` over both the primary and every aux slot is
    /// used deliberately (spec.md §9 open question): each check must run
    /// and free its own slot regardless of the others' outcome.
    pub fn poll_all_acked<P: Platform>(&mut self, platform: &P) -> bool {
        let mut acked = self.poll_one(platform, Self::primary_mut);
        for i in 0..N_APP {
            acked &= self.poll_aux(platform, i);
        }
        acked
    }

    fn primary_mut(&mut self) -> &mut IpiSlot {
        &mut self.primary
    }

    fn poll_one<P: Platform>(&mut self, platform: &P, get: impl Fn(&mut Self) -> &mut IpiSlot) -> bool {
        let slot = *get(self);
        if slot.is_unused() {
            return true;
        }
        let done = platform.ipi_check_complete(slot);
        if done {
            platform.ipi_free(slot);
            *get(self) = IpiSlot::UNUSED;
        }
        done
    }

    fn poll_aux<P: Platform>(&mut self, platform: &P, peer: usize) -> bool {
        let slot = self.aux[peer];
        if slot.is_unused() {
            return true;
        }
        let done = platform.ipi_check_complete(slot);
        if done {
            platform.ipi_free(slot);
            self.aux[peer] = IpiSlot::UNUSED;
        }
        done
    }

    /// Free every still-outstanding slot (spec.md §5 Cancellation: "on any
    /// per-state timeout, every outstanding slot owned by that machine is
    /// freed").
    pub fn free_all<P: Platform>(&mut self, platform: &P) {
        if !self.primary.is_unused() {
            platform.ipi_free(self.primary);
            self.primary = IpiSlot::UNUSED;
        }
        for slot in self.aux.iter_mut() {
            if !slot.is_unused() {
                platform.ipi_free(*slot);
                *slot = IpiSlot::UNUSED;
            }
        }
    }

    /// Count of live slots owned by this machine (spec.md §8 invariant 3).
    pub fn outstanding_count(&self) -> usize {
        let mut n = usize::from(!self.primary.is_unused());
        n += self.aux.iter().filter(|s| !s.is_unused()).count();
        n
    }
}
