// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Component C: the cooperative scheduler (spec.md §4.C).
//!
//! Single-threaded, round-robin over the fixed machine table — grounded on
//! `kernel::sched::sched_rr::SchedulerRR`'s index-wrapping `next()`, reduced
//! to the fixed-size, allocation-free case spec.md calls for (no VM/Vcpu
//! sleep/wake queue; every one of the `N_APP` machines is always present).

use crate::control::Monitor;
use crate::platform::Platform;

/// Round-robin cursor over `[Machine; N_APP]`.
pub struct Scheduler<const N_APP: usize> {
    next: usize,
}

impl<const N_APP: usize> Default for Scheduler<N_APP> {
    fn default() -> Self {
        Self { next: 0 }
    }
}

impl<const N_APP: usize> Scheduler<N_APP> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick exactly one machine — the one at the current cursor — then
    /// advance the cursor (spec.md §4.C: "A bare loop selects one machine
    /// per tick, calls its handler").
    pub fn tick_one<'img, P: Platform>(&mut self, monitor: &mut Monitor<'img, P, N_APP>) {
        let idx = self.next;
        self.next = (self.next + 1) % N_APP;
        monitor.tick_machine(idx);
    }

    /// Tick every machine exactly once, in fixed table order (spec.md §5:
    /// "within one round, order is the fixed machine table order").
    pub fn tick_round<'img, P: Platform>(&mut self, monitor: &mut Monitor<'img, P, N_APP>) {
        for _ in 0..N_APP {
            self.tick_one(monitor);
        }
    }
}
