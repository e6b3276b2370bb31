// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Component E: the public control surface (spec.md §4.E).
//!
//! `Monitor` owns everything process-wide: the platform collaborator, the
//! system registers, the fixed machine table, and the registered image.
//! Everything external talks to the core through these entry points.

use crate::error::{Error, ErrorKind, Result};
use crate::image::validate::validate_image;
use crate::image::BootImage;
use crate::ipi::{IpiOp, IpiSlot};
use crate::machine::{BootState, Machine, TickCtx};
use crate::platform::{Platform, Trigger};
use crate::registers::Registers;

/// `RestartCore`'s `source` argument (spec.md §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartSource {
    All,
    Hart(usize),
}

/// Process-wide monitor state (spec.md §3 "Process-wide state"): the
/// registered image, the system registers, and the fixed `[Machine; N_APP]`
/// table. `'img` is the lifetime of the registered image's backing bytes.
pub struct Monitor<'img, P: Platform, const N_APP: usize> {
    pub platform: P,
    pub registers: Registers<N_APP>,
    pub machines: [Machine<N_APP>; N_APP],
    image: Option<BootImage<'img>>,
    /// Built-in device-tree blob fallback (spec.md §9 "Built-in DTB
    /// fallback ... expose as a configuration parameter of `RestartCore`").
    fallback_arg1: Option<u64>,
    /// Whether the `BootCustom` alternative flow runs inside
    /// `ValidateImage` (spec.md §4.E: "Selected by build configuration").
    boot_custom_enabled: bool,
}

impl<'img, P: Platform, const N_APP: usize> Monitor<'img, P, N_APP> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            registers: Registers::new(),
            machines: core::array::from_fn(Machine::new),
            image: None,
            fallback_arg1: None,
            boot_custom_enabled: false,
        }
    }

    pub fn with_fallback_arg1(mut self, arg1: u64) -> Self {
        self.fallback_arg1 = Some(arg1);
        self
    }

    pub fn with_boot_custom_enabled(mut self, enabled: bool) -> Self {
        self.boot_custom_enabled = enabled;
        self
    }

    pub fn image(&self) -> Option<&BootImage<'img>> {
        self.image.as_ref()
    }

    /// `RegisterBootImage` (spec.md §4.E): idempotent replacement allowed.
    pub fn register_boot_image(&mut self, image: BootImage<'img>) {
        self.image = Some(image);
    }

    /// Advance machine `idx` by exactly one scheduler tick. Called by
    /// `scheduler::Scheduler`; kept `pub(crate)` since the scheduler is the
    /// only intended caller of single-machine ticks.
    pub(crate) fn tick_machine(&mut self, idx: usize) {
        let ctx = TickCtx {
            image: self.image,
            platform: &self.platform,
            registers: &self.registers,
            fallback_arg1: self.fallback_arg1,
        };
        self.machines[idx].tick(&ctx);
    }

    fn validate_current_image(&mut self) -> bool {
        let Some(image) = self.image else { return false };
        let ok = validate_image(&self.platform, image.bytes(), &image.header);
        if ok && self.boot_custom_enabled {
            self.boot_custom();
        }
        ok
    }

    /// `SkipBootIsSet` (spec.md §4.E).
    pub fn skip_boot_is_set(&self, target: usize) -> bool {
        self.image
            .map(|img| img.hart(target).flags.contains(crate::image::HartFlags::SKIP_AUTOBOOT))
            .unwrap_or(false)
    }

    /// `RestartCore` (spec.md §4.E).
    pub fn restart_core(&mut self, source: RestartSource) -> Result<()> {
        match source {
            RestartSource::All => {
                if !self.validate_current_image() {
                    return Err(Error::new(ErrorKind::BadImage));
                }
                let mask = if N_APP >= 32 { u32::MAX } else { (1u32 << N_APP) - 1 };
                self.restart_cores_using_bitmask(mask)
            }
            RestartSource::Hart(source) => {
                let Some(image) = self.image else {
                    return Err(Error::new(ErrorKind::NoImage));
                };
                let mut mask = 1u32 << source;
                for peer in image.peers_sharing_entry(source) {
                    mask |= 1 << peer;
                }
                self.restart_cores_using_bitmask(mask)
            }
        }
    }

    /// `RestartCoresUsingBitmask` (spec.md §4.E).
    pub fn restart_cores_using_bitmask(&mut self, mut mask: u32) -> Result<()> {
        if !self.validate_current_image() {
            return Err(Error::new(ErrorKind::BadImage));
        }
        let Some(image) = self.image else {
            return Err(Error::new(ErrorKind::NoImage));
        };
        while mask != 0 {
            let s = mask.trailing_zeros() as usize;
            let mut local_mask = 1u32 << s;
            for peer in image.peers_sharing_entry(s) {
                local_mask |= 1 << peer;
            }
            if image.hart(s).num_chunks > 0 {
                for t in 0..N_APP {
                    if local_mask & (1 << t) == 0 {
                        continue;
                    }
                    let m = &mut self.machines[t];
                    match m.state {
                        BootState::OpenSbiInit => {}
                        BootState::Idle | BootState::SetupPmpComplete | BootState::Initialization => {
                            m.state = BootState::Initialization;
                        }
                        other => {
                            warn!("machine {}: recovering to Initialization from {:?}", t, other);
                            m.state = BootState::Initialization;
                        }
                    }
                }
            }
            self.platform.trigger_notify(Trigger::PostBoot);
            mask &= !local_mask;
        }
        Ok(())
    }

    /// `PMPSetupRequest` (spec.md §4.E): `None` covers both allocation and
    /// delivery failure; in the latter case the slot is freed before
    /// returning.
    pub fn pmp_setup_request(&self, target: usize) -> Option<IpiSlot> {
        let image = self.image?;
        let hart = image.hart(target);
        let slot = self.platform.ipi_alloc()?;
        if self
            .platform
            .ipi_deliver(slot, target, IpiOp::PmpSetup, hart.priv_mode, hart.entry_point, 0)
        {
            Some(slot)
        } else {
            self.platform.ipi_free(slot);
            None
        }
    }

    /// `PMPSetupHandler` (spec.md §4.E): runs conceptually on the
    /// application hart in response to the `PMP_SETUP` IPI. Guarded by
    /// `pmpSetupFlag[hart]` so only the first call between resets performs
    /// the side effect; repeats are a no-op that still report success
    /// (spec.md §8 invariant 1).
    pub fn pmp_setup_handler(&self, hart: usize) -> bool {
        if self.registers.try_claim_pmp_setup(hart) {
            self.platform.hart_state_set(hart, "Booting");
            // "program and lock the RISC-V PMP registers from platform
            // configuration, configure the APB bus control register"
            // (spec.md §4.E) — both are platform-side register writes this
            // core never performs directly; `hart_state_set_ex` is the
            // collaborator call that carries them out.
            self.platform
                .hart_state_set_ex(hart, "PmpLocked", crate::limits::PMP_LOCKED_APB_CONFIGURED);
        }
        true
    }

    /// `IPIHandler` (spec.md §4.E). `rproc_boot_target`, when set, is the
    /// true target embedded in an `RPROC_BOOT` argument: that machine is
    /// moved directly to `OpenSbiInit` before delegating to `RestartCore`.
    pub fn ipi_handler(&mut self, source: usize, rproc_boot_target: Option<usize>) -> Result<()> {
        if let Some(target) = rproc_boot_target {
            self.machines[target].state = BootState::OpenSbiInit;
        }
        self.restart_core(RestartSource::Hart(source))
    }

    /// `BootCustom` (spec.md §4.E): a synchronous, monitor-hart alternative
    /// to the cooperative machines. Preserves the source's loop-overwrite
    /// quirk verbatim (spec.md §9 open question): `target` ends up being the
    /// *last* hart with `numChunks > 0`, not the first.
    pub fn boot_custom(&mut self) {
        let Some(image) = self.image else { return };

        let mut target = 0usize;
        for h in 0..N_APP {
            if image.hart(h).num_chunks > 0 {
                target = h;
            }
        }

        let mut zi = 0usize;
        while let Some(z) = image.zi_chunk(zi) {
            if z.is_sentinel() {
                break;
            }
            self.platform.memset_zero(z.exec_addr, z.size as usize);
            zi += 1;
        }

        let hart = image.hart(target);
        if hart.num_chunks > 0 {
            let mut idx = hart.first_chunk;
            while idx <= hart.last_chunk {
                let Some(chunk) = image.chunk(idx as usize) else { break };
                if chunk.is_sentinel() {
                    break;
                }
                if chunk.owned_by(target) && self.platform.pmp_check_write(target, chunk.exec_addr, chunk.size) {
                    self.platform
                        .dma_memcpy(chunk.exec_addr, image.chunk_load_addr(&chunk), chunk.size as usize);
                }
                idx += 1;
            }
        }

        for h in 0..N_APP {
            let peer = image.hart(h);
            if peer.has_entry_point() {
                let slot = self.platform.ipi_alloc();
                if let Some(slot) = slot {
                    self.platform.ipi_deliver(slot, h, IpiOp::Goto, 0, peer.entry_point, 0);
                }
            }
        }

        info!(
            "boot_custom: monitor hart jumping to entry point {:#x}",
            image.hart(target).entry_point
        );
    }
}
