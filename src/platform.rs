// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Collaborator interfaces (spec.md §6).
//!
//! Everything in this module is out of scope for the core (spec.md §1): the
//! IPI transport, the DMA copy primitive, the PMP-write oracle, the
//! performance counter facility, the domain registry, and the monotonic
//! clock/trigger bank all live on the platform side. `Platform` is the Rust
//! expression of that boundary, modeled on `board::PlatOperation` in the
//! teacher crate — one trait a board implements once, the core is generic
//! over.

use crate::ipi::{IpiOp, IpiSlot};

/// Events the core waits on or fires via `Trigger.{isNotified,notify}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    DdrTrained,
    StartupComplete,
    BootComplete,
    PostBoot,
}

/// A supervisor-runtime domain registration (spec.md §4.B `registerHarts`).
#[derive(Debug, Clone, Copy)]
pub struct DomainSpec {
    pub name: [u8; 16],
    pub hart_mask: u32,
    pub boot_hart: usize,
    pub priv_mode: u8,
    pub entry_point: u64,
    pub arg1: u64,
    pub cold_reboot_allowed: bool,
    pub warm_reboot_allowed: bool,
}

/// The set of external collaborators the boot core consumes (spec.md §6).
///
/// `Debug.printf` is not part of this trait: the core calls the `log` crate
/// macros directly, the way the teacher crate's `kernel/*.rs` does.
pub trait Platform {
    /// Monotonic clock in an implementation-defined unit (ticks, ms, ...).
    fn timer_now(&self) -> u64;

    /// True once `interval` units have elapsed since `start`.
    fn timer_is_elapsed(&self, start: u64, interval: u64) -> bool;

    fn trigger_is_notified(&self, ev: Trigger) -> bool;
    fn trigger_notify(&self, ev: Trigger);

    /// PMP-write permission oracle: may `hart` write `[addr, addr+size)`?
    fn pmp_check_write(&self, hart: usize, addr: u64, size: u64) -> bool;

    /// DMA bulk copy, `n` bytes from `src` to `dst`.
    fn dma_memcpy(&self, dst: u64, src: u64, n: usize);

    /// Zero-fill `n` bytes starting at `dst`.
    fn memset_zero(&self, dst: u64, n: usize);

    fn is_addr_in_ddr(&self, addr: u64) -> bool;

    /// Allocate a message slot; `None` if the transport has no free slot.
    fn ipi_alloc(&self) -> Option<IpiSlot>;
    /// Deliver a message on `slot` to `target`; `false` on transport failure.
    fn ipi_deliver(&self, slot: IpiSlot, target: usize, op: IpiOp, priv_mode: u8, entry: u64, arg: u64) -> bool;
    fn ipi_check_complete(&self, slot: IpiSlot) -> bool;
    fn ipi_free(&self, slot: IpiSlot);
    /// Poll whether a `BOOT_REQUEST` is pending for `target`; consume it if so.
    fn ipi_consume_boot_request(&self, target: usize) -> bool;

    fn domains_register(&self, spec: DomainSpec);
    fn domains_deregister(&self, hart: usize);

    fn crc32(&self, buf: &[u8]) -> u32;

    /// Cryptographic signature verifier; `true` if `signature` authenticates
    /// `header_bytes`. The core never inspects signature contents itself.
    fn verify_signature(&self, header_bytes: &[u8], signature: &[u8]) -> bool;

    /// Allocate a performance-counter handle for `hart`.
    fn perf_ctr_allocate(&self, hart: usize) -> u32;
    fn perf_ctr_lap(&self, handle: u32);

    /// Set the external hart-visible state (e.g. "Booting", "Idle").
    fn hart_state_set(&self, hart: usize, state: &str);

    /// Extended hart-state report carrying a platform-defined `extra` word
    /// (spec.md §4.E `PMPSetupHandler`): called once per hart per reset, from
    /// the guarded program-and-lock step, to report which config-driven
    /// actions the platform just completed for `hart` (see
    /// `limits::PMP_LOCKED_APB_CONFIGURED`).
    fn hart_state_set_ex(&self, hart: usize, state: &str, extra: u64);
}
