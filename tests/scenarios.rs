//! End-to-end scenarios S1-S7 from spec.md §8, driven against a mock
//! `Platform` the way the teacher's board-level tests stand in for hardware.
//! These exercise `Monitor`/`Scheduler` together rather than one module in
//! isolation, so they live in `tests/` instead of a `#[cfg(test)]` block.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use hart_boot_monitor::image::header::{
    HartFlags, HEADER_CRC_OFFSET, HEADER_VCURRENT_LEN, MAGIC_PLAIN, SIGNATURE_OFFSET,
};
use hart_boot_monitor::image::BootImage;
use hart_boot_monitor::ipi::{IpiOp, IpiSlot, MAX_OUTSTANDING};
use hart_boot_monitor::limits::{N_NAME, N_SET, N_SIGNATURE};
use hart_boot_monitor::platform::{DomainSpec, Platform, Trigger};
use hart_boot_monitor::{BootState, Monitor, RestartSource, Scheduler};

const N_APP: usize = 4;
const CHUNK_ENTRY_LEN: usize = 4 + 8 + 8 + 8;
const ZI_CHUNK_ENTRY_LEN: usize = 4 + 8 + 8;
const HEADER_FIXED_LEN: usize = 4 + N_SET + 4 + 4 + 4 + 4 + 4;
const HART_ENTRY_LEN: usize = N_NAME + 8 + 1 + 4 + 4 + 4 + 4;

fn chunk_exec_addr(h: usize) -> u64 {
    0x2000 + (h as u64) * 0x1000
}
fn zi_exec_addr(h: usize) -> u64 {
    0x5000 + (h as u64) * 0x1000
}

#[derive(Clone, Copy)]
struct HartCfg {
    entry_point: u64,
    flags: HartFlags,
    has_chunk: bool,
}

/// Assembles a well-formed boot image byte buffer (header + one chunk and
/// one ZI chunk per hart that wants one + sentinels), CRC-stamped with the
/// same fake CRC32 the accompanying `MockPlatform` reports back.
fn build_image(harts: &[HartCfg; N_APP]) -> Vec<u8> {
    let header_len = HEADER_VCURRENT_LEN;
    let chunk_table_off = header_len;
    let zi_table_off = chunk_table_off + (N_APP + 1) * CHUNK_ENTRY_LEN;
    let total = zi_table_off + (N_APP + 1) * ZI_CHUNK_ENTRY_LEN;
    let mut bytes = vec![0u8; total];

    bytes[0..4].copy_from_slice(&MAGIC_PLAIN.to_ne_bytes());
    let version_off = 4 + N_SET;
    bytes[version_off..version_off + 4].copy_from_slice(&1u32.to_ne_bytes());
    let ct_off_field = HEADER_FIXED_LEN - 8;
    bytes[ct_off_field..ct_off_field + 4].copy_from_slice(&(chunk_table_off as u32).to_ne_bytes());
    let zt_off_field = ct_off_field + 4;
    bytes[zt_off_field..zt_off_field + 4].copy_from_slice(&(zi_table_off as u32).to_ne_bytes());

    for (h, cfg) in harts.iter().enumerate() {
        let base = HEADER_FIXED_LEN + h * HART_ENTRY_LEN;
        let mut off = base + N_NAME;
        bytes[off..off + 8].copy_from_slice(&cfg.entry_point.to_ne_bytes());
        off += 8;
        bytes[off] = 1; // priv_mode
        off += 1;
        let (first, last, num) = if cfg.has_chunk { (h as u32, h as u32, 1u32) } else { (0, 0, 0) };
        bytes[off..off + 4].copy_from_slice(&first.to_ne_bytes());
        off += 4;
        bytes[off..off + 4].copy_from_slice(&last.to_ne_bytes());
        off += 4;
        bytes[off..off + 4].copy_from_slice(&num.to_ne_bytes());
        off += 4;
        bytes[off..off + 4].copy_from_slice(&cfg.flags.bits().to_ne_bytes());

        if cfg.has_chunk {
            let cb = chunk_table_off + h * CHUNK_ENTRY_LEN;
            bytes[cb..cb + 4].copy_from_slice(&(h as u32).to_ne_bytes());
            bytes[cb + 4..cb + 12].copy_from_slice(&0u64.to_ne_bytes());
            bytes[cb + 12..cb + 20].copy_from_slice(&chunk_exec_addr(h).to_ne_bytes());
            bytes[cb + 20..cb + 28].copy_from_slice(&1u64.to_ne_bytes());

            let zb = zi_table_off + h * ZI_CHUNK_ENTRY_LEN;
            bytes[zb..zb + 4].copy_from_slice(&(h as u32).to_ne_bytes());
            bytes[zb + 4..zb + 12].copy_from_slice(&zi_exec_addr(h).to_ne_bytes());
            bytes[zb + 12..zb + 20].copy_from_slice(&16u64.to_ne_bytes());
        }
    }
    // remaining chunk/zi slots and the two sentinels stay all-zero.

    stamp_crc(&mut bytes);
    bytes
}

fn fake_crc32(buf: &[u8]) -> u32 {
    buf.iter().fold(0u32, |acc, &b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

fn stamp_crc(bytes: &mut [u8]) {
    let crc_len = HEADER_VCURRENT_LEN; // version 1 throughout this suite
    let mut scratch = bytes[..crc_len].to_vec();
    scratch[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].fill(0);
    scratch[SIGNATURE_OFFSET..SIGNATURE_OFFSET + N_SIGNATURE].fill(0);
    let crc = fake_crc32(&scratch);
    bytes[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].copy_from_slice(&crc.to_ne_bytes());
}

type DeliveryLog = Vec<(usize, IpiOp, u8, u64, u64)>;

#[derive(Default)]
struct MockPlatform {
    time: Cell<u64>,
    ddr_trained: Cell<bool>,
    startup_complete: Cell<bool>,
    boot_complete_fired: Cell<bool>,
    post_boot_count: Cell<u32>,
    pmp_denied: RefCell<HashSet<(usize, u64)>>,
    copies: RefCell<Vec<(u64, u64, usize)>>,
    zeros: RefCell<Vec<(u64, usize)>>,
    ipi_next: Cell<usize>,
    ipi_freed: RefCell<HashSet<usize>>,
    never_ack: Cell<bool>,
    fail_delivery: Cell<bool>,
    delivered: RefCell<DeliveryLog>,
    domains_registered: RefCell<Vec<DomainSpec>>,
    domains_deregistered: RefCell<Vec<usize>>,
}

impl MockPlatform {
    fn ready() -> Self {
        let p = Self::default();
        p.ddr_trained.set(true);
        p.startup_complete.set(true);
        p
    }
}

impl Platform for MockPlatform {
    fn timer_now(&self) -> u64 {
        self.time.get()
    }
    fn timer_is_elapsed(&self, start: u64, interval: u64) -> bool {
        self.time.get().saturating_sub(start) >= interval
    }
    fn trigger_is_notified(&self, ev: Trigger) -> bool {
        match ev {
            Trigger::DdrTrained => self.ddr_trained.get(),
            Trigger::StartupComplete => self.startup_complete.get(),
            Trigger::BootComplete => self.boot_complete_fired.get(),
            Trigger::PostBoot => self.post_boot_count.get() > 0,
        }
    }
    fn trigger_notify(&self, ev: Trigger) {
        match ev {
            Trigger::BootComplete => self.boot_complete_fired.set(true),
            Trigger::PostBoot => self.post_boot_count.set(self.post_boot_count.get() + 1),
            _ => {}
        }
    }
    fn pmp_check_write(&self, hart: usize, addr: u64, _size: u64) -> bool {
        !self.pmp_denied.borrow().contains(&(hart, addr))
    }
    fn dma_memcpy(&self, dst: u64, src: u64, n: usize) {
        self.copies.borrow_mut().push((dst, src, n));
    }
    fn memset_zero(&self, dst: u64, n: usize) {
        self.zeros.borrow_mut().push((dst, n));
    }
    fn is_addr_in_ddr(&self, _addr: u64) -> bool {
        true
    }
    fn ipi_alloc(&self) -> Option<IpiSlot> {
        let n = self.ipi_next.get();
        if n >= MAX_OUTSTANDING {
            return None;
        }
        self.ipi_next.set(n + 1);
        Some(IpiSlot::new(n))
    }
    fn ipi_deliver(&self, slot: IpiSlot, target: usize, op: IpiOp, priv_mode: u8, entry: u64, arg: u64) -> bool {
        if self.fail_delivery.get() {
            return false;
        }
        self.delivered.borrow_mut().push((target, op, priv_mode, entry, arg));
        let _ = slot;
        true
    }
    fn ipi_check_complete(&self, _slot: IpiSlot) -> bool {
        !self.never_ack.get()
    }
    fn ipi_free(&self, slot: IpiSlot) {
        self.ipi_freed.borrow_mut().insert(slot.index());
    }
    fn ipi_consume_boot_request(&self, _target: usize) -> bool {
        false
    }
    fn domains_register(&self, spec: DomainSpec) {
        self.domains_registered.borrow_mut().push(spec);
    }
    fn domains_deregister(&self, hart: usize) {
        self.domains_deregistered.borrow_mut().push(hart);
    }
    fn crc32(&self, buf: &[u8]) -> u32 {
        fake_crc32(buf)
    }
    fn verify_signature(&self, _header_bytes: &[u8], _signature: &[u8]) -> bool {
        true
    }
    fn perf_ctr_allocate(&self, _hart: usize) -> u32 {
        0
    }
    fn perf_ctr_lap(&self, _handle: u32) {}
    fn hart_state_set(&self, _hart: usize, _state: &str) {}
    fn hart_state_set_ex(&self, _hart: usize, _state: &str, _extra: u64) {}
}

/// Ticks the scheduler until every machine sits in `Idle` or `Error`, or
/// `max_rounds` round-robin passes have elapsed (spec.md §8 invariant 4:
/// convergence within a bounded number of ticks).
fn run_to_quiescence<P: Platform>(monitor: &mut Monitor<P, N_APP>, scheduler: &mut Scheduler<N_APP>, max_rounds: u32) {
    for _ in 0..max_rounds {
        scheduler.tick_round(monitor);
        if monitor.machines.iter().all(|m| matches!(m.state, BootState::Idle | BootState::Error)) {
            // Error is transient (immediately re-enters Complete), give it a
            // few more rounds to finish converging to Idle.
        }
        if monitor.machines.iter().all(|m| m.state == BootState::Idle) {
            return;
        }
    }
}

#[test]
fn s1_happy_path_all_harts_converge_and_complete_fires() {
    let harts: [HartCfg; N_APP] = std::array::from_fn(|h| HartCfg {
        entry_point: 0x1000 + (h as u64) * 0x100,
        flags: HartFlags::empty(),
        has_chunk: true,
    });
    let bytes = build_image(&harts);
    let image = BootImage::parse(&bytes, 0).unwrap();
    let platform = MockPlatform::ready();
    let mut monitor = Monitor::<_, N_APP>::new(platform);
    monitor.register_boot_image(image);
    let mut scheduler = Scheduler::<N_APP>::new();

    monitor.restart_core(RestartSource::All).expect("well-formed image validates");
    run_to_quiescence(&mut monitor, &mut scheduler, 64);

    for (h, m) in monitor.machines.iter().enumerate() {
        assert_eq!(m.state, BootState::Idle, "hart {h} did not converge to Idle");
    }
    assert!(!monitor.registers.boot_fail());
    assert_eq!(monitor.registers.boot_status() & 0xF, 0xF);
    assert!(monitor.platform.boot_complete_fired.get());
    // each hart's chunk was actually copied exactly once
    assert_eq!(monitor.platform.copies.borrow().len(), N_APP);
}

#[test]
fn s2_skip_autoboot_hart_never_downloads_its_chunk() {
    let mut harts: [HartCfg; N_APP] = std::array::from_fn(|h| HartCfg {
        entry_point: 0x1000 + (h as u64) * 0x100,
        flags: HartFlags::empty(),
        has_chunk: true,
    });
    harts[1].flags = HartFlags::SKIP_AUTOBOOT;
    let bytes = build_image(&harts);
    let image = BootImage::parse(&bytes, 0).unwrap();
    let platform = MockPlatform::ready();
    let mut monitor = Monitor::<_, N_APP>::new(platform);
    monitor.register_boot_image(image);
    let mut scheduler = Scheduler::<N_APP>::new();

    monitor.restart_core(RestartSource::All).unwrap();
    run_to_quiescence(&mut monitor, &mut scheduler, 64);

    for m in monitor.machines.iter() {
        assert_eq!(m.state, BootState::Idle);
    }
    let copied_dsts: HashSet<u64> = monitor.platform.copies.borrow().iter().map(|&(dst, _, _)| dst).collect();
    assert!(!copied_dsts.contains(&chunk_exec_addr(1)), "skip-autoboot hart must not have its chunk downloaded");
    for h in [0usize, 2, 3] {
        assert!(copied_dsts.contains(&chunk_exec_addr(h)), "hart {h} should still download normally");
    }
}

#[test]
fn s3_skip_opensbi_hart_is_deregistered_and_gets_goto() {
    let mut harts: [HartCfg; N_APP] = std::array::from_fn(|h| HartCfg {
        entry_point: 0x1000 + (h as u64) * 0x100,
        flags: HartFlags::empty(),
        has_chunk: true,
    });
    // hart 1 and hart 2 co-boot; hart 2 opts out of the opensbi handshake.
    harts[2].entry_point = harts[1].entry_point;
    harts[2].flags = HartFlags::SKIP_OPENSBI;
    let bytes = build_image(&harts);
    let image = BootImage::parse(&bytes, 0).unwrap();
    let platform = MockPlatform::ready();
    let mut monitor = Monitor::<_, N_APP>::new(platform);
    monitor.register_boot_image(image);
    let mut scheduler = Scheduler::<N_APP>::new();

    monitor.restart_core(RestartSource::All).unwrap();
    run_to_quiescence(&mut monitor, &mut scheduler, 64);

    assert!(monitor.platform.domains_deregistered.borrow().contains(&2));
    let goto_to_hart2 = monitor
        .platform
        .delivered
        .borrow()
        .iter()
        .any(|&(target, op, ..)| target == 2 && op == IpiOp::Goto);
    assert!(goto_to_hart2, "hart 2 must receive GOTO, not OPENSBI_INIT");
    let opensbi_to_hart2 = monitor
        .platform
        .delivered
        .borrow()
        .iter()
        .any(|&(target, op, ..)| target == 2 && op == IpiOp::OpenSbiInit);
    assert!(!opensbi_to_hart2);
}

#[test]
fn s4_bad_crc_rejects_restart_and_leaves_harts_idle() {
    let harts: [HartCfg; N_APP] = std::array::from_fn(|h| HartCfg {
        entry_point: 0x1000 + (h as u64) * 0x100,
        flags: HartFlags::empty(),
        has_chunk: true,
    });
    let mut bytes = build_image(&harts);
    bytes[HEADER_CRC_OFFSET] ^= 0x1; // flip one bit after stamping
    let image = BootImage::parse(&bytes, 0).unwrap();
    let platform = MockPlatform::ready();
    let mut monitor = Monitor::<_, N_APP>::new(platform);
    monitor.register_boot_image(image);

    let result = monitor.restart_core(RestartSource::All);
    assert!(result.is_err());
    for m in monitor.machines.iter() {
        assert_eq!(m.state, BootState::Idle);
    }
    assert!(!monitor.registers.boot_fail());
}

#[test]
fn s5_pmp_denial_skips_the_chunk_but_still_completes() {
    let harts: [HartCfg; N_APP] = std::array::from_fn(|h| HartCfg {
        entry_point: 0x1000 + (h as u64) * 0x100,
        flags: HartFlags::empty(),
        has_chunk: true,
    });
    let bytes = build_image(&harts);
    let image = BootImage::parse(&bytes, 0).unwrap();
    let platform = MockPlatform::ready();
    platform.pmp_denied.borrow_mut().insert((2, chunk_exec_addr(2)));
    let mut monitor = Monitor::<_, N_APP>::new(platform);
    monitor.register_boot_image(image);
    let mut scheduler = Scheduler::<N_APP>::new();

    monitor.restart_core(RestartSource::All).unwrap();
    run_to_quiescence(&mut monitor, &mut scheduler, 64);

    for m in monitor.machines.iter() {
        assert_eq!(m.state, BootState::Idle, "partial boot must still converge");
    }
    let copied_dsts: HashSet<u64> = monitor.platform.copies.borrow().iter().map(|&(dst, _, _)| dst).collect();
    assert!(!copied_dsts.contains(&chunk_exec_addr(2)), "denied chunk must not be copied");
    assert!(monitor.platform.boot_complete_fired.get(), "aggregate completion still fires on partial boot");
}

#[test]
fn s6_pmp_setup_ack_timeout_fails_that_hart_only() {
    let harts: [HartCfg; N_APP] = std::array::from_fn(|h| HartCfg {
        entry_point: 0x1000 + (h as u64) * 0x100,
        flags: HartFlags::empty(),
        has_chunk: true,
    });
    let bytes = build_image(&harts);
    let image = BootImage::parse(&bytes, 0).unwrap();
    let platform = MockPlatform::ready();
    platform.never_ack.set(true);
    let mut monitor = Monitor::<_, N_APP>::new(platform);
    monitor.register_boot_image(image);
    let mut scheduler = Scheduler::<N_APP>::new();

    monitor.restart_core(RestartSource::All).unwrap();
    // Advance the clock well past BOOT_SETUP_PMP_COMPLETE_TIMEOUT before
    // ticking, so the very first poll in SetupPmpComplete already times out.
    for _ in 0..8 {
        scheduler.tick_round(&mut monitor);
    }
    monitor.platform.time.set(10_000);
    run_to_quiescence(&mut monitor, &mut scheduler, 16);

    for m in monitor.machines.iter() {
        assert_eq!(m.state, BootState::Idle);
        assert_eq!(m.local.slots.outstanding_count(), 0, "timed-out slots must be freed");
    }
    assert!(monitor.registers.boot_fail());
}

#[test]
fn s7_coboot_group_registers_shared_mask_and_orders_peer_before_self() {
    let mut harts: [HartCfg; N_APP] = std::array::from_fn(|h| HartCfg {
        entry_point: 0x1000 + (h as u64) * 0x100,
        flags: HartFlags::empty(),
        has_chunk: true,
    });
    harts[2].entry_point = harts[1].entry_point; // harts 1 and 2 co-boot
    let bytes = build_image(&harts);
    let image = BootImage::parse(&bytes, 0).unwrap();
    let platform = MockPlatform::ready();
    let mut monitor = Monitor::<_, N_APP>::new(platform);
    monitor.register_boot_image(image);
    let mut scheduler = Scheduler::<N_APP>::new();

    monitor.restart_core(RestartSource::All).unwrap();
    run_to_quiescence(&mut monitor, &mut scheduler, 64);

    let domains = monitor.platform.domains_registered.borrow();
    let group_domain = domains
        .iter()
        .find(|d| d.boot_hart == 1)
        .expect("hart 1 is the primary boot hart of the co-boot group");
    assert_eq!(group_domain.hart_mask, (1 << 1) | (1 << 2));

    let delivered = monitor.platform.delivered.borrow();
    let peer_idx = delivered
        .iter()
        .position(|&(target, op, ..)| target == 2 && op == IpiOp::OpenSbiInit)
        .expect("hart 2 must receive an OPENSBI_INIT fan-out message");
    let self_idx = delivered
        .iter()
        .rposition(|&(target, op, ..)| target == 1 && op == IpiOp::OpenSbiInit)
        .expect("hart 1 must self-deliver on OpenSbiInit.exit");
    assert!(peer_idx < self_idx, "peer fan-out must be delivered before the OpenSbiInit.exit self-delivery");
}
