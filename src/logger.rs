// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! `Debug.printf` sink (spec.md §6), modeled on `kernel::logger`'s
//! `SimpleLogger` — same level-to-color banner, same `log::Log` impl — but
//! writing through a platform-installed byte sink instead of a hard-coded
//! UART `println!`, since this crate no longer owns a board driver. The
//! core itself never goes through this module: it calls the `log` crate's
//! macros directly, the way `kernel/*.rs` does throughout the teacher crate.

use core::fmt::Write;
use core::sync::atomic::{AtomicPtr, Ordering};
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

/// The signature of the platform-installed raw byte sink.
pub type WriteFn = fn(core::fmt::Arguments<'_>);

fn null_write(_args: core::fmt::Arguments<'_>) {}

static WRITE_FN: AtomicPtr<()> = AtomicPtr::new(null_write as *mut ());

/// Installs the byte sink `SimpleLogger` writes through. Output is silently
/// discarded until this is called.
///
/// # Safety
/// `f` must be safe to call from any context the logger may run in.
pub unsafe fn set_write_fn(f: WriteFn) {
    WRITE_FN.store(f as *mut (), Ordering::Release);
}

fn load_write_fn() -> WriteFn {
    let ptr = WRITE_FN.load(Ordering::Acquire);
    // SAFETY: only `set_write_fn` ever stores into `WRITE_FN`, and only with
    // a valid `WriteFn`.
    unsafe { core::mem::transmute(ptr) }
}

fn level_color(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}

struct ColorWriter;

impl Write for ColorWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        load_write_fn()(format_args!("{}", s));
        Ok(())
    }
}

struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "[E]",
            Level::Warn => "[W]",
            Level::Info => "[I]",
            Level::Debug => "[D]",
            Level::Trace => "[T]",
        };
        let _ = writeln!(
            ColorWriter,
            "\u{1B}[{}m{}>[{}, {}:{}] {}\u{1B}[0m",
            level_color(record.level()),
            tag,
            record.target(),
            record.file().unwrap_or("?"),
            record.line().unwrap_or(0),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: SimpleLogger = SimpleLogger;

/// Installs `SimpleLogger` as the global `log` sink at `Trace` level. A
/// platform still needs `set_write_fn` to see any output.
pub fn logger_init() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Trace))
}
