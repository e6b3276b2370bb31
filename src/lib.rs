// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Monitor-hart boot core for a heterogeneous multi-core SoC.
//!
//! Parses a packaged boot image, drives one cooperative state machine per
//! application hart through PMP setup, chunk download and zero-init, and
//! releases each hart to its supervisor-init entry point over an IPI
//! request/ack protocol. A no_std library: the platform-specific firmware
//! image that links this crate owns the entry point, linker script, and
//! panic handler.
//!
//! `N_APP` (the number of application harts a given [`control::Monitor`] is
//! built for) is threaded through every module as a const generic, the way
//! `PLATFORM_CPU_NUM_MAX` sizes fixed arrays throughout the teacher crate
//! this was grounded on.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;
#[cfg(test)]
extern crate alloc;

pub mod control;
pub mod error;
pub mod image;
pub mod ipi;
pub mod limits;
pub mod logger;
pub mod machine;
pub mod platform;
pub mod registers;
pub mod scheduler;

pub use control::{Monitor, RestartSource};
pub use error::{Error, ErrorKind, Result};
pub use image::BootImage;
pub use machine::{BootState, Machine};
pub use platform::{DomainSpec, Platform, Trigger};
pub use scheduler::Scheduler;
