// Copyright (c) 2023 Beihang University, Huawei Technologies Co.,Ltd. All rights reserved.
// Rust-Shyper is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//          http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND,
// EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT,
// MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Error taxonomy for the boot core (spec.md §7).
//!
//! The per-hart state machine never propagates `Err` up a call stack: a
//! failed operation mutates the machine's state to `Error` and the machine
//! continues (see `machine::state`). `Error`/`ErrorKind` here are only used
//! by the handful of control-surface entry points that report a failure
//! synchronously to their caller (`RegisterBootImage`'s validation path,
//! `RestartCore`, `RestartCoresUsingBitmask`).

use core::fmt;
use core::result::Result as CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorKind {
    /// `currentBootImage` was null at `Initialization`.
    NoImage,
    /// Magic, signature, or header CRC check failed.
    BadImage,
    /// An ack did not arrive inside the per-state time budget.
    Timeout,
    /// A chunk's owner/PMP check failed; the chunk was skipped.
    PermissionDenied,
    /// The IPI transport rejected a `deliver` call.
    DeliveryFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
}

pub type Result<T> = CoreResult<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> CoreResult<(), fmt::Error> {
        fmt::Debug::fmt(self, f)
    }
}

impl Error {
    pub const fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

impl<T> From<ErrorKind> for Result<T> {
    fn from(val: ErrorKind) -> Self {
        Err(val.into())
    }
}
