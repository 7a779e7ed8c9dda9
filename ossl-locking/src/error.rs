// Copyright 2024 tison <wander4096@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// Errors that prevent the locking callbacks from being installed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The lock table could not be allocated.
    #[error("failed to allocate a table of {count} locks")]
    Allocation {
        count: usize,
        #[source]
        source: TryReserveError,
    },
    /// A mutex failed to initialize. Mutexes created before it have been destroyed.
    #[error("failed to initialize lock {index}")]
    Init {
        index: usize,
        #[source]
        source: io::Error,
    },
    /// Locking callbacks are installed already and have not been shut down.
    #[error("locking callbacks are already installed")]
    AlreadyInstalled,
}

/// A mutex that could not be destroyed during teardown.
///
/// Teardown carries on past these; they are collected in a [`DestroyReport`].
#[derive(Debug, Error)]
#[error("failed to destroy lock {index}")]
pub struct DestroyWarning {
    pub index: usize,
    #[source]
    pub source: io::Error,
}

/// Outcome of destroying a set of mutexes.
#[derive(Debug, Default)]
pub struct DestroyReport {
    /// Number of mutexes destroyed cleanly.
    pub released: usize,
    /// Mutexes that failed to destroy.
    pub warnings: Vec<DestroyWarning>,
}

impl DestroyReport {
    /// Returns `true` if every mutex was destroyed cleanly.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
