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

//! The fixed-size table of static locks.
//!
//! The library reports how many locks it needs once, at startup, and from then on refers to them
//! only by index. The table is therefore read-only after construction: the only mutable state is
//! inside each mutex.

use std::fmt;

use crate::error::DestroyReport;
use crate::error::DestroyWarning;
use crate::error::Error;
use crate::raw::DefaultMutex;
use crate::raw::RawLock;


pub struct LockTable<M: RawLock = DefaultMutex> {
    locks: Box<[M]>,
}

impl<M: RawLock> LockTable<M> {
    /// Allocates and initializes `count` mutexes.
    ///
    /// Initialization is all-or-nothing: if any mutex fails to initialize, the ones created before
    /// it are destroyed and the error is returned.
    pub fn new(count: usize) -> Result<Self, Error> {
        let mut locks = Vec::new();
        locks
            .try_reserve_exact(count)
            .map_err(|source| Error::Allocation { count, source })?;

        for index in 0..count {
            match M::init() {
                Ok(lock) => locks.push(lock),
                Err(source) => {
                    let report = destroy_all(locks);
                    tracing::debug!(
                        released = report.released,
                        warnings = report.warnings.len(),
                        "released partially initialized lock table"
                    );
                    return Err(Error::Init { index, source });
                }
            }
        }

        Ok(Self {
            locks: locks.into_boxed_slice(),
        })
    }

    /// Returns the number of locks in the table.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if the table holds no locks.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Acquires the lock at `index`, blocking until it is available.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn lock(&self, index: usize) -> std::io::Result<()> {
        self.locks[index].lock()
    }

    /// Attempts to acquire the lock at `index` without blocking.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn try_lock(&self, index: usize) -> bool {
        self.locks[index].try_lock()
    }

    /// Releases the lock at `index`.
    ///
    /// # Safety
    ///
    /// The lock at `index` must be held by the caller.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub unsafe fn unlock(&self, index: usize) -> std::io::Result<()> {
        // SAFETY: upheld by the caller.
        unsafe { self.locks[index].unlock() }
    }

    /// Destroys every mutex in the table.
    ///
    /// A mutex that fails to destroy is logged and recorded in the report; the remaining ones are
    /// still destroyed.
    pub fn destroy(self) -> DestroyReport {
        let Self { locks } = self;
        destroy_all(locks.into_vec())
    }
}

impl<M: RawLock> fmt::Debug for LockTable<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

fn destroy_all<M: RawLock>(locks: Vec<M>) -> DestroyReport {
    let mut report = DestroyReport::default();
    for (index, lock) in locks.into_iter().enumerate() {
        match lock.destroy() {
            Ok(()) => report.released += 1,
            Err(source) => {
                tracing::warn!(index, error = %source, "failed to destroy lock");
                report.warnings.push(DestroyWarning { index, source });
            }
        }
    }
    report
}
