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

//! Platform mutex backends.
//!
//! The cryptographic library acquires a lock in one callback and releases it in a later one, so
//! guard-based mutexes do not fit here. Every backend exposes an explicit lock/unlock pair through
//! [`RawLock`] instead, and the lock table and dynamic lock handles are generic over it.

use std::io;

mod futex;
pub use futex::FutexMutex;

#[cfg(unix)]
mod pthread;
#[cfg(unix)]
pub use pthread::PthreadMutex;

#[cfg(test)]
mod tests;

/// The backend used when no other is named.
pub type DefaultMutex = FutexMutex;

/// A mutex with explicit lock and unlock operations.
///
/// # Safety
///
/// Implementations must guarantee mutual exclusion: between a successful [`lock`] (or a
/// `try_lock` returning `true`) and the matching [`unlock`], no other call may acquire the
/// same mutex.
///
/// [`lock`]: RawLock::lock
/// [`unlock`]: RawLock::unlock
pub unsafe trait RawLock: Send + Sync + Sized + 'static {
    /// Creates a new, unlocked mutex.
    fn init() -> io::Result<Self>;

    /// Acquires the mutex, blocking the current thread until it is able to do so.
    fn lock(&self) -> io::Result<()>;

    /// Attempts to acquire the mutex without blocking.
    fn try_lock(&self) -> bool;

    /// Releases the mutex.
    ///
    /// # Safety
    ///
    /// The mutex must be held by the caller.
    unsafe fn unlock(&self) -> io::Result<()>;

    /// Releases the resources held by the mutex.
    ///
    /// Fails when the mutex is still locked. The underlying object is leaked in that case.
    fn destroy(self) -> io::Result<()>;
}
