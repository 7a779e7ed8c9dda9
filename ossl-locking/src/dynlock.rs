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

//! Locks created and destroyed on demand by the library.
//!
//! A [`DynLock`] is boxed and handed to the library as an opaque [`CRYPTO_dynlock_value`]
//! pointer. Ownership belongs to the library from then on, until it passes the pointer back to
//! the destroy callback, which reclaims the box exactly once.

use std::fmt;
use std::io;

use crate::ffi::CRYPTO_dynlock_value;
use crate::raw::DefaultMutex;
use crate::raw::RawLock;

/// One dynamically created lock.
pub struct DynLock<M: RawLock = DefaultMutex> {
    mutex: M,
}

impl<M: RawLock> DynLock<M> {
    /// Creates a boxed lock wrapping a freshly initialized mutex.
    pub fn new() -> io::Result<Box<Self>> {
        let mutex = M::init()?;
        Ok(Box::new(Self { mutex }))
    }

    /// Acquires the lock, blocking until it is available.
    pub fn lock(&self) -> io::Result<()> {
        self.mutex.lock()
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> bool {
        self.mutex.try_lock()
    }

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The lock must be held by the caller.
    pub unsafe fn unlock(&self) -> io::Result<()> {
        // SAFETY: upheld by the caller.
        unsafe { self.mutex.unlock() }
    }

    /// Destroys the mutex and releases the handle.
    pub fn destroy(self: Box<Self>) -> io::Result<()> {
        let Self { mutex } = *self;
        mutex.destroy()
    }

    /// Transfers ownership of the handle to the caller as an opaque pointer.
    pub fn into_raw(this: Box<Self>) -> *mut CRYPTO_dynlock_value {
        Box::into_raw(this).cast()
    }

    /// Borrows the handle behind a pointer produced by [`DynLock::into_raw`].
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `DynLock::<M>::into_raw` and not have been reclaimed
    /// yet, and must stay valid for `'a`.
    pub unsafe fn from_ptr<'a>(ptr: *mut CRYPTO_dynlock_value) -> Option<&'a Self> {
        // SAFETY: upheld by the caller.
        unsafe { ptr.cast::<Self>().as_ref() }
    }

    /// Reclaims ownership of a handle produced by [`DynLock::into_raw`].
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `DynLock::<M>::into_raw`, and must not be reclaimed
    /// or used again afterwards.
    pub unsafe fn from_raw(ptr: *mut CRYPTO_dynlock_value) -> Option<Box<Self>> {
        if ptr.is_null() {
            None
        } else {
            // SAFETY: upheld by the caller.
            Some(unsafe { Box::from_raw(ptr.cast::<Self>()) })
        }
    }
}

impl<M: RawLock> fmt::Debug for DynLock<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynLock").finish_non_exhaustive()
    }
}
