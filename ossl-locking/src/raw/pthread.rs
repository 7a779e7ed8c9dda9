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

use std::cell::UnsafeCell;
use std::fmt;
use std::io;
use std::mem::ManuallyDrop;

use crate::raw::RawLock;

/// A `pthread_mutex_t` with default attributes.
///
/// The mutex lives in its own heap allocation because POSIX forbids moving an initialized
/// `pthread_mutex_t`.
pub struct PthreadMutex {
    inner: ManuallyDrop<Box<UnsafeCell<libc::pthread_mutex_t>>>,
}

// SAFETY: pthread mutexes are designed to be shared between threads; the raw object is only
// touched through the pthread API.
unsafe impl Send for PthreadMutex {}
// SAFETY: see above.
unsafe impl Sync for PthreadMutex {}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}

impl PthreadMutex {
    fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }

    /// Destroys the mutex and frees its allocation, or leaks the allocation if the platform
    /// refuses to destroy it.
    ///
    /// Must be called at most once.
    fn release(&mut self) -> io::Result<()> {
        // SAFETY: the mutex was initialized by `init` and is destroyed at most once.
        let rc = unsafe { libc::pthread_mutex_destroy(self.raw()) };
        // SAFETY: `release` runs at most once, from either `destroy` or `drop`.
        let inner = unsafe { ManuallyDrop::take(&mut self.inner) };
        match check(rc) {
            Ok(()) => {
                drop(inner);
                Ok(())
            }
            Err(err) => {
                let _ = Box::leak(inner);
                Err(err)
            }
        }
    }
}

impl fmt::Debug for PthreadMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PthreadMutex").finish_non_exhaustive()
    }
}

impl Drop for PthreadMutex {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// SAFETY: mutual exclusion is provided by the platform implementation of pthread_mutex_lock.
unsafe impl RawLock for PthreadMutex {
    fn init() -> io::Result<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        // SAFETY: the pointer is valid and the mutex is not yet shared.
        check(unsafe { libc::pthread_mutex_init(inner.get(), std::ptr::null()) })?;
        Ok(Self {
            inner: ManuallyDrop::new(inner),
        })
    }

    fn lock(&self) -> io::Result<()> {
        // SAFETY: the mutex is initialized and pinned on the heap.
        check(unsafe { libc::pthread_mutex_lock(self.raw()) })
    }

    fn try_lock(&self) -> bool {
        // SAFETY: the mutex is initialized and pinned on the heap.
        unsafe { libc::pthread_mutex_trylock(self.raw()) == 0 }
    }

    unsafe fn unlock(&self) -> io::Result<()> {
        // SAFETY: the caller holds the mutex.
        check(unsafe { libc::pthread_mutex_unlock(self.raw()) })
    }

    fn destroy(self) -> io::Result<()> {
        let mut this = ManuallyDrop::new(self);
        this.release()
    }
}
