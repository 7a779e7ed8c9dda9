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

//! The callbacks the library invokes to lock its internal state.
//!
//! The library hands no user data to any of them, so the static locking callback finds the lock
//! table through the process-wide registration kept by [`ThreadingShim`]. Dynamic locks carry
//! their own mutex and need no shared state at all.
//!
//! [`ThreadingShim`]: crate::ThreadingShim

use std::ffi::c_char;
use std::ffi::c_int;
use std::ffi::c_ulong;
use std::ffi::CStr;
use std::fmt;
use std::ptr;

use crate::dynlock::DynLock;
use crate::ffi::CRYPTO_dynlock_value;
use crate::ffi::DynlockCreateCallback;
use crate::ffi::DynlockDestroyCallback;
use crate::ffi::DynlockLockCallback;
use crate::ffi::LockMode;
use crate::ffi::LockingCallback;
use crate::ffi::ThreadIdCallback;
use crate::ffi::CRYPTO_THREADID;
use crate::library::CryptoLibrary;
use crate::raw::RawLock;
use crate::shim;

/// The five callback slots of the locking interface.
#[derive(Debug, Clone, Copy)]
pub struct Callbacks {
    pub thread_id: Option<ThreadIdCallback>,
    pub locking: Option<LockingCallback>,
    pub dynlock_create: Option<DynlockCreateCallback>,
    pub dynlock_lock: Option<DynlockLockCallback>,
    pub dynlock_destroy: Option<DynlockDestroyCallback>,
}

impl Callbacks {
    /// Empty slots; registering these detaches every callback.
    pub const NONE: Self = Self {
        thread_id: None,
        locking: None,
        dynlock_create: None,
        dynlock_lock: None,
        dynlock_destroy: None,
    };

    /// The callbacks for library `L`, with locks backed by `M`.
    ///
    /// The static locking callback reads the table installed by `ThreadingShim<L, M>`; the set
    /// should only be registered while such a shim is installed. If it is invoked while no shim is
    /// installed, or while one with a backend other than `M` is, the process aborts.
    pub fn new<L: CryptoLibrary, M: RawLock>() -> Self {
        Self {
            thread_id: Some(thread_id::<L>),
            locking: Some(locking::<M>),
            dynlock_create: Some(dynlock_create::<M>),
            dynlock_lock: Some(dynlock_lock::<M>),
            dynlock_destroy: Some(dynlock_destroy::<M>),
        }
    }

    /// Returns `true` if every slot is empty.
    pub fn is_none(&self) -> bool {
        self.thread_id.is_none()
            && self.locking.is_none()
            && self.dynlock_create.is_none()
            && self.dynlock_lock.is_none()
            && self.dynlock_destroy.is_none()
    }
}

/// Returns a numeric identifier for the calling thread, unique among live threads.
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
pub fn current_thread_id() -> c_ulong {
    // SAFETY: pthread_self has no preconditions.
    unsafe { libc::pthread_self() as c_ulong }
}

/// Returns a numeric identifier for the calling thread, unique among live threads.
#[cfg(not(unix))]
pub fn current_thread_id() -> c_ulong {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
    std::thread_local! {
        static THREAD_ID: c_ulong = NEXT_ID.fetch_add(1, Ordering::Relaxed) as c_ulong;
    }
    THREAD_ID.with(|id| *id)
}

/// Call site reported by the library, formatted lazily for trace output.
struct CallSite(*const c_char, c_int);

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_null() {
            return write!(f, "<unknown>:{}", self.1);
        }
        // SAFETY: the library passes `__FILE__`, a static NUL-terminated string.
        let file = unsafe { CStr::from_ptr(self.0) };
        write!(f, "{}:{}", file.to_string_lossy(), self.1)
    }
}

unsafe extern "C" fn thread_id<L: CryptoLibrary>(id: *mut CRYPTO_THREADID) {
    // SAFETY: the library passes the CRYPTO_THREADID it wants filled in.
    unsafe { L::set_thread_id(id, current_thread_id()) }
}

unsafe extern "C" fn locking<M: RawLock>(mode: c_int, n: c_int, file: *const c_char, line: c_int) {
    let mode = LockMode(mode);
    tracing::trace!(
        n,
        lock = mode.is_lock(),
        read = mode.is_read(),
        site = %CallSite(file, line),
        "static lock"
    );

    let table = match shim::active_table::<M>() {
        Ok(table) => table,
        Err(err) => fatal!(n, error = ?err, "locking callback cannot reach the lock table"),
    };
    let index = match usize::try_from(n) {
        Ok(index) if index < table.len() => index,
        _ => fatal!(n, len = table.len(), "lock index out of range"),
    };

    let result = if mode.is_lock() {
        table.lock(index)
    } else {
        // SAFETY: the library only unlocks the locks it has locked.
        unsafe { table.unlock(index) }
    };
    if let Err(err) = result {
        fatal!(n, lock = mode.is_lock(), error = %err, "static lock operation failed");
    }
}

unsafe extern "C" fn dynlock_create<M: RawLock>(
    file: *const c_char,
    line: c_int,
) -> *mut CRYPTO_dynlock_value {
    match DynLock::<M>::new() {
        Ok(lock) => {
            let value = DynLock::into_raw(lock);
            tracing::trace!(?value, site = %CallSite(file, line), "created dynamic lock");
            value
        }
        Err(err) => {
            tracing::error!(error = %err, site = %CallSite(file, line), "failed to create dynamic lock");
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn dynlock_lock<M: RawLock>(
    mode: c_int,
    value: *mut CRYPTO_dynlock_value,
    file: *const c_char,
    line: c_int,
) {
    let mode = LockMode(mode);
    tracing::trace!(
        ?value,
        lock = mode.is_lock(),
        read = mode.is_read(),
        site = %CallSite(file, line),
        "dynamic lock"
    );

    // SAFETY: the library only passes handles returned by `dynlock_create` that it has not
    // destroyed yet.
    let Some(lock) = (unsafe { DynLock::<M>::from_ptr(value) }) else {
        fatal!("dynamic lock callback invoked with a null handle");
    };

    let result = if mode.is_lock() {
        lock.lock()
    } else {
        // SAFETY: the library only unlocks the locks it has locked.
        unsafe { lock.unlock() }
    };
    if let Err(err) = result {
        fatal!(?value, lock = mode.is_lock(), error = %err, "dynamic lock operation failed");
    }
}

unsafe extern "C" fn dynlock_destroy<M: RawLock>(
    value: *mut CRYPTO_dynlock_value,
    file: *const c_char,
    line: c_int,
) {
    // SAFETY: the library destroys each handle returned by `dynlock_create` exactly once.
    let Some(lock) = (unsafe { DynLock::<M>::from_raw(value) }) else {
        tracing::warn!(site = %CallSite(file, line), "ignored destroy of a null dynamic lock");
        return;
    };
    tracing::trace!(?value, site = %CallSite(file, line), "destroying dynamic lock");
    if let Err(err) = lock.destroy() {
        tracing::warn!(?value, error = %err, "failed to destroy dynamic lock");
    }
}
