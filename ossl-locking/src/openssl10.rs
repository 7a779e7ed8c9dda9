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

//! Binding to OpenSSL 1.0.x, the last release line that delegates locking to the application.

use std::ffi::c_char;
use std::ffi::c_int;
use std::ffi::c_ulong;
use std::ffi::c_void;
use std::ffi::CStr;
use std::ptr;

use crate::callbacks::Callbacks;
use crate::ffi::CRYPTO_THREADID;
use crate::ffi::DynlockCreateCallback;
use crate::ffi::DynlockDestroyCallback;
use crate::ffi::DynlockLockCallback;
use crate::ffi::LockingCallback;
use crate::ffi::ThreadIdCallback;
use crate::library::CryptoLibrary;

const SSLEAY_VERSION: c_int = 0;

#[link(name = "crypto")]
extern "C" {
    fn SSLeay_version(t: c_int) -> *const c_char;
    fn RAND_poll() -> c_int;
    fn CRYPTO_num_locks() -> c_int;

    fn CRYPTO_THREADID_set_callback(func: Option<ThreadIdCallback>) -> c_int;
    fn CRYPTO_THREADID_set_numeric(id: *mut CRYPTO_THREADID, val: c_ulong);
    fn CRYPTO_set_locking_callback(func: Option<LockingCallback>);
    fn CRYPTO_set_dynlock_create_callback(func: Option<DynlockCreateCallback>);
    fn CRYPTO_set_dynlock_lock_callback(func: Option<DynlockLockCallback>);
    fn CRYPTO_set_dynlock_destroy_callback(func: Option<DynlockDestroyCallback>);

    fn ERR_remove_thread_state(id: *const CRYPTO_THREADID);
    fn ERR_free_strings();
    fn ENGINE_cleanup();
    fn EVP_cleanup();
    fn CRYPTO_cleanup_all_ex_data();
    fn sk_free(st: *mut c_void);
}

#[link(name = "ssl")]
extern "C" {
    fn SSL_load_error_strings();
    fn SSL_library_init() -> c_int;
    fn SSL_COMP_get_compression_methods() -> *mut c_void;
}

/// The process's OpenSSL 1.0.x `libssl` and `libcrypto`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSsl10;

impl CryptoLibrary for OpenSsl10 {
    fn version(&self) -> String {
        // SAFETY: SSLeay_version returns a pointer to a static NUL-terminated string.
        let version = unsafe { SSLeay_version(SSLEAY_VERSION) };
        if version.is_null() {
            return String::from("unknown");
        }
        // SAFETY: checked non-null above.
        unsafe { CStr::from_ptr(version) }
            .to_string_lossy()
            .into_owned()
    }

    fn initialize(&self) {
        // SAFETY: one-time global initialization, serialized by the caller.
        unsafe {
            SSL_load_error_strings();
            SSL_library_init();
            if RAND_poll() == 0 {
                tracing::warn!("failed to seed the random number generator");
            }
        }
    }

    fn num_locks(&self) -> usize {
        // SAFETY: no preconditions.
        let count = unsafe { CRYPTO_num_locks() };
        usize::try_from(count).unwrap_or(0)
    }

    fn set_callbacks(&self, callbacks: &Callbacks) {
        // SAFETY: registration is serialized with all other use of the library by the caller.
        unsafe {
            // The thread-id callback can be set only once per process; resetting it is a no-op.
            if CRYPTO_THREADID_set_callback(callbacks.thread_id) == 0 && callbacks.thread_id.is_some()
            {
                tracing::debug!("thread id callback was already registered");
            }
            CRYPTO_set_locking_callback(callbacks.locking);
            CRYPTO_set_dynlock_create_callback(callbacks.dynlock_create);
            CRYPTO_set_dynlock_lock_callback(callbacks.dynlock_lock);
            CRYPTO_set_dynlock_destroy_callback(callbacks.dynlock_destroy);
        }
    }

    fn cleanup_thread(&self) {
        // SAFETY: a null id means the calling thread.
        unsafe { ERR_remove_thread_state(ptr::null()) }
    }

    fn cleanup_global(&self) {
        // SAFETY: no other thread is using the library, as required by shutdown.
        unsafe {
            ENGINE_cleanup();
            ERR_free_strings();
            EVP_cleanup();
            CRYPTO_cleanup_all_ex_data();
            // The compression method stack is never freed by the library itself.
            sk_free(SSL_COMP_get_compression_methods());
        }
    }

    unsafe fn set_thread_id(id: *mut CRYPTO_THREADID, value: c_ulong) {
        // SAFETY: upheld by the caller.
        unsafe { CRYPTO_THREADID_set_numeric(id, value) }
    }
}
