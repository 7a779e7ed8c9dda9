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

//! The callback ABI of the OpenSSL 1.0.x locking interface.

#![allow(non_camel_case_types)]

use std::ffi::c_char;
use std::ffi::c_int;
use std::marker::PhantomData;
use std::marker::PhantomPinned;

/// Mode bit requesting that the lock be acquired.
pub const CRYPTO_LOCK: c_int = 0x01;
/// Mode bit requesting that the lock be released.
pub const CRYPTO_UNLOCK: c_int = 0x02;
/// Advisory bit: the caller only reads the protected state.
pub const CRYPTO_READ: c_int = 0x04;
/// Advisory bit: the caller writes the protected state.
pub const CRYPTO_WRITE: c_int = 0x08;

/// The library's `CRYPTO_THREADID`. Only ever handled by pointer.
#[repr(C)]
pub struct CRYPTO_THREADID {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// The library's `struct CRYPTO_dynlock_value`, whose definition is left to the application.
#[repr(C)]
pub struct CRYPTO_dynlock_value {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Stores the calling thread's identifier into `id`.
pub type ThreadIdCallback = unsafe extern "C" fn(id: *mut CRYPTO_THREADID);

/// Locks or unlocks static lock `n`, as requested by `mode`.
pub type LockingCallback =
    unsafe extern "C" fn(mode: c_int, n: c_int, file: *const c_char, line: c_int);

/// Creates a dynamic lock, or returns null on failure.
pub type DynlockCreateCallback =
    unsafe extern "C" fn(file: *const c_char, line: c_int) -> *mut CRYPTO_dynlock_value;

/// Locks or unlocks the dynamic lock `value`, as requested by `mode`.
pub type DynlockLockCallback = unsafe extern "C" fn(
    mode: c_int,
    value: *mut CRYPTO_dynlock_value,
    file: *const c_char,
    line: c_int,
);

/// Destroys the dynamic lock `value`.
pub type DynlockDestroyCallback =
    unsafe extern "C" fn(value: *mut CRYPTO_dynlock_value, file: *const c_char, line: c_int);

/// A decoded lock mode bitfield.
///
/// Only the lock/unlock bit is acted upon. The read/write bits are advisory and every lock is
/// taken exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockMode(pub c_int);

impl LockMode {
    /// Returns `true` if the lock should be acquired, `false` if it should be released.
    pub const fn is_lock(self) -> bool {
        self.0 & CRYPTO_LOCK != 0
    }

    /// Returns `true` if the caller announced a read-only critical section.
    pub const fn is_read(self) -> bool {
        self.0 & CRYPTO_READ != 0
    }
}
