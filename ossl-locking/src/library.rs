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

use std::ffi::c_ulong;

use crate::callbacks::Callbacks;
use crate::ffi::CRYPTO_THREADID;

/// The cryptographic library the locking callbacks are installed into.
///
/// Implementations forward to the library's own global entry points. None of these are called
/// concurrently with one another by this crate; install and shutdown must be serialized with all
/// other use of the library by the application.
pub trait CryptoLibrary {
    /// Returns the human readable version string of the loaded library.
    fn version(&self) -> String;

    /// Runs the library's one-time global initialization.
    fn initialize(&self);

    /// Returns the number of static locks the library needs.
    fn num_locks(&self) -> usize;

    /// Registers the given callbacks, replacing any registered before.
    ///
    /// [`Callbacks::NONE`] detaches all of them.
    fn set_callbacks(&self, callbacks: &Callbacks);

    /// Frees the calling thread's library state.
    fn cleanup_thread(&self);

    /// Frees the library's process-wide state. Not thread-safe.
    fn cleanup_global(&self);

    /// Stores a numeric thread identifier into `id`.
    ///
    /// Called from the thread-id callback on arbitrary threads, hence no receiver.
    ///
    /// # Safety
    ///
    /// `id` must point to a valid `CRYPTO_THREADID` supplied by the library.
    unsafe fn set_thread_id(id: *mut CRYPTO_THREADID, value: c_ulong);
}
