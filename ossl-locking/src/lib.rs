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

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Locking callbacks that make OpenSSL 1.0.x safe to use from multiple threads.
//!
//! OpenSSL releases before 1.1.0 keep global state that is only protected if the application
//! supplies locking primitives through a set of callbacks: a thread-id accessor, a locking
//! function over a fixed table of locks, and three functions managing "dynamic" locks the
//! library creates on demand. This crate provides those callbacks and manages their lifecycle.
//!
//! * [`ThreadingShim`] installs the callbacks into a [`CryptoLibrary`] and tears them down;
//! * [`LockTable`] is the fixed-size table of static locks;
//! * [`DynLock`] is a dynamic lock, owned by the library between creation and destruction;
//! * [`RawLock`] abstracts over the platform mutex backing both kinds of lock.
//!
//! The callbacks never fail silently: a lock the library asks for that cannot be taken or
//! released aborts the process, since no cryptographic operation can be trusted afterwards.

/// Logs at error level and aborts the process.
macro_rules! fatal {
    ($($arg:tt)+) => {{
        tracing::error!($($arg)+);
        std::process::abort()
    }};
}

mod callbacks;
mod dynlock;
mod error;
pub mod ffi;
mod library;
#[cfg(feature = "openssl10")]
mod openssl10;
pub mod raw;
mod shim;
mod table;

pub use callbacks::current_thread_id;
pub use callbacks::Callbacks;
pub use dynlock::DynLock;
pub use error::DestroyReport;
pub use error::DestroyWarning;
pub use error::Error;
pub use library::CryptoLibrary;
#[cfg(feature = "openssl10")]
pub use openssl10::OpenSsl10;
pub use raw::DefaultMutex;
pub use raw::RawLock;
pub use shim::is_installed;
pub use shim::Config;
pub use shim::ThreadingShim;
pub use table::LockTable;

#[cfg(test)]
mod testkit;
