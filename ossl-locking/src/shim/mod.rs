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

//! Process-wide installation of the locking callbacks.
//!
//! The library keeps a single set of callbacks for the whole process, so only one
//! [`ThreadingShim`] can be installed at a time. The lifecycle is:
//!
//! * [`ThreadingShim::install`] initializes the library, allocates the lock table sized to the
//!   library's lock count, publishes it and registers the callbacks;
//! * while installed, the library invokes the callbacks from any number of threads;
//! * [`ThreadingShim::shutdown`] (or dropping the shim) detaches the callbacks, runs the
//!   library's cleanup functions and destroys the lock table.
//!
//! Installing and shutting down must not race with any other use of the library. The shim
//! rejects a second install while one is active, but cannot tell whether other threads are still
//! inside the library during shutdown: quiesce them first.
//!
//! # Examples
//!
//! ```no_run
//! # #[cfg(feature = "openssl10")]
//! # fn main() -> Result<(), ossl_locking::Error> {
//! use ossl_locking::Config;
//! use ossl_locking::OpenSsl10;
//! use ossl_locking::ThreadingShim;
//!
//! let shim = ThreadingShim::<_>::install(OpenSsl10, Config::default())?;
//! // ... use OpenSSL from as many threads as needed ...
//! let report = shim.shutdown();
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "openssl10"))]
//! # fn main() {}
//! ```

use std::any::TypeId;
use std::fmt;
use std::ptr;
use std::ptr::NonNull;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering;

use crate::callbacks::Callbacks;
use crate::error::DestroyReport;
use crate::error::Error;
use crate::library::CryptoLibrary;
use crate::raw::DefaultMutex;
use crate::raw::RawLock;
use crate::table::LockTable;


static INSTALLED: AtomicBool = AtomicBool::new(false);
static ACTIVE_TABLE: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

/// The lock table as published to the callbacks, tagged with its backend.
///
/// `repr(C)` keeps `backend` at offset zero for every `M`, so it can be read before the
/// backend is known.
#[repr(C)]
struct Published<M: RawLock> {
    backend: TypeId,
    table: LockTable<M>,
}

/// Why the callbacks could not reach the lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LookupError {
    /// No shim is installed.
    NotInstalled,
    /// The installed table uses a different mutex backend than the callback asking for it.
    BackendMismatch,
}

/// Returns the lock table published by the installed shim.
///
/// Fails if nothing is installed, or if the installed shim's backend is not `M`. The latter
/// happens when callbacks built for another backend are registered by hand.
pub(crate) fn active_table<'a, M: RawLock>() -> Result<&'a LockTable<M>, LookupError> {
    let published = ACTIVE_TABLE.load(Ordering::Acquire);
    if published.is_null() {
        return Err(LookupError::NotInstalled);
    }
    // SAFETY: a non-null pointer was published by `install` and points to a `Published<_>`, whose
    // first field is a `TypeId` whatever the backend. It stays valid until shutdown, which must
    // not race with the library calling back.
    let backend = unsafe { *published.cast::<TypeId>() };
    if backend != TypeId::of::<M>() {
        return Err(LookupError::BackendMismatch);
    }
    // SAFETY: the backend tag matches, so the pointee is a `Published<M>`.
    let published = unsafe { &*published.cast::<Published<M>>() };
    Ok(&published.table)
}

/// Holds the registration flag during install; releases it unless defused.
struct InstallClaim {
    armed: bool,
}

impl InstallClaim {
    fn acquire() -> Option<Self> {
        INSTALLED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { armed: true })
    }

    fn defuse(mut self) {
        self.armed = false;
    }
}

impl Drop for InstallClaim {
    fn drop(&mut self) {
        if self.armed {
            INSTALLED.store(false, Ordering::Release);
        }
    }
}

/// Returns `true` while a [`ThreadingShim`] is installed.
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Acquire)
}

/// Options for installing and shutting down the shim.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    initialize_library: bool,
    global_cleanup: bool,
}

impl Config {
    /// Creates the default configuration, with every step enabled.
    pub const fn new() -> Self {
        Self {
            initialize_library: true,
            global_cleanup: true,
        }
    }

    /// Whether to run the library's global initialization on install.
    ///
    /// Disable this if the application initializes the library itself.
    pub const fn initialize_library(mut self, enabled: bool) -> Self {
        self.initialize_library = enabled;
        self
    }

    /// Whether to run the library's process-wide cleanup on shutdown.
    ///
    /// These cleanup functions are not thread-safe. Disable this if other code may still use
    /// the library after the shim is shut down.
    pub const fn global_cleanup(mut self, enabled: bool) -> Self {
        self.global_cleanup = enabled;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// The installed locking callbacks, together with the lock table they operate on.
///
/// See the [module level documentation](self) for more.
pub struct ThreadingShim<L: CryptoLibrary, M: RawLock = DefaultMutex> {
    library: L,
    config: Config,
    table: Option<NonNull<Published<M>>>,
}

// SAFETY: the table is only shared through the registration, and `LockTable<M>` is `Send` and
// `Sync` because `M` is.
unsafe impl<L: CryptoLibrary + Send, M: RawLock> Send for ThreadingShim<L, M> {}
// SAFETY: see above.
unsafe impl<L: CryptoLibrary + Sync, M: RawLock> Sync for ThreadingShim<L, M> {}

impl<L: CryptoLibrary, M: RawLock> ThreadingShim<L, M> {
    /// Initializes the library and installs the locking callbacks.
    ///
    /// Fails with [`Error::AlreadyInstalled`] if another shim is installed, or if allocating or
    /// initializing the lock table fails. On failure nothing is registered with the library.
    pub fn install(library: L, config: Config) -> Result<Self, Error> {
        let claim = InstallClaim::acquire().ok_or(Error::AlreadyInstalled)?;

        tracing::info!(version = %library.version(), "loaded crypto library");
        if config.initialize_library {
            library.initialize();
        }

        let count = library.num_locks();
        let table = match LockTable::<M>::new(count) {
            Ok(table) => table,
            Err(err) => {
                tracing::error!(count, error = %err, "failed to create lock table");
                return Err(err);
            }
        };

        let published = Box::new(Published {
            backend: TypeId::of::<M>(),
            table,
        });
        let table = NonNull::from(Box::leak(published));
        ACTIVE_TABLE.store(table.as_ptr().cast(), Ordering::Release);
        library.set_callbacks(&Callbacks::new::<L, M>());
        claim.defuse();
        tracing::info!(locks = count, "installed locking callbacks");

        Ok(Self {
            library,
            config,
            table: Some(table),
        })
    }

    /// Detaches the callbacks, cleans up the library and destroys the lock table.
    ///
    /// No other thread may be using the library. Mutexes that fail to destroy are logged and
    /// reported; teardown always runs to completion.
    pub fn shutdown(mut self) -> DestroyReport {
        self.teardown()
    }

    /// Returns the library the callbacks are installed into.
    pub fn library(&self) -> &L {
        &self.library
    }

    /// Returns the configuration the shim was installed with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the number of static locks.
    pub fn lock_count(&self) -> usize {
        self.table().map_or(0, LockTable::len)
    }

    fn table(&self) -> Option<&LockTable<M>> {
        // SAFETY: the table is owned by this shim until teardown takes it.
        self.table.map(|published| unsafe { &published.as_ref().table })
    }

    fn teardown(&mut self) -> DestroyReport {
        let Some(table) = self.table.take() else {
            return DestroyReport::default();
        };

        tracing::info!("unloading crypto library");
        self.library.set_callbacks(&Callbacks::NONE);
        self.library.cleanup_thread();
        if self.config.global_cleanup {
            self.library.cleanup_global();
        }

        ACTIVE_TABLE.store(ptr::null_mut(), Ordering::Release);
        // SAFETY: the pointer came from `Box::leak` in `install`, and the callbacks reading it
        // have been detached.
        let published = unsafe { Box::from_raw(table.as_ptr()) };
        let report = published.table.destroy();
        INSTALLED.store(false, Ordering::Release);

        if !report.is_clean() {
            tracing::warn!(
                released = report.released,
                failed = report.warnings.len(),
                "lock table destroyed with failures"
            );
        }
        report
    }
}

impl<L: CryptoLibrary, M: RawLock> Drop for ThreadingShim<L, M> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<L: CryptoLibrary, M: RawLock> fmt::Debug for ThreadingShim<L, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadingShim")
            .field("config", &self.config)
            .field("lock_count", &self.lock_count())
            .finish_non_exhaustive()
    }
}
