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

//! Shared fixtures for unit tests.

use std::cell::Cell;
use std::cell::UnsafeCell;
use std::ffi::c_int;
use std::ffi::c_ulong;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::callbacks::Callbacks;
use crate::ffi::CRYPTO_dynlock_value;
use crate::ffi::CRYPTO_THREADID;
use crate::ffi::CRYPTO_LOCK;
use crate::ffi::CRYPTO_READ;
use crate::ffi::CRYPTO_UNLOCK;
use crate::ffi::CRYPTO_WRITE;
use crate::library::CryptoLibrary;
use crate::raw::FutexMutex;
use crate::raw::RawLock;

/// Serializes tests that install into the process-wide registration.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    static SERIAL: Mutex<()> = Mutex::new(());
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) struct UnsafeSendCell<T>(UnsafeCell<T>);
unsafe impl<T> Send for UnsafeSendCell<T> {}
unsafe impl<T> Sync for UnsafeSendCell<T> {}
impl<T> UnsafeSendCell<T> {
    pub(crate) fn new(t: T) -> Self {
        Self(UnsafeCell::new(t))
    }
    pub(crate) unsafe fn get(&self) -> *mut T {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Initialize,
    NumLocks,
    Register,
    Deregister,
    CleanupThread,
    CleanupGlobal,
}

struct MockState {
    num_locks: usize,
    panic_on_num_locks: bool,
    calls: Mutex<Vec<Call>>,
    callbacks: Mutex<Callbacks>,
}

/// A library that records every call made into it.
#[derive(Clone)]
pub(crate) struct MockLibrary {
    state: Arc<MockState>,
}

impl MockLibrary {
    pub(crate) fn new(num_locks: usize) -> Self {
        Self::build(num_locks, false)
    }

    /// A library whose lock count query panics.
    pub(crate) fn panicking(num_locks: usize) -> Self {
        Self::build(num_locks, true)
    }

    fn build(num_locks: usize, panic_on_num_locks: bool) -> Self {
        Self {
            state: Arc::new(MockState {
                num_locks,
                panic_on_num_locks,
                calls: Mutex::new(Vec::new()),
                callbacks: Mutex::new(Callbacks::NONE),
            }),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    /// The callbacks currently registered.
    pub(crate) fn callbacks(&self) -> Callbacks {
        *self.state.callbacks.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.state.calls.lock().unwrap().push(call);
    }
}

impl CryptoLibrary for MockLibrary {
    fn version(&self) -> String {
        "MockSSL 1.0.2u".to_string()
    }

    fn initialize(&self) {
        self.record(Call::Initialize);
    }

    fn num_locks(&self) -> usize {
        self.record(Call::NumLocks);
        if self.state.panic_on_num_locks {
            panic!("lock count unavailable");
        }
        self.state.num_locks
    }

    fn set_callbacks(&self, callbacks: &Callbacks) {
        self.record(if callbacks.is_none() {
            Call::Deregister
        } else {
            Call::Register
        });
        *self.state.callbacks.lock().unwrap() = *callbacks;
    }

    fn cleanup_thread(&self) {
        self.record(Call::CleanupThread);
    }

    fn cleanup_global(&self) {
        self.record(Call::CleanupGlobal);
    }

    unsafe fn set_thread_id(id: *mut CRYPTO_THREADID, value: c_ulong) {
        unsafe { *id.cast::<c_ulong>() = value };
    }
}

/// Invokes the registered callbacks the way the library does.
impl Callbacks {
    pub(crate) fn call_thread_id(&self) -> c_ulong {
        let mut id: c_ulong = 0;
        unsafe { (self.thread_id.unwrap())((&mut id as *mut c_ulong).cast()) };
        id
    }

    pub(crate) fn call_lock(&self, n: c_int) {
        let mode = CRYPTO_LOCK | CRYPTO_WRITE;
        unsafe { (self.locking.unwrap())(mode, n, c"ssl_lib.c".as_ptr(), 1) }
    }

    pub(crate) fn call_unlock(&self, n: c_int) {
        let mode = CRYPTO_UNLOCK | CRYPTO_WRITE;
        unsafe { (self.locking.unwrap())(mode, n, c"ssl_lib.c".as_ptr(), 2) }
    }

    pub(crate) fn call_read_lock(&self, n: c_int) {
        let mode = CRYPTO_LOCK | CRYPTO_READ;
        unsafe { (self.locking.unwrap())(mode, n, c"ssl_lib.c".as_ptr(), 3) }
    }

    pub(crate) fn call_read_unlock(&self, n: c_int) {
        let mode = CRYPTO_UNLOCK | CRYPTO_READ;
        unsafe { (self.locking.unwrap())(mode, n, c"ssl_lib.c".as_ptr(), 4) }
    }

    pub(crate) fn call_dyn_create(&self) -> DynHandle {
        let value = unsafe { (self.dynlock_create.unwrap())(c"ssl_sess.c".as_ptr(), 10) };
        DynHandle(value)
    }

    pub(crate) fn call_dyn_lock(&self, handle: DynHandle) {
        let mode = CRYPTO_LOCK | CRYPTO_WRITE;
        unsafe { (self.dynlock_lock.unwrap())(mode, handle.0, c"ssl_sess.c".as_ptr(), 11) }
    }

    pub(crate) fn call_dyn_unlock(&self, handle: DynHandle) {
        let mode = CRYPTO_UNLOCK | CRYPTO_WRITE;
        unsafe { (self.dynlock_lock.unwrap())(mode, handle.0, c"ssl_sess.c".as_ptr(), 12) }
    }

    pub(crate) fn call_dyn_destroy(&self, handle: DynHandle) {
        unsafe { (self.dynlock_destroy.unwrap())(handle.0, c"ssl_sess.c".as_ptr(), 13) }
    }
}

/// A dynamic lock handle as held by the library.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DynHandle(pub(crate) *mut CRYPTO_dynlock_value);

unsafe impl Send for DynHandle {}

impl DynHandle {
    pub(crate) fn is_null(self) -> bool {
        self.0.is_null()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counts {
    pub(crate) inits: usize,
    pub(crate) destroys: usize,
}

impl Counts {
    pub(crate) fn live(&self) -> usize {
        self.inits - self.destroys
    }
}

std::thread_local! {
    static COUNTS: Cell<Counts> = const { Cell::new(Counts { inits: 0, destroys: 0 }) };
    static INIT_BUDGET: Cell<Option<usize>> = const { Cell::new(None) };
}

/// A futex mutex that counts creations and destructions on the current thread.
pub(crate) struct CountingMutex(FutexMutex);

impl CountingMutex {
    pub(crate) fn snapshot() -> Counts {
        COUNTS.with(Cell::get)
    }
}

unsafe impl RawLock for CountingMutex {
    fn init() -> io::Result<Self> {
        COUNTS.with(|c| {
            let mut counts = c.get();
            counts.inits += 1;
            c.set(counts);
        });
        Ok(Self(FutexMutex::new()))
    }

    fn lock(&self) -> io::Result<()> {
        self.0.lock()
    }

    fn try_lock(&self) -> bool {
        self.0.try_lock()
    }

    unsafe fn unlock(&self) -> io::Result<()> {
        unsafe { self.0.unlock() }
    }

    fn destroy(self) -> io::Result<()> {
        COUNTS.with(|c| {
            let mut counts = c.get();
            counts.destroys += 1;
            c.set(counts);
        });
        self.0.destroy()
    }
}

/// A counting mutex whose creation fails once the current thread's budget runs out.
pub(crate) struct FailingMutex(CountingMutex);

impl FailingMutex {
    /// Lets the next `budget` creations on this thread succeed and fails the ones after.
    pub(crate) fn set_budget(budget: Option<usize>) {
        INIT_BUDGET.with(|b| b.set(budget));
    }
}

unsafe impl RawLock for FailingMutex {
    fn init() -> io::Result<Self> {
        let exhausted = INIT_BUDGET.with(|b| match b.get() {
            Some(0) => true,
            Some(n) => {
                b.set(Some(n - 1));
                false
            }
            None => false,
        });
        if exhausted {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "init budget exhausted"));
        }
        CountingMutex::init().map(Self)
    }

    fn lock(&self) -> io::Result<()> {
        self.0.lock()
    }

    fn try_lock(&self) -> bool {
        self.0.try_lock()
    }

    unsafe fn unlock(&self) -> io::Result<()> {
        unsafe { self.0.unlock() }
    }

    fn destroy(self) -> io::Result<()> {
        self.0.destroy()
    }
}
