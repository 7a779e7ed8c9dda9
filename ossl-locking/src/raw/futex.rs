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

use std::hint;
use std::io;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use crate::raw::RawLock;

// This is derived from futex.rs in the std library.

const UNLOCKED: u32 = 0; // unlocked
const LOCKED: u32 = 1; // locked, no other threads waiting
const CONTENDED: u32 = 2; // locked, and other threads waiting (contended)

/// A futex-based mutex that can be unlocked from a different call than the one that locked it.
#[derive(Debug)]
pub struct FutexMutex {
    futex: AtomicU32,
}

impl FutexMutex {
    /// Creates a new, unlocked mutex.
    pub const fn new() -> Self {
        Self {
            futex: AtomicU32::new(UNLOCKED),
        }
    }

    /// Returns `true` if the mutex is currently held by anyone.
    ///
    /// This method is typically used for debugging and testing purposes.
    pub fn is_locked(&self) -> bool {
        self.futex.load(Ordering::Relaxed) != UNLOCKED
    }

    fn acquire(&self) {
        if self
            .futex
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_contended()
        }
    }

    #[cold]
    fn lock_contended(&self) {
        // Spin first to speed things up if the lock is released quickly.
        let mut state = self.spin();

        // If it's unlocked now, attempt to take the lock
        // without marking it as contended.
        if state == UNLOCKED {
            match self.futex.compare_exchange(
                UNLOCKED,
                LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return, // Locked!
                Err(s) => state = s,
            }
        }

        loop {
            // Put the lock in contended state.
            // We avoid an unnecessary write if it as already set to CONTENDED,
            // to be friendlier for the caches.
            if state != CONTENDED && self.futex.swap(CONTENDED, Ordering::Acquire) == UNLOCKED {
                // We changed it from UNLOCKED to CONTENDED, so we just successfully locked it.
                return;
            }

            // Wait for the futex to change state, assuming it is still CONTENDED.
            atomic_wait::wait(&self.futex, CONTENDED);

            // Spin again after waking up.
            state = self.spin();
        }
    }

    fn spin(&self) -> u32 {
        let mut spin = 100;
        loop {
            // We only use `load` (and not `swap` or `compare_exchange`)
            // while spinning, to be easier on the caches.
            let state = self.futex.load(Ordering::Relaxed);

            // We stop spinning when the mutex is UNLOCKED,
            // but also when it's CONTENDED.
            if state != LOCKED || spin == 0 {
                return state;
            }

            hint::spin_loop();
            spin -= 1;
        }
    }

    fn release(&self) -> io::Result<()> {
        match self.futex.swap(UNLOCKED, Ordering::Release) {
            UNLOCKED => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unlock of a mutex that is not locked",
            )),
            CONTENDED => {
                // We only wake up one thread. When that thread locks the mutex, it
                // will mark the mutex as CONTENDED (see lock_contended above),
                // which makes sure that any other waiting threads will also be
                // woken up eventually.
                atomic_wait::wake_one(&self.futex);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Default for FutexMutex {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the futex word only transitions away from UNLOCKED through an acquiring CAS or swap
// that observed UNLOCKED, so at most one caller holds the mutex at a time.
unsafe impl RawLock for FutexMutex {
    fn init() -> io::Result<Self> {
        Ok(Self::new())
    }

    fn lock(&self) -> io::Result<()> {
        self.acquire();
        Ok(())
    }

    fn try_lock(&self) -> bool {
        self.futex
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) -> io::Result<()> {
        self.release()
    }

    fn destroy(self) -> io::Result<()> {
        if self.is_locked() {
            return Err(io::Error::from(io::ErrorKind::ResourceBusy));
        }
        Ok(())
    }
}
