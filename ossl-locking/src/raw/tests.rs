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

use std::sync::Arc;
use std::vec::Vec;

use super::*;
use crate::testkit::UnsafeSendCell;

fn exclusive_increments<M: RawLock>(threads: usize, rounds: usize) -> usize {
    let mutex = Arc::new(M::init().unwrap());
    let counter = Arc::new(UnsafeSendCell::new(0_usize));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let mutex = mutex.clone();
            let counter = counter.clone();
            std::thread::spawn(move || {
                for _ in 0..rounds {
                    mutex.lock().unwrap();
                    unsafe { *counter.get() += 1 };
                    unsafe { mutex.unlock().unwrap() };
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let mutex = Arc::into_inner(mutex).unwrap();
    mutex.destroy().unwrap();
    unsafe { *counter.get() }
}

#[test]
fn test_futex_lock_unlock() {
    let mutex = FutexMutex::init().unwrap();
    assert!(!mutex.is_locked());
    mutex.lock().unwrap();
    assert!(mutex.is_locked());
    assert!(!mutex.try_lock());
    unsafe { mutex.unlock().unwrap() };
    assert!(mutex.try_lock());
    unsafe { mutex.unlock().unwrap() };
    mutex.destroy().unwrap();
}

#[test]
fn test_futex_multi_thread() {
    assert_eq!(exclusive_increments::<FutexMutex>(8, 1000), 8000);
}

#[test]
fn test_futex_unlock_unlocked() {
    let mutex = FutexMutex::new();
    let err = unsafe { mutex.unlock() }.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[test]
fn test_futex_destroy_locked() {
    let mutex = FutexMutex::new();
    mutex.lock().unwrap();
    let err = mutex.destroy().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::ResourceBusy);
}

#[test]
fn test_futex_unlock_from_other_thread() {
    let mutex = Arc::new(FutexMutex::new());
    mutex.lock().unwrap();
    let m = mutex.clone();
    std::thread::spawn(move || unsafe { m.unlock().unwrap() })
        .join()
        .unwrap();
    assert!(!mutex.is_locked());
}

#[cfg(unix)]
#[test]
fn test_pthread_lock_unlock() {
    let mutex = PthreadMutex::init().unwrap();
    mutex.lock().unwrap();
    unsafe { mutex.unlock().unwrap() };
    assert!(mutex.try_lock());
    unsafe { mutex.unlock().unwrap() };
    mutex.destroy().unwrap();
}

#[cfg(unix)]
#[test]
fn test_pthread_multi_thread() {
    assert_eq!(exclusive_increments::<PthreadMutex>(8, 1000), 8000);
}

#[cfg(unix)]
#[test]
fn test_pthread_drop_releases() {
    for _ in 0..64 {
        drop(PthreadMutex::init().unwrap());
    }
}
