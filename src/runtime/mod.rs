//! Session orchestration: the controller, its feed subscriptions, and the
//! host-facing notification surface.

pub mod notify;
pub mod session;
pub mod subscriptions;

use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
