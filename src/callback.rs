use alloc::boxed::Box;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

type Callback<A> = Box<dyn FnMut(A) + Send>;

/// Single-subscriber callback slot. Last writer wins.
///
/// The callback runs outside the lock, so it may replace itself (or install a
/// different subscriber) while running. A replacement made during the call is
/// kept; otherwise the original callback goes back into the slot.
pub(crate) struct CallbackSlot<A> {
    slot: Mutex<CriticalSectionRawMutex, RefCell<Option<Callback<A>>>>,
}

impl<A> CallbackSlot<A> {
    pub(crate) const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    pub(crate) fn set(&self, callback: impl FnMut(A) + Send + 'static) {
        self.slot.lock(|slot| {
            *slot.borrow_mut() = Some(Box::new(callback));
        });
    }

    /// Calls the subscriber, if any. Returns whether one was called.
    pub(crate) fn call(&self, arg: A) -> bool {
        let Some(mut callback) = self.slot.lock(|slot| slot.borrow_mut().take()) else {
            return false;
        };
        callback(arg);
        self.slot.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_none() {
                *slot = Some(callback);
            }
        });
        true
    }
}
