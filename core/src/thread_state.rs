//! Per-thread "native" state
//!
//! While a thread is native (inside a real library call the layer made on
//! its own behalf, such as window creation), its waits are not diverted.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static NATIVE_DEPTH: Cell<u32> = const { Cell::new(0) };
}

pub fn is_native() -> bool {
    NATIVE_DEPTH.with(|d| d.get() > 0)
}

/// Marks the current thread native until dropped. Scopes nest.
#[must_use = "the thread leaves the native state when the scope is dropped"]
pub struct NativeScope {
    // Must be dropped on the thread that created it
    _not_send: PhantomData<*const ()>,
}

impl NativeScope {
    pub fn enter() -> Self {
        NATIVE_DEPTH.with(|d| d.set(d.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for NativeScope {
    fn drop(&mut self) {
        NATIVE_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_scopes_nest() {
        assert!(!is_native());
        {
            let _outer = NativeScope::enter();
            {
                let _inner = NativeScope::enter();
                assert!(is_native());
            }
            assert!(is_native());
        }
        assert!(!is_native());
    }

    #[test]
    fn test_native_state_is_per_thread() {
        let _scope = NativeScope::enter();
        let other = std::thread::spawn(is_native).join().unwrap();
        assert!(!other);
        assert!(is_native());
    }
}
