//! Fault isolation for best-effort work.
//!
//! Lifecycle steps and border rebuilds call into host code that may panic.
//! Both go through [`isolate`] so a single broken step cannot take down the
//! tick that ran it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run `f`, turning a panic into an `Err` carrying its payload.
pub fn isolate<T>(f: impl FnOnce() -> T) -> Result<T, Box<dyn Any + Send>> {
    panic::catch_unwind(AssertUnwindSafe(f))
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_passes_through_value() {
        assert_eq!(isolate(|| 41 + 1).ok(), Some(42));
    }

    #[test]
    fn test_isolate_captures_formatted_panic() {
        let err = isolate(|| -> u32 { panic!("step {} broke", 3) }).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "step 3 broke");
    }
}
