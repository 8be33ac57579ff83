//! Worker panics are caught with `std::panic::catch_unwind`, whose `Err` variant carries a
//! `Box<dyn Any + Send>` payload. Invariant violations inside the reservation layer surface this
//! way, so the message is worth recovering.
use std::any::Any;

/// Render a caught panic payload, prefixed with `context`.
///
/// `panic!` payloads are either a `&str` or a formatted `String`. Anything else yields only the
/// context.
pub fn panic_to_string(context: &str, payload: Box<dyn Any + Send>) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str));

    match message {
        Some(message) => format!("{}: {}", context, message),
        None => format!("{} (no message)", context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_static_and_formatted_messages() {
        let err = std::panic::catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_to_string("worker 0", err), "worker 0: plain");

        let n = 3;
        let err = std::panic::catch_unwind(|| panic!("formatted {}", n)).unwrap_err();
        assert_eq!(panic_to_string("worker 1", err), "worker 1: formatted 3");

        let err = std::panic::catch_unwind(|| std::panic::panic_any(7u32)).unwrap_err();
        assert_eq!(panic_to_string("worker 2", err), "worker 2 (no message)");
    }
}
