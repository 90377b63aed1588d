// Panic isolation for subscriber callbacks
use std::panic::catch_unwind;

/// Outcome of a guarded call
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    Success(T),
    /// The call panicked; carries the panic message when it was a string
    Panicked(String),
}

impl<T> PanicGuardResult<T> {
    pub fn is_panicked(&self) -> bool {
        matches!(self, PanicGuardResult::Panicked(_))
    }
}

/// Run `f`, converting a panic into `PanicGuardResult::Panicked` so a faulty
/// callback cannot take its dispatcher down with it.
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    match catch_unwind(f) {
        Ok(value) => PanicGuardResult::Success(value),
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            };
            PanicGuardResult::Panicked(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_passes_value_through() {
        match execute_guarded(|| 7) {
            PanicGuardResult::Success(v) => assert_eq!(v, 7),
            PanicGuardResult::Panicked(msg) => panic!("unexpected panic: {}", msg),
        }
    }

    #[test]
    fn test_panic_message_is_captured() {
        let result: PanicGuardResult<()> = execute_guarded(|| panic!("callback failed"));
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "callback failed"),
            PanicGuardResult::Success(_) => panic!("expected a panic"),
        }
    }

    #[test]
    fn test_formatted_panic_message_is_captured() {
        let code = 42;
        let result: PanicGuardResult<()> = execute_guarded(move || panic!("code {}", code));
        assert!(result.is_panicked());
        if let PanicGuardResult::Panicked(msg) = result {
            assert_eq!(msg, "code 42");
        }
    }
}
