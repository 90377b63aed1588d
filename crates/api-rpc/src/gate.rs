//! Admin gate backed by a shared token

use ticketline_core::port::AdminGate;

/// Grants admin rights when the caller presents the configured token.
/// With no configured token nobody is an admin.
pub struct TokenGate<'a> {
    configured: Option<&'a str>,
    presented: Option<&'a str>,
}

impl<'a> TokenGate<'a> {
    pub fn new(configured: Option<&'a str>, presented: Option<&'a str>) -> Self {
        Self {
            configured,
            presented,
        }
    }
}

impl AdminGate for TokenGate<'_> {
    fn is_authorized(&self) -> bool {
        match (self.configured, self.presented) {
            (Some(expected), Some(given)) if !expected.is_empty() => {
                constant_time_eq(expected.as_bytes(), given.as_bytes())
            }
            _ => false,
        }
    }
}

// Length leaks, contents do not
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_token_is_admin() {
        assert!(TokenGate::new(Some("s3cret"), Some("s3cret")).is_authorized());
    }

    #[test]
    fn test_wrong_or_missing_token_is_refused() {
        assert!(!TokenGate::new(Some("s3cret"), Some("s3creT")).is_authorized());
        assert!(!TokenGate::new(Some("s3cret"), Some("s3c")).is_authorized());
        assert!(!TokenGate::new(Some("s3cret"), None).is_authorized());
    }

    #[test]
    fn test_unconfigured_token_refuses_everyone() {
        assert!(!TokenGate::new(None, Some("anything")).is_authorized());
        assert!(!TokenGate::new(None, None).is_authorized());
        assert!(!TokenGate::new(Some(""), Some("")).is_authorized());
    }
}
