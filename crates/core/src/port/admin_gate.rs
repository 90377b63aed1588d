// Admin Gate Port
//
// The session/auth collaborator decides who is an admin; the core only asks.

/// Opaque "is this caller an admin" capability
pub trait AdminGate: Send + Sync {
    fn is_authorized(&self) -> bool;
}

pub mod mocks {
    use super::AdminGate;

    /// Gate with a fixed answer
    #[derive(Debug, Clone, Copy)]
    pub struct StaticGate(pub bool);

    impl StaticGate {
        pub fn allow() -> Self {
            Self(true)
        }

        pub fn deny() -> Self {
            Self(false)
        }
    }

    impl AdminGate for StaticGate {
        fn is_authorized(&self) -> bool {
            self.0
        }
    }
}
