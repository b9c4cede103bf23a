//! Player identity lookup.
//!
//! The protocol layer asks an [`IdentityProvider`] for the UUID of every player
//! that completes login. How that UUID is derived is the provider's business.

use uuid::Uuid;

pub trait IdentityProvider: Send + Sync {
    fn identify(&self, name: &str) -> Uuid;
}

/// Name-derived UUIDs for servers without authentication.
///
/// A name-based (version 3) UUID of `"OfflinePlayer:<name>"`, so the same name
/// always maps to the same identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineIdentity;

impl IdentityProvider for OfflineIdentity {
    fn identify(&self, name: &str) -> Uuid {
        Uuid::new_v3(
            &Uuid::NAMESPACE_URL,
            format!("OfflinePlayer:{name}").as_bytes(),
        )
    }
}

impl<F> IdentityProvider for F
where
    F: Fn(&str) -> Uuid + Send + Sync,
{
    fn identify(&self, name: &str) -> Uuid {
        self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_identity_is_stable() {
        let a = OfflineIdentity.identify("Notch");
        let b = OfflineIdentity.identify("Notch");
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 3);
        assert_ne!(a, OfflineIdentity.identify("notch"));
    }

    #[test]
    fn test_offline_identity_uses_url_namespace() {
        let expected = Uuid::new_v3(&Uuid::NAMESPACE_URL, b"OfflinePlayer:Notch");
        assert_eq!(OfflineIdentity.identify("Notch"), expected);
    }

    #[test]
    fn test_closure_provider() {
        let fixed = |_: &str| Uuid::nil();
        assert_eq!(fixed.identify("anyone"), Uuid::nil());
    }
}
