use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{SliceError, SliceResult};

/// The set of slice domains claimed so far.
///
/// Whoever assembles containers owns the registry and passes it to
/// [`SliceBuilder::build`](crate::SliceBuilder::build). Independent
/// registries never see each other's domains, so several containers can
/// coexist in one process.
#[derive(Clone, Debug, Default)]
pub struct DomainRegistry(Arc<Mutex<BTreeSet<String>>>);

impl DomainRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a slice has claimed this domain.
    pub fn contains(&self, domain: &str) -> bool {
        self.0.lock().contains(domain)
    }

    /// Every claimed domain, sorted.
    pub fn domains(&self) -> Vec<String> {
        self.0.lock().iter().cloned().collect()
    }

    pub(crate) fn claim(&self, domain: &str) -> SliceResult<()> {
        if self.0.lock().insert(domain.to_string()) {
            Ok(())
        } else {
            Err(SliceError::DuplicateDomain(domain.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_domain_can_only_be_claimed_once() {
        let registry = DomainRegistry::new();
        registry.claim("auth").unwrap();
        assert!(matches!(
            registry.claim("auth"),
            Err(SliceError::DuplicateDomain(d)) if d == "auth"
        ));

        // a separate registry is unaffected
        DomainRegistry::new().claim("auth").unwrap();
        assert_eq!(registry.domains(), vec!["auth".to_string()]);
    }
}
