//! Per-worker storefront domain rotation

use crate::utils::host_matches;

/// Fixed set of storefront domains a regional worker may use.
///
/// Each worker owns its pool, so the rotation cursor needs no
/// synchronization.
#[derive(Debug, Clone)]
pub struct DomainPool {
    domains: Vec<String>,
    cursor: usize,
}

impl DomainPool {
    pub fn new(domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut domains: Vec<String> = domains.into_iter().map(Into::into).collect();
        domains.dedup();
        Self { domains, cursor: 0 }
    }

    /// Next domain in round-robin order, `None` for an empty pool
    pub fn next_domain(&mut self) -> Option<&str> {
        if self.domains.is_empty() {
            return None;
        }
        let index = self.cursor % self.domains.len();
        self.cursor = self.cursor.wrapping_add(1);
        Some(&self.domains[index])
    }

    pub fn contains(&self, host: &str) -> bool {
        self.domains.iter().any(|domain| host_matches(host, domain))
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// More than one domain to rotate through
    pub fn rotates(&self) -> bool {
        self.domains.len() > 1
    }
}
