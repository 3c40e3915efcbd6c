// Allow-list of hostnames currently served by the proxy
//
// Numan Thabit 2025 Nov

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Copy-on-write host set. Readers clone the current `Arc` and never observe
/// a partially replaced set.
#[derive(Debug, Default)]
pub struct HostFilter {
    active: RwLock<Arc<HashSet<String>>>,
}

impl HostFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, host: &str) -> bool {
        self.snapshot().contains(host)
    }

    /// Swaps in a new set wholesale.
    pub fn replace<I, S>(&self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: Arc<HashSet<String>> = Arc::new(hosts.into_iter().map(Into::into).collect());
        match self.active.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<HashSet<String>> {
        match self.active.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_and_rejects_everything() {
        let filter = HostFilter::new();
        assert!(filter.is_empty());
        assert!(!filter.contains("a.com"));
        assert!(!filter.contains(""));
    }

    #[test]
    fn replace_swaps_whole_set() {
        let filter = HostFilter::new();
        filter.replace(["a.com", "b.com"]);
        assert!(filter.contains("a.com"));
        assert!(filter.contains("b.com"));

        filter.replace(vec!["c.com".to_string()]);
        assert!(!filter.contains("a.com"));
        assert!(!filter.contains("b.com"));
        assert!(filter.contains("c.com"));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn concurrent_readers_see_a_whole_set() {
        let filter = Arc::new(HostFilter::new());
        filter.replace(["a.com", "b.com"]);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let filter = Arc::clone(&filter);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let set = filter.snapshot();
                        let old = set.len() == 2 && set.contains("a.com") && set.contains("b.com");
                        let new = set.len() == 1 && set.contains("c.com");
                        assert!(old || new);
                    }
                })
            })
            .collect();

        for i in 0..100 {
            if i % 2 == 0 {
                filter.replace(["c.com"]);
            } else {
                filter.replace(["a.com", "b.com"]);
            }
        }

        for r in readers {
            r.join().unwrap();
        }
    }
}
