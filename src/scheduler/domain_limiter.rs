//! Per-host fairness limiter.
//!
//! Collection links are almost always same-host relative paths, but a site
//! config can still point a link at an absolute foreign URL. One semaphore
//! per host, sized to `maxConcurrency`, keeps a single noisy host from
//! consuming every in-flight slot — following the same approach as
//! `crawl_engine::domain_limiter::DomainLimiter`, generalized from
//! "external domain being crawled" to "host a collection link resolves to".

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct HostLimiter {
    semaphores: DashMap<String, Arc<Semaphore>>,
    max_per_host: usize,
}

impl HostLimiter {
    #[must_use]
    pub fn new(max_per_host: usize) -> Self {
        Self {
            semaphores: DashMap::new(),
            max_per_host: max_per_host.max(1),
        }
    }

    pub async fn acquire(&self, host: &str) -> OwnedSemaphorePermit {
        loop {
            let semaphore = self
                .semaphores
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)))
                .clone();

            match semaphore.acquire_owned().await {
                Ok(permit) => return permit,
                Err(_) => {
                    log::error!("host semaphore for '{host}' closed unexpectedly - replacing");
                    self.semaphores
                        .insert(host.to_string(), Arc::new(Semaphore::new(self.max_per_host)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grants_independent_permits_per_host() {
        let limiter = HostLimiter::new(1);
        let _a = limiter.acquire("a.example.com").await;
        let _b = limiter.acquire("b.example.com").await;
    }

    #[tokio::test]
    async fn reuses_the_same_semaphore_for_repeat_hosts() {
        let limiter = HostLimiter::new(2);
        let _p1 = limiter.acquire("a.example.com").await;
        let _p2 = limiter.acquire("a.example.com").await;
        assert_eq!(limiter.semaphores.len(), 1);
    }
}
