//! AllowedIPs list building
//!
//! Merges statically configured CIDRs with `/32` entries obtained by
//! resolving a list of DNS names. The result is sorted as plain strings and
//! deduplicated, so building twice from the same inputs and answers yields the
//! same list, and feeding a result back in as the static list changes nothing.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{WgClientError, WgClientResult};
use crate::resolver::Resolve;

/// Builds allow-lists with an injected resolver
pub struct AllowlistBuilder<R> {
    resolver: R,
}

impl<R: Resolve> AllowlistBuilder<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Resolve `dns_names` and merge them with `static_cidrs`
    ///
    /// Names are resolved one at a time, in order. The first failed lookup,
    /// or the first name without any IPv4 answer, aborts the build; nothing
    /// is returned for the names that did resolve.
    pub async fn build(&self, dns_names: &[String], static_cidrs: &[String]) -> WgClientResult<Vec<String>> {
        let mut entries = Vec::with_capacity(static_cidrs.len() + dns_names.len());

        for name in dns_names {
            let ips = self.resolver.lookup_ipv4(name).await.map_err(|e| {
                error!(dns_name = %name, "{}", e);
                e
            })?;

            if ips.is_empty() {
                error!(dns_name = %name, "no DNS resolver response for dns name");
                return Err(WgClientError::NoResolverResponse(name.clone()));
            }

            debug!(dns_name = %name, count = ips.len(), "resolved");
            entries.extend(ips.iter().map(|ip| format!("{}/32", ip)));
        }

        entries.extend(static_cidrs.iter().cloned());
        let merged = sort_unique(entries);

        info!(
            "Built allow-list with {} entries ({} dns names, {} static)",
            merged.len(),
            dns_names.len(),
            static_cidrs.len()
        );
        Ok(merged)
    }

    /// Same as [`build`](Self::build), aborted when `cancel` completes first
    ///
    /// The in-flight lookup is dropped on cancellation.
    pub async fn build_with_cancel<F>(
        &self,
        dns_names: &[String],
        static_cidrs: &[String],
        cancel: F,
    ) -> WgClientResult<Vec<String>>
    where
        F: Future<Output = ()>,
    {
        self.build_until(dns_names, static_cidrs, cancel, None).await
    }

    /// Same as [`build`](Self::build), bounded by an overall deadline
    pub async fn build_with_timeout(
        &self,
        dns_names: &[String],
        static_cidrs: &[String],
        timeout: Duration,
    ) -> WgClientResult<Vec<String>> {
        self.build_until(dns_names, static_cidrs, std::future::pending::<()>(), Some(timeout))
            .await
    }

    /// Build until `cancel` completes or `deadline` elapses, whichever is first
    ///
    /// `Cancelled` and `Timeout` are returned for the two abort paths; no
    /// partial list is ever returned.
    pub async fn build_until<F>(
        &self,
        dns_names: &[String],
        static_cidrs: &[String],
        cancel: F,
        deadline: Option<Duration>,
    ) -> WgClientResult<Vec<String>>
    where
        F: Future<Output = ()>,
    {
        let bounded = async {
            let Some(limit) = deadline else {
                return self.build(dns_names, static_cidrs).await;
            };
            match tokio::time::timeout(limit, self.build(dns_names, static_cidrs)).await {
                Ok(result) => result,
                Err(_) => {
                    error!("allow-list build exceeded {:?}", limit);
                    Err(WgClientError::Timeout(format!("allow-list build exceeded {:?}", limit)))
                }
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = cancel => {
                error!("allow-list build cancelled");
                Err(WgClientError::Cancelled("allow-list build".to_string()))
            }
        }
    }
}

/// Sort as strings, then collapse runs of equal entries
pub(crate) fn sort_unique(mut entries: Vec<String>) -> Vec<String> {
    entries.sort();
    entries.dedup();
    entries
}
