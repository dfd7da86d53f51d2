//! User registry
//!
//! The registry is the JSON document listing every VPN user, the server key,
//! the interfaces clients attach to and the networks routed through them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::allowlist::AllowlistBuilder;
use crate::error::{WgClientError, WgClientResult};
use crate::resolver::Resolve;
use crate::validation;

/// Maximum length of a generated config file stem
pub const MAX_FILENAME_STEM_LEN: usize = 15;

/// Used when a user name cannot produce a valid file name
pub const FALLBACK_FILENAME: &str = "wireguard.conf";

/// One WireGuard interface on the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// `host:port` clients connect to
    #[serde(rename = "Endpoint", alias = "endpoint")]
    pub endpoint: String,
    /// Address prefix the user key is appended to, e.g. `10.8.0.`
    #[serde(rename = "Prefix", alias = "prefix")]
    pub prefix: String,
}

/// A client config variant to generate for a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Interface index, 0 = wg0, 1 = wg1, ...
    #[serde(rename = "if", default)]
    pub interface: u32,
    /// Leave out the `DNS =` line
    #[serde(default)]
    pub no_dns: bool,
    /// Route the DNS servers through the tunnel as well
    #[serde(default)]
    pub route_dns: bool,
}

impl ClientConfig {
    pub fn new(interface: u32) -> Self {
        Self {
            interface,
            ..Default::default()
        }
    }

    /// `no_dns` wins when both flags are set
    pub fn routes_dns(&self) -> bool {
        !self.no_dns && self.route_dns
    }

    /// Suffix appended to the user name in file names: `_<if>[n|r]`
    pub fn filename_suffix(&self) -> String {
        let mut suffix = format!("_{}", self.interface);
        if self.no_dns {
            suffix.push('n');
        } else if self.route_dns {
            suffix.push('r');
        }
        suffix
    }
}

/// A VPN user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(rename = "priv", default)]
    pub private_key: String,
    #[serde(rename = "pub", default)]
    pub public_key: String,
    #[serde(rename = "configs", default)]
    pub client_configs: Vec<ClientConfig>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl User {
    /// File name for one of this user's config variants
    ///
    /// The stem is at most 15 characters: the user name is shortened to make
    /// room for the variant suffix, keeping at least one character of it.
    /// Names that still do not form a valid tunnel name fall back to
    /// `wireguard.conf`.
    pub fn filename(&self, cc: &ClientConfig) -> String {
        let suffix = cc.filename_suffix();

        let mut name = self.name.as_str();
        if name.len() + suffix.len() > MAX_FILENAME_STEM_LEN {
            let end = MAX_FILENAME_STEM_LEN.saturating_sub(suffix.len()).max(1);
            name = truncate_on_char_boundary(name, end);
        }

        let mut stem = format!("{}{}", name, suffix);
        if stem.len() > MAX_FILENAME_STEM_LEN {
            let end = truncate_on_char_boundary(&stem, MAX_FILENAME_STEM_LEN).len();
            stem.truncate(end);
        }
        let stem = stem.trim_end_matches('_');

        if !validation::is_valid_tunnel_name(stem) {
            error!("not a valid tunnel name: {}", stem);
            return FALLBACK_FILENAME.to_string();
        }
        format!("{}.conf", stem)
    }
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Users keyed by the host part of their tunnel address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Users(pub HashMap<String, User>);

impl Users {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries sorted by key, for stable output
    pub fn sorted(&self) -> Vec<(&String, &User)> {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Find a user by exact name, returning its key
    pub fn find_by_name(&self, name: &str) -> WgClientResult<(&str, &User)> {
        self.0
            .iter()
            .find(|(_, user)| user.name == name)
            .map(|(key, user)| (key.as_str(), user))
            .ok_or_else(|| {
                WgClientError::NotFound(format!("could not find user with name {} in registry", name))
            })
    }

    /// Users whose name or email contains any of `patterns`
    pub fn matching<S: AsRef<str>>(&self, patterns: &[S]) -> Users {
        let contains = |v: &str| patterns.iter().any(|p| v.contains(p.as_ref()));
        Users(
            self.0
                .iter()
                .filter(|(_, user)| contains(&user.name) || contains(&user.email))
                .map(|(key, user)| (key.clone(), user.clone()))
                .collect(),
        )
    }

    /// Users carrying at least one of `tags`
    pub fn with_tags<S: AsRef<str>>(&self, tags: &[S]) -> Users {
        Users(
            self.0
                .iter()
                .filter(|(_, user)| {
                    user.tags
                        .iter()
                        .any(|got| tags.iter().any(|want| got == want.as_ref()))
                })
                .map(|(key, user)| (key.clone(), user.clone()))
                .collect(),
        )
    }
}

/// The registry document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(rename = "Users", alias = "users", default)]
    pub users: Users,
    #[serde(rename = "AllowedIPs", alias = "allowed_ips", default)]
    pub allowed_ips: Vec<String>,
    #[serde(rename = "DNSNames", alias = "dns_names", default)]
    pub dns_names: Vec<String>,
    #[serde(rename = "DNS", alias = "dns", default)]
    pub dns: Vec<String>,
    #[serde(rename = "ServerPublicKey", alias = "server_public_key", default)]
    pub server_public_key: String,
    #[serde(rename = "Interfaces", alias = "interfaces", default)]
    pub interfaces: BTreeMap<u32, Interface>,
}

impl Registry {
    /// Parse a registry document and validate every user name
    pub fn from_json(data: &[u8]) -> WgClientResult<Self> {
        let registry: Registry = serde_json::from_slice(data)?;

        for (key, user) in registry.users.sorted() {
            if let Err(e) = validation::validate_tunnel_name(&user.name) {
                error!(user = %key, "{}", e);
                return Err(e);
            }
        }

        for cidr in &registry.allowed_ips {
            if !validation::is_valid_cidr(cidr) {
                warn!("AllowedIPs entry '{}' is not a valid CIDR", cidr);
            }
        }

        debug!(
            "Parsed registry: {} users, {} interfaces, {} dns names",
            registry.users.len(),
            registry.interfaces.len(),
            registry.dns_names.len()
        );
        Ok(registry)
    }

    /// Load a registry from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> WgClientResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            WgClientError::ConfigParse(format!("Failed to read registry {:?}: {}", path, e))
        })?;
        let registry = Self::from_json(&data)?;
        info!("Loaded registry {:?} with {} users", path, registry.users.len());
        Ok(registry)
    }

    /// Every variant for every interface: default, no-DNS and route-DNS
    pub fn all_client_configs(&self) -> Vec<ClientConfig> {
        let mut configs = Vec::with_capacity(self.interfaces.len() * 3);
        for &interface in self.interfaces.keys() {
            configs.push(ClientConfig { interface, no_dns: false, route_dns: false });
            configs.push(ClientConfig { interface, no_dns: true, route_dns: false });
            configs.push(ClientConfig { interface, no_dns: false, route_dns: true });
        }
        configs
    }

    pub fn interface(&self, index: u32) -> WgClientResult<&Interface> {
        self.interfaces
            .get(&index)
            .ok_or_else(|| WgClientError::NotFound(format!("interface {} is not defined", index)))
    }

    /// Resolve `DNSNames` and replace `AllowedIPs` with the merged list
    ///
    /// The build is aborted when `cancel` completes or `deadline` elapses.
    /// `AllowedIPs` is left untouched unless the build succeeds.
    pub async fn update_allowed_ips<R, F>(
        &mut self,
        builder: &AllowlistBuilder<R>,
        cancel: F,
        deadline: Option<Duration>,
    ) -> WgClientResult<()>
    where
        R: Resolve,
        F: Future<Output = ()>,
    {
        let merged = builder
            .build_until(&self.dns_names, &self.allowed_ips, cancel, deadline)
            .await?;
        self.allowed_ips = merged;
        Ok(())
    }
}
