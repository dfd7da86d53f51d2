//! Client config rendering

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::warn;

use crate::allowlist::sort_unique;
use crate::error::{WgClientError, WgClientResult};
use crate::registry::{ClientConfig, Registry, User};

/// Keepalive sent by every generated client
pub const PERSISTENT_KEEPALIVE: u16 = 25;

/// Values substituted into a single client config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateContext {
    pub private_key: String,
    pub peer_public_key: String,
    pub peer_endpoint: String,
    pub net_prefix: String,
    pub net_suffix: String,
    /// Value of the `DNS =` line; the line is left out when empty
    pub dns: String,
    pub allowed_ips: String,
}

impl TemplateContext {
    /// Collect the substitutions for one (user, variant) pair
    ///
    /// `key` is the user's registry key, which is also the host part of the
    /// client address.
    pub fn for_client(registry: &Registry, key: &str, user: &User, cc: &ClientConfig) -> WgClientResult<Self> {
        if user.private_key.is_empty() {
            return Err(WgClientError::InvalidParameter(format!(
                "user '{}' has no private key",
                user.name
            )));
        }

        let interface = registry.interface(cc.interface)?;

        let dns = if cc.no_dns {
            String::new()
        } else {
            registry.dns.join(",")
        };

        let allowed_ips = if cc.routes_dns() {
            let mut entries = registry.allowed_ips.clone();
            entries.extend(registry.dns.iter().map(|server| host_route(server)));
            sort_unique(entries)
        } else {
            registry.allowed_ips.clone()
        };

        Ok(Self {
            private_key: user.private_key.clone(),
            peer_public_key: registry.server_public_key.clone(),
            peer_endpoint: interface.endpoint.clone(),
            net_prefix: interface.prefix.clone(),
            net_suffix: key.to_string(),
            dns,
            allowed_ips: allowed_ips.join(", "),
        })
    }

    pub fn address(&self) -> String {
        format!("{}{}/32", self.net_prefix, self.net_suffix)
    }
}

/// Single-host route for a DNS server, `/32` for IPv4 and `/128` for IPv6
///
/// Entries that already carry a prefix length are kept as written.
fn host_route(server: &str) -> String {
    if server.contains('/') {
        return server.to_string();
    }
    match server.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => format!("{}/32", ip),
        Ok(IpAddr::V6(ip)) => format!("{}/128", ip),
        Err(_) => {
            warn!("DNS server '{}' is not an IP address, routing it as written", server);
            server.to_string()
        }
    }
}

/// Render a client config file
pub fn render_client_config(ctx: &TemplateContext) -> String {
    let mut cfg = String::new();

    // [Interface] section
    cfg.push_str("[Interface]\n");
    cfg.push_str(&format!("PrivateKey = {}\n", ctx.private_key));
    cfg.push_str(&format!("Address = {}\n", ctx.address()));
    if !ctx.dns.is_empty() {
        cfg.push_str(&format!("DNS = {}\n", ctx.dns));
    }

    // [Peer] section
    cfg.push_str("\n[Peer]\n");
    cfg.push_str(&format!("PublicKey = {}\n", ctx.peer_public_key));
    cfg.push_str(&format!("Endpoint = {}\n", ctx.peer_endpoint));
    cfg.push_str(&format!("PersistentKeepalive = {}\n", PERSISTENT_KEEPALIVE));
    cfg.push_str(&format!("AllowedIPs = {}\n", ctx.allowed_ips));

    cfg
}
