//! wgclient - WireGuard client config generator
//!
//! Library behind the `wgclient` tool:
//! - Registry loading and user selection
//! - Tunnel name validation and config file naming
//! - AllowedIPs building from static CIDRs and DNS names
//! - Hostname resolution (system resolver or a specific nameserver)
//! - Client config rendering and writing

pub mod error;
pub mod validation;
pub mod resolver;
pub mod allowlist;
pub mod registry;
pub mod render;
pub mod output;
pub mod config;

// Re-export commonly used types
pub use error::{WgClientError, WgClientResult};
pub use validation::{is_valid_tunnel_name, validate_tunnel_name};
pub use resolver::{NameserverResolver, Resolve, SystemResolver};
pub use allowlist::AllowlistBuilder;
pub use registry::{ClientConfig, Interface, Registry, User, Users};
pub use render::{render_client_config, TemplateContext};
pub use output::{render_all, write_client_configs, RenderedConfig};
pub use config::Settings;
