//! Tunnel name validation
//!
//! The WireGuard Windows client refuses tunnel names that collide with legacy
//! Win32 device names or that contain characters forbidden in file names and
//! service names. Every generated config is checked against the same rules so
//! it imports cleanly on every platform.

use crate::error::{WgClientError, WgClientResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length of a tunnel name accepted by the Windows client
pub const MAX_TUNNEL_NAME_LEN: usize = 32;

/// Win32 device names that cannot be used as a file or tunnel name
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL",
    "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9",
    "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Forbidden in Windows service names
const SERVICE_NAME_FORBIDDEN: &[char] = &['$'];

/// Forbidden by the netshell tunnel name dialog
const NETSHELL_FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|', '\t'];

/// Positive allowlist, checked last
static ALLOWED_NAME_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_=+.-]{1,32}$").expect("Invalid tunnel name regex")
});

/// Check whether `name` is a Win32 reserved device name (case-insensitive)
pub fn is_reserved_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    RESERVED_NAMES.iter().any(|reserved| name.eq_ignore_ascii_case(reserved))
}

/// Check for path separators, wildcards, control bytes and `$`
pub fn has_special_chars(name: &str) -> bool {
    name.chars().any(|c| {
        // 0x00-0x1F
        (c as u32) < 0x20 || NETSHELL_FORBIDDEN.contains(&c) || SERVICE_NAME_FORBIDDEN.contains(&c)
    })
}

/// Check whether `name` is usable as a tunnel name and config file stem
pub fn is_valid_tunnel_name(name: &str) -> bool {
    if is_reserved_name(name) || has_special_chars(name) {
        return false;
    }
    ALLOWED_NAME_FORMAT.is_match(name)
}

/// Validate a tunnel name, reporting which rule it breaks
pub fn validate_tunnel_name(name: &str) -> WgClientResult<()> {
    let invalid = |reason: String| {
        Err(WgClientError::InvalidTunnelName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name cannot be empty".to_string());
    }

    if name.chars().count() > MAX_TUNNEL_NAME_LEN {
        return invalid(format!(
            "can not be longer than {} characters",
            MAX_TUNNEL_NAME_LEN
        ));
    }

    if is_reserved_name(name) {
        return invalid("is a reserved windows device name".to_string());
    }

    if has_special_chars(name) {
        return invalid("contains characters forbidden in windows tunnel names".to_string());
    }

    if !ALLOWED_NAME_FORMAT.is_match(name) {
        return invalid(
            "is not a valid windows tunnel name (allowed: letters, digits and _=+.-)".to_string(),
        );
    }

    Ok(())
}

/// Validate a CIDR notation (e.g., "10.0.0.1/24")
pub fn is_valid_cidr(cidr: &str) -> bool {
    if let Some((ip, prefix)) = cidr.split_once('/') {
        if let Ok(prefix_len) = prefix.parse::<u8>() {
            if ip.parse::<std::net::Ipv4Addr>().is_ok() {
                return prefix_len <= 32;
            } else if ip.parse::<std::net::Ipv6Addr>().is_ok() {
                return prefix_len <= 128;
            }
        }
    }
    false
}
