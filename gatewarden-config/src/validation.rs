// gatewarden-config/src/validation.rs
//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use std::net::IpAddr;

use regex::Regex;
use validator::ValidationError;

fn is_match(pattern: &str, value: &str) -> Result<bool, ValidationError> {
    let re = Regex::new(pattern).map_err(|_| ValidationError::new("invalid_regex"))?;
    Ok(re.is_match(value))
}

/// Validate that an interface name follows Linux naming conventions.
pub fn validate_interface(name: &str) -> Result<(), ValidationError> {
    if !name.is_empty() && name.len() <= 15 && is_match("^[a-zA-Z0-9_.-]+$", name)? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_interface"))
    }
}

/// Validate an nftables table or set name.
pub fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if name.len() <= 64 && is_match("^[a-zA-Z_][a-zA-Z0-9_]*$", name)? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_identifier"))
    }
}

/// Validate firewall backend selection.
pub fn validate_backend(backend: &str) -> Result<(), ValidationError> {
    if is_match("^(nftables|memory)$", backend)? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_firewall_backend"))
    }
}

/// Validate nftables address family. The ban set holds IPv4 addresses, so
/// only families that can match `ip saddr` are accepted.
pub fn validate_family(family: &str) -> Result<(), ValidationError> {
    if is_match("^(inet|ip)$", family)? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_family"))
    }
}

/// Validate which alert address is banned.
pub fn validate_block_target(target: &str) -> Result<(), ValidationError> {
    if is_match("^(source|destination)$", target)? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_block_target"))
    }
}

/// Validate log level.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if is_match("^(trace|debug|info|warn|error)$", &level.to_lowercase())? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Validate that every entry parses as a single IP address.
pub fn validate_address_list(addresses: &[String]) -> Result<(), ValidationError> {
    if addresses
        .iter()
        .all(|a| a.trim().parse::<IpAddr>().is_ok())
    {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_address"))
    }
}
