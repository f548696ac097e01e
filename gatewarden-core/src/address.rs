//! ## gatewarden-core::address
//! **Canonical address form**
//!
//! Every address entering the ban table or the whitelist passes through
//! [`canonicalize`], so `::ffff:10.0.0.1`, ` 10.0.0.1 ` and `10.0.0.1` all
//! collide on the same key. IPv6 is rendered in RFC 5952 form.

use std::net::IpAddr;

use crate::error::AddressError;

/// Parse `raw` and return its canonical textual form.
pub fn canonicalize(raw: &str) -> Result<String, AddressError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    let addr: IpAddr = trimmed
        .parse()
        .map_err(|_| AddressError::Invalid(raw.to_string()))?;

    Ok(addr.to_canonical().to_string())
}
