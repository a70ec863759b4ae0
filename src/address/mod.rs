//! Best-effort normalization of `To`/`From` header values.

use std::str::FromStr;

use email_address::EmailAddress;

/// A header value that does not hold a usable mailbox.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    /// The header value was empty.
    #[error("empty address")]
    Empty,

    /// The addr-spec failed validation.
    #[error("invalid address {input:?}: {source}")]
    Invalid {
        /// The addr-spec that was checked.
        input: String,
        /// Validation failure.
        source: email_address::Error,
    },
}

/// Reduces a header mailbox such as `"Jane" <jane@example.com>` to its
/// bare `local@domain` form.
///
/// Only the first mailbox of a list is considered.
pub fn normalize_address(value: &str) -> Result<String, AddressError> {
    let first = value.split(',').next().unwrap_or_default();
    let addr_spec = match (first.rfind('<'), first.rfind('>')) {
        (Some(open), Some(close)) if open < close => &first[open + 1..close],
        _ => first,
    }
    .trim();

    if addr_spec.is_empty() {
        return Err(AddressError::Empty);
    }

    let parsed = EmailAddress::from_str(addr_spec).map_err(|source| AddressError::Invalid {
        input: addr_spec.to_string(),
        source,
    })?;
    Ok(format!("{}@{}", parsed.local_part(), parsed.domain()))
}
