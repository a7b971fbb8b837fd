//! API credential resolution at the request boundary.
//!
//! Callers either bring their own model API key or send the literal
//! [`SERVER_KEY_SENTINEL`] to use the key the service was started with.
//! The server key is passed in explicitly (from [`crate::ServiceConfig`])
//! rather than read from the process environment here, so resolution is a
//! pure function of its inputs.

use crate::error::CmaError;
use std::fmt;

/// `apiKey` value that selects the server-held key.
pub const SERVER_KEY_SENTINEL: &str = "USE_SERVER_KEY";

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The caller supplied their own key.
    Caller,
    /// The sentinel selected the server-held key.
    Server,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Caller => f.write_str("caller"),
            CredentialSource::Server => f.write_str("server"),
        }
    }
}

/// A usable API key. `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential {
    key: String,
    pub source: CredentialSource,
}

impl ApiCredential {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("key", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Resolve the form's `apiKey` field into a credential.
///
/// * sentinel + server key present → server key
/// * sentinel + no server key → [`CmaError::MissingCredential`]
/// * any other non-blank value → that value, as the caller's key
/// * missing or blank → [`CmaError::MissingCredential`]
pub fn resolve_credential(
    api_key: Option<&str>,
    server_api_key: Option<&str>,
) -> Result<ApiCredential, CmaError> {
    let api_key = api_key.map(str::trim).filter(|k| !k.is_empty());

    match api_key {
        Some(SERVER_KEY_SENTINEL) => server_api_key
            .filter(|k| !k.trim().is_empty())
            .map(|k| ApiCredential {
                key: k.to_string(),
                source: CredentialSource::Server,
            })
            .ok_or(CmaError::MissingCredential),
        Some(key) => Ok(ApiCredential {
            key: key.to_string(),
            source: CredentialSource::Caller,
        }),
        None => Err(CmaError::MissingCredential),
    }
}
