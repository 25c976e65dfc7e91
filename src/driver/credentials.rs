use std::env;

use serde::{Deserialize, Serialize};

use crate::driver::error::{DriverError, DriverErrorKind, invalid_request};

/// Where a service credential comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialRef {
    Env {
        var: String,
    },
    InlineToken {
        token: String,
    },
    #[default]
    None,
}

/// Resolves the `Authorization` header value for `reference`, if one applies.
pub fn resolve_auth_header(
    reference: &CredentialRef,
    service: &str,
) -> Result<Option<String>, DriverError> {
    match reference {
        CredentialRef::Env { var } => {
            let token = env::var(var).map_err(|_| {
                DriverError::new(
                    DriverErrorKind::Authentication,
                    format!("missing credential environment variable {var} for {service}"),
                )
            })?;
            Ok(Some(format!("Bearer {token}")))
        }
        CredentialRef::InlineToken { token } => {
            if token.trim().is_empty() {
                return Err(invalid_request("inline credential token cannot be empty"));
            }
            Ok(Some(format!("Bearer {token}")))
        }
        CredentialRef::None => Ok(None),
    }
}
