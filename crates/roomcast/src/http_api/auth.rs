//! Authentication is an out-of-scope external collaborator (spec.md
//! §1: "authentication token issue/verify... password hashing" are
//! not part of the core). This trait is the stub extension point
//! SPEC_FULL.md §A2 calls for; the core only ever calls `authenticate`
//! and never issues or verifies tokens itself.

use crate::error::{Error, Result};

pub trait Authenticator: Send + Sync {
    /// Validates a bearer token (or `None` if the request carried
    /// none), returning `Error::Unauthorized` to reject.
    fn authenticate(&self, token: Option<&str>) -> Result<()>;
}

/// Accepts every request. The development/test default; production
/// deployments inject a real `Authenticator` wired to
/// `AUTH_SECRET_KEY`/`PW_SECRET_KEY`/`ACCESS_TOKEN_EXPIRE`.
pub struct AllowAllAuthenticator;

impl Authenticator for AllowAllAuthenticator {
    fn authenticate(&self, _token: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// Rejects every request with no bearer token. Useful for exercising
/// the 401 path in tests without standing up real token issuance.
pub struct RequireBearerAuthenticator;

impl Authenticator for RequireBearerAuthenticator {
    fn authenticate(&self, token: Option<&str>) -> Result<()> {
        match token {
            Some(_) => Ok(()),
            None => Err(Error::Unauthorized),
        }
    }
}
