//! Bearer token verification.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, Header, Validation};
use store::{Database, UserStore};

use crate::{AuthError, Claims, KeyLookup};

const BEARER_PREFIX: &str = "Bearer ";

/// Issues and verifies RS256 tokens, re-checking the account on every
/// verification.
pub struct Authenticator<D> {
    keys: Arc<dyn KeyLookup>,
    issuer: String,
    db: D,
}

impl<D: Clone> Clone for Authenticator<D> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
            issuer: self.issuer.clone(),
            db: self.db.clone(),
        }
    }
}

impl<D: Database> Authenticator<D> {
    pub fn new(keys: Arc<dyn KeyLookup>, issuer: impl Into<String>, db: D) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            db,
        }
    }

    /// Signs `claims` with the private key registered under `kid`.
    pub fn generate_token(&self, kid: &str, claims: &Claims) -> Result<String, AuthError> {
        let key = self.keys.private_key(kid)?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        Ok(jsonwebtoken::encode(&header, claims, key)?)
    }

    /// Verifies an `Authorization` header value and returns its claims.
    ///
    /// The token must carry the `Bearer ` prefix, a known `kid`, a valid
    /// RS256 signature, our issuer and an unexpired `exp`. The subject must
    /// still exist, be enabled and have a confirmed email.
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(&self, authorization: &str) -> Result<Claims, AuthError> {
        let result = self.verify(authorization).await;
        if let Err(e) = &result {
            metrics::counter!("auth_failures_total", "reason" => e.reason()).increment(1);
            tracing::warn!(error = %e, "authentication rejected");
        }
        result
    }

    async fn verify(&self, authorization: &str) -> Result<Claims, AuthError> {
        let token = authorization
            .strip_prefix(BEARER_PREFIX)
            .ok_or(AuthError::MissingBearer)?;

        let claims = self.verify_signature(token)?;
        let user_id = claims.subject()?;

        let mut session = self.db.session().await?;
        let user = session
            .user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.enabled {
            return Err(AuthError::UserDisabled);
        }
        if !user.email_confirmed() {
            return Err(AuthError::EmailUnconfirmed);
        }
        Ok(claims)
    }

    fn verify_signature(&self, token: &str) -> Result<Claims, AuthError> {
        let header = jsonwebtoken::decode_header(token)?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let key = self.keys.public_key(&kid)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(jsonwebtoken::decode::<Claims>(token, key, &validation)?.claims)
    }
}
