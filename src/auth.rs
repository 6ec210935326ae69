// ABOUTME: HS256 JWT issuing and verification for tenant-bound identities
// ABOUTME: Claims carry subject, tenant, and role names; AuthManager validates signature, expiry, and issuer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tessera_core::models::{TenantId, UserId};
use tracing::debug;

use crate::config::environment::AuthConfig;
use crate::errors::{AppError, AppResult};

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Tenant the token was issued for
    pub tenant_id: String,
    /// Role names granted within that tenant
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issuer
    pub iss: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

/// Identity extracted from a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// User id from `sub`
    pub user_id: UserId,
    /// Tenant from the token, independent of any request header
    pub tenant_id: TenantId,
    /// Role names from the token
    pub roles: Vec<String>,
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AppError::auth_invalid("token subject is not a user id"))?;
        let tenant_id = TenantId::parse(&claims.tenant_id)
            .map_err(|_| AppError::auth_invalid("token tenant is malformed"))?;
        Ok(Self {
            user_id,
            tenant_id,
            roles: claims.roles,
        })
    }
}

/// Issues and verifies HS256 tokens
#[derive(Clone)]
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    expiry: Duration,
}

impl AuthManager {
    /// Build from configuration
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            expiry: Duration::hours(config.jwt_expiry_hours),
        }
    }

    /// Sign a token for `user_id` in `tenant_id` with the given role names
    ///
    /// # Errors
    ///
    /// Returns an internal error if signing fails
    pub fn generate_token(
        &self,
        user_id: UserId,
        tenant_id: &TenantId,
        roles: &[String],
    ) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            roles: roles.to_vec(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.expiry).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to sign token: {e}")))
    }

    /// Verify signature, expiry, and issuer and return the claims
    ///
    /// # Errors
    ///
    /// Returns an `AUTH_INVALID` error for any verification failure
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "token rejected");
                AppError::auth_invalid("invalid or expired token")
            })
    }

    /// Verify a token and convert it into an identity
    ///
    /// # Errors
    ///
    /// Returns an `AUTH_INVALID` error if the token or its claims are invalid
    pub fn authenticate(&self, token: &str) -> AppResult<AuthenticatedUser> {
        self.validate_token(token)?.try_into()
    }
}
