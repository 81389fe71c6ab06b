//! Bearer token authentication for the sync server.
//!
//! Signed tokens use HMAC-SHA256 over the user name.
//!
//! ## Token Format
//!
//! `{user}.{signature}` where the signature is the lowercase hex
//! HMAC-SHA256 of `user` under the server secret.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }
}

/// Validator for signed bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues a token for a user.
    pub fn create_token(&self, user: &str) -> String {
        let signature: String = self
            .mac(user.as_bytes())
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("{user}.{signature}")
    }

    /// Validates a token and returns the user it was issued to.
    pub fn validate_token(&self, token: &str) -> ServerResult<String> {
        let (user, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| ServerError::NotAuthorized("malformed token".into()))?;

        let signature = decode_hex(signature)
            .ok_or_else(|| ServerError::NotAuthorized("malformed signature".into()))?;

        self.mac(user.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        Ok(user.to_string())
    }

    fn mac(&self, data: &[u8]) -> HmacSha256 {
        // Any key length is valid for HMAC.
        let mut mac = HmacSha256::new_from_slice(&self.config.secret)
            .unwrap_or_else(|_| unreachable!("HMAC can take key of any size"));
        mac.update(data);
        mac
    }
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Validator that accepts a fixed set of tokens.
/// Useful for testing.
#[derive(Clone)]
pub struct SimpleTokenValidator {
    tokens: Vec<String>,
}

impl SimpleTokenValidator {
    /// Creates a validator for the given tokens.
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// Validates that the token is one of the accepted tokens.
    pub fn validate(&self, token: &str) -> ServerResult<()> {
        if self.tokens.iter().any(|t| constant_time_eq(t.as_bytes(), token.as_bytes())) {
            Ok(())
        } else {
            Err(ServerError::NotAuthorized("invalid token".into()))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Combined authenticator used by the request handler.
#[derive(Clone)]
pub(crate) struct Authenticator {
    signed: Option<TokenValidator>,
    fixed: SimpleTokenValidator,
    required: bool,
}

impl Authenticator {
    pub(crate) fn new(required: bool, secret: Option<Vec<u8>>, tokens: Vec<String>) -> Self {
        Self {
            signed: secret.map(|s| TokenValidator::new(AuthConfig::new(s))),
            fixed: SimpleTokenValidator::new(tokens),
            required,
        }
    }

    /// Checks a bearer token.
    pub(crate) fn check(&self, bearer: &str) -> ServerResult<()> {
        if !self.required {
            return Ok(());
        }
        if bearer.is_empty() {
            return Err(ServerError::NotAuthorized("missing bearer token".into()));
        }
        if self.fixed.validate(bearer).is_ok() {
            return Ok(());
        }
        match &self.signed {
            Some(validator) => validator.validate_token(bearer).map(|_| ()),
            None => Err(ServerError::NotAuthorized("invalid token".into())),
        }
    }
}
