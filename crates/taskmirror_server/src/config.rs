//! Server configuration.

/// Configuration for the reference sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum commands accepted in one request.
    pub max_commands: usize,
    /// Whether to require a bearer token.
    pub require_auth: bool,
    /// Secret key for signed token validation (if enabled).
    pub auth_secret: Option<Vec<u8>>,
    /// Tokens accepted verbatim.
    pub static_tokens: Vec<String>,
}

impl ServerConfig {
    /// Creates a configuration without authentication.
    pub fn new() -> Self {
        Self {
            max_commands: 100,
            require_auth: false,
            auth_secret: None,
            static_tokens: Vec::new(),
        }
    }

    /// Sets the maximum command batch size.
    pub fn with_max_commands(mut self, max: usize) -> Self {
        self.max_commands = max;
        self
    }

    /// Enables signed-token authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Accepts a fixed bearer token. Enables authentication.
    pub fn with_static_token(mut self, token: impl Into<String>) -> Self {
        self.require_auth = true;
        self.static_tokens.push(token.into());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_commands, 100);
        assert!(!config.require_auth);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_commands(5)
            .with_auth(vec![1, 2, 3, 4])
            .with_static_token("abc");

        assert_eq!(config.max_commands, 5);
        assert!(config.require_auth);
        assert_eq!(config.auth_secret, Some(vec![1, 2, 3, 4]));
        assert_eq!(config.static_tokens, vec!["abc".to_string()]);
    }
}
