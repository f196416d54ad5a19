//! RS512 bearer tokens binding a client to its seat.

use std::env;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable `iss` claim of every token.
pub const ISSUER: &str = "rileythomp/jeopardy";
const LIFETIME_SECS: u64 = 24 * 60 * 60;
const PRIVATE_KEY_ENV: &str = "JWT_RS512_KEY";
const PUBLIC_KEY_ENV: &str = "JWT_RS512_PUB_KEY";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("environment variable {0} is not set")]
    MissingKey(&'static str),
    #[error("invalid key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    iat: u64,
    exp: u64,
}

/// Signs and verifies player tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    /// Load the PEM key pair from `JWT_RS512_KEY` / `JWT_RS512_PUB_KEY`.
    pub fn from_env() -> Result<Self, TokenError> {
        let private = env::var(PRIVATE_KEY_ENV).map_err(|_| TokenError::MissingKey(PRIVATE_KEY_ENV))?;
        let public = env::var(PUBLIC_KEY_ENV).map_err(|_| TokenError::MissingKey(PUBLIC_KEY_ENV))?;
        // Deployments often store the PEM on one line with escaped newlines.
        Self::from_pem(&private.replace("\\n", "\n"), &public.replace("\\n", "\n"))
    }

    pub fn from_pem(private: &str, public: &str) -> Result<Self, TokenError> {
        let encoding = EncodingKey::from_rsa_pem(private.as_bytes()).map_err(TokenError::InvalidKey)?;
        let decoding = DecodingKey::from_rsa_pem(public.as_bytes()).map_err(TokenError::InvalidKey)?;
        let mut validation = Validation::new(Algorithm::RS512);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        Ok(Self {
            encoding,
            decoding,
            validation,
        })
    }

    /// Token for `player_id`, valid for a day.
    pub fn issue(&self, player_id: &str) -> Result<String, TokenError> {
        self.issue_at(player_id, get_current_timestamp())
    }

    fn issue_at(&self, player_id: &str, now: u64) -> Result<String, TokenError> {
        let claims = Claims {
            sub: player_id.to_string(),
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS512), &claims, &self.encoding).map_err(TokenError::Sign)
    }

    /// Player id carried by a valid token.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(TokenError::Invalid)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::TokenService;

    pub fn tokens() -> TokenService {
        TokenService::from_pem(
            include_str!("testdata/token_private.pem"),
            include_str!("testdata/token_public.pem"),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::{fixtures::tokens, *};

    #[test]
    fn issued_tokens_carry_the_player() {
        let tokens = tokens();
        let token = tokens.issue("player-1").unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), "player-1");
    }

    #[test]
    fn expired_and_tampered_tokens_are_rejected() {
        let tokens = tokens();
        let expired = tokens
            .issue_at("player-1", get_current_timestamp() - 2 * LIFETIME_SECS)
            .unwrap();
        assert!(matches!(tokens.verify(&expired), Err(TokenError::Invalid(_))));

        let mut tampered = tokens.issue("player-1").unwrap();
        tampered.push('x');
        assert!(tokens.verify(&tampered).is_err());
        assert!(tokens.verify("not-a-token").is_err());
    }

    #[test]
    fn garbage_keys_are_refused() {
        assert!(matches!(
            TokenService::from_pem("nope", "nope"),
            Err(TokenError::InvalidKey(_))
        ));
    }
}
