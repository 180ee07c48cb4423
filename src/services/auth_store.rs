//! Pairing codes and bearer tokens
//!
//! One pairing code is live at a time. It rotates when read after its TTL and
//! right after a successful exchange, so each code can mint at most one token.
//! Tokens are opaque random strings with a fixed lifetime.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::config::defaults::PAIR_CODE_LENGTH;
use crate::errors::AuthError;
use crate::models::{PairingCodeResponse, TokenResponse};

/// Pairing code alphabet, without characters that read alike (0/O, 1/I)
const PAIR_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const TOKEN_BYTES: usize = 32;

struct PairCode {
    code: String,
    issued_at: Instant,
}

struct AuthState {
    pair_code: PairCode,
    tokens: HashMap<String, Instant>,
}

pub struct AuthStore {
    pair_code_ttl: Duration,
    token_ttl: Duration,
    state: Mutex<AuthState>,
}

impl AuthStore {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            pair_code_ttl: config.pair_code_ttl,
            token_ttl: config.token_ttl,
            state: Mutex::new(AuthState {
                pair_code: PairCode {
                    code: generate_pair_code(),
                    issued_at: Instant::now(),
                },
                tokens: HashMap::new(),
            }),
        }
    }

    pub fn pairing_code(&self) -> PairingCodeResponse {
        self.pairing_code_at(Instant::now())
    }

    /// Current pairing code, rotated first if it has outlived its TTL.
    pub fn pairing_code_at(&self, now: Instant) -> PairingCodeResponse {
        let mut state = self.lock();
        self.rotate_if_expired(&mut state, now);
        let age = now.saturating_duration_since(state.pair_code.issued_at);
        PairingCodeResponse {
            code: state.pair_code.code.clone(),
            expires_in: self.pair_code_ttl.saturating_sub(age).as_secs(),
        }
    }

    pub fn exchange(&self, code: &str) -> Result<TokenResponse, AuthError> {
        self.exchange_at(code, Instant::now())
    }

    /// Trade the live pairing code for a token. The code is spent either way it matches.
    pub fn exchange_at(&self, code: &str, now: Instant) -> Result<TokenResponse, AuthError> {
        let mut state = self.lock();
        if self.rotate_if_expired(&mut state, now) {
            return Err(AuthError::InvalidPairCode);
        }

        let candidate = code.trim().to_ascii_uppercase();
        if candidate.is_empty() || candidate != state.pair_code.code {
            debug!("Rejected pairing attempt");
            return Err(AuthError::InvalidPairCode);
        }

        state.pair_code = PairCode {
            code: generate_pair_code(),
            issued_at: now,
        };
        let token = generate_token();
        state.tokens.insert(token.clone(), now + self.token_ttl);
        info!(active_tokens = state.tokens.len(), "Issued access token");

        Ok(TokenResponse {
            token,
            expires_in: self.token_ttl.as_secs(),
        })
    }

    pub fn validate(&self, token: Option<&str>) -> Result<(), AuthError> {
        self.validate_at(token, Instant::now())
    }

    pub fn validate_at(&self, token: Option<&str>, now: Instant) -> Result<(), AuthError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let mut state = self.lock();
        match state.tokens.get(token) {
            Some(expires_at) if *expires_at > now => Ok(()),
            Some(_) => {
                state.tokens.remove(token);
                Err(AuthError::InvalidToken)
            }
            None => Err(AuthError::InvalidToken),
        }
    }

    /// Drop expired tokens and rotate a stale pairing code. Returns how many tokens went.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let before = state.tokens.len();
        state.tokens.retain(|_, expires_at| *expires_at > now);
        self.rotate_if_expired(&mut state, now);
        before - state.tokens.len()
    }

    pub fn token_count(&self) -> usize {
        self.lock().tokens.len()
    }

    fn rotate_if_expired(&self, state: &mut AuthState, now: Instant) -> bool {
        if now.saturating_duration_since(state.pair_code.issued_at) < self.pair_code_ttl {
            return false;
        }
        state.pair_code = PairCode {
            code: generate_pair_code(),
            issued_at: now,
        };
        info!(pair_code = %state.pair_code.code, "Rotated pairing code");
        true
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn generate_pair_code() -> String {
    let mut rng = rand::rng();
    (0..PAIR_CODE_LENGTH)
        .map(|_| PAIR_CODE_ALPHABET[rng.random_range(0..PAIR_CODE_ALPHABET.len())] as char)
        .collect()
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AuthStore {
        AuthStore::new(&AuthConfig {
            pair_code_ttl: Duration::from_secs(300),
            token_ttl: Duration::from_secs(600),
        })
    }

    #[test]
    fn pair_code_shape() {
        let code = store().pairing_code().code;
        assert_eq!(code.len(), PAIR_CODE_LENGTH);
        assert!(code.bytes().all(|b| PAIR_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn exchange_issues_token_and_spends_code() {
        let store = store();
        let now = Instant::now();
        let code = store.pairing_code_at(now).code;

        let token = store
            .exchange_at(&format!(" {} ", code.to_lowercase()), now)
            .unwrap();
        assert_eq!(token.expires_in, 600);
        assert!(store.validate_at(Some(&token.token), now).is_ok());

        // Replaying the same code fails because it rotated
        assert_eq!(
            store.exchange_at(&code, now).unwrap_err(),
            AuthError::InvalidPairCode
        );
        assert_ne!(store.pairing_code_at(now).code, code);
    }

    #[test]
    fn wrong_code_is_rejected_without_rotation() {
        let store = store();
        let now = Instant::now();
        let code = store.pairing_code_at(now).code;

        assert_eq!(
            store.exchange_at("", now).unwrap_err(),
            AuthError::InvalidPairCode
        );
        assert_eq!(store.pairing_code_at(now).code, code);
    }

    #[test]
    fn expired_code_rotates_on_read_and_fails_exchange() {
        let store = store();
        let now = Instant::now();
        let code = store.pairing_code_at(now).code;
        let later = now + Duration::from_secs(301);

        assert_eq!(
            store.exchange_at(&code, later).unwrap_err(),
            AuthError::InvalidPairCode
        );
        let fresh = store.pairing_code_at(later);
        assert_eq!(fresh.expires_in, 300);
    }

    #[test]
    fn tokens_expire() {
        let store = store();
        let now = Instant::now();
        let code = store.pairing_code_at(now).code;
        let token = store.exchange_at(&code, now).unwrap().token;

        let near = now + Duration::from_secs(599);
        assert!(store.validate_at(Some(&token), near).is_ok());

        let after = now + Duration::from_secs(601);
        assert_eq!(
            store.validate_at(Some(&token), after).unwrap_err(),
            AuthError::InvalidToken
        );
        assert_eq!(store.token_count(), 0);
    }

    #[test]
    fn missing_and_unknown_tokens() {
        let store = store();
        assert_eq!(store.validate(None).unwrap_err(), AuthError::MissingToken);
        assert_eq!(store.validate(Some("  ")).unwrap_err(), AuthError::MissingToken);
        assert_eq!(
            store.validate(Some("not-a-token")).unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn purge_drops_only_expired_tokens() {
        let store = store();
        let now = Instant::now();
        let first_code = store.pairing_code_at(now).code;
        store.exchange_at(&first_code, now).unwrap();

        let later = now + Duration::from_secs(200);
        let second_code = store.pairing_code_at(later).code;
        let kept = store.exchange_at(&second_code, later).unwrap().token;

        assert_eq!(store.purge_expired(now + Duration::from_secs(700)), 1);
        assert_eq!(store.token_count(), 1);
        assert!(
            store
                .validate_at(Some(&kept), now + Duration::from_secs(700))
                .is_ok()
        );
    }
}
