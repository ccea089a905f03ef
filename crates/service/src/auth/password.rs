//! Adaptive password hashing and the password strength policy.

use argon2::{password_hash::{PasswordHasher as _, PasswordVerifier, SaltString}, Argon2, PasswordHash};
use configs::auth::{AuthSettings, PasswordAlgorithm, PasswordPolicySettings};
use rand::rngs::OsRng;

use super::errors::AuthError;

/// Upper bound on accepted password length.
pub const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::from(&PasswordPolicySettings::default())
    }
}

impl From<&PasswordPolicySettings> for PasswordPolicy {
    fn from(s: &PasswordPolicySettings) -> Self {
        Self {
            min_length: s.min_length.max(8),
            require_uppercase: s.require_uppercase,
            require_lowercase: s.require_lowercase,
            require_digit: s.require_digit,
            require_special: s.require_special,
        }
    }
}

impl PasswordPolicy {
    /// Every rule the password breaks, in a stable order.
    pub fn violations(&self, password: &str) -> Vec<String> {
        let mut reasons = Vec::new();
        let len = password.chars().count();
        if len < self.min_length {
            reasons.push(format!("must be at least {} characters long", self.min_length));
        }
        if len > MAX_PASSWORD_LEN {
            reasons.push(format!("must be at most {MAX_PASSWORD_LEN} characters long"));
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            reasons.push("must contain an uppercase letter".to_string());
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            reasons.push("must contain a lowercase letter".to_string());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            reasons.push("must contain a digit".to_string());
        }
        if self.require_special && !password.chars().any(is_special) {
            reasons.push("must contain a special character".to_string());
        }
        reasons
    }
}

/// Printable, not a letter or digit, not whitespace.
fn is_special(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control()
}

/// Hashes and verifies passwords with bcrypt or argon2id.
///
/// # Examples
/// ```
/// use service::auth::password::{PasswordHasher, PasswordPolicy};
/// use configs::auth::PasswordAlgorithm;
/// let hasher = PasswordHasher::new(PasswordAlgorithm::Bcrypt, 4, PasswordPolicy::default()).unwrap();
/// let hash = hasher.hash("P@ssw0rd!").unwrap();
/// assert!(hasher.verify("P@ssw0rd!", &hash));
/// assert!(!hasher.verify("p@ssw0rd!", &hash));
/// assert!(hasher.check_strength("password123").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    algorithm: PasswordAlgorithm,
    cost: u32,
    policy: PasswordPolicy,
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(algorithm: PasswordAlgorithm, cost: u32, policy: PasswordPolicy) -> Result<Self, AuthError> {
        if algorithm == PasswordAlgorithm::Bcrypt && !(4..=31).contains(&cost) {
            return Err(AuthError::Validation(format!("bcrypt cost {cost} outside 4..=31")));
        }
        let mut hasher = Self { algorithm, cost, policy, dummy_hash: String::new() };
        let filler = common::crypto::generate_secure_token();
        hasher.dummy_hash = hasher.hash(&filler)?;
        Ok(hasher)
    }

    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        Self::new(settings.password_algorithm, settings.hash_cost, PasswordPolicy::from(&settings.password))
    }

    pub fn algorithm(&self) -> PasswordAlgorithm {
        self.algorithm
    }

    /// Salted one-way hash in modular-crypt (bcrypt) or PHC (argon2) format.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        match self.algorithm {
            PasswordAlgorithm::Bcrypt => {
                bcrypt::hash(password, self.cost).map_err(|e| AuthError::infra("bcrypt hash", e))
            }
            PasswordAlgorithm::Argon2 => {
                let salt = SaltString::generate(&mut OsRng);
                Argon2::default()
                    .hash_password(password.as_bytes(), &salt)
                    .map(|h| h.to_string())
                    .map_err(|e| AuthError::infra("argon2 hash", e))
            }
        }
    }

    /// Constant-time check. A hash that cannot be parsed still costs one full
    /// verification (against the dummy hash) and yields `false`.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match verify_known(password, hash) {
            Some(ok) => ok,
            None => {
                let _ = verify_known(password, &self.dummy_hash);
                false
            }
        }
    }

    /// Burn the same work as a real verification; used when no user matched.
    pub fn verify_dummy(&self, password: &str) {
        let _ = verify_known(password, &self.dummy_hash);
    }

    /// True when `hash` was produced by another algorithm or a weaker bcrypt cost.
    pub fn needs_rehash(&self, hash: &str) -> bool {
        match self.algorithm {
            PasswordAlgorithm::Bcrypt => match bcrypt_cost(hash) {
                Some(cost) => cost < self.cost,
                None => true,
            },
            PasswordAlgorithm::Argon2 => !hash.starts_with("$argon2"),
        }
    }

    pub fn check_strength(&self, password: &str) -> Result<(), AuthError> {
        let reasons = self.policy.violations(password);
        if reasons.is_empty() { Ok(()) } else { Err(AuthError::PasswordTooWeak(reasons)) }
    }
}

fn verify_known(password: &str, hash: &str) -> Option<bool> {
    if hash.starts_with("$2") {
        bcrypt::verify(password, hash).ok()
    } else if hash.starts_with("$argon2") {
        let parsed = PasswordHash::new(hash).ok()?;
        Some(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    } else {
        None
    }
}

fn bcrypt_cost(hash: &str) -> Option<u32> {
    if !hash.starts_with("$2") {
        return None;
    }
    hash.split('$').nth(2)?.parse().ok()
}
