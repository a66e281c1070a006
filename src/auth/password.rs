use std::str::FromStr;

use anyhow::anyhow;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};
use rand::Rng;

const MIN_LENGTH: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password12", "password123", "passw0rd", "12345678", "123456789",
    "1234567890", "11111111", "00000000", "qwerty123", "qwertyuiop", "iloveyou", "letmein1",
    "welcome1", "admin123", "abc12345", "sunshine", "football", "baseball", "trustno1",
    "princess", "dragon123", "monkey123", "superman", "starwars",
];

/// Strength checks applied to new passwords, and the hashing cost that goes
/// with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordPolicy {
    #[default]
    Strict,
    /// No strength checks and minimal Argon2 cost. For fixtures.
    Relaxed,
}

impl FromStr for PasswordPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "relaxed" => Ok(Self::Relaxed),
            other => Err(format!("unknown password policy {other:?}")),
        }
    }
}

impl PasswordPolicy {
    /// Every violated rule, in a stable order. Empty means acceptable.
    pub fn violations(self, password: &str, email: &str, handle: Option<&str>) -> Vec<String> {
        if self == Self::Relaxed {
            return Vec::new();
        }

        let mut violations = Vec::new();
        let lowered = password.to_lowercase();

        if password.chars().count() < MIN_LENGTH {
            violations.push(format!(
                "This password is too short. It must contain at least {MIN_LENGTH} characters."
            ));
        }
        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            violations.push("This password is entirely numeric.".to_owned());
        }
        if COMMON_PASSWORDS.contains(&lowered.as_str()) {
            violations.push("This password is too common.".to_owned());
        }

        let local_part = email.split('@').next().unwrap_or_default().to_lowercase();
        if local_part.len() >= 3 && lowered.contains(&local_part) {
            violations.push("The password is too similar to the email address.".to_owned());
        }
        if let Some(handle) = handle.map(str::to_lowercase) {
            if handle.len() >= 3 && lowered.contains(&handle) {
                violations.push("The password is too similar to the handle.".to_owned());
            }
        }

        violations
    }

    fn hasher(self) -> anyhow::Result<Argon2<'static>> {
        Ok(match self {
            Self::Strict => Argon2::default(),
            Self::Relaxed => {
                let params = Params::new(Params::MIN_M_COST, 1, 1, None).map_err(|e| anyhow!(e.to_string()))?;
                Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            }
        })
    }

    /// Argon2id PHC string for `password`.
    pub fn hash(self, password: &str) -> anyhow::Result<String> {
        let mut salt_bytes = [0u8; 16];
        rand::rng().fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let phc = self
            .hasher()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!(e.to_string()))?
            .to_string();
        Ok(phc)
    }
}

/// Parameters come from the PHC string, so this accepts hashes from either policy.
/// Anything that does not parse (like the placeholder author's `!`) never verifies.
pub fn verify(phc: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaxed_accepts_anything() {
        assert!(PasswordPolicy::Relaxed.violations("1", "a@b.co", None).is_empty());
    }

    #[test]
    fn strict_collects_every_violation() {
        let violations = PasswordPolicy::Strict.violations("1234", "a@b.co", None);
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("too short"));
        assert!(violations[1].contains("entirely numeric"));
    }

    #[test]
    fn strict_rejects_common_and_similar() {
        assert!(
            PasswordPolicy::Strict
                .violations("Password123", "x@example.com", None)
                .iter()
                .any(|v| v.contains("too common"))
        );
        assert!(
            PasswordPolicy::Strict
                .violations("goldfinch-rules", "goldfinch@example.com", None)
                .iter()
                .any(|v| v.contains("email"))
        );
        assert!(
            PasswordPolicy::Strict
                .violations("i-am-digger-42", "x@example.com", Some("Digger"))
                .iter()
                .any(|v| v.contains("handle"))
        );
        assert!(PasswordPolicy::Strict.violations("securepassword123", "test@example.com", Some("testuser")).is_empty());
    }

    #[test]
    fn hash_then_verify() {
        for policy in [PasswordPolicy::Relaxed, PasswordPolicy::Strict] {
            let phc = policy.hash("correct horse").unwrap();
            assert_ne!(phc, "correct horse");
            assert!(verify(&phc, "correct horse"));
            assert!(!verify(&phc, "battery staple"));
        }
        assert!(!verify("!", "anything"));
    }

    #[test]
    fn policy_parses() {
        assert_eq!("Relaxed".parse::<PasswordPolicy>().unwrap(), PasswordPolicy::Relaxed);
        assert_eq!("strict".parse::<PasswordPolicy>().unwrap(), PasswordPolicy::Strict);
        assert!("lenient".parse::<PasswordPolicy>().is_err());
    }
}
