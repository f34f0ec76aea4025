//! Signing secret strength checks.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

const MIN_SECRET_LENGTH: usize = 32;
const RECOMMENDED_SECRET_LENGTH: usize = 64;

#[derive(Debug, PartialEq, Eq)]
pub enum SecretStrength {
    Weak,
    Acceptable,
    Strong,
}

/// Classify an HS256 signing secret.
///
/// Weak when shorter than 32 bytes, below 4 bits/byte of Shannon entropy, or
/// containing a run of four repeated or sequential bytes.
pub fn validate_secret_strength(secret: &str) -> SecretStrength {
    let bytes = secret.as_bytes();

    if bytes.len() < MIN_SECRET_LENGTH {
        return SecretStrength::Weak;
    }

    let entropy = shannon_entropy(bytes);
    if entropy < 4.0 || has_obvious_patterns(bytes) {
        return SecretStrength::Weak;
    }

    if bytes.len() >= RECOMMENDED_SECRET_LENGTH && entropy >= 5.0 {
        SecretStrength::Strong
    } else {
        SecretStrength::Acceptable
    }
}

fn shannon_entropy(data: &[u8]) -> f64 {
    let mut freq = [0u32; 256];
    let len = data.len() as f64;

    for &byte in data {
        freq[byte as usize] += 1;
    }

    freq.iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn has_obvious_patterns(data: &[u8]) -> bool {
    let mut same = 1;
    let mut seq = 1;
    for window in data.windows(2) {
        same = if window[0] == window[1] { same + 1 } else { 1 };
        seq = if window[1] as i16 - window[0] as i16 == 1 { seq + 1 } else { 1 };
        if same >= 4 || seq >= 4 {
            return true;
        }
    }
    false
}

/// Random per-process secret for development runs without `JWT__SECRET`.
pub fn generate_ephemeral_secret() -> String {
    let mut rng = rand::thread_rng();
    let mut buffer = [0u8; RECOMMENDED_SECRET_LENGTH];
    loop {
        rng.fill_bytes(&mut buffer);
        let secret = STANDARD.encode(buffer);
        // Random output can still contain a short run like "abcd"; draw again.
        if validate_secret_strength(&secret) == SecretStrength::Strong {
            return secret;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_secret_is_weak() {
        assert_eq!(validate_secret_strength("your-secret-key"), SecretStrength::Weak);
    }

    #[test]
    fn test_low_entropy_secret_is_weak() {
        assert_eq!(
            validate_secret_strength("abababababababababababababababab"),
            SecretStrength::Weak
        );
    }

    #[test]
    fn test_sequential_secret_is_weak() {
        assert_eq!(
            validate_secret_strength("abcdefghijklmnopqrstuvwxyzabcdef"),
            SecretStrength::Weak
        );
    }

    #[test]
    fn test_random_looking_secret_is_accepted() {
        let strength = validate_secret_strength("J8Kq2mPvRx4TnZs9YwLcGf7DhBe3Xa6W");
        assert_ne!(strength, SecretStrength::Weak);
    }

    #[test]
    fn test_generated_secret_is_strong() {
        let secret = generate_ephemeral_secret();
        assert_eq!(validate_secret_strength(&secret), SecretStrength::Strong);
    }
}
