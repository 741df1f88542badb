//! Random secret generation for passwords, API keys and Rails secrets.

use rand::distributions::{Alphanumeric, Distribution, Uniform};
use rand::Rng;

const HEX_DIGITS: &[u8] = b"0123456789abcdef";

/// Default length of generated passwords and API keys.
pub const DEFAULT_SECRET_LEN: usize = 32;

/// Length of a Rails `SECRET_KEY_BASE` (64 random bytes, hex encoded).
pub const SECRET_KEY_BASE_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// `[A-Za-z0-9]`
    Alphanumeric,
    /// Lowercase hex digits.
    Hex,
}

/// Generate a random secret of `len` characters from `charset`.
pub fn generate_secret(len: usize, charset: Charset) -> String {
    generate_with(&mut rand::thread_rng(), len, charset)
}

fn generate_with<R: Rng + ?Sized>(rng: &mut R, len: usize, charset: Charset) -> String {
    match charset {
        Charset::Alphanumeric => Alphanumeric
            .sample_iter(rng)
            .take(len)
            .map(char::from)
            .collect(),
        Charset::Hex => {
            let digits = Uniform::from(0..HEX_DIGITS.len());
            (0..len)
                .map(|_| HEX_DIGITS[digits.sample(&mut *rng)] as char)
                .collect()
        }
    }
}

/// A 128-character hex secret for Chatwoot's `SECRET_KEY_BASE`.
pub fn secret_key_base() -> String {
    generate_secret(SECRET_KEY_BASE_LEN, Charset::Hex)
}

/// Show only the first `visible` characters of a secret.
pub fn mask(secret: &str, visible: usize) -> String {
    let shown: String = secret.chars().take(visible).collect();
    if shown.len() == secret.len() {
        return "*".repeat(secret.chars().count());
    }
    format!("{shown}...")
}
