//! Validators for operator input.

use std::fmt;
use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$")
        .expect("valid domain regex")
});

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

static NETWORK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]{0,62}$").expect("valid network regex")
});

/// Local test domains accepted without a public TLD.
pub const LOCAL_DOMAINS: &[&str] = &[
    "localhost",
    "portainer.localhost",
    "evolution.localhost",
    "chatwoot.localhost",
];

/// Characters that count as "special" in a password.
pub const PASSWORD_SPECIALS: &str = "!@#$%^&*()_+-=[]{};:,.<>?";

pub const MIN_PASSWORD_LEN: usize = 12;

pub fn validate_domain(domain: &str) -> bool {
    LOCAL_DOMAINS.contains(&domain) || DOMAIN_RE.is_match(domain)
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn validate_ip(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok()
}

/// Accepts decimal ports in `1..=65535`.
pub fn validate_port(port: &str) -> bool {
    port.parse::<u16>().map(|p| p != 0).unwrap_or(false)
}

/// Docker network names: alphanumeric start, then up to 62 of `[A-Za-z0-9_-]`.
pub fn validate_network_name(name: &str) -> bool {
    NETWORK_RE.is_match(name)
}

/// A rule a password fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordIssue {
    TooShort,
    NoUppercase,
    NoLowercase,
    NoDigit,
    NoSpecial,
}

impl fmt::Display for PasswordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordIssue::TooShort => {
                write!(f, "must be at least {MIN_PASSWORD_LEN} characters long")
            }
            PasswordIssue::NoUppercase => f.write_str("must contain an uppercase letter"),
            PasswordIssue::NoLowercase => f.write_str("must contain a lowercase letter"),
            PasswordIssue::NoDigit => f.write_str("must contain a digit"),
            PasswordIssue::NoSpecial => {
                write!(f, "must contain a special character ({PASSWORD_SPECIALS})")
            }
        }
    }
}

/// Every rule `password` fails; empty means the password is acceptable.
pub fn validate_password(password: &str) -> Vec<PasswordIssue> {
    let mut issues = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        issues.push(PasswordIssue::TooShort);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        issues.push(PasswordIssue::NoUppercase);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        issues.push(PasswordIssue::NoLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push(PasswordIssue::NoDigit);
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        issues.push(PasswordIssue::NoSpecial);
    }
    issues
}
