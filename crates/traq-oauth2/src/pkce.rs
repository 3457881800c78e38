//! Proof Key for Code Exchange.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use traq_types::CodeChallengeMethod;

/// Code verifiers and challenges: 43-128 unreserved characters.
pub static PKCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9~._-]{43,128}$").expect("Invalid regex"));

/// `base64url(SHA-256(verifier))` without padding.
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Check a verifier against the challenge recorded with an authorization
/// code. A code issued without a challenge only accepts an empty verifier.
/// A missing method means `plain`.
pub fn verify(challenge: &str, method: Option<CodeChallengeMethod>, verifier: &str) -> bool {
    if verifier.is_empty() {
        return challenge.is_empty();
    }
    if !PKCE_REGEX.is_match(verifier) {
        return false;
    }
    match method.unwrap_or(CodeChallengeMethod::Plain) {
        CodeChallengeMethod::Plain => verifier == challenge,
        CodeChallengeMethod::S256 => s256_challenge(verifier) == challenge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rfc7636_vector() {
        assert_eq!(
            s256_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r7wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_verify() {
        let verifier = "abc".repeat(15);
        let challenge = s256_challenge(&verifier);
        assert!(verify(&challenge, Some(CodeChallengeMethod::S256), &verifier));
        assert!(!verify(&challenge, Some(CodeChallengeMethod::S256), &"abd".repeat(15)));
        assert!(verify(&verifier, None, &verifier));
        assert!(verify("", None, ""));
        assert!(!verify(&challenge, Some(CodeChallengeMethod::S256), ""));
        assert!(!verify("short", None, "short"));
    }

    proptest! {
        #[test]
        fn prop_s256_accepts_only_its_verifier(
            v in "[a-zA-Z0-9~._-]{43,128}",
            w in "[a-zA-Z0-9~._-]{43,128}",
        ) {
            let challenge = s256_challenge(&v);
            prop_assert!(verify(&challenge, Some(CodeChallengeMethod::S256), &v));
            prop_assert_eq!(verify(&challenge, Some(CodeChallengeMethod::S256), &w), v == w);
        }
    }
}
