//! Salted receipt tokens for verified payment proofs.
//!
//! A client that has had a proof checked may want to reference that check
//! later (for example in a support request) without re-exposing the raw
//! transaction key. The receipt token is a one-way hash over the proof pair
//! and an operator secret, so it cannot be forged or reversed by anyone
//! without the secret.

use sha3::{Digest, Sha3_256};

/// Derives a public, non-reversible receipt token for a checked proof.
///
/// # Examples
///
/// ```
/// use xmr_paywall::proof_hash::generate_proof_hash;
///
/// let token = generate_proof_hash("txid", "txkey", "operator secret");
/// assert_eq!(token.len(), 64);
/// ```
pub fn generate_proof_hash(txid: &str, tx_key: &str, secret: &str) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(txid.as_bytes());
    hasher.update(tx_key.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = generate_proof_hash("tx", "key", "secret");
        let b = generate_proof_hash("tx", "key", "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_secret_salts_the_hash() {
        let a = generate_proof_hash("tx", "key", "secret a");
        let b = generate_proof_hash("tx", "key", "secret b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_inputs_change_the_hash() {
        let base = generate_proof_hash("tx", "key", "secret");
        assert_ne!(generate_proof_hash("tx2", "key", "secret"), base);
        assert_ne!(generate_proof_hash("tx", "key2", "secret"), base);
    }
}
