//! Syntactic validation of addresses, proofs, and amounts.
//!
//! Everything here is pure: a rejection means no network call is ever made.
//! Address checksums are not verified locally. The wallet RPC re-validates
//! the address during the proof check, so only the cheap shape checks live
//! here.

use crate::errors::{PaywallError, Result};

/// Atomic units per whole XMR (1 XMR = 10^12 piconero).
pub const ATOMIC_PER_XMR: u64 = 1_000_000_000_000;

/// Hard ceiling on any amount input, in whole XMR. Rejects overflow and
/// denial-of-service inputs before conversion.
pub const MAX_AMOUNT_XMR: f64 = 1_000_000_000.0;

/// Monero's base58 alphabet: no 0, O, I, or l.
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Standard address length (mainnet primary or subaddress).
const STANDARD_ADDRESS_LEN: usize = 95;

/// Integrated address length (payment id embedded).
const INTEGRATED_ADDRESS_LEN: usize = 106;

/// Validates the shape of a Monero address.
///
/// Accepts the standard 95-character form starting with `4` or `8`, or the
/// 106-character integrated form starting with `4`, with every character in
/// the base58 alphabet.
///
/// # Examples
///
/// ```
/// use xmr_paywall::validate::validate_address;
///
/// let addr = format!("4{}", "A".repeat(94));
/// assert!(validate_address(&addr).is_ok());
/// assert!(validate_address("short").is_err());
/// ```
pub fn validate_address(address: &str) -> Result<()> {
    let shape_ok = match address.len() {
        STANDARD_ADDRESS_LEN => address.starts_with('4') || address.starts_with('8'),
        INTEGRATED_ADDRESS_LEN => address.starts_with('4'),
        _ => false,
    };

    if !shape_ok {
        return Err(PaywallError::InvalidInput(
            "payment address has an invalid length or prefix".to_string(),
        ));
    }

    if !address.chars().all(|c| BASE58_ALPHABET.contains(c)) {
        return Err(PaywallError::InvalidInput(
            "payment address contains characters outside the base58 alphabet".to_string(),
        ));
    }

    Ok(())
}

/// Validates a transaction id: exactly 64 hex characters.
pub fn validate_txid(txid: &str) -> Result<()> {
    validate_hex64(txid, "transaction id")
}

/// Validates a transaction private key: exactly 64 hex characters.
pub fn validate_tx_key(tx_key: &str) -> Result<()> {
    validate_hex64(tx_key, "transaction key")
}

/// Validates an identity public key: exactly 64 hex characters.
pub fn validate_pubkey(pubkey: &str) -> Result<()> {
    validate_hex64(pubkey, "public key")
}

fn validate_hex64(value: &str, field: &str) -> Result<()> {
    if value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(PaywallError::InvalidInput(format!(
            "{field} must be exactly 64 hexadecimal characters"
        )))
    }
}

/// Largest amount whose atomic-unit form still fits in a `u64`.
const MAX_REPRESENTABLE_XMR: f64 = u64::MAX as f64 / ATOMIC_PER_XMR as f64;

/// Validates an XMR amount: finite, positive, below the hard ceiling, and
/// representable in atomic units without overflowing a `u64`.
pub fn validate_amount(amount_xmr: f64) -> Result<()> {
    if !amount_xmr.is_finite() || amount_xmr <= 0.0 {
        return Err(PaywallError::InvalidInput(
            "amount must be a finite positive number".to_string(),
        ));
    }
    if amount_xmr > MAX_AMOUNT_XMR {
        return Err(PaywallError::InvalidInput(
            "amount exceeds the maximum allowed value".to_string(),
        ));
    }
    if amount_xmr >= MAX_REPRESENTABLE_XMR {
        return Err(PaywallError::InvalidInput(
            "amount is too large to represent in atomic units".to_string(),
        ));
    }
    Ok(())
}

/// Converts a whole-XMR amount to atomic units, rounding to the nearest
/// atomic unit. The result feeds the exact integer comparison in
/// [`amounts_match`]; whole-unit floats are never compared directly.
/// Inputs are range-checked by [`validate_amount`] first, so the cast
/// cannot saturate.
///
/// # Examples
///
/// ```
/// use xmr_paywall::validate::xmr_to_atomic;
///
/// assert_eq!(xmr_to_atomic(0.05), 50_000_000_000);
/// assert_eq!(xmr_to_atomic(1.0), 1_000_000_000_000);
/// ```
pub fn xmr_to_atomic(amount_xmr: f64) -> u64 {
    (amount_xmr * ATOMIC_PER_XMR as f64).round() as u64
}

/// Converts atomic units back to whole XMR. Display only, never used for
/// amount comparison.
pub fn atomic_to_xmr(atomic: u64) -> f64 {
    atomic as f64 / ATOMIC_PER_XMR as f64
}

/// Exact amount comparison in atomic units, with a tolerance of one atomic
/// unit to absorb decimal-to-atomic rounding of the expected price.
///
/// # Examples
///
/// ```
/// use xmr_paywall::validate::amounts_match;
///
/// assert!(amounts_match(50_000_000_000, 50_000_000_000));
/// assert!(amounts_match(50_000_000_001, 50_000_000_000));
/// assert!(!amounts_match(49_999_999_998, 50_000_000_000));
/// ```
pub fn amounts_match(received_atomic: u64, expected_atomic: u64) -> bool {
    received_atomic.abs_diff(expected_atomic) <= 1
}

/// Runs the full proof-input validation: address, txid, tx key, and amount.
pub fn validate_proof_inputs(
    txid: &str,
    tx_key: &str,
    address: &str,
    expected_xmr: f64,
) -> Result<()> {
    validate_txid(txid)?;
    validate_tx_key(tx_key)?;
    validate_address(address)?;
    validate_amount(expected_xmr)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_address() -> String {
        format!("4{}", "A".repeat(94))
    }

    #[test]
    fn test_standard_address_accepted() {
        assert!(validate_address(&standard_address()).is_ok());
        assert!(validate_address(&format!("8{}", "B".repeat(94))).is_ok());
    }

    #[test]
    fn test_integrated_address_accepted() {
        assert!(validate_address(&format!("4{}", "C".repeat(105))).is_ok());
        // Integrated addresses never start with 8.
        assert!(validate_address(&format!("8{}", "C".repeat(105))).is_err());
    }

    #[test]
    fn test_address_rejections() {
        assert!(validate_address("").is_err());
        assert!(validate_address(&format!("4{}", "A".repeat(93))).is_err());
        assert!(validate_address(&format!("5{}", "A".repeat(94))).is_err());
        // 0, O, I, l are not in the alphabet.
        assert!(validate_address(&format!("4{}0", "A".repeat(93))).is_err());
        assert!(validate_address(&format!("4{}l", "A".repeat(93))).is_err());
    }

    #[test]
    fn test_txid_and_tx_key() {
        let valid = "a".repeat(64);
        assert!(validate_txid(&valid).is_ok());
        assert!(validate_tx_key(&valid).is_ok());

        assert!(validate_txid(&"a".repeat(63)).is_err());
        assert!(validate_txid(&"a".repeat(65)).is_err());
        assert!(validate_txid(&format!("{}g", "a".repeat(63))).is_err());
    }

    #[test]
    fn test_amount_bounds() {
        assert!(validate_amount(0.05).is_ok());
        assert!(validate_amount(0.000000000001).is_ok());
        assert!(validate_amount(0.0).is_err());
        assert!(validate_amount(-1.0).is_err());
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
        assert!(validate_amount(1_000_000_001.0).is_err());
    }

    #[test]
    fn test_amount_must_fit_in_atomic_units() {
        // u64::MAX atomic units is roughly 18.4M XMR; anything above that
        // would silently clamp in the conversion, so it is rejected even
        // though it is under the 1 billion ceiling.
        assert!(validate_amount(18_000_000.0).is_ok());
        assert!(validate_amount(20_000_000.0).is_err());
        assert!(validate_amount(999_999_999.0).is_err());
    }

    #[test]
    fn test_atomic_conversion() {
        assert_eq!(xmr_to_atomic(0.05), 50_000_000_000);
        assert_eq!(xmr_to_atomic(1.0), ATOMIC_PER_XMR);
        // One atomic unit survives the round trip despite the f64 input.
        assert_eq!(xmr_to_atomic(0.000000000001), 1);
        assert_eq!(atomic_to_xmr(50_000_000_000), 0.05);
    }

    #[test]
    fn test_amounts_match_tolerance() {
        let expected = xmr_to_atomic(0.05);
        assert!(amounts_match(expected, expected));
        assert!(amounts_match(expected + 1, expected));
        assert!(amounts_match(expected - 1, expected));
        assert!(!amounts_match(expected + 2, expected));
        assert!(!amounts_match(expected - 2, expected));
        // Zero received vs a one-atomic-unit price falls within this
        // tolerance; the orchestrator rejects zero-received payments
        // before comparing amounts.
        assert!(amounts_match(0, 1));
    }

    #[test]
    fn test_validate_proof_inputs() {
        let txid = "a".repeat(64);
        let tx_key = "b".repeat(64);
        assert!(validate_proof_inputs(&txid, &tx_key, &standard_address(), 0.05).is_ok());
        assert!(validate_proof_inputs("bad", &tx_key, &standard_address(), 0.05).is_err());
        assert!(validate_proof_inputs(&txid, &tx_key, "bad", 0.05).is_err());
        assert!(validate_proof_inputs(&txid, &tx_key, &standard_address(), 0.0).is_err());
    }
}
