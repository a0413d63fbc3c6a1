//! # xmr-paywall
//!
//! A non-custodial payment verification and content unlock engine for
//! creator paywalls priced in Monero.
//!
//! A creator registers a piece of encrypted content with a price and a
//! payment address. A buyer pays the creator directly on-chain, then proves
//! the payment with the transaction id and transaction private key; the
//! engine checks the proof against a pool of wallet RPC nodes and releases
//! the content decryption key exactly once per (content, buyer) pair. The
//! service never holds or moves funds.
//!
//! ## Features
//!
//! - **Proof verification**: `check_tx_key`-based verification across
//!   multiple wallet RPC nodes with per-node circuit breakers and
//!   propagation-aware retries
//! - **Exact amounts**: all comparisons happen in integer atomic units
//!   (10^12 per XMR), never in floating point
//! - **Idempotent unlocks**: a buyer who already unlocked gets the key back
//!   without re-verification, and sales aggregates count each unlock once
//! - **Keys encrypted at rest**: stored decryption keys are sealed with
//!   AES-256-GCM under a PBKDF2-derived operator key
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xmr_paywall::cipher::KeyCipher;
//! use xmr_paywall::store::PaywallStore;
//! use xmr_paywall::verifier::{TransactionVerifier, VerifierConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = TransactionVerifier::new(
//!     VerifierConfig::new(vec!["http://wallet-rpc:18082".to_string()])
//!         .with_daemon("http://monerod:18081"),
//! );
//! let cipher = KeyCipher::new("operator secret")?;
//! let store = PaywallStore::new(Arc::new(verifier), cipher);
//!
//! let address = format!("4{}", "A".repeat(94));
//! store
//!     .create_paywall(
//!         "note-1",
//!         "c".repeat(64),
//!         address,
//!         0.05,
//!         "base64-content-key",
//!         "public teaser",
//!         None,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Verification flow
//!
//! 1. **Validate**: address, transaction id, transaction key, and amount are
//!    checked syntactically; malformed input never reaches the network
//! 2. **Select a node**: candidates are tried in priority order, skipping
//!    any whose circuit breaker is open
//! 3. **Warm up and check**: each attempt re-points the wallet at its
//!    daemon, waits for the link to settle, probes liveness, then runs the
//!    proof check
//! 4. **Classify**: "transaction not found" responses wait out propagation
//!    lag and retry; other failures back off exponentially; a transaction
//!    invisible everywhere surfaces as a distinct retryable error
//! 5. **Release**: the store persists the unlock and hands out the key,
//!    exactly once per buyer
//!
//! ## Security
//!
//! - **Non-custodial**: payments flow directly from buyer to creator;
//!   the engine only verifies that a transfer happened
//! - **No topology leaks**: callers see a small stable error vocabulary;
//!   node addresses and per-node failures stay in the logs
//! - **At-rest encryption**: decryption keys are never stored in the clear
//!   unless an operator explicitly opts out

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod breaker;
pub mod cipher;
pub mod errors;
pub mod proof_hash;
pub mod rpc;
pub mod store;
pub mod types;
pub mod validate;
pub mod verifier;

// Re-export commonly used items
pub use breaker::{BreakerRegistry, BreakerSettings, CircuitPhase};
pub use cipher::KeyCipher;
pub use errors::{PaywallError, Result};
pub use proof_hash::generate_proof_hash;
pub use store::PaywallStore;
pub use types::{
    PaymentInstructions, PaywallInfo, PaywallRecord, PurchaseRecord, PurchaseStatus, UnlockRecord,
    UnlockRequest, UnlockResponse, VerifiedPayment,
};
pub use verifier::{ProofVerifier, TransactionVerifier, VerifierConfig};
