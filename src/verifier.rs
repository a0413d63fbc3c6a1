//! Verification orchestrator: turns a transaction proof into a verified
//! payment by interrogating a pool of wallet RPC nodes.
//!
//! Nodes are tried strictly in priority order, one at a time, skipping any
//! whose circuit breaker is open. Each node gets a bounded retry loop that
//! distinguishes "the transaction has not propagated yet" from every other
//! failure, because the former deserves a patient fixed wait while the
//! latter gets exponential backoff. The distinction also survives to the
//! caller: when every attempted node ended in a propagation-lag failure the
//! final error is [`PaywallError::NotYetConfirmed`], which clients may
//! retry, instead of the deliberately opaque generic failure.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::breaker::BreakerRegistry;
use crate::errors::{PaywallError, Result};
use crate::rpc::WalletRpcClient;
use crate::types::VerifiedPayment;
use crate::validate::{amounts_match, validate_proof_inputs, xmr_to_atomic};

/// Known wallet RPC phrasings for a transaction that is not yet visible on
/// the node's ledger view. Matched case-insensitively by substring.
const NOT_FOUND_PATTERNS: &[&str] = &[
    "transaction not found",
    "tx not found",
    "not found in blockchain",
    "failed to get transaction from daemon",
];

/// Configuration for the verification orchestrator.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Candidate wallet RPC node base URLs; list order is priority order
    pub nodes: Vec<String>,

    /// Daemon address each wallet is re-pointed to before a proof check.
    /// When unset the warm-up reset step is skipped.
    pub daemon_address: Option<String>,

    /// Per-RPC-call timeout
    pub rpc_timeout: Duration,

    /// Retry budget per node
    pub max_attempts: u32,

    /// Fixed wait after the daemon reset, letting it take effect
    pub settle_interval: Duration,

    /// Fixed wait after a "not yet visible" failure, sized to typical
    /// ledger propagation latency
    pub propagation_wait: Duration,

    /// Base delay for exponential backoff on other failures
    pub backoff_base: Duration,

    /// Multiplier applied per attempt
    pub backoff_factor: f64,

    /// Upper bound on a single backoff delay
    pub backoff_cap: Duration,
}

impl VerifierConfig {
    /// Creates a configuration with production timing for the given nodes.
    ///
    /// # Examples
    ///
    /// ```
    /// use xmr_paywall::verifier::VerifierConfig;
    ///
    /// let config = VerifierConfig::new(vec![
    ///     "http://wallet-1:18082".to_string(),
    ///     "http://wallet-2:18082".to_string(),
    /// ]);
    /// assert_eq!(config.max_attempts, 5);
    /// ```
    pub fn new(nodes: Vec<String>) -> Self {
        Self {
            nodes,
            daemon_address: None,
            rpc_timeout: Duration::from_secs(30),
            max_attempts: 5,
            settle_interval: Duration::from_millis(300),
            propagation_wait: Duration::from_secs(5),
            backoff_base: Duration::from_secs(3),
            backoff_factor: 1.5,
            backoff_cap: Duration::from_secs(15),
        }
    }

    /// Sets the daemon address used by the warm-up reset step.
    pub fn with_daemon(mut self, daemon_address: impl Into<String>) -> Self {
        self.daemon_address = Some(daemon_address.into());
        self
    }

    /// Sets the per-call RPC timeout.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Sets the per-node retry budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Overrides all waiting intervals. Intended for tests.
    pub fn with_intervals(
        mut self,
        settle: Duration,
        propagation: Duration,
        backoff_base: Duration,
        backoff_cap: Duration,
    ) -> Self {
        self.settle_interval = settle;
        self.propagation_wait = propagation;
        self.backoff_base = backoff_base;
        self.backoff_cap = backoff_cap;
        self
    }
}

/// Seam between the store and the ledger. The store only ever sees this
/// trait, so tests can count and script verifications.
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    /// Verifies that `txid`, opened with `tx_key`, paid `expected_xmr` to
    /// `address`.
    async fn verify(
        &self,
        txid: &str,
        tx_key: &str,
        address: &str,
        expected_xmr: f64,
    ) -> Result<VerifiedPayment>;
}

/// Outcome of one node's full retry loop.
enum NodeOutcome {
    Verified(VerifiedPayment),
    /// Every attempt failed with a propagation-lag pattern
    NotYetConfirmed,
    Failed(String),
}

/// Production orchestrator backed by the wallet RPC pool.
pub struct TransactionVerifier {
    config: VerifierConfig,
    rpc: WalletRpcClient,
    breakers: BreakerRegistry,
}

impl TransactionVerifier {
    /// Creates an orchestrator with a fresh breaker registry.
    pub fn new(config: VerifierConfig) -> Self {
        let rpc = WalletRpcClient::new().with_timeout(config.rpc_timeout);
        Self {
            config,
            rpc,
            breakers: BreakerRegistry::new(),
        }
    }

    /// Creates an orchestrator with an injected breaker registry, so breaker
    /// state can be shared or pre-seeded.
    pub fn with_breakers(config: VerifierConfig, breakers: BreakerRegistry) -> Self {
        let rpc = WalletRpcClient::new().with_timeout(config.rpc_timeout);
        Self {
            config,
            rpc,
            breakers,
        }
    }

    /// Read access to the breaker registry, for diagnostics.
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Runs the bounded retry loop against one node.
    ///
    /// Each attempt performs the fixed warm-up sequence: best-effort daemon
    /// reset, settle wait, liveness probe, proof check. A failed liveness
    /// probe abandons the node immediately: retrying a node that cannot
    /// even report its height wastes the attempt budget.
    async fn attempt_node(
        &self,
        node: &str,
        txid: &str,
        tx_key: &str,
        address: &str,
        expected_atomic: u64,
    ) -> NodeOutcome {
        let mut all_not_found = true;
        let mut last_error = String::new();

        for attempt in 0..self.config.max_attempts {
            if let Some(daemon) = &self.config.daemon_address {
                if let Err(e) = self.rpc.set_daemon(node, daemon).await {
                    debug!(node, error = %e, "daemon reset failed, continuing");
                }
            }

            tokio::time::sleep(self.config.settle_interval).await;

            if let Err(e) = self.rpc.get_height(node).await {
                debug!(node, error = %e, "liveness probe failed");
                return NodeOutcome::Failed(format!("liveness probe failed: {e}"));
            }

            match self.rpc.check_tx_key(node, txid, tx_key, address).await {
                Ok(proof) => {
                    if proof.received == 0 || !amounts_match(proof.received, expected_atomic) {
                        return NodeOutcome::Failed(format!(
                            "received amount {} does not match expected {}",
                            proof.received, expected_atomic
                        ));
                    }
                    return NodeOutcome::Verified(VerifiedPayment {
                        amount_atomic: proof.received,
                        confirmations: proof.confirmations,
                        in_pool: proof.in_pool,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    let not_found = is_not_found_error(&message);
                    all_not_found &= not_found;
                    last_error = message;

                    if attempt + 1 < self.config.max_attempts {
                        let wait = if not_found {
                            self.config.propagation_wait
                        } else {
                            backoff_delay(
                                self.config.backoff_base,
                                self.config.backoff_factor,
                                self.config.backoff_cap,
                                attempt,
                            )
                        };
                        debug!(
                            node,
                            attempt,
                            not_found,
                            wait_ms = wait.as_millis() as u64,
                            "proof check failed, retrying"
                        );
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        if all_not_found {
            NodeOutcome::NotYetConfirmed
        } else {
            NodeOutcome::Failed(last_error)
        }
    }
}

#[async_trait]
impl ProofVerifier for TransactionVerifier {
    async fn verify(
        &self,
        txid: &str,
        tx_key: &str,
        address: &str,
        expected_xmr: f64,
    ) -> Result<VerifiedPayment> {
        validate_proof_inputs(txid, tx_key, address, expected_xmr)?;
        let expected_atomic = xmr_to_atomic(expected_xmr);

        let mut attempted_any = false;
        let mut all_not_yet = true;

        for node in &self.config.nodes {
            if !self.breakers.is_available(node) {
                debug!(node = %node, "skipping node with open circuit");
                continue;
            }
            attempted_any = true;

            match self
                .attempt_node(node, txid, tx_key, address, expected_atomic)
                .await
            {
                NodeOutcome::Verified(payment) => {
                    self.breakers.record_success(node);
                    debug!(
                        node = %node,
                        confirmations = payment.confirmations,
                        in_pool = payment.in_pool,
                        "payment verified"
                    );
                    return Ok(payment);
                }
                NodeOutcome::NotYetConfirmed => {
                    self.breakers.record_failure(node);
                    debug!(node = %node, "transaction not yet visible on node");
                }
                NodeOutcome::Failed(reason) => {
                    self.breakers.record_failure(node);
                    all_not_yet = false;
                    // Full reason stays in the log; callers get the
                    // generic failure with no node detail.
                    warn!(node = %node, reason = %reason, "node verification attempt failed");
                }
            }
        }

        if attempted_any && all_not_yet {
            Err(PaywallError::NotYetConfirmed)
        } else {
            Err(PaywallError::VerificationFailed(
                "payment could not be verified - check the transaction details and try again"
                    .to_string(),
            ))
        }
    }
}

/// Returns true if a wallet RPC error message matches a known "transaction
/// not yet visible" phrasing.
fn is_not_found_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Exponential backoff delay for attempt `attempt` (zero-based).
fn backoff_delay(base: Duration, factor: f64, cap: Duration, attempt: u32) -> Duration {
    let delay = base.as_secs_f64() * factor.powi(attempt as i32);
    Duration::from_secs_f64(delay.min(cap.as_secs_f64()))
}
