//! Core type definitions for the paywall engine.
//!
//! This module contains the durable record types (paywalls, purchases,
//! unlocks), the public-safe views returned to callers, and the wallet RPC
//! wire envelope.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validate::atomic_to_xmr;

/// How long a pending purchase remains claimable before the periodic sweep
/// removes it.
pub const PURCHASE_TTL_SECS: i64 = 3600;

/// A paywalled piece of content registered by a creator.
///
/// At most one record exists per `note_id`. The record is immutable after
/// creation except for the sales aggregates, which are updated on each
/// verified unlock, and deletion by the creator.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaywallRecord {
    /// Opaque content identifier
    #[serde(rename = "noteId")]
    pub note_id: String,

    /// Creator's identity key (64 hex chars)
    #[serde(rename = "creatorPubkey")]
    pub creator_pubkey: String,

    /// Monero address payments must be sent to
    #[serde(rename = "paymentAddress")]
    pub payment_address: String,

    /// Price in whole XMR
    #[serde(rename = "priceXmr")]
    pub price_xmr: f64,

    /// Content decryption key in its at-rest form (encrypted, or legacy
    /// plaintext for records that predate at-rest encryption)
    #[serde(rename = "decryptionKey")]
    pub decryption_key: String,

    /// Public teaser text shown before purchase
    pub preview: String,

    /// Optional inline ciphertext blob for the content itself
    #[serde(rename = "encryptedContent", skip_serializing_if = "Option::is_none")]
    pub encrypted_content: Option<String>,

    /// Creation timestamp
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Number of verified unlocks
    #[serde(rename = "totalSales")]
    pub total_sales: u64,

    /// Sum of verified received amounts, in atomic units. Kept as an
    /// integer so aggregate arithmetic is exact.
    #[serde(rename = "totalRevenueAtomic")]
    pub total_revenue_atomic: u64,
}

/// Status of a pending purchase.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    /// Created, awaiting payment proof
    Pending,
    /// Unlocked by a verified payment
    Completed,
}

/// A buyer's declared intent to purchase, created by `initiate_purchase`.
///
/// Purchases are optional scaffolding: an unlock can also proceed ad hoc
/// from the `note_id` alone. Pending purchases past `expires_at` are removed
/// by the periodic cleanup sweep.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PurchaseRecord {
    /// Random purchase token
    #[serde(rename = "purchaseId")]
    pub purchase_id: String,

    /// Content being purchased
    #[serde(rename = "noteId")]
    pub note_id: String,

    /// Buyer's identity key
    #[serde(rename = "buyerPubkey")]
    pub buyer_pubkey: String,

    /// Creator's identity key, denormalized from the paywall
    #[serde(rename = "creatorPubkey")]
    pub creator_pubkey: String,

    /// Payment address, denormalized from the paywall
    #[serde(rename = "paymentAddress")]
    pub payment_address: String,

    /// Price in whole XMR at purchase time
    #[serde(rename = "priceXmr")]
    pub price_xmr: f64,

    /// Current lifecycle state
    pub status: PurchaseStatus,

    /// Creation timestamp
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Expiry timestamp (created_at + 1 hour)
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,

    /// Transaction id of the completing payment, once verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,

    /// Completion timestamp
    #[serde(rename = "completedAt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PurchaseRecord {
    /// Returns true if this purchase is pending and past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PurchaseStatus::Pending && now > self.expires_at
    }

    /// Computes the expiry for a purchase created at `created_at`.
    pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::seconds(PURCHASE_TTL_SECS)
    }
}

/// Permanent record of a verified unlock, keyed by (note_id, buyer_pubkey).
///
/// Exactly zero or one record exists per composite key. Once created it is
/// the sole gate for re-fetching the decryption key without re-verification.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnlockRecord {
    /// Transaction id of the verified payment
    pub txid: String,

    /// Verified received amount in atomic units
    #[serde(rename = "amountAtomic")]
    pub amount_atomic: u64,

    /// Confirmation count at verification time
    pub confirmations: u64,

    /// When the unlock was granted
    #[serde(rename = "unlockedAt")]
    pub unlocked_at: DateTime<Utc>,
}

/// Public-safe view of a paywall: never carries the decryption key.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaywallInfo {
    /// Content identifier
    #[serde(rename = "noteId")]
    pub note_id: String,

    /// Creator's identity key
    #[serde(rename = "creatorPubkey")]
    pub creator_pubkey: String,

    /// Payment address
    #[serde(rename = "paymentAddress")]
    pub payment_address: String,

    /// Price in whole XMR
    #[serde(rename = "priceXmr")]
    pub price_xmr: f64,

    /// Public teaser text
    pub preview: String,

    /// Creation timestamp
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Number of verified unlocks
    #[serde(rename = "totalSales")]
    pub total_sales: u64,

    /// Total verified revenue in whole XMR (display value)
    #[serde(rename = "totalRevenueXmr")]
    pub total_revenue_xmr: f64,
}

impl From<&PaywallRecord> for PaywallInfo {
    fn from(record: &PaywallRecord) -> Self {
        Self {
            note_id: record.note_id.clone(),
            creator_pubkey: record.creator_pubkey.clone(),
            payment_address: record.payment_address.clone(),
            price_xmr: record.price_xmr,
            preview: record.preview.clone(),
            created_at: record.created_at,
            total_sales: record.total_sales,
            total_revenue_xmr: atomic_to_xmr(record.total_revenue_atomic),
        }
    }
}

/// Payment instructions returned by `initiate_purchase`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentInstructions {
    /// Purchase token to quote back on unlock
    #[serde(rename = "purchaseId")]
    pub purchase_id: String,

    /// Address to pay
    #[serde(rename = "paymentAddress")]
    pub payment_address: String,

    /// Amount to pay in whole XMR
    #[serde(rename = "priceXmr")]
    pub price_xmr: f64,

    /// When the pending purchase expires
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

/// Parameters for `verify_and_unlock`.
///
/// The target paywall is resolved from `purchase_id` when present, otherwise
/// from `note_id`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnlockRequest {
    /// Purchase token from `initiate_purchase`, if one was created
    #[serde(rename = "purchaseId", skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<String>,

    /// Content identifier for ad hoc unlocks
    #[serde(rename = "noteId", skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,

    /// Buyer's identity key
    #[serde(rename = "buyerPubkey")]
    pub buyer_pubkey: String,

    /// Transaction id of the payment
    pub txid: String,

    /// Transaction private key proving the payment
    #[serde(rename = "txKey")]
    pub tx_key: String,
}

/// Successful unlock result.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnlockResponse {
    /// Decrypted content decryption key
    #[serde(rename = "decryptionKey")]
    pub decryption_key: String,

    /// Verified received amount in atomic units
    #[serde(rename = "amountAtomic")]
    pub amount_atomic: u64,

    /// Confirmation count at verification time
    pub confirmations: u64,

    /// Whether the transaction was still in the pool when checked
    #[serde(rename = "inTxPool")]
    pub in_tx_pool: bool,

    /// True when the buyer already held an unlock and no ledger
    /// verification was performed
    #[serde(rename = "alreadyUnlocked")]
    pub already_unlocked: bool,
}

/// Outcome of a successful transaction-proof verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// Received amount in atomic units
    pub amount_atomic: u64,

    /// Confirmation count reported by the wallet
    pub confirmations: u64,

    /// Whether the transaction is still in the pool
    pub in_pool: bool,
}

/// JSON-RPC 2.0 request envelope posted to a wallet node's `/json_rpc`.
#[derive(Serialize, Debug, Clone)]
pub struct RpcRequest {
    /// Protocol version marker, always "2.0"
    pub jsonrpc: &'static str,

    /// Request identifier
    pub id: &'static str,

    /// Method name (e.g. "check_tx_key")
    pub method: String,

    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Builds a request envelope for `method` with optional `params`.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: "0",
            method: method.into(),
            params,
        }
    }
}

/// Protocol-level error surfaced by a wallet node.
#[derive(Deserialize, Debug, Clone)]
pub struct RpcErrorBody {
    /// Numeric error code
    pub code: i64,

    /// Human-readable message
    pub message: String,
}

/// JSON-RPC 2.0 response envelope.
#[derive(Deserialize, Debug, Clone)]
pub struct RpcResponse {
    /// Result payload, present on success
    pub result: Option<Value>,

    /// Error body, present on failure
    pub error: Option<RpcErrorBody>,
}

/// Result of a `check_tx_key` call. All fields are required; a response
/// missing any of them is a protocol error.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct ProofCheck {
    /// Amount received by the queried address, in atomic units
    pub received: u64,

    /// Number of confirmations the transaction has
    pub confirmations: u64,

    /// Whether the transaction is still in the pool
    pub in_pool: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rpc_request_serialization() {
        let req = RpcRequest::new("get_height", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"get_height\""));
        assert!(!json.contains("params"));

        let req = RpcRequest::new("check_tx_key", Some(json!({"txid": "ab"})));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"params\""));
    }

    #[test]
    fn test_rpc_response_deserialization() {
        let ok: RpcResponse =
            serde_json::from_str(r#"{"id":"0","jsonrpc":"2.0","result":{"height":123}}"#).unwrap();
        assert!(ok.result.is_some());
        assert!(ok.error.is_none());

        let err: RpcResponse = serde_json::from_str(
            r#"{"id":"0","jsonrpc":"2.0","error":{"code":-8,"message":"TX not found"}}"#,
        )
        .unwrap();
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().code, -8);
    }

    #[test]
    fn test_proof_check_requires_all_fields() {
        let full: ProofCheck = serde_json::from_value(json!({
            "received": 50000000000u64,
            "confirmations": 3,
            "in_pool": false
        }))
        .unwrap();
        assert_eq!(full.received, 50_000_000_000);
        assert!(!full.in_pool);

        // Missing in_pool must be a deserialization error, not a default.
        let missing =
            serde_json::from_value::<ProofCheck>(json!({"received": 1, "confirmations": 0}));
        assert!(missing.is_err());
    }

    #[test]
    fn test_purchase_expiry() {
        let now = Utc::now();
        let purchase = PurchaseRecord {
            purchase_id: "p1".to_string(),
            note_id: "n1".to_string(),
            buyer_pubkey: "b".repeat(64),
            creator_pubkey: "c".repeat(64),
            payment_address: "addr".to_string(),
            price_xmr: 0.1,
            status: PurchaseStatus::Pending,
            created_at: now,
            expires_at: PurchaseRecord::expiry_for(now),
            txid: None,
            completed_at: None,
        };

        assert!(!purchase.is_expired(now));
        assert!(purchase.is_expired(now + Duration::seconds(PURCHASE_TTL_SECS + 1)));

        // Completed purchases never expire.
        let mut done = purchase;
        done.status = PurchaseStatus::Completed;
        assert!(!done.is_expired(now + Duration::seconds(PURCHASE_TTL_SECS * 2)));
    }

    #[test]
    fn test_paywall_info_hides_key() {
        let record = PaywallRecord {
            note_id: "n1".to_string(),
            creator_pubkey: "c".repeat(64),
            payment_address: "addr".to_string(),
            price_xmr: 0.05,
            decryption_key: "enc:v1:secret".to_string(),
            preview: "teaser".to_string(),
            encrypted_content: Some("blob".to_string()),
            created_at: Utc::now(),
            total_sales: 2,
            total_revenue_atomic: 100_000_000_000,
        };

        let info = PaywallInfo::from(&record);
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("decryptionKey"));
        assert!((info.total_revenue_xmr - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_purchase_status_serialization() {
        assert_eq!(
            serde_json::to_string(&PurchaseStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&PurchaseStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
