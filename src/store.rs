//! Paywall and purchase store: the unlock state machine.
//!
//! The store owns the durable records (paywalls, pending purchases,
//! unlocks) and turns a verified payment into a one-time key release. The
//! ledger is only ever reached through the injected [`ProofVerifier`] seam,
//! so the store itself performs no retries: a failed unlock leaves every
//! record untouched and is safe for the caller to repeat.
//!
//! The already-unlocked check and the unlock write are a single
//! insert-if-absent under one write lock. Two racing unlock calls for the
//! same (note, buyer) pair may both pay the cost of verification, but only
//! one of them creates the unlock record and bumps the sales aggregates;
//! the loser is answered as an idempotent repeat.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cipher::KeyCipher;
use crate::errors::{PaywallError, Result};
use crate::types::{
    PaymentInstructions, PaywallInfo, PaywallRecord, PurchaseRecord, PurchaseStatus,
    UnlockRecord, UnlockRequest, UnlockResponse,
};
use crate::validate::{validate_address, validate_amount, validate_pubkey, validate_tx_key,
    validate_txid};
use crate::verifier::ProofVerifier;

/// Composite key for unlock records.
type UnlockKey = (String, String);

/// Durable state plus the unlock state machine.
pub struct PaywallStore {
    paywalls: RwLock<HashMap<String, PaywallRecord>>,
    purchases: RwLock<HashMap<String, PurchaseRecord>>,
    unlocks: RwLock<HashMap<UnlockKey, UnlockRecord>>,
    verifier: Arc<dyn ProofVerifier>,
    cipher: KeyCipher,
}

impl PaywallStore {
    /// Creates an empty store backed by the given verifier and cipher.
    pub fn new(verifier: Arc<dyn ProofVerifier>, cipher: KeyCipher) -> Self {
        Self {
            paywalls: RwLock::new(HashMap::new()),
            purchases: RwLock::new(HashMap::new()),
            unlocks: RwLock::new(HashMap::new()),
            verifier,
            cipher,
        }
    }

    /// Registers a paywall for a note.
    ///
    /// Validates every field, rejects a duplicate `note_id`, and stores the
    /// decryption key through the at-rest cipher. The returned view never
    /// contains the key.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_paywall(
        &self,
        note_id: impl Into<String>,
        creator_pubkey: impl Into<String>,
        payment_address: impl Into<String>,
        price_xmr: f64,
        decryption_key: &str,
        preview: impl Into<String>,
        encrypted_content: Option<String>,
    ) -> Result<PaywallInfo> {
        let note_id = note_id.into();
        let creator_pubkey = creator_pubkey.into();
        let payment_address = payment_address.into();

        if note_id.is_empty() {
            return Err(PaywallError::InvalidInput("note id must not be empty".to_string()));
        }
        validate_pubkey(&creator_pubkey)?;
        validate_address(&payment_address)?;
        validate_amount(price_xmr)?;
        if decryption_key.is_empty() {
            return Err(PaywallError::InvalidInput(
                "decryption key must not be empty".to_string(),
            ));
        }

        let stored_key = self.cipher.encrypt(decryption_key)?;
        let record = PaywallRecord {
            note_id: note_id.clone(),
            creator_pubkey,
            payment_address,
            price_xmr,
            decryption_key: stored_key,
            preview: preview.into(),
            encrypted_content,
            created_at: Utc::now(),
            total_sales: 0,
            total_revenue_atomic: 0,
        };

        let mut paywalls = self.paywalls.write().await;
        if paywalls.contains_key(&note_id) {
            return Err(PaywallError::AlreadyExists(format!(
                "paywall already exists for note {note_id}"
            )));
        }

        let info = PaywallInfo::from(&record);
        paywalls.insert(note_id.clone(), record);
        info!(note_id = %note_id, "paywall created");
        Ok(info)
    }

    /// Returns the public-safe view of a paywall, or `None` if absent.
    pub async fn get_paywall_info(&self, note_id: &str) -> Option<PaywallInfo> {
        self.paywalls
            .read()
            .await
            .get(note_id)
            .map(PaywallInfo::from)
    }

    /// Batch variant of [`get_paywall_info`](Self::get_paywall_info):
    /// absent records yield `None` entries, never errors.
    pub async fn get_paywall_info_batch(&self, note_ids: &[String]) -> Vec<Option<PaywallInfo>> {
        let paywalls = self.paywalls.read().await;
        note_ids
            .iter()
            .map(|id| paywalls.get(id).map(PaywallInfo::from))
            .collect()
    }

    /// Returns the decrypted key to the paywall's creator.
    ///
    /// Creators always retain access to their own content; anyone else is
    /// denied regardless of unlock state.
    pub async fn get_creator_key(&self, note_id: &str, creator_pubkey: &str) -> Result<String> {
        let paywalls = self.paywalls.read().await;
        let record = paywalls
            .get(note_id)
            .ok_or_else(|| PaywallError::NotFound(format!("no paywall for note {note_id}")))?;

        if record.creator_pubkey != creator_pubkey {
            return Err(PaywallError::Unauthorized(
                "only the creator may read the decryption key".to_string(),
            ));
        }

        self.cipher.decrypt(&record.decryption_key)
    }

    /// Creates a pending purchase and returns payment instructions.
    ///
    /// Never talks to the ledger. Rejects when the paywall is missing or the
    /// buyer already holds an unlock.
    pub async fn initiate_purchase(
        &self,
        note_id: &str,
        buyer_pubkey: &str,
    ) -> Result<PaymentInstructions> {
        validate_pubkey(buyer_pubkey)?;

        let (creator_pubkey, payment_address, price_xmr) = {
            let paywalls = self.paywalls.read().await;
            let record = paywalls
                .get(note_id)
                .ok_or_else(|| PaywallError::NotFound(format!("no paywall for note {note_id}")))?;
            (
                record.creator_pubkey.clone(),
                record.payment_address.clone(),
                record.price_xmr,
            )
        };

        let unlock_key = (note_id.to_string(), buyer_pubkey.to_string());
        if self.unlocks.read().await.contains_key(&unlock_key) {
            return Err(PaywallError::AlreadyExists(
                "content is already unlocked for this buyer".to_string(),
            ));
        }

        let created_at = Utc::now();
        let purchase = PurchaseRecord {
            purchase_id: generate_purchase_id(),
            note_id: note_id.to_string(),
            buyer_pubkey: buyer_pubkey.to_string(),
            creator_pubkey,
            payment_address: payment_address.clone(),
            price_xmr,
            status: PurchaseStatus::Pending,
            created_at,
            expires_at: PurchaseRecord::expiry_for(created_at),
            txid: None,
            completed_at: None,
        };

        let instructions = PaymentInstructions {
            purchase_id: purchase.purchase_id.clone(),
            payment_address,
            price_xmr,
            expires_at: purchase.expires_at,
        };

        self.purchases
            .write()
            .await
            .insert(purchase.purchase_id.clone(), purchase);

        debug!(note_id = %note_id, "purchase initiated");
        Ok(instructions)
    }

    /// Verifies a payment proof and releases the decryption key.
    ///
    /// If the buyer already holds an unlock the key is returned immediately
    /// with `already_unlocked` set and no ledger verification is performed.
    /// Otherwise the proof is verified against the paywall's address and
    /// price; on success the unlock is persisted, any matching pending
    /// purchase is completed, and the sales aggregates grow by the verified
    /// amount. A verification failure mutates nothing.
    pub async fn verify_and_unlock(&self, request: UnlockRequest) -> Result<UnlockResponse> {
        validate_txid(&request.txid)?;
        validate_tx_key(&request.tx_key)?;
        validate_pubkey(&request.buyer_pubkey)?;

        let note_id = self.resolve_note_id(&request).await?;
        let unlock_key = (note_id.clone(), request.buyer_pubkey.clone());

        let (payment_address, price_xmr, stored_key) = {
            let paywalls = self.paywalls.read().await;
            let record = paywalls
                .get(&note_id)
                .ok_or_else(|| PaywallError::NotFound(format!("no paywall for note {note_id}")))?;
            (
                record.payment_address.clone(),
                record.price_xmr,
                record.decryption_key.clone(),
            )
        };

        // Fast path: the unlock already exists, release the key again
        // without touching the ledger.
        if let Some(existing) = self.unlocks.read().await.get(&unlock_key) {
            return self.repeat_unlock(existing, &stored_key);
        }

        let payment = self
            .verifier
            .verify(&request.txid, &request.tx_key, &payment_address, price_xmr)
            .await?;

        // Insert-if-absent under one write lock: a racing unlock that got
        // here first wins, and this call degrades to an idempotent repeat.
        {
            let mut unlocks = self.unlocks.write().await;
            if let Some(existing) = unlocks.get(&unlock_key) {
                return self.repeat_unlock(existing, &stored_key);
            }
            unlocks.insert(
                unlock_key,
                UnlockRecord {
                    txid: request.txid.clone(),
                    amount_atomic: payment.amount_atomic,
                    confirmations: payment.confirmations,
                    unlocked_at: Utc::now(),
                },
            );
        }

        self.complete_purchase(&request, &note_id).await;

        {
            let mut paywalls = self.paywalls.write().await;
            if let Some(record) = paywalls.get_mut(&note_id) {
                record.total_sales += 1;
                record.total_revenue_atomic = record
                    .total_revenue_atomic
                    .saturating_add(payment.amount_atomic);
            }
        }

        info!(
            note_id = %note_id,
            confirmations = payment.confirmations,
            "content unlocked"
        );

        Ok(UnlockResponse {
            decryption_key: self.cipher.decrypt(&stored_key)?,
            amount_atomic: payment.amount_atomic,
            confirmations: payment.confirmations,
            in_tx_pool: payment.in_pool,
            already_unlocked: false,
        })
    }

    /// Deletes a paywall. Only the recorded creator may do this.
    pub async fn delete_paywall(&self, note_id: &str, creator_pubkey: &str) -> Result<()> {
        let mut paywalls = self.paywalls.write().await;
        let record = paywalls
            .get(note_id)
            .ok_or_else(|| PaywallError::NotFound(format!("no paywall for note {note_id}")))?;

        if record.creator_pubkey != creator_pubkey {
            return Err(PaywallError::Unauthorized(
                "only the creator may delete a paywall".to_string(),
            ));
        }

        paywalls.remove(note_id);
        info!(note_id = %note_id, "paywall deleted");
        Ok(())
    }

    /// Removes pending purchases past their expiry. Returns how many were
    /// swept. Completed purchases are never touched.
    pub async fn cleanup_expired_purchases(&self) -> usize {
        let now = Utc::now();
        let mut purchases = self.purchases.write().await;
        let before = purchases.len();
        purchases.retain(|_, p| !p.is_expired(now));
        let swept = before - purchases.len();
        if swept > 0 {
            debug!(swept, "expired purchases removed");
        }
        swept
    }

    /// Looks up a purchase by id. Mostly useful for status displays.
    pub async fn get_purchase(&self, purchase_id: &str) -> Option<PurchaseRecord> {
        self.purchases.read().await.get(purchase_id).cloned()
    }

    /// Resolves the target note from a purchase id or an explicit note id.
    async fn resolve_note_id(&self, request: &UnlockRequest) -> Result<String> {
        if let Some(purchase_id) = &request.purchase_id {
            let purchases = self.purchases.read().await;
            let purchase = purchases.get(purchase_id).ok_or_else(|| {
                PaywallError::NotFound(format!("no purchase {purchase_id}"))
            })?;
            return Ok(purchase.note_id.clone());
        }
        request
            .note_id
            .clone()
            .ok_or_else(|| {
                PaywallError::InvalidInput(
                    "either purchaseId or noteId is required".to_string(),
                )
            })
    }

    /// Answers a repeated unlock from the existing record.
    fn repeat_unlock(&self, existing: &UnlockRecord, stored_key: &str) -> Result<UnlockResponse> {
        Ok(UnlockResponse {
            decryption_key: self.cipher.decrypt(stored_key)?,
            amount_atomic: existing.amount_atomic,
            confirmations: existing.confirmations,
            in_tx_pool: false,
            already_unlocked: true,
        })
    }

    /// Marks the matching pending purchase completed, by id when the caller
    /// supplied one, otherwise by (note, buyer). Only a pending purchase
    /// belonging to the unlocking buyer is ever touched: a purchase id is a
    /// lookup handle, not an authorization to complete someone else's
    /// purchase or rewrite a completed one.
    async fn complete_purchase(&self, request: &UnlockRequest, note_id: &str) {
        let now = Utc::now();
        let mut purchases = self.purchases.write().await;

        let target = if let Some(purchase_id) = &request.purchase_id {
            purchases.get_mut(purchase_id).filter(|p| {
                p.buyer_pubkey == request.buyer_pubkey && p.status == PurchaseStatus::Pending
            })
        } else {
            purchases.values_mut().find(|p| {
                p.note_id == note_id
                    && p.buyer_pubkey == request.buyer_pubkey
                    && p.status == PurchaseStatus::Pending
            })
        };

        if let Some(purchase) = target {
            purchase.status = PurchaseStatus::Completed;
            purchase.txid = Some(request.txid.clone());
            purchase.completed_at = Some(now);
        }
    }
}

/// Generates a random purchase token: 32 bytes of entropy as hex.
fn generate_purchase_id() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
