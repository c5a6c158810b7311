//! Attribution engine: website registry, conversion tracking, payout
//! escrow, and settlement orchestration.
//!
//! The engine is single-actor: every state-mutating operation takes
//! `&mut self` and runs to completion before the next one, so two
//! conversions can never race on a website's counters and an escrow entry
//! can never be drained twice concurrently. State is persisted after each
//! logical operation; a persistence failure is logged and does not roll
//! back the in-memory mutation.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use requity_core::models::{
    ConversionEvent, PayoutStatus, PendingPayout, WebsiteRegistration, normalize_domain,
};
use requity_core::store::StoreState;
use requity_core::{ids, unix_timestamp};

use crate::ledger::{LedgerClient, LedgerError, validate_address};
use crate::verifier::{OwnershipCheck, VERIFICATION_MARKER, VerifyError, WELL_KNOWN_FILE};

/// Attribution engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown website id or domain. Hard error, no state change.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input cannot be treated as a domain.
    #[error("Invalid domain: {0:?}")]
    InvalidDomain(String),

    /// Operator account cannot fund the payout. The settlement is not
    /// attempted; the entry stays unpaid.
    #[error("Insufficient operator balance: {available} available, {required} required")]
    InsufficientBalance { available: u64, required: u64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl EngineError {
    /// Whether re-running the failed operation later can succeed without
    /// operator correction first.
    pub const fn is_retry_safe(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_transient(),
            Self::InsufficientBalance { .. } => true,
            Self::NotFound(_) | Self::InvalidDomain(_) | Self::Verify(_) => false,
        }
    }
}

/// Engine-level settings, resolved from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Operator wallet funding payouts; placeholder owner for
    /// auto-registered domains.
    pub operator_address: String,
    /// Fixed reward per conversion, in minor units.
    pub payout_amount: u64,
    /// Auto-register unknown conversion domains instead of rejecting them.
    pub auto_register_unknown_domains: bool,
}

/// Result of a registration call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOutcome {
    pub website_id: String,
    pub verification_token: String,
    pub instructions: String,
    /// True when the domain was already registered; the existing record is
    /// returned untouched and the token is never rotated.
    pub is_existing: bool,
}

/// Conversion intake payload from the storefront/extension collaborators.
#[derive(Debug, Clone, Default)]
pub struct OrderInfo {
    pub order_id: String,
    /// Accepted but not used to scale the payout (fixed-amount model).
    pub order_amount: Option<f64>,
    pub user_agent: Option<String>,
    pub additional_data: Option<serde_json::Value>,
}

/// Counters from an escrow drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainOutcome {
    pub claimed: usize,
    pub failed: usize,
}

/// The orchestrator. Owns the website registry, conversion log, and payout
/// escrow; coordinates the domain verifier and the ledger client.
pub struct AttributionEngine<L, V> {
    state: StoreState,
    state_path: PathBuf,
    settings: EngineSettings,
    ledger: L,
    verifier: V,
}

impl<L: LedgerClient, V: OwnershipCheck> AttributionEngine<L, V> {
    /// Load persisted state from `state_path` (empty when the file is
    /// missing or corrupt) and build an engine around it.
    pub fn open(state_path: PathBuf, settings: EngineSettings, ledger: L, verifier: V) -> Self {
        let state = StoreState::load(&state_path);
        Self { state, state_path, settings, ledger, verifier }
    }

    /// Register a website domain for attribution payouts.
    ///
    /// Idempotent: re-registering a known domain returns the existing
    /// record with `is_existing = true` and never rotates its token, since
    /// that would invalidate an in-progress verification.
    pub fn register(&mut self, domain: &str, owner: &str) -> Result<RegistrationOutcome, EngineError> {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return Err(EngineError::InvalidDomain(domain));
        }

        if let Some(existing) = self.state.websites.values().find(|r| r.domain == domain) {
            debug!(domain, website_id = existing.website_id, "domain already registered");
            return Ok(RegistrationOutcome {
                website_id: existing.website_id.clone(),
                verification_token: existing.verification_token.clone(),
                instructions: verification_instructions(
                    &domain,
                    &existing.verification_token,
                    &existing.website_id,
                ),
                is_existing: true,
            });
        }

        let website_id = self.create_registration(&domain, owner);
        self.persist();

        let reg = &self.state.websites[&website_id];
        info!(domain, website_id, "website registered");
        Ok(RegistrationOutcome {
            website_id: website_id.clone(),
            verification_token: reg.verification_token.clone(),
            instructions: verification_instructions(&domain, &reg.verification_token, &website_id),
            is_existing: false,
        })
    }

    /// Verify domain ownership for a registered website.
    ///
    /// Unknown ids are a hard error, distinct from a failed check which is
    /// a normal `Ok(false)` with no state change. On success the website
    /// flips verified (one-way) and all escrowed payouts for it are
    /// drained. Re-invoking on an already-verified website skips the
    /// network check and just re-drains whatever is still pending, which
    /// makes retry after a partial drain safe.
    pub async fn verify(&mut self, website_id: &str) -> Result<bool, EngineError> {
        let reg = self
            .state
            .websites
            .get(website_id)
            .ok_or_else(|| EngineError::NotFound(format!("website {website_id}")))?;

        let mut newly_verified = false;
        if reg.is_verified {
            debug!(website_id, "already verified, re-draining escrow");
        } else {
            let domain = reg.domain.clone();
            let token = reg.verification_token.clone();
            let ok = self.verifier.verify(&domain, &token).await?;
            if !ok {
                info!(website_id, domain, "ownership check failed");
                return Ok(false);
            }
            if let Some(r) = self.state.websites.get_mut(website_id) {
                r.is_verified = true;
            }
            newly_verified = true;
            info!(website_id, domain, "website verified");
        }

        let outcome = self.drain_escrow(website_id).await;
        if newly_verified || outcome.claimed > 0 {
            self.persist();
        }
        Ok(true)
    }

    /// Record a conversion attributed to a website.
    ///
    /// `target` may be a website id or a domain. An unknown domain is
    /// auto-registered with the operator account as placeholder owner (when
    /// enabled) so conversions are never dropped just because a site never
    /// pre-registered; payouts for such sites land in the operator wallet
    /// until the publisher re-registers with their own address.
    ///
    /// Verified websites are paid immediately; a failed immediate payout
    /// falls back to escrow rather than losing the conversion. Unverified
    /// websites always escrow.
    pub async fn track_conversion(
        &mut self,
        target: &str,
        source_url: &str,
        order: &OrderInfo,
    ) -> Result<String, EngineError> {
        let website_id = self.resolve_target(target)?;
        let now = unix_timestamp();
        let conversion_id = ids::conversion_id(&website_id, &order.order_id, now);
        let amount = self.settings.payout_amount;

        let (is_verified, owner, domain) = {
            let reg = self
                .state
                .websites
                .get(&website_id)
                .ok_or_else(|| EngineError::NotFound(format!("website {website_id}")))?;
            (reg.is_verified, reg.owner.clone(), reg.domain.clone())
        };

        self.state.conversions.push(ConversionEvent {
            website_id: website_id.clone(),
            conversion_id: conversion_id.clone(),
            timestamp: now,
            amount,
            source_url: source_url.to_string(),
            destination_url: order.order_id.clone(),
            user_agent: order.user_agent.clone(),
            referrer_data: order.additional_data.clone(),
        });
        if let Some(reg) = self.state.websites.get_mut(&website_id) {
            reg.total_conversions += 1;
        }

        if is_verified {
            let memo = format!("Requity payout for conversion {conversion_id}");
            match self.settle(&owner, amount, &memo).await {
                Ok(tx_id) => {
                    self.credit_earnings(&website_id, amount);
                    info!(website_id, conversion_id, tx_id, amount, "conversion paid out");
                }
                Err(e) => {
                    // The conversion must never be lost to a payout failure.
                    warn!(website_id, conversion_id, error = %e, "immediate payout failed, escrowing");
                    self.push_pending(&website_id, &domain, &conversion_id, amount, now, source_url);
                }
            }
        } else {
            debug!(website_id, conversion_id, "website unverified, escrowing payout");
            self.push_pending(&website_id, &domain, &conversion_id, amount, now, source_url);
        }

        self.persist();
        Ok(conversion_id)
    }

    /// Stats for a registered website. Unknown ids are a hard error.
    pub fn stats(&self, website_id: &str) -> Result<&WebsiteRegistration, EngineError> {
        self.state
            .websites
            .get(website_id)
            .ok_or_else(|| EngineError::NotFound(format!("website {website_id}")))
    }

    /// Recorded conversions, optionally filtered by website id.
    pub fn conversions(&self, website_id: Option<&str>) -> Vec<&ConversionEvent> {
        self.state
            .conversions
            .iter()
            .filter(|e| website_id.is_none_or(|id| e.website_id == id))
            .collect()
    }

    /// All escrow entries, claimed and pending alike.
    pub fn pending_payouts(&self) -> &[PendingPayout] {
        &self.state.pending_payouts
    }

    /// Resolve a conversion target: website id first, then normalized
    /// domain, then the auto-registration fallback for unknown domains.
    fn resolve_target(&mut self, target: &str) -> Result<String, EngineError> {
        if self.state.websites.contains_key(target) {
            return Ok(target.to_string());
        }

        let domain = normalize_domain(target);
        if let Some(id) = self
            .state
            .websites
            .iter()
            .find_map(|(id, r)| (r.domain == domain).then(|| id.clone()))
        {
            return Ok(id);
        }

        if domain.contains('.') && self.settings.auto_register_unknown_domains {
            warn!(
                domain,
                "unknown conversion domain, auto-registering with operator as placeholder owner"
            );
            let operator = self.settings.operator_address.clone();
            return Ok(self.create_registration(&domain, &operator));
        }

        Err(EngineError::NotFound(format!("website or domain {target}")))
    }

    fn create_registration(&mut self, domain: &str, owner: &str) -> String {
        let now = unix_timestamp();
        let website_id = ids::website_id(domain, now);
        self.state.websites.insert(
            website_id.clone(),
            WebsiteRegistration {
                website_id: website_id.clone(),
                domain: domain.to_string(),
                owner: owner.to_string(),
                verification_token: ids::verification_token(),
                is_verified: false,
                registration_timestamp: now,
                total_conversions: 0,
                total_earnings: 0,
            },
        );
        website_id
    }

    /// Settle a single payout: balance check, recipient validation, then
    /// the transfer. Any failure propagates to the caller; the caller
    /// decides between escrow fallback and leaving an entry pending.
    async fn settle(&self, recipient: &str, amount: u64, memo: &str) -> Result<String, EngineError> {
        let available = self.ledger.balance(&self.settings.operator_address).await?;
        if available < amount {
            // Skip the known-doomed transfer call entirely.
            return Err(EngineError::InsufficientBalance { available, required: amount });
        }
        validate_address(recipient)?;
        let tx_id = self.ledger.transfer(recipient, amount, Some(memo)).await?;
        Ok(tx_id)
    }

    /// Drain all pending escrow entries for a website, each independently.
    ///
    /// A failed transfer leaves its entry pending and moves on; one bad
    /// transfer must not block the rest of the batch. Only entries still
    /// `pending` are selected, so re-running never double-pays.
    async fn drain_escrow(&mut self, website_id: &str) -> DrainOutcome {
        let indices: Vec<usize> = self
            .state
            .pending_payouts
            .iter()
            .enumerate()
            .filter(|(_, p)| p.website_id == website_id && p.status == PayoutStatus::Pending)
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            return DrainOutcome::default();
        }

        let Some(owner) = self.state.websites.get(website_id).map(|r| r.owner.clone()) else {
            return DrainOutcome::default();
        };

        let mut outcome = DrainOutcome::default();
        for i in indices {
            let (amount, conversion_id) = {
                let p = &self.state.pending_payouts[i];
                (p.amount, p.conversion_id.clone())
            };
            let memo = format!("Requity escrow payout for conversion {conversion_id}");
            match self.settle(&owner, amount, &memo).await {
                Ok(tx_id) => {
                    self.state.pending_payouts[i].status = PayoutStatus::Claimed;
                    self.credit_earnings(website_id, amount);
                    outcome.claimed += 1;
                    info!(website_id, conversion_id, tx_id, amount, "escrow payout claimed");
                }
                Err(e) => {
                    outcome.failed += 1;
                    warn!(website_id, conversion_id, error = %e, "escrow payout failed, leaving pending");
                }
            }
        }
        outcome
    }

    fn push_pending(
        &mut self,
        website_id: &str,
        domain: &str,
        conversion_id: &str,
        amount: u64,
        timestamp: i64,
        source_url: &str,
    ) {
        self.state.pending_payouts.push(PendingPayout {
            website_id: website_id.to_string(),
            domain: domain.to_string(),
            conversion_id: conversion_id.to_string(),
            amount,
            timestamp,
            source_url: source_url.to_string(),
            status: PayoutStatus::Pending,
        });
    }

    fn credit_earnings(&mut self, website_id: &str, amount: u64) {
        if let Some(reg) = self.state.websites.get_mut(website_id) {
            reg.total_earnings = reg.total_earnings.saturating_add(amount);
        }
    }

    /// Best-effort, at-least-once persistence after each logical operation.
    /// Availability of the next operation wins over strict durability.
    fn persist(&self) {
        if let Err(e) = self.state.save(&self.state_path) {
            error!(path = %self.state_path.display(), error = %e, "failed to persist engine state");
        }
    }
}

/// Human-readable instructions returned from registration.
fn verification_instructions(domain: &str, token: &str, website_id: &str) -> String {
    format!(
        "To verify ownership of {domain}:\n\
         1. Create a file at https://{domain}/.well-known/{WELL_KNOWN_FILE}\n\
         \x20   containing: {VERIFICATION_MARKER}={token}\n\
         2. Or add this tag to your homepage:\n\
         \x20   <meta name=\"{VERIFICATION_MARKER}\" content=\"{token}\" />\n\
         3. Then run: requity verify {website_id}\n"
    )
}
