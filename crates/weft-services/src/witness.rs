//! The witness engine: adaptive-quorum corroboration for credit awards.
//!
//! A proposer signs a claim and asks the mesh to witness it. Witnesses
//! validate the claim against the contribution allow-list and the
//! proposer's signature, then sign exactly `{tx_id, witness}` in return.
//! Once a proposal collects attestations from a quorum of distinct
//! witnesses it finalizes into the ledger and the award is broadcast.
//!
//! Quorum adapts to mesh size: clamp(open peers, 1, 3). A lone node
//! self-finalizes; a large mesh never needs more than three witnesses.
//!
//! Receivers of a finalized award re-verify every attestation against
//! their own quorum before applying — the attestations are the
//! authority, not the sender's word.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use weft_core::crypto::{verify_canonical, IdentityKeypair};
use weft_core::schema::{
    namespace, parse_reason, random_id, AttestationClaim, CreditTransaction, Packet,
    ProposalClaim, WitnessAttestation,
};
use weft_mesh::MeshController;

use crate::credit::{CreditError, CreditLedger};

struct PendingAward {
    tx: CreditTransaction,
    created_at: u64,
}

pub struct WitnessEngine {
    controller: Arc<MeshController>,
    identity: Arc<IdentityKeypair>,
    ledger: Arc<CreditLedger>,
    /// Pioneers apply every verified award as archival replicas.
    pioneer: bool,
    pending: DashMap<String, PendingAward>,
    pending_ttl_ms: u64,
}

impl WitnessEngine {
    pub fn new(
        controller: Arc<MeshController>,
        identity: Arc<IdentityKeypair>,
        ledger: Arc<CreditLedger>,
        pioneer: bool,
        pending_ttl_ms: u64,
    ) -> Self {
        Self {
            controller,
            identity,
            ledger,
            pioneer,
            pending: DashMap::new(),
            pending_ttl_ms,
        }
    }

    /// Witnesses required to finalize, from this node's own mesh view.
    pub fn quorum(&self) -> usize {
        self.controller.peer_count().clamp(1, 3)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Propose an award and ask the mesh to witness it. The proposer
    /// attests its own proposal, so a lone node finalizes immediately.
    pub async fn propose(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        reason: &str,
    ) -> Result<String, CreditError> {
        if parse_reason(reason).is_none() {
            return Err(CreditError::UnrecognizedReason(reason.to_string()));
        }

        let mut tx = CreditTransaction {
            id: random_id(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            reason: reason.to_string(),
            timestamp: now_millis(),
            signature: None,
            attestations: Vec::new(),
        };
        tx.signature = Some(self.identity.sign_canonical(&ProposalClaim::of(&tx))?);

        let id = tx.id.clone();
        self.pending.insert(
            id.clone(),
            PendingAward {
                tx: tx.clone(),
                created_at: tx.timestamp,
            },
        );
        debug!(tx = id.as_str(), to, amount, "award proposed");

        if let Err(e) = self
            .controller
            .broadcast(namespace::ECONOMY, Packet::WitnessRequest { tx })
            .await
        {
            warn!(tx = id.as_str(), error = %e, "witness request broadcast failed");
        }
        self.accept_attestation(self.attest(&id)?).await?;
        Ok(id)
    }

    /// Handle a peer's witness request: validate, then sign and
    /// broadcast our attestation. Invalid proposals are logged and
    /// dropped, never attested.
    pub async fn on_request(&self, tx: CreditTransaction, sender_key: Option<String>) {
        let Some(sender_key) = sender_key else {
            warn!(tx = tx.id.as_str(), "unsigned witness request dropped");
            return;
        };
        if parse_reason(&tx.reason).is_none() {
            warn!(
                tx = tx.id.as_str(),
                reason = tx.reason.as_str(),
                "unrecognized contribution, not attesting"
            );
            return;
        }
        let Some(signature) = &tx.signature else {
            warn!(tx = tx.id.as_str(), "proposal carries no signature");
            return;
        };
        if !verify_canonical(&ProposalClaim::of(&tx), signature, &sender_key) {
            warn!(tx = tx.id.as_str(), "proposal signature invalid, not attesting");
            return;
        }

        let attestation = match self.attest(&tx.id) {
            Ok(attestation) => attestation,
            Err(e) => {
                warn!(tx = tx.id.as_str(), error = %e, "attestation signing failed");
                return;
            }
        };
        if let Err(e) = self
            .controller
            .broadcast(
                namespace::ECONOMY,
                Packet::WitnessAttestation {
                    attestation: attestation.clone(),
                },
            )
            .await
        {
            warn!(tx = tx.id.as_str(), error = %e, "attestation broadcast failed");
        }
    }

    /// Handle an incoming attestation for one of our pending proposals.
    pub async fn on_attestation(&self, attestation: WitnessAttestation) {
        if let Err(e) = self.accept_attestation(attestation).await {
            warn!(error = %e, "attestation finalization failed");
        }
    }

    /// Handle a finalized award from the mesh. Every attestation is
    /// re-verified and counted against our own quorum before the ledger
    /// moves — a forged or under-witnessed award never applies. A
    /// verified award only moves the ledger when this node is the
    /// beneficiary or an archival pioneer; everyone else verifies and
    /// drops it.
    pub async fn on_award(&self, tx: CreditTransaction) {
        let mut seen = Vec::new();
        for attestation in &tx.attestations {
            if attestation.tx_id != tx.id {
                warn!(tx = tx.id.as_str(), "attestation for a different transaction");
                return;
            }
            if seen.contains(&attestation.witness) {
                continue;
            }
            if !verify_attestation(attestation) {
                warn!(
                    tx = tx.id.as_str(),
                    witness = attestation.witness.as_str(),
                    "attestation signature invalid, award rejected"
                );
                return;
            }
            seen.push(attestation.witness.clone());
        }
        if seen.len() < self.quorum() {
            warn!(
                tx = tx.id.as_str(),
                witnesses = seen.len(),
                quorum = self.quorum(),
                "award below quorum, rejected"
            );
            return;
        }
        if tx.to != self.controller.local_id() && !self.pioneer {
            debug!(tx = tx.id.as_str(), "award verified, not ours to apply");
            return;
        }
        match self.ledger.apply(&tx).await {
            Ok(true) => {}
            Ok(false) => debug!(tx = tx.id.as_str(), "award replayed, ignored"),
            Err(e) => warn!(tx = tx.id.as_str(), error = %e, "award apply failed"),
        }
    }

    /// Drop pending proposals older than the TTL. Returns the swept ids.
    pub fn sweep_expired(&self) -> Vec<String> {
        let cutoff = now_millis().saturating_sub(self.pending_ttl_ms);
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|e| e.value().created_at < cutoff)
            .map(|e| e.key().clone())
            .collect();
        for id in &expired {
            self.pending.remove(id);
            debug!(tx = id.as_str(), "pending award expired");
        }
        expired
    }

    fn attest(&self, tx_id: &str) -> Result<WitnessAttestation, CreditError> {
        let claim = AttestationClaim {
            tx_id: tx_id.to_string(),
            witness: self.controller.local_id().to_string(),
        };
        let signature = self.identity.sign_canonical(&claim)?;
        Ok(WitnessAttestation {
            tx_id: claim.tx_id,
            witness: claim.witness,
            witness_public_key: self.identity.public_base64(),
            signature,
        })
    }

    async fn accept_attestation(
        &self,
        attestation: WitnessAttestation,
    ) -> Result<(), CreditError> {
        if !verify_attestation(&attestation) {
            warn!(
                tx = attestation.tx_id.as_str(),
                witness = attestation.witness.as_str(),
                "attestation signature invalid, ignored"
            );
            return Ok(());
        }
        let finalized = {
            let Some(mut pending) = self.pending.get_mut(&attestation.tx_id) else {
                debug!(tx = attestation.tx_id.as_str(), "attestation for unknown proposal");
                return Ok(());
            };
            if pending
                .tx
                .attestations
                .iter()
                .any(|a| a.witness == attestation.witness)
            {
                return Ok(());
            }
            pending.tx.attestations.push(attestation);
            if pending.tx.attestations.len() >= self.quorum() {
                Some(pending.tx.clone())
            } else {
                None
            }
        };

        if let Some(tx) = finalized {
            self.pending.remove(&tx.id);
            self.ledger.apply(&tx).await?;
            info!(
                tx = tx.id.as_str(),
                witnesses = tx.attestations.len(),
                "award finalized"
            );
            if let Err(e) = self
                .controller
                .broadcast(namespace::ECONOMY, Packet::CreditAward { tx })
                .await
            {
                warn!(error = %e, "award broadcast failed");
            }
        }
        Ok(())
    }
}

fn verify_attestation(attestation: &WitnessAttestation) -> bool {
    let claim = AttestationClaim {
        tx_id: attestation.tx_id.clone(),
        witness: attestation.witness.clone(),
    };
    verify_canonical(
        &claim,
        &attestation.signature,
        &attestation.witness_public_key,
    )
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
