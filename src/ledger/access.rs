//! Access Control
//!
//! Owner, provider allow-list, trusted oracle relay, pause flag and
//! per-actor cooldowns. Admin operations are owner-gated.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::core::clock::Timestamp;
use crate::core::ids::ActorId;
use crate::error::PactError;

/// Rate-limited action kinds. Each has an independent timestamp per actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Record submission.
    Submission,
    /// Decryption request.
    DecryptionRequest,
}

/// Owner-gated access-control change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessUpdate {
    /// Allow-list a provider.
    AddProvider(ActorId),
    /// Remove a provider.
    RemoveProvider(ActorId),
    /// Set the trusted relay.
    SetRelay(ActorId),
    /// Pause or resume.
    SetPaused(bool),
    /// Change the cooldown.
    SetCooldown(u64),
    /// Hand over ownership.
    TransferOwnership(ActorId),
}

/// Roles, pause flag and cooldown bookkeeping.
#[derive(Clone, Debug)]
pub struct AccessControl {
    owner: ActorId,
    relay: Option<ActorId>,
    providers: BTreeSet<ActorId>,
    paused: bool,
    cooldown_secs: u64,
    last_action: BTreeMap<(ActorId, ActionKind), Timestamp>,
}

impl AccessControl {
    /// Create with an owner and a positive cooldown.
    pub fn new(owner: ActorId, cooldown_secs: u64) -> Result<Self, PactError> {
        if cooldown_secs == 0 {
            return Err(PactError::InvalidCooldown);
        }
        Ok(Self {
            owner,
            relay: None,
            providers: BTreeSet::new(),
            paused: false,
            cooldown_secs,
            last_action: BTreeMap::new(),
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current owner.
    pub fn owner(&self) -> ActorId {
        self.owner
    }

    /// Is `caller` the owner?
    pub fn is_owner(&self, caller: &ActorId) -> bool {
        *caller == self.owner
    }

    /// Is `caller` an allow-listed provider?
    pub fn is_provider(&self, caller: &ActorId) -> bool {
        self.providers.contains(caller)
    }

    /// Is `caller` the trusted oracle relay?
    pub fn is_relay(&self, caller: &ActorId) -> bool {
        self.relay.as_ref() == Some(caller)
    }

    /// Is the system paused?
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Global cooldown duration in seconds.
    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown_secs
    }

    /// Last successful action of `kind` by `actor`.
    pub fn last_action_time(&self, actor: &ActorId, kind: ActionKind) -> Option<Timestamp> {
        self.last_action.get(&(*actor, kind)).copied()
    }

    /// Stamp a successful action.
    pub(crate) fn record_action(&mut self, actor: ActorId, kind: ActionKind, now: Timestamp) {
        self.last_action.insert((actor, kind), now);
    }

    // =========================================================================
    // Guards
    // =========================================================================

    /// Fail unless `caller` is the owner.
    pub fn require_owner(&self, caller: &ActorId) -> Result<(), PactError> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(PactError::NotOwner(*caller))
        }
    }

    /// Fail unless `caller` is a provider.
    pub fn require_provider(&self, caller: &ActorId) -> Result<(), PactError> {
        if self.is_provider(caller) {
            Ok(())
        } else {
            Err(PactError::NotProvider(*caller))
        }
    }

    /// Fail unless `caller` is the trusted relay.
    pub fn require_relay(&self, caller: &ActorId) -> Result<(), PactError> {
        if self.is_relay(caller) {
            Ok(())
        } else {
            Err(PactError::UntrustedRelay(*caller))
        }
    }

    /// Fail while paused.
    pub fn require_not_paused(&self) -> Result<(), PactError> {
        if self.paused {
            Err(PactError::Paused)
        } else {
            Ok(())
        }
    }

    /// Fail unless `now >= last + cooldown`. A first action always passes.
    pub fn check_cooldown(
        &self,
        actor: &ActorId,
        kind: ActionKind,
        now: Timestamp,
    ) -> Result<(), PactError> {
        let Some(last) = self.last_action_time(actor, kind) else {
            return Ok(());
        };
        let cooldown = i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX);
        let ready_at = last.saturating_add(cooldown);
        if now >= ready_at {
            Ok(())
        } else {
            Err(PactError::CooldownActive {
                remaining: ready_at.abs_diff(now),
            })
        }
    }

    // =========================================================================
    // Admin
    // =========================================================================

    /// Allow-list a provider.
    pub fn add_provider(&mut self, caller: &ActorId, provider: ActorId) -> Result<(), PactError> {
        self.require_owner(caller)?;
        if self.providers.insert(provider) {
            info!("Provider {} added", provider);
        }
        Ok(())
    }

    /// Remove a provider from the allow-list.
    pub fn remove_provider(&mut self, caller: &ActorId, provider: &ActorId) -> Result<(), PactError> {
        self.require_owner(caller)?;
        if self.providers.remove(provider) {
            info!("Provider {} removed", provider);
        }
        Ok(())
    }

    /// Set the trusted oracle relay.
    pub fn set_relay(&mut self, caller: &ActorId, relay: ActorId) -> Result<(), PactError> {
        self.require_owner(caller)?;
        self.relay = Some(relay);
        info!("Oracle relay set to {}", relay);
        Ok(())
    }

    /// Pause or unpause.
    pub fn set_paused(&mut self, caller: &ActorId, paused: bool) -> Result<(), PactError> {
        self.require_owner(caller)?;
        self.paused = paused;
        info!("Paused: {}", paused);
        Ok(())
    }

    /// Change the cooldown. Must be positive.
    pub fn set_cooldown(&mut self, caller: &ActorId, cooldown_secs: u64) -> Result<(), PactError> {
        self.require_owner(caller)?;
        if cooldown_secs == 0 {
            return Err(PactError::InvalidCooldown);
        }
        self.cooldown_secs = cooldown_secs;
        Ok(())
    }

    /// Hand ownership to another actor.
    pub fn transfer_ownership(&mut self, caller: &ActorId, new_owner: ActorId) -> Result<(), PactError> {
        self.require_owner(caller)?;
        info!("Ownership transferred {} -> {}", self.owner, new_owner);
        self.owner = new_owner;
        Ok(())
    }

    /// Apply an owner-gated change.
    pub fn apply(&mut self, caller: &ActorId, update: AccessUpdate) -> Result<(), PactError> {
        match update {
            AccessUpdate::AddProvider(actor) => self.add_provider(caller, actor),
            AccessUpdate::RemoveProvider(actor) => self.remove_provider(caller, &actor),
            AccessUpdate::SetRelay(actor) => self.set_relay(caller, actor),
            AccessUpdate::SetPaused(paused) => self.set_paused(caller, paused),
            AccessUpdate::SetCooldown(secs) => self.set_cooldown(caller, secs),
            AccessUpdate::TransferOwnership(actor) => self.transfer_ownership(caller, actor),
        }
    }
}
