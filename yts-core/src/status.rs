//! Local client status: advertised capabilities, interests, status fragments.

use std::collections::{BTreeMap, BTreeSet};

use crate::metadata::{Metadata, MetadataError, Node};

/// The local client's currently-advertised status, keyed by capability id,
/// plus the set of capabilities it wants to receive status updates for.
#[derive(Default)]
pub struct ClientStatus {
    capabilities: BTreeSet<String>,
    interests: BTreeSet<String>,
    statuses: BTreeMap<String, Metadata>,
}

impl ClientStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability the client implements. False if already present.
    pub fn add_capability(&mut self, capability: &str) -> bool {
        self.capabilities.insert(capability.to_owned())
    }

    /// Remove a capability and any stored status for it. False if absent.
    pub fn revoke_capability(&mut self, capability: &str) -> bool {
        let removed = self.capabilities.remove(capability);
        if removed {
            self.statuses.remove(capability);
        }
        removed
    }

    /// Add a capability the client wants status updates for. False if
    /// already present.
    pub fn add_interest(&mut self, capability: &str) -> bool {
        self.interests.insert(capability.to_owned())
    }

    /// Remove an interest. False if absent.
    pub fn revoke_interest(&mut self, capability: &str) -> bool {
        self.interests.remove(capability)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn has_interest(&self, capability: &str) -> bool {
        self.interests.contains(capability)
    }

    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    /// Build and store the status fragment for a capability, replacing any
    /// prior one. The fragment always carries `xmlns`, `capability` and
    /// `from-service` plus the caller's attributes and optional payload.
    pub fn set(
        &mut self,
        capability: &str,
        activity: &str,
        from_service: &str,
        attributes: &[(&str, &str)],
        payload: Option<Node>,
    ) -> Result<&Metadata, MetadataError> {
        let mut status = Metadata::status(capability, activity, from_service, attributes)?;
        if let Some(node) = payload {
            status.add_child(node);
        }
        self.statuses.insert(capability.to_owned(), status);
        Ok(&self.statuses[capability])
    }

    /// Drop the stored status for a capability. False if none was stored.
    pub fn clear(&mut self, capability: &str) -> bool {
        self.statuses.remove(capability).is_some()
    }

    pub fn get(&self, capability: &str) -> Option<&Metadata> {
        self.statuses.get(capability)
    }

    /// Visit each advertised capability in order. The iterator returns false
    /// to abort the remaining traversal; the return value is whether the
    /// traversal ran to completion.
    pub fn foreach_capability<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&str) -> bool,
    {
        for capability in &self.capabilities {
            if !f(capability) {
                return false;
            }
        }
        true
    }

    /// Visit each interest in order, with the same short-circuit contract
    /// as `foreach_capability`.
    pub fn foreach_interest<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&str) -> bool,
    {
        for capability in &self.interests {
            if !f(capability) {
                return false;
            }
        }
        true
    }
}
