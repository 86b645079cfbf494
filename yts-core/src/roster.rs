//! Roster: known contacts, their services, and proxy lifecycle.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::proxy::{PlayerProxy, Proxy, TranscriptProxy};
use crate::registry::{VP_PLAYER, VP_TRANSCRIPT};

/// Presence subscription state of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subscription {
    #[default]
    None,
    PendingIn,
    PendingOut,
    Approved,
}

/// One service a peer advertises: per-peer-unique id, type, capability set
/// and localized display names.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub service_id: String,
    pub peer_id: String,
    pub service_type: String,
    pub capabilities: BTreeSet<String>,
    pub names: BTreeMap<String, String>,
}

/// A tracked service. Wanted services (capability overlap with our own set)
/// carry proxies; unwanted ones are kept as opaque metadata and can still
/// receive plain messages.
pub struct ContactService {
    pub descriptor: ServiceDescriptor,
    pub wanted: bool,
    proxies: BTreeMap<String, Box<dyn Proxy>>,
}

impl ContactService {
    pub fn proxy(&self, capability: &str) -> Option<&dyn Proxy> {
        self.proxies.get(capability).map(Box::as_ref)
    }

    pub fn proxy_mut(&mut self, capability: &str) -> Option<&mut Box<dyn Proxy>> {
        self.proxies.get_mut(capability)
    }

    pub fn proxies_mut(&mut self) -> impl Iterator<Item = (&String, &mut Box<dyn Proxy>)> {
        self.proxies.iter_mut()
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }
}

/// A known peer and the services it currently advertises. A contact exists
/// iff it has at least one service; service ids are unique per contact.
pub struct Contact {
    pub peer_id: String,
    pub subscription: Subscription,
    services: BTreeMap<String, ContactService>,
}

impl Contact {
    pub fn service(&self, service_id: &str) -> Option<&ContactService> {
        self.services.get(service_id)
    }

    pub fn service_mut(&mut self, service_id: &str) -> Option<&mut ContactService> {
        self.services.get_mut(service_id)
    }

    pub fn services(&self) -> impl Iterator<Item = &ContactService> {
        self.services.values()
    }

    pub fn services_mut(&mut self) -> impl Iterator<Item = &mut ContactService> {
        self.services.values_mut()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

/// Lifecycle events, drained by the owner after each mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterEvent {
    ContactAdded { peer_id: String },
    ServiceAdded { peer_id: String, service_id: String, wanted: bool },
    ServiceRemoved { peer_id: String, service_id: String },
    ContactRemoved { peer_id: String },
}

type ProxyFactory = Box<dyn Fn(u64) -> Box<dyn Proxy>>;

/// Owns every Contact (and through them all services and proxies).
/// Proxy types are matched by capability id in a factory table the
/// embedding application can extend.
pub struct Roster {
    contacts: BTreeMap<String, Contact>,
    factories: BTreeMap<String, ProxyFactory>,
    invocation_timeout_ticks: u64,
    events: Vec<RosterEvent>,
}

impl Roster {
    /// A roster with factories for the built-in VideoProfile contracts.
    pub fn new(invocation_timeout_ticks: u64) -> Self {
        let mut roster = Self {
            contacts: BTreeMap::new(),
            factories: BTreeMap::new(),
            invocation_timeout_ticks,
            events: Vec::new(),
        };
        roster.register_proxy_factory(VP_PLAYER, |ticks| Box::new(PlayerProxy::new(ticks)));
        roster.register_proxy_factory(VP_TRANSCRIPT, |ticks| {
            Box::new(TranscriptProxy::new(ticks))
        });
        roster
    }

    /// Register (or replace) the proxy type for a capability id.
    pub fn register_proxy_factory<F>(&mut self, capability: &str, factory: F)
    where
        F: Fn(u64) -> Box<dyn Proxy> + 'static,
    {
        self.factories.insert(capability.to_owned(), Box::new(factory));
    }

    pub fn contact(&self, peer_id: &str) -> Option<&Contact> {
        self.contacts.get(peer_id)
    }

    pub fn contact_mut(&mut self, peer_id: &str) -> Option<&mut Contact> {
        self.contacts.get_mut(peer_id)
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    pub fn contacts_mut(&mut self) -> impl Iterator<Item = &mut Contact> {
        self.contacts.values_mut()
    }

    /// The first wanted proxy mirroring `capability` on any of the peer's
    /// services. Inbound events and responses route here.
    pub fn proxy_for(&mut self, peer_id: &str, capability: &str) -> Option<&mut Box<dyn Proxy>> {
        self.proxy_entry_for(peer_id, capability).map(|(_, p)| p)
    }

    /// Like `proxy_for`, also naming the service the proxy belongs to.
    pub fn proxy_entry_for(
        &mut self,
        peer_id: &str,
        capability: &str,
    ) -> Option<(String, &mut Box<dyn Proxy>)> {
        let contact = self.contacts.get_mut(peer_id)?;
        contact.services.iter_mut().find_map(|(service_id, s)| {
            s.proxies
                .get_mut(capability)
                .map(|p| (service_id.clone(), p))
        })
    }

    /// Apply a roster delta for one service. Finds-or-creates the contact
    /// and descriptor; the wanted/unwanted split is the capability-set
    /// intersection against `local_caps`. Newly wanted capabilities get
    /// proxies (which immediately queue their snapshot call).
    pub fn on_service_delta(
        &mut self,
        peer_id: &str,
        service_id: &str,
        service_type: &str,
        capabilities: &[String],
        names: &BTreeMap<String, String>,
        local_caps: &BTreeSet<String>,
        now_tick: u64,
    ) {
        let descriptor = ServiceDescriptor {
            service_id: service_id.to_owned(),
            peer_id: peer_id.to_owned(),
            service_type: service_type.to_owned(),
            capabilities: capabilities.iter().cloned().collect(),
            names: names.clone(),
        };
        let wanted_caps: Vec<String> = descriptor
            .capabilities
            .intersection(local_caps)
            .cloned()
            .collect();
        let wanted = !wanted_caps.is_empty();

        let contact_is_new = !self.contacts.contains_key(peer_id);
        if contact_is_new {
            self.contacts.insert(
                peer_id.to_owned(),
                Contact {
                    peer_id: peer_id.to_owned(),
                    subscription: Subscription::None,
                    services: BTreeMap::new(),
                },
            );
            self.events.push(RosterEvent::ContactAdded {
                peer_id: peer_id.to_owned(),
            });
        }

        let mut proxies = BTreeMap::new();
        for capability in &wanted_caps {
            match self.factories.get(capability) {
                Some(factory) => {
                    let mut proxy = factory(self.invocation_timeout_ticks);
                    proxy.begin_discovery(now_tick);
                    proxies.insert(capability.clone(), proxy);
                }
                None => {
                    info!(capability, "no proxy type known for wanted capability");
                }
            }
        }

        let Some(contact) = self.contacts.get_mut(peer_id) else {
            return;
        };
        let service_is_new = !contact.services.contains_key(service_id);
        contact.services.insert(
            service_id.to_owned(),
            ContactService {
                descriptor,
                wanted,
                proxies,
            },
        );
        if service_is_new {
            self.events.push(RosterEvent::ServiceAdded {
                peer_id: peer_id.to_owned(),
                service_id: service_id.to_owned(),
                wanted,
            });
        } else {
            debug!(peer_id, service_id, "service re-announced, descriptor replaced");
        }
    }

    /// Remove one service; removing the last service removes the contact.
    pub fn remove_service(&mut self, peer_id: &str, service_id: &str) {
        let Some(contact) = self.contacts.get_mut(peer_id) else {
            return;
        };
        if contact.services.remove(service_id).is_some() {
            self.events.push(RosterEvent::ServiceRemoved {
                peer_id: peer_id.to_owned(),
                service_id: service_id.to_owned(),
            });
        }
        if contact.services.is_empty() {
            self.contacts.remove(peer_id);
            self.events.push(RosterEvent::ContactRemoved {
                peer_id: peer_id.to_owned(),
            });
        }
    }

    /// Remove every contact, emitting removal events for each. Used on
    /// disconnect; proxies (and their pending tables) are dropped with
    /// their owners, silently abandoning any late responses.
    pub fn clear(&mut self) {
        let contacts = std::mem::take(&mut self.contacts);
        for (peer_id, contact) in contacts {
            for service_id in contact.services.keys() {
                self.events.push(RosterEvent::ServiceRemoved {
                    peer_id: peer_id.clone(),
                    service_id: service_id.clone(),
                });
            }
            self.events.push(RosterEvent::ContactRemoved { peer_id });
        }
    }

    /// Drain queued lifecycle events.
    pub fn take_events(&mut self) -> Vec<RosterEvent> {
        std::mem::take(&mut self.events)
    }
}
