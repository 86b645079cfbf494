//! Host-driven coordinator: the host passes transport events in and sends
//! the returned actions out.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::metadata::{Direction, EnvelopeKind, Metadata, MetadataError, Node, COLLECT_PROPERTIES};
use crate::proxy::ProxyNotification;
use crate::registry;
use crate::roster::{Roster, RosterEvent};
use crate::service::{AdapterEvent, ServiceAdapter};
use crate::status::ClientStatus;
use crate::transfer::{IncomingTransfer, OutgoingTransfer, TransferSetupError};
use crate::wire;

/// Action for the host to perform.
#[derive(Debug)]
pub enum OutboundAction {
    /// Send a wire frame to a peer over the message transport.
    SendMessage { peer_id: String, frame: Vec<u8> },
    /// Publish a status fragment to the shared status broadcast.
    AdvertiseStatus {
        capability: String,
        service_id: String,
        status: String,
    },
}

/// Application-facing happenings, drained after feeding the client.
#[derive(Debug)]
pub enum ClientEvent {
    /// A plain one-shot message arrived.
    MessageReceived { peer_id: String, message: Metadata },
    /// A peer's status for a capability was replaced.
    RemoteStatusChanged {
        peer_id: String,
        service_id: String,
        capability: String,
    },
    Roster(RosterEvent),
    Proxy {
        peer_id: String,
        service_id: String,
        capability: String,
        notification: ProxyNotification,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("failed to decode message")]
    DecodeFailed,
}

/// Main coordinator. Owns the local status, the roster (and through it all
/// proxies), and the local service adapters.
pub struct YtsClient {
    service_id: String,
    status: ClientStatus,
    roster: Roster,
    adapters: BTreeMap<String, Box<dyn ServiceAdapter>>,
    remote_status: BTreeMap<(String, String, String), Metadata>,
    events: Vec<ClientEvent>,
    tick_count: u64,
    authenticated: bool,
    connected: bool,
}

impl YtsClient {
    pub fn new(config: &Config, service_id: &str) -> Self {
        Self {
            service_id: service_id.to_owned(),
            status: ClientStatus::new(),
            roster: Roster::new(config.invocation_timeout_ticks),
            adapters: BTreeMap::new(),
            remote_status: BTreeMap::new(),
            events: Vec::new(),
            tick_count: 0,
            authenticated: false,
            connected: false,
        }
    }

    /// The transport authenticated. Messages cannot flow yet; that happens
    /// on `on_ready`.
    pub fn on_authenticated(&mut self) {
        self.authenticated = true;
    }

    /// The transport finished connecting; the session is usable.
    pub fn on_ready(&mut self) {
        self.connected = true;
    }

    /// The transport dropped; every contact, proxy and pending table goes.
    pub fn on_disconnected(&mut self) {
        self.authenticated = false;
        self.connected = false;
        self.clear_roster();
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn status(&self) -> &ClientStatus {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut ClientStatus {
        &mut self.status
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    /// Expose a local capability implementation. The capability is added to
    /// the advertised set, so matching remote services become wanted.
    pub fn register_adapter(&mut self, adapter: Box<dyn ServiceAdapter>) {
        self.status.add_capability(adapter.capability());
        self.adapters.insert(adapter.capability().to_owned(), adapter);
    }

    /// A discovery delta for one remote service. Newly wanted proxies
    /// immediately emit their snapshot-seeding frames.
    pub fn on_roster_delta(
        &mut self,
        peer_id: &str,
        service_id: &str,
        service_type: &str,
        capabilities: &[String],
        names: &BTreeMap<String, String>,
    ) -> Vec<OutboundAction> {
        let local_caps = self.status.capabilities().clone();
        self.roster.on_service_delta(
            peer_id,
            service_id,
            service_type,
            capabilities,
            names,
            &local_caps,
            self.tick_count,
        );
        for event in self.roster.take_events() {
            self.events.push(ClientEvent::Roster(event));
        }
        self.flush_proxies()
    }

    /// A remote service disappeared from the presence mesh.
    pub fn on_service_removed(&mut self, peer_id: &str, service_id: &str) {
        self.roster.remove_service(peer_id, service_id);
        for event in self.roster.take_events() {
            self.events.push(ClientEvent::Roster(event));
        }
        self.remote_status
            .retain(|(p, s, _), _| !(p == peer_id && s == service_id));
    }

    /// Disconnect: drop every contact, proxy and pending table.
    pub fn clear_roster(&mut self) {
        self.roster.clear();
        for event in self.roster.take_events() {
            self.events.push(ClientEvent::Roster(event));
        }
        self.remote_status.clear();
    }

    /// Process a received wire frame: decode, route by envelope kind and
    /// capability, return response frames to send. Protocol violations are
    /// logged and dropped; only an undecodable frame is an error.
    pub fn on_message_received(
        &mut self,
        peer_id: &str,
        bytes: &[u8],
    ) -> Result<Vec<OutboundAction>, MessageError> {
        let (metadata, _consumed) =
            wire::decode_frame(bytes).map_err(|_| MessageError::DecodeFailed)?;
        let actions = match metadata.kind() {
            EnvelopeKind::Invocation => self.on_invocation(peer_id, &metadata),
            EnvelopeKind::Status => {
                self.on_status(peer_id, metadata);
                Vec::new()
            }
            EnvelopeKind::Message => {
                self.events.push(ClientEvent::MessageReceived {
                    peer_id: peer_id.to_owned(),
                    message: metadata,
                });
                Vec::new()
            }
        };
        Ok(actions)
    }

    /// Periodic tick (nominally 1 Hz): expire pending invocations and
    /// flush anything proxies queued.
    pub fn tick(&mut self) -> Vec<OutboundAction> {
        self.tick_count = self.tick_count.saturating_add(1);
        let now = self.tick_count;
        for contact in self.roster.contacts_mut() {
            for service in contact.services_mut() {
                for (_, proxy) in service.proxies_mut() {
                    proxy.expire(now);
                }
            }
        }
        self.flush_proxies()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The host calls this after a native object's observable property
    /// changed; the resulting events are broadcast to every known peer.
    pub fn adapter_property_changed(&mut self, capability: &str, aspect: &str) -> Vec<OutboundAction> {
        let Some(adapter) = self.adapters.get_mut(capability) else {
            warn!(capability, "property change for unregistered capability");
            return Vec::new();
        };
        adapter.property_changed(aspect);
        let events = adapter.take_events();
        let peers: Vec<String> = self.roster.contacts().map(|c| c.peer_id.clone()).collect();
        let mut actions = Vec::new();
        for event in events {
            match event {
                AdapterEvent::Event { aspect, value } => {
                    for peer in &peers {
                        push_invocation_frame(
                            &mut actions,
                            peer,
                            &uuid::Uuid::new_v4().to_string(),
                            capability,
                            &aspect,
                            Some(&value),
                            Direction::Event,
                        );
                    }
                }
                AdapterEvent::Response { .. } => {
                    debug!(capability, "stray response outside an invocation, dropped");
                }
            }
        }
        actions
    }

    /// Update the local status for a capability and re-advertise it.
    pub fn set_status(
        &mut self,
        capability: &str,
        activity: &str,
        attributes: &[(&str, &str)],
        payload: Option<Node>,
    ) -> Result<Vec<OutboundAction>, MetadataError> {
        let service_id = self.service_id.clone();
        let status = self
            .status
            .set(capability, activity, &service_id, attributes, payload)?;
        Ok(vec![OutboundAction::AdvertiseStatus {
            capability: capability.to_owned(),
            service_id,
            status: status.to_string(),
        }])
    }

    /// Send a one-shot message envelope to a peer.
    pub fn send_message(
        &self,
        peer_id: &str,
        message: &Metadata,
    ) -> Result<OutboundAction, wire::FrameEncodeError> {
        let frame = wire::encode_frame(message)?;
        Ok(OutboundAction::SendMessage {
            peer_id: peer_id.to_owned(),
            frame,
        })
    }

    /// Turn invocations queued by proxies (snapshot calls, property writes,
    /// method calls) into frames, and surface their notifications. Call
    /// after mutating a proxy directly.
    pub fn flush_proxies(&mut self) -> Vec<OutboundAction> {
        let mut actions = Vec::new();
        let mut events = Vec::new();
        for contact in self.roster.contacts_mut() {
            let peer_id = contact.peer_id.clone();
            for service in contact.services_mut() {
                let service_id = service.descriptor.service_id.clone();
                for (capability, proxy) in service.proxies_mut() {
                    for command in proxy.take_commands() {
                        push_invocation_frame(
                            &mut actions,
                            &peer_id,
                            &command.invocation_id,
                            capability,
                            &command.aspect,
                            command.arguments.as_ref(),
                            Direction::Call,
                        );
                    }
                    for notification in proxy.take_notifications() {
                        events.push(ClientEvent::Proxy {
                            peer_id: peer_id.clone(),
                            service_id: service_id.clone(),
                            capability: capability.clone(),
                            notification,
                        });
                    }
                }
            }
        }
        self.events.append(&mut events);
        actions
    }

    /// Start an outgoing file transfer. Validation happens here, before
    /// any channel is negotiated; the sender service id is our own.
    pub fn send_file(
        &self,
        recipient_contact: Option<&str>,
        recipient_service: Option<&str>,
        file: Option<(PathBuf, u64)>,
        description: &str,
    ) -> Result<OutgoingTransfer, TransferSetupError> {
        OutgoingTransfer::new(
            self.connected,
            file,
            recipient_contact,
            recipient_service,
            Some(self.service_id.as_str()),
            description,
        )
    }

    /// The transport offered us an incoming file channel.
    pub fn on_incoming_file_channel(
        &self,
        peer_id: &str,
        service_id: &str,
        name: &str,
        size: u64,
        offset: u64,
        channel: Option<u64>,
    ) -> IncomingTransfer {
        IncomingTransfer::new(peer_id, service_id, name, size, offset, channel)
    }

    /// Drain application-facing events.
    pub fn take_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// The most recent status a peer service advertised for a capability.
    pub fn remote_status(
        &self,
        peer_id: &str,
        service_id: &str,
        capability: &str,
    ) -> Option<&Metadata> {
        self.remote_status.get(&(
            peer_id.to_owned(),
            service_id.to_owned(),
            capability.to_owned(),
        ))
    }

    fn on_invocation(&mut self, peer_id: &str, metadata: &Metadata) -> Vec<OutboundAction> {
        let (Some(invocation_id), Some(capability), Some(aspect), Some(direction)) = (
            metadata.invocation_id(),
            metadata.capability(),
            metadata.aspect(),
            metadata.direction(),
        ) else {
            warn!(peer_id, "invocation envelope missing required attributes, dropped");
            return Vec::new();
        };
        let arguments = match metadata.arguments() {
            Ok(args) => args,
            Err(_) => {
                warn!(peer_id, aspect, "invocation arguments failed to parse, dropped");
                return Vec::new();
            }
        };
        match direction {
            Direction::Call => {
                self.on_invocation_call(peer_id, invocation_id, capability, aspect, arguments)
            }
            Direction::Event => {
                self.apply_to_proxy(peer_id, capability, |proxy| {
                    proxy.apply_event(aspect, arguments.unwrap_or(Value::Null));
                });
                Vec::new()
            }
            Direction::Response => {
                self.apply_to_proxy(peer_id, capability, |proxy| {
                    proxy.apply_response(invocation_id, arguments.unwrap_or(Value::Null));
                });
                Vec::new()
            }
        }
    }

    fn on_invocation_call(
        &mut self,
        peer_id: &str,
        invocation_id: &str,
        capability: &str,
        aspect: &str,
        arguments: Option<Value>,
    ) -> Vec<OutboundAction> {
        if aspect != COLLECT_PROPERTIES {
            if let Some(contract) = registry::lookup(capability) {
                let is_method = contract.method(aspect).is_some();
                if !is_method && contract.property(aspect).is_none() {
                    warn!(capability, aspect, "aspect not in capability contract, dropped");
                    return Vec::new();
                }
                if arguments.is_some() && !is_method && !contract.is_writable(aspect) {
                    warn!(capability, aspect, "setter push for read-only property, dropped");
                    return Vec::new();
                }
            }
        }
        let Some(adapter) = self.adapters.get_mut(capability) else {
            warn!(peer_id, capability, "call for capability with no local service, dropped");
            return Vec::new();
        };
        let mut actions = Vec::new();
        if aspect == COLLECT_PROPERTIES {
            let snapshot: serde_json::Map<String, Value> =
                adapter.collect_properties().into_iter().collect();
            push_invocation_frame(
                &mut actions,
                peer_id,
                invocation_id,
                capability,
                aspect,
                Some(&Value::Object(snapshot)),
                Direction::Response,
            );
            return actions;
        }
        let keep_response = adapter.invoke(invocation_id, aspect, arguments);
        for event in adapter.take_events() {
            match event {
                AdapterEvent::Event { aspect, value } => {
                    push_invocation_frame(
                        &mut actions,
                        peer_id,
                        &uuid::Uuid::new_v4().to_string(),
                        capability,
                        &aspect,
                        Some(&value),
                        Direction::Event,
                    );
                }
                AdapterEvent::Response {
                    invocation_id,
                    value,
                } => {
                    if keep_response {
                        push_invocation_frame(
                            &mut actions,
                            peer_id,
                            &invocation_id,
                            capability,
                            aspect,
                            Some(&value),
                            Direction::Response,
                        );
                    }
                }
            }
        }
        actions
    }

    fn on_status(&mut self, peer_id: &str, metadata: Metadata) {
        let (Some(capability), Some(from_service)) = (
            metadata.attribute("capability").map(str::to_owned),
            metadata.attribute("from-service").map(str::to_owned),
        ) else {
            warn!(peer_id, "status envelope missing capability or from-service, dropped");
            return;
        };
        if !self.status.has_interest(&capability) {
            debug!(peer_id, capability, "status for capability without interest, dropped");
            return;
        }
        // Replace semantics: a newer status supersedes, never merges.
        self.remote_status.insert(
            (peer_id.to_owned(), from_service.clone(), capability.clone()),
            metadata,
        );
        self.events.push(ClientEvent::RemoteStatusChanged {
            peer_id: peer_id.to_owned(),
            service_id: from_service,
            capability,
        });
    }

    fn apply_to_proxy<F>(&mut self, peer_id: &str, capability: &str, f: F)
    where
        F: FnOnce(&mut Box<dyn crate::proxy::Proxy>),
    {
        match self.roster.proxy_entry_for(peer_id, capability) {
            Some((service_id, proxy)) => {
                f(proxy);
                let notifications = proxy.take_notifications();
                for notification in notifications {
                    self.events.push(ClientEvent::Proxy {
                        peer_id: peer_id.to_owned(),
                        service_id: service_id.clone(),
                        capability: capability.to_owned(),
                        notification,
                    });
                }
            }
            None => {
                warn!(peer_id, capability, "no proxy mirrors this capability, dropped");
            }
        }
    }
}

fn push_invocation_frame(
    actions: &mut Vec<OutboundAction>,
    peer_id: &str,
    invocation_id: &str,
    capability: &str,
    aspect: &str,
    arguments: Option<&Value>,
    direction: Direction,
) {
    let envelope = Metadata::invocation(invocation_id, capability, aspect, arguments, direction);
    // Encoding only fails on oversized arguments; drop and keep the session alive.
    match wire::encode_frame(&envelope) {
        Ok(frame) => actions.push(OutboundAction::SendMessage {
            peer_id: peer_id.to_owned(),
            frame,
        }),
        Err(err) => warn!(%err, aspect, "failed to encode invocation frame, dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{PlayerProxy, ProxyNotification};
    use crate::registry::VP_PLAYER;
    use crate::service::testutil::FakePlayer;
    use crate::service::PlayerAdapter;
    use serde_json::json;

    fn client(service_id: &str) -> YtsClient {
        YtsClient::new(&Config::default(), service_id)
    }

    fn deliver(
        from: &str,
        actions: Vec<OutboundAction>,
        to: &mut YtsClient,
    ) -> Vec<OutboundAction> {
        let mut out = Vec::new();
        for action in actions {
            if let OutboundAction::SendMessage { frame, .. } = action {
                out.extend(to.on_message_received(from, &frame).unwrap());
            }
        }
        out
    }

    fn caps(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| (*s).to_owned()).collect()
    }

    /// Two clients wired back-to-back: A serves a player, B mirrors it.
    fn discovered_pair() -> (YtsClient, YtsClient) {
        let mut a = client("svc-a");
        a.register_adapter(Box::new(PlayerAdapter::new(FakePlayer::default())));
        let mut b = client("svc-b");
        b.status_mut().add_capability(VP_PLAYER);

        // Both sides learn about each other from the presence mesh.
        a.on_roster_delta("b@example.com", "svc-b", "player", &caps(&[VP_PLAYER]), &BTreeMap::new());
        let seed = b.on_roster_delta(
            "a@example.com",
            "svc-a",
            "player",
            &caps(&[VP_PLAYER]),
            &BTreeMap::new(),
        );
        // B's fresh proxy asked for the snapshot; run it through A and back.
        let responses = deliver("b@example.com", seed, &mut a);
        let leftover = deliver("a@example.com", responses, &mut b);
        assert!(leftover.is_empty());
        (a, b)
    }

    fn player_proxy(b: &mut YtsClient) -> &mut PlayerProxy {
        b.roster_mut()
            .proxy_for("a@example.com", VP_PLAYER)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<PlayerProxy>()
            .unwrap()
    }

    #[test]
    fn snapshot_seeds_proxy_over_the_wire() {
        let (_a, mut b) = discovered_pair();
        let proxy = player_proxy(&mut b);
        assert_eq!(proxy.volume(), 0.5);
        assert!(!proxy.playing());
        assert_eq!(proxy.playable_uris().len(), 1);
    }

    #[test]
    fn native_change_reaches_remote_proxy() {
        let (mut a, mut b) = discovered_pair();
        b.take_events();
        // Mutate the native object (a setter push works; drain its echo),
        // then let the host report the change.
        if let Some(adapter) = a.adapters.get_mut(VP_PLAYER) {
            adapter.invoke("seed", "volume", Some(json!(0.8)));
            adapter.take_events();
        }
        let actions = a.adapter_property_changed(VP_PLAYER, "volume");
        assert!(!actions.is_empty());
        deliver("a@example.com", actions, &mut b);
        assert_eq!(player_proxy(&mut b).volume(), 0.8);
        let changed = b.take_events().into_iter().any(|e| {
            matches!(
                e,
                ClientEvent::Proxy {
                    notification: ProxyNotification::PropertyChanged { ref aspect },
                    ..
                } if aspect == "volume"
            )
        });
        assert!(changed);
    }

    #[test]
    fn method_call_round_trip() {
        let (mut a, mut b) = discovered_pair();
        b.take_events();
        player_proxy(&mut b).next(None, 0);
        let calls = b.flush_proxies();
        let responses = deliver("b@example.com", calls, &mut a);
        deliver("a@example.com", responses, &mut b);
        let returned = b.take_events().into_iter().any(|e| {
            matches!(
                e,
                ClientEvent::Proxy {
                    notification: ProxyNotification::MethodReturned { ref aspect, ref value },
                    ..
                } if aspect == "next" && *value == json!(true)
            )
        });
        assert!(returned);
    }

    #[test]
    fn property_write_round_trip() {
        let (mut a, mut b) = discovered_pair();
        player_proxy(&mut b).set_volume(0.25);
        let pushes = b.flush_proxies();
        let echoes = deliver("b@example.com", pushes, &mut a);
        // The setter push produced an echo event, not a response.
        assert!(!echoes.is_empty());
        deliver("a@example.com", echoes, &mut b);
        assert_eq!(player_proxy(&mut b).volume(), 0.25);
    }

    #[test]
    fn unknown_capability_call_is_dropped() {
        let mut a = client("svc-a");
        let envelope = Metadata::invocation("i1", "org.example.Nope", "poke", None, Direction::Call);
        let frame = wire::encode_frame(&envelope).unwrap();
        let actions = a.on_message_received("b@example.com", &frame).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn setter_push_for_read_only_property_is_dropped() {
        let (mut a, _b) = discovered_pair();
        let envelope = Metadata::invocation(
            "i2",
            VP_PLAYER,
            "playable-uris",
            Some(&json!(["u9"])),
            Direction::Call,
        );
        let frame = wire::encode_frame(&envelope).unwrap();
        let actions = a.on_message_received("b@example.com", &frame).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn aspect_outside_contract_is_dropped() {
        let (mut a, _b) = discovered_pair();
        let envelope = Metadata::invocation("i3", VP_PLAYER, "shuffle", None, Direction::Call);
        let frame = wire::encode_frame(&envelope).unwrap();
        let actions = a.on_message_received("b@example.com", &frame).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn undecodable_frame_is_an_error() {
        let mut a = client("svc-a");
        assert!(matches!(
            a.on_message_received("b@example.com", &[1, 2, 3, 4, 5, 6, 7, 8]),
            Err(MessageError::DecodeFailed)
        ));
    }

    #[test]
    fn wanted_unwanted_partition() {
        let mut b = client("svc-b");
        b.status_mut().add_capability("org.example.A");
        b.roster_mut()
            .register_proxy_factory("org.example.A", |ticks| Box::new(PlayerProxy::new(ticks)));

        // Overlap: wanted, proxy created.
        b.on_roster_delta(
            "p1@example.com",
            "svc1",
            "thing",
            &caps(&["org.example.A", "org.example.B"]),
            &BTreeMap::new(),
        );
        assert!(b.roster_mut().proxy_for("p1@example.com", "org.example.A").is_some());

        // No overlap: unwanted, metadata-only service, still reachable by
        // plain messages.
        b.on_roster_delta(
            "p2@example.com",
            "svc1",
            "thing",
            &caps(&["org.example.B"]),
            &BTreeMap::new(),
        );
        let contact = b.roster().contact("p2@example.com").unwrap();
        let service = contact.service("svc1").unwrap();
        assert!(!service.wanted);
        assert_eq!(service.proxy_count(), 0);

        let msg = Metadata::message(&[("subject", "hi")]);
        let frame = wire::encode_frame(&msg).unwrap();
        b.on_message_received("p2@example.com", &frame).unwrap();
        let got = b
            .take_events()
            .into_iter()
            .any(|e| matches!(e, ClientEvent::MessageReceived { ref peer_id, .. } if peer_id == "p2@example.com"));
        assert!(got);
    }

    #[test]
    fn status_replace_semantics_with_interest() {
        let mut b = client("svc-b");
        b.status_mut().add_interest("org.example.Foo");

        let s1 = Metadata::status("org.example.Foo", "playing", "svc-a", &[]).unwrap();
        let f1 = wire::encode_frame(&s1).unwrap();
        b.on_message_received("a@example.com", &f1).unwrap();
        let stored = b
            .remote_status("a@example.com", "svc-a", "org.example.Foo")
            .unwrap();
        assert_eq!(stored.attribute("activity"), Some("playing"));

        let s2 = Metadata::status("org.example.Foo", "paused", "svc-a", &[]).unwrap();
        let f2 = wire::encode_frame(&s2).unwrap();
        b.on_message_received("a@example.com", &f2).unwrap();
        let stored = b
            .remote_status("a@example.com", "svc-a", "org.example.Foo")
            .unwrap();
        assert_eq!(stored.attribute("activity"), Some("paused"));

        let changes = b
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, ClientEvent::RemoteStatusChanged { .. }))
            .count();
        assert_eq!(changes, 2);
    }

    #[test]
    fn status_without_interest_is_dropped() {
        let mut b = client("svc-b");
        let s = Metadata::status("org.example.Foo", "playing", "svc-a", &[]).unwrap();
        let frame = wire::encode_frame(&s).unwrap();
        b.on_message_received("a@example.com", &frame).unwrap();
        assert!(b.remote_status("a@example.com", "svc-a", "org.example.Foo").is_none());
    }

    #[test]
    fn pending_invocation_times_out_via_ticks() {
        let config = Config {
            invocation_timeout_ticks: 5,
        };
        let mut b = YtsClient::new(&config, "svc-b");
        b.status_mut().add_capability(VP_PLAYER);
        b.on_roster_delta(
            "a@example.com",
            "svc-a",
            "player",
            &caps(&[VP_PLAYER]),
            &BTreeMap::new(),
        );
        b.take_events();
        // The snapshot call never gets an answer.
        for _ in 0..6 {
            b.tick();
        }
        let timed_out = b.take_events().into_iter().any(|e| {
            matches!(
                e,
                ClientEvent::Proxy {
                    notification: ProxyNotification::InvocationTimedOut { .. },
                    ..
                }
            )
        });
        assert!(timed_out);
    }

    #[test]
    fn set_status_advertises() {
        let mut a = client("svc-a");
        a.status_mut().add_capability("org.example.Foo");
        let actions = a
            .set_status("org.example.Foo", "playing", &[("show", "news")], None)
            .unwrap();
        match &actions[0] {
            OutboundAction::AdvertiseStatus {
                capability,
                service_id,
                status,
            } => {
                assert_eq!(capability, "org.example.Foo");
                assert_eq!(service_id, "svc-a");
                let parsed = Metadata::parse(status).unwrap();
                assert_eq!(parsed.attribute("activity"), Some("playing"));
                assert_eq!(parsed.attribute("from-service"), Some("svc-a"));
            }
            other => panic!("expected AdvertiseStatus, got {other:?}"),
        }
    }

    #[test]
    fn service_removal_drops_remote_status() {
        let mut b = client("svc-b");
        b.status_mut().add_interest("org.example.Foo");
        b.on_roster_delta(
            "a@example.com",
            "svc-a",
            "thing",
            &caps(&["org.example.Foo"]),
            &BTreeMap::new(),
        );
        let s = Metadata::status("org.example.Foo", "playing", "svc-a", &[]).unwrap();
        let frame = wire::encode_frame(&s).unwrap();
        b.on_message_received("a@example.com", &frame).unwrap();
        b.on_service_removed("a@example.com", "svc-a");
        assert!(b.remote_status("a@example.com", "svc-a", "org.example.Foo").is_none());
        assert!(b.roster().contact("a@example.com").is_none());
    }

    #[test]
    fn clear_roster_on_disconnect() {
        let (_a, mut b) = discovered_pair();
        b.take_events();
        b.on_authenticated();
        b.on_ready();
        assert!(b.is_authenticated());
        b.on_disconnected();
        assert!(!b.is_connected());
        assert!(!b.is_authenticated());
        assert_eq!(b.roster().contacts().count(), 0);
        let removed = b
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, ClientEvent::Roster(RosterEvent::ContactRemoved { .. })))
            .count();
        assert_eq!(removed, 1);
    }

    #[test]
    fn send_file_requires_connection_and_recipient() {
        let mut a = client("svc-a");
        let file = Some((PathBuf::from("/tmp/movie.ogv"), 1000));
        assert_eq!(
            a.send_file(Some("b@example.com"), Some("svc-b"), file.clone(), "")
                .unwrap_err(),
            TransferSetupError::NoConnection
        );
        a.on_ready();
        assert_eq!(
            a.send_file(None, Some("svc-b"), file.clone(), "").unwrap_err(),
            TransferSetupError::NoRecipientContact
        );
        let transfer = a
            .send_file(Some("b@example.com"), Some("svc-b"), file, "a movie")
            .unwrap();
        assert_eq!(transfer.sender_service(), "svc-a");
        assert_eq!(transfer.progress(), 0.0);
    }

    #[test]
    fn incoming_file_channel_enters_requested() {
        let a = client("svc-a");
        let mut t = a.on_incoming_file_channel("b@example.com", "svc-b", "movie.ogv", 10, 0, Some(4));
        assert_eq!(t.progress(), 0.0);
        t.accept(PathBuf::from("/tmp/movie.ogv")).unwrap();
        t.on_data(10);
        t.on_complete();
        assert!(t.progress() > 1.0);
    }
}
