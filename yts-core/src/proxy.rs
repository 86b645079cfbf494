//! Proxies: local mirrors of a remote service's capability state.

use std::any::Any;

use serde_json::Value;
use tracing::{error, warn};

use crate::correlate::Correlator;
use crate::metadata::COLLECT_PROPERTIES;
use crate::registry::{VP_PLAYER, VP_TRANSCRIPT};

/// Outbound invocation a proxy wants sent to its remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyCommand {
    pub invocation_id: String,
    pub aspect: String,
    pub arguments: Option<Value>,
}

/// Local notifications surfaced to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyNotification {
    PropertyChanged { aspect: String },
    MethodReturned { aspect: String, value: Value },
    InvocationTimedOut { aspect: String },
}

/// The remote-mirroring counterpart of a service adapter. Inbound events
/// and responses mutate the cached snapshot; local writes and calls are
/// queued as outbound invocations.
pub trait Proxy {
    fn capability(&self) -> &'static str;

    /// Issue the reserved snapshot call; the matching response seeds the
    /// property cache. Called once when the proxy is created.
    fn begin_discovery(&mut self, now_tick: u64);

    /// Apply an inbound property-change event to the cache. Unknown aspect
    /// or type mismatch is logged and ignored.
    fn apply_event(&mut self, aspect: &str, value: Value);

    /// Resolve an inbound response against the pending table. A response
    /// for an unknown (or already-resolved) id is a protocol violation:
    /// logged, no state change, no crash.
    fn apply_response(&mut self, invocation_id: &str, value: Value);

    /// Time out pending invocations older than the configured deadline.
    fn expire(&mut self, now_tick: u64);

    /// Drain queued outbound invocations.
    fn take_commands(&mut self) -> Vec<ProxyCommand>;

    /// Drain queued local notifications.
    fn take_notifications(&mut self) -> Vec<ProxyNotification>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlayerCall {
    CollectProperties,
    Next,
    Prev,
}

impl PlayerCall {
    fn aspect(self) -> &'static str {
        match self {
            PlayerCall::CollectProperties => COLLECT_PROPERTIES,
            PlayerCall::Next => "next",
            PlayerCall::Prev => "prev",
        }
    }
}

/// Mirror of a remote VideoProfile player.
pub struct PlayerProxy {
    playing: bool,
    volume: f64,
    playable_uris: Vec<String>,
    correlator: Correlator<PlayerCall>,
    commands: Vec<ProxyCommand>,
    notifications: Vec<ProxyNotification>,
}

impl PlayerProxy {
    pub fn new(invocation_timeout_ticks: u64) -> Self {
        Self {
            playing: false,
            volume: 0.0,
            playable_uris: Vec::new(),
            correlator: Correlator::with_timeout(invocation_timeout_ticks),
            commands: Vec::new(),
            notifications: Vec::new(),
        }
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn playable_uris(&self) -> &[String] {
        &self.playable_uris
    }

    /// Optimistic write: update the cache, notify, and push the invocation
    /// carrying the new value.
    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        self.notify_changed("playing");
        self.push_command("playing", Some(Value::Bool(playing)));
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
        self.notify_changed("volume");
        self.push_command("volume", Some(Value::from(volume)));
    }

    pub fn play(&mut self) {
        self.push_command("play", None);
    }

    pub fn pause(&mut self) {
        self.push_command("pause", None);
    }

    /// Call `next` on the remote player; the answer arrives as a
    /// `MethodReturned` notification. A caller-supplied id correlates the
    /// call with an externally-known protocol.
    pub fn next(&mut self, invocation_id: Option<&str>, now_tick: u64) -> String {
        self.call(PlayerCall::Next, invocation_id, now_tick)
    }

    pub fn prev(&mut self, invocation_id: Option<&str>, now_tick: u64) -> String {
        self.call(PlayerCall::Prev, invocation_id, now_tick)
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.correlator.len()
    }

    fn call(&mut self, call: PlayerCall, invocation_id: Option<&str>, now_tick: u64) -> String {
        let id = match invocation_id {
            Some(id) => {
                self.correlator.register(id, call, now_tick);
                id.to_owned()
            }
            None => self.correlator.issue(call, now_tick),
        };
        self.commands.push(ProxyCommand {
            invocation_id: id.clone(),
            aspect: call.aspect().to_owned(),
            arguments: None,
        });
        id
    }

    fn push_command(&mut self, aspect: &str, arguments: Option<Value>) {
        self.commands.push(ProxyCommand {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            aspect: aspect.to_owned(),
            arguments,
        });
    }

    fn notify_changed(&mut self, aspect: &str) {
        self.notifications.push(ProxyNotification::PropertyChanged {
            aspect: aspect.to_owned(),
        });
    }
}

impl Proxy for PlayerProxy {
    fn capability(&self) -> &'static str {
        VP_PLAYER
    }

    fn begin_discovery(&mut self, now_tick: u64) {
        self.call(PlayerCall::CollectProperties, None, now_tick);
    }

    fn apply_event(&mut self, aspect: &str, value: Value) {
        match aspect {
            "playing" => match value.as_bool() {
                Some(playing) => {
                    self.playing = playing;
                    self.notify_changed("playing");
                }
                None => warn!(aspect, "event value is not a boolean"),
            },
            "volume" => match value.as_f64() {
                Some(volume) => {
                    self.volume = volume;
                    self.notify_changed("volume");
                }
                None => warn!(aspect, "event value is not a number"),
            },
            "playable-uris" => match string_list(&value) {
                Some(uris) => {
                    self.playable_uris = uris;
                    self.notify_changed("playable-uris");
                }
                None => warn!(aspect, "event value is not a string list"),
            },
            _ => warn!(capability = VP_PLAYER, aspect, "event for unknown aspect"),
        }
    }

    fn apply_response(&mut self, invocation_id: &str, value: Value) {
        match self.correlator.resolve(invocation_id) {
            Some(PlayerCall::CollectProperties) => apply_snapshot(self, value),
            Some(call @ (PlayerCall::Next | PlayerCall::Prev)) => {
                self.notifications.push(ProxyNotification::MethodReturned {
                    aspect: call.aspect().to_owned(),
                    value,
                });
            }
            None => error!(
                invocation_id,
                capability = VP_PLAYER,
                "response for unknown invocation"
            ),
        }
    }

    fn expire(&mut self, now_tick: u64) {
        for (_, call) in self.correlator.expire(now_tick) {
            self.notifications.push(ProxyNotification::InvocationTimedOut {
                aspect: call.aspect().to_owned(),
            });
        }
    }

    fn take_commands(&mut self) -> Vec<ProxyCommand> {
        std::mem::take(&mut self.commands)
    }

    fn take_notifications(&mut self) -> Vec<ProxyNotification> {
        std::mem::take(&mut self.notifications)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TranscriptCall {
    CollectProperties,
}

/// Mirror of a remote VideoProfile transcript.
pub struct TranscriptProxy {
    available_locales: Vec<String>,
    current_text: Option<String>,
    locale: String,
    correlator: Correlator<TranscriptCall>,
    commands: Vec<ProxyCommand>,
    notifications: Vec<ProxyNotification>,
}

impl TranscriptProxy {
    pub fn new(invocation_timeout_ticks: u64) -> Self {
        Self {
            available_locales: Vec::new(),
            current_text: None,
            locale: String::new(),
            correlator: Correlator::with_timeout(invocation_timeout_ticks),
            commands: Vec::new(),
            notifications: Vec::new(),
        }
    }

    pub fn available_locales(&self) -> &[String] {
        &self.available_locales
    }

    pub fn current_text(&self) -> Option<&str> {
        self.current_text.as_deref()
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn set_locale(&mut self, locale: &str) {
        self.locale = locale.to_owned();
        self.notifications.push(ProxyNotification::PropertyChanged {
            aspect: "locale".to_owned(),
        });
        self.commands.push(ProxyCommand {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            aspect: "locale".to_owned(),
            arguments: Some(Value::from(locale)),
        });
    }
}

impl Proxy for TranscriptProxy {
    fn capability(&self) -> &'static str {
        VP_TRANSCRIPT
    }

    fn begin_discovery(&mut self, now_tick: u64) {
        let id = self
            .correlator
            .issue(TranscriptCall::CollectProperties, now_tick);
        self.commands.push(ProxyCommand {
            invocation_id: id,
            aspect: COLLECT_PROPERTIES.to_owned(),
            arguments: None,
        });
    }

    fn apply_event(&mut self, aspect: &str, value: Value) {
        match aspect {
            "available-locales" => match string_list(&value) {
                Some(locales) => {
                    self.available_locales = locales;
                    self.notifications.push(ProxyNotification::PropertyChanged {
                        aspect: aspect.to_owned(),
                    });
                }
                None => warn!(aspect, "event value is not a string list"),
            },
            "current-text" => match value {
                Value::String(text) => {
                    self.current_text = Some(text);
                    self.notifications.push(ProxyNotification::PropertyChanged {
                        aspect: aspect.to_owned(),
                    });
                }
                Value::Null => {
                    self.current_text = None;
                    self.notifications.push(ProxyNotification::PropertyChanged {
                        aspect: aspect.to_owned(),
                    });
                }
                _ => warn!(aspect, "event value is not a string"),
            },
            "locale" => match value.as_str() {
                Some(locale) => {
                    self.locale = locale.to_owned();
                    self.notifications.push(ProxyNotification::PropertyChanged {
                        aspect: aspect.to_owned(),
                    });
                }
                None => warn!(aspect, "event value is not a string"),
            },
            _ => warn!(capability = VP_TRANSCRIPT, aspect, "event for unknown aspect"),
        }
    }

    fn apply_response(&mut self, invocation_id: &str, value: Value) {
        match self.correlator.resolve(invocation_id) {
            Some(TranscriptCall::CollectProperties) => apply_snapshot(self, value),
            None => error!(
                invocation_id,
                capability = VP_TRANSCRIPT,
                "response for unknown invocation"
            ),
        }
    }

    fn expire(&mut self, now_tick: u64) {
        for _ in self.correlator.expire(now_tick) {
            self.notifications.push(ProxyNotification::InvocationTimedOut {
                aspect: COLLECT_PROPERTIES.to_owned(),
            });
        }
    }

    fn take_commands(&mut self) -> Vec<ProxyCommand> {
        std::mem::take(&mut self.commands)
    }

    fn take_notifications(&mut self) -> Vec<ProxyNotification> {
        std::mem::take(&mut self.notifications)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Seed a proxy from a collected-properties response: every entry of the
/// map is applied as a property-change event.
fn apply_snapshot<P: Proxy + ?Sized>(proxy: &mut P, value: Value) {
    match value {
        Value::Object(map) => {
            for (aspect, v) in map {
                proxy.apply_event(&aspect, v);
            }
        }
        _ => warn!("collected-properties response is not a map"),
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect()
    })
}
