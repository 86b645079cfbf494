//! Service adapters: bridge a locally-implemented capability to the wire.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::registry::{VP_PLAYER, VP_TRANSCRIPT};

/// Outbound traffic an adapter produced: property-change events and method
/// responses, drained by the client and turned into invocation envelopes.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Event { aspect: String, value: Value },
    Response { invocation_id: String, value: Value },
}

/// One adapter per capability contract. Maps aspect strings onto native
/// getter/setter/method dispatch for the wrapped object.
pub trait ServiceAdapter {
    fn capability(&self) -> &'static str;

    /// Snapshot of every currently-set readable property, used to seed a
    /// newly created remote proxy. Unset optional properties are absent.
    fn collect_properties(&self) -> BTreeMap<String, Value>;

    /// Route an inbound call to the native object. Property aspects with
    /// arguments are setter pushes; method aspects dispatch natively.
    /// Returns true iff a response envelope must be sent back.
    /// Unknown aspects are logged and dropped.
    fn invoke(&mut self, invocation_id: &str, aspect: &str, arguments: Option<Value>) -> bool;

    /// The host calls this after the native object's observable property
    /// changed, so the adapter can emit the matching event.
    fn property_changed(&mut self, aspect: &str);

    /// Drain queued events and responses.
    fn take_events(&mut self) -> Vec<AdapterEvent>;
}

/// Native surface of the VideoProfile player contract.
pub trait Player {
    fn playing(&self) -> bool;
    fn set_playing(&mut self, playing: bool);
    fn volume(&self) -> f64;
    fn set_volume(&mut self, volume: f64);
    fn playable_uris(&self) -> Vec<String>;
    fn play(&mut self);
    fn pause(&mut self);
    /// Skip forward. Returns whether there was a next item.
    fn next(&mut self) -> bool;
    /// Skip back. Returns whether there was a previous item.
    fn prev(&mut self) -> bool;
}

pub struct PlayerAdapter<P: Player> {
    player: P,
    events: Vec<AdapterEvent>,
}

impl<P: Player> PlayerAdapter<P> {
    pub fn new(player: P) -> Self {
        Self {
            player,
            events: Vec::new(),
        }
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    fn current_value(&self, aspect: &str) -> Option<Value> {
        match aspect {
            "playing" => Some(Value::Bool(self.player.playing())),
            "volume" => Some(Value::from(self.player.volume())),
            "playable-uris" => Some(Value::from(self.player.playable_uris())),
            _ => None,
        }
    }

    fn emit_event(&mut self, aspect: &str) {
        if let Some(value) = self.current_value(aspect) {
            self.events.push(AdapterEvent::Event {
                aspect: aspect.to_owned(),
                value,
            });
        }
    }
}

impl<P: Player> ServiceAdapter for PlayerAdapter<P> {
    fn capability(&self) -> &'static str {
        VP_PLAYER
    }

    fn collect_properties(&self) -> BTreeMap<String, Value> {
        let mut props = BTreeMap::new();
        props.insert("playing".to_owned(), Value::Bool(self.player.playing()));
        props.insert("volume".to_owned(), Value::from(self.player.volume()));
        props.insert(
            "playable-uris".to_owned(),
            Value::from(self.player.playable_uris()),
        );
        props
    }

    fn invoke(&mut self, invocation_id: &str, aspect: &str, arguments: Option<Value>) -> bool {
        match aspect {
            "play" => {
                self.player.play();
                false
            }
            "pause" => {
                self.player.pause();
                false
            }
            "next" => {
                let moved = self.player.next();
                self.events.push(AdapterEvent::Response {
                    invocation_id: invocation_id.to_owned(),
                    value: Value::Bool(moved),
                });
                true
            }
            "prev" => {
                let moved = self.player.prev();
                self.events.push(AdapterEvent::Response {
                    invocation_id: invocation_id.to_owned(),
                    value: Value::Bool(moved),
                });
                true
            }
            "playing" => {
                match arguments.as_ref().and_then(Value::as_bool) {
                    Some(playing) => {
                        self.player.set_playing(playing);
                        self.emit_event("playing");
                    }
                    None => warn!(aspect, "player setter push without boolean argument"),
                }
                false
            }
            "volume" => {
                match arguments.as_ref().and_then(Value::as_f64) {
                    Some(volume) => {
                        self.player.set_volume(volume);
                        self.emit_event("volume");
                    }
                    None => warn!(aspect, "player setter push without numeric argument"),
                }
                false
            }
            _ => {
                warn!(capability = VP_PLAYER, aspect, "unknown aspect invoked");
                false
            }
        }
    }

    fn property_changed(&mut self, aspect: &str) {
        if self.current_value(aspect).is_some() {
            self.emit_event(aspect);
        } else {
            warn!(capability = VP_PLAYER, aspect, "change for unknown aspect");
        }
    }

    fn take_events(&mut self) -> Vec<AdapterEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Native surface of the VideoProfile transcript contract. The current
/// text is optional: absent until the first utterance.
pub trait Transcript {
    fn available_locales(&self) -> Vec<String>;
    fn current_text(&self) -> Option<String>;
    fn locale(&self) -> String;
    fn set_locale(&mut self, locale: &str);
}

pub struct TranscriptAdapter<T: Transcript> {
    transcript: T,
    events: Vec<AdapterEvent>,
}

impl<T: Transcript> TranscriptAdapter<T> {
    pub fn new(transcript: T) -> Self {
        Self {
            transcript,
            events: Vec::new(),
        }
    }

    pub fn transcript(&self) -> &T {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut T {
        &mut self.transcript
    }

    fn current_value(&self, aspect: &str) -> Option<Value> {
        match aspect {
            "available-locales" => Some(Value::from(self.transcript.available_locales())),
            "current-text" => self.transcript.current_text().map(Value::from),
            "locale" => Some(Value::from(self.transcript.locale())),
            _ => None,
        }
    }

    fn emit_event(&mut self, aspect: &str) {
        if let Some(value) = self.current_value(aspect) {
            self.events.push(AdapterEvent::Event {
                aspect: aspect.to_owned(),
                value,
            });
        }
    }
}

impl<T: Transcript> ServiceAdapter for TranscriptAdapter<T> {
    fn capability(&self) -> &'static str {
        VP_TRANSCRIPT
    }

    fn collect_properties(&self) -> BTreeMap<String, Value> {
        let mut props = BTreeMap::new();
        props.insert(
            "available-locales".to_owned(),
            Value::from(self.transcript.available_locales()),
        );
        if let Some(text) = self.transcript.current_text() {
            props.insert("current-text".to_owned(), Value::from(text));
        }
        props.insert("locale".to_owned(), Value::from(self.transcript.locale()));
        props
    }

    fn invoke(&mut self, _invocation_id: &str, aspect: &str, arguments: Option<Value>) -> bool {
        match aspect {
            "locale" => {
                match arguments.as_ref().and_then(Value::as_str) {
                    Some(locale) => {
                        self.transcript.set_locale(locale);
                        self.emit_event("locale");
                    }
                    None => warn!(aspect, "transcript setter push without string argument"),
                }
                false
            }
            _ => {
                warn!(capability = VP_TRANSCRIPT, aspect, "unknown aspect invoked");
                false
            }
        }
    }

    fn property_changed(&mut self, aspect: &str) {
        match aspect {
            "available-locales" | "current-text" | "locale" => self.emit_event(aspect),
            _ => warn!(capability = VP_TRANSCRIPT, aspect, "change for unknown aspect"),
        }
    }

    fn take_events(&mut self) -> Vec<AdapterEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Minimal in-memory player used across the crate's tests.
    pub struct FakePlayer {
        pub playing: bool,
        pub volume: f64,
        pub uris: Vec<String>,
        pub has_next: bool,
    }

    impl Default for FakePlayer {
        fn default() -> Self {
            Self {
                playing: false,
                volume: 0.5,
                uris: vec!["http://example.com/a.ogv".to_owned()],
                has_next: true,
            }
        }
    }

    impl Player for FakePlayer {
        fn playing(&self) -> bool {
            self.playing
        }
        fn set_playing(&mut self, playing: bool) {
            self.playing = playing;
        }
        fn volume(&self) -> f64 {
            self.volume
        }
        fn set_volume(&mut self, volume: f64) {
            self.volume = volume;
        }
        fn playable_uris(&self) -> Vec<String> {
            self.uris.clone()
        }
        fn play(&mut self) {
            self.playing = true;
        }
        fn pause(&mut self) {
            self.playing = false;
        }
        fn next(&mut self) -> bool {
            self.has_next
        }
        fn prev(&mut self) -> bool {
            false
        }
    }

    pub struct FakeTranscript {
        pub locales: Vec<String>,
        pub text: Option<String>,
        pub locale: String,
    }

    impl Default for FakeTranscript {
        fn default() -> Self {
            Self {
                locales: vec!["en".to_owned(), "fi".to_owned()],
                text: None,
                locale: "en".to_owned(),
            }
        }
    }

    impl Transcript for FakeTranscript {
        fn available_locales(&self) -> Vec<String> {
            self.locales.clone()
        }
        fn current_text(&self) -> Option<String> {
            self.text.clone()
        }
        fn locale(&self) -> String {
            self.locale.clone()
        }
        fn set_locale(&mut self, locale: &str) {
            self.locale = locale.to_owned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{FakePlayer, FakeTranscript};
    use super::*;
    use serde_json::json;

    #[test]
    fn collect_properties_includes_readable_set() {
        let adapter = PlayerAdapter::new(FakePlayer::default());
        let props = adapter.collect_properties();
        assert_eq!(props.get("volume"), Some(&json!(0.5)));
        assert_eq!(props.get("playing"), Some(&json!(false)));
        assert!(props.contains_key("playable-uris"));
    }

    #[test]
    fn native_change_emits_event() {
        let mut adapter = PlayerAdapter::new(FakePlayer::default());
        adapter.player_mut().volume = 0.8;
        adapter.property_changed("volume");
        let events = adapter.take_events();
        assert_eq!(
            events,
            vec![AdapterEvent::Event {
                aspect: "volume".to_owned(),
                value: json!(0.8),
            }]
        );
        // Drained: a second take is empty.
        assert!(adapter.take_events().is_empty());
    }

    #[test]
    fn method_with_response_keeps_envelope() {
        let mut adapter = PlayerAdapter::new(FakePlayer::default());
        assert!(adapter.invoke("inv-1", "next", None));
        let events = adapter.take_events();
        assert_eq!(
            events,
            vec![AdapterEvent::Response {
                invocation_id: "inv-1".to_owned(),
                value: json!(true),
            }]
        );
    }

    #[test]
    fn fire_and_forget_methods_produce_no_response() {
        let mut adapter = PlayerAdapter::new(FakePlayer::default());
        assert!(!adapter.invoke("inv-2", "play", None));
        assert!(adapter.player().playing);
        assert!(adapter.take_events().is_empty());
    }

    #[test]
    fn setter_push_applies_and_echoes_event() {
        let mut adapter = PlayerAdapter::new(FakePlayer::default());
        assert!(!adapter.invoke("inv-3", "volume", Some(json!(0.9))));
        assert_eq!(adapter.player().volume, 0.9);
        let events = adapter.take_events();
        assert_eq!(
            events,
            vec![AdapterEvent::Event {
                aspect: "volume".to_owned(),
                value: json!(0.9),
            }]
        );
    }

    #[test]
    fn setter_push_with_wrong_type_is_dropped() {
        let mut adapter = PlayerAdapter::new(FakePlayer::default());
        assert!(!adapter.invoke("inv-4", "volume", Some(json!("loud"))));
        assert_eq!(adapter.player().volume, 0.5);
        assert!(adapter.take_events().is_empty());
    }

    #[test]
    fn unknown_aspect_is_dropped() {
        let mut adapter = PlayerAdapter::new(FakePlayer::default());
        assert!(!adapter.invoke("inv-5", "shuffle", None));
        assert!(adapter.take_events().is_empty());
    }

    #[test]
    fn transcript_unset_text_absent_from_snapshot() {
        let adapter = TranscriptAdapter::new(FakeTranscript::default());
        let props = adapter.collect_properties();
        assert!(!props.contains_key("current-text"));
        assert!(props.contains_key("available-locales"));
        assert_eq!(props.get("locale"), Some(&json!("en")));
    }

    #[test]
    fn transcript_text_present_once_set() {
        let mut adapter = TranscriptAdapter::new(FakeTranscript::default());
        adapter.transcript_mut().text = Some("hello".to_owned());
        let props = adapter.collect_properties();
        assert_eq!(props.get("current-text"), Some(&json!("hello")));

        adapter.property_changed("current-text");
        let events = adapter.take_events();
        assert_eq!(
            events,
            vec![AdapterEvent::Event {
                aspect: "current-text".to_owned(),
                value: json!("hello"),
            }]
        );
    }

    #[test]
    fn transcript_locale_setter_push() {
        let mut adapter = TranscriptAdapter::new(FakeTranscript::default());
        assert!(!adapter.invoke("inv-6", "locale", Some(json!("fi"))));
        assert_eq!(adapter.transcript().locale, "fi");
        assert_eq!(adapter.take_events().len(), 1);
    }
}
