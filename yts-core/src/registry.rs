//! Capability contracts: per-capability aspect tables, read-only after start.

/// Fully qualified capability id of the VideoProfile player contract.
pub const VP_PLAYER: &str = "org.freedesktop.ytstenut.VideoProfile.Player";

/// Fully qualified capability id of the VideoProfile transcript contract.
pub const VP_TRANSCRIPT: &str = "org.freedesktop.ytstenut.VideoProfile.Transcript";

/// A property aspect a contract exposes.
#[derive(Debug, Clone, Copy)]
pub struct PropertySpec {
    pub name: &'static str,
    pub writable: bool,
}

/// A method aspect a contract exposes.
#[derive(Debug, Clone, Copy)]
pub struct MethodSpec {
    pub name: &'static str,
    /// Whether invoking this method produces a response envelope.
    pub expects_response: bool,
}

/// The aspect surface of one capability contract.
#[derive(Debug)]
pub struct Contract {
    pub capability: &'static str,
    pub properties: &'static [PropertySpec],
    pub methods: &'static [MethodSpec],
}

impl Contract {
    pub fn property(&self, aspect: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == aspect)
    }

    pub fn method(&self, aspect: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == aspect)
    }

    pub fn is_writable(&self, aspect: &str) -> bool {
        self.property(aspect).map(|p| p.writable).unwrap_or(false)
    }
}

static CONTRACTS: &[Contract] = &[
    Contract {
        capability: VP_PLAYER,
        properties: &[
            PropertySpec {
                name: "playing",
                writable: true,
            },
            PropertySpec {
                name: "volume",
                writable: true,
            },
            PropertySpec {
                name: "playable-uris",
                writable: false,
            },
        ],
        methods: &[
            MethodSpec {
                name: "play",
                expects_response: false,
            },
            MethodSpec {
                name: "pause",
                expects_response: false,
            },
            MethodSpec {
                name: "next",
                expects_response: true,
            },
            MethodSpec {
                name: "prev",
                expects_response: true,
            },
        ],
    },
    Contract {
        capability: VP_TRANSCRIPT,
        properties: &[
            PropertySpec {
                name: "available-locales",
                writable: false,
            },
            PropertySpec {
                name: "current-text",
                writable: false,
            },
            PropertySpec {
                name: "locale",
                writable: true,
            },
        ],
        methods: &[],
    },
];

/// Look up the contract for a capability id. None for capabilities this
/// client does not understand; callers log and drop, never fail.
pub fn lookup(capability: &str) -> Option<&'static Contract> {
    CONTRACTS.iter().find(|c| c.capability == capability)
}
