//! Records exchanged with the OpenAM REST API.
//!
//! # Design
//! OpenAM identity and server-info documents have no fixed schema, so
//! `Identity` and `ServerInfo` wrap a JSON object and offer typed accessors
//! instead of structs. Authentication challenges and tokens do have a known
//! core, but unknown fields are carried in `extra` so a challenge can be
//! resubmitted exactly as the server sent it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Callback type whose value also becomes the session's username.
pub const NAME_CALLBACK: &str = "NameCallback";
/// Callback type whose value also becomes the session's password.
pub const PASSWORD_CALLBACK: &str = "PasswordCallback";

macro_rules! attribute_record {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Map<String, Value>);

        impl $name {
            pub fn get(&self, key: &str) -> Option<&Value> {
                self.0.get(key)
            }

            /// The attribute when it is a plain string.
            pub fn get_str(&self, key: &str) -> Option<&str> {
                self.0.get(key).and_then(Value::as_str)
            }

            /// A string attribute, or the first element of a string array.
            /// OpenAM returns most directory attributes as one-element arrays.
            pub fn first_str(&self, key: &str) -> Option<&str> {
                match self.0.get(key)? {
                    Value::String(s) => Some(s),
                    Value::Array(items) => items.first().and_then(Value::as_str),
                    _ => None,
                }
            }

            /// Every string in an array attribute; a plain string yields itself.
            pub fn strings(&self, key: &str) -> Vec<&str> {
                match self.0.get(key) {
                    Some(Value::String(s)) => vec![s.as_str()],
                    Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
                    _ => Vec::new(),
                }
            }

            pub fn contains_key(&self, key: &str) -> bool {
                self.0.contains_key(key)
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn attributes(&self) -> &Map<String, Value> {
                &self.0
            }

            pub fn into_attributes(self) -> Map<String, Value> {
                self.0
            }
        }

        impl From<Map<String, Value>> for $name {
            fn from(attributes: Map<String, Value>) -> Self {
                Self(attributes)
            }
        }
    };
}

attribute_record!(
    /// A directory entry returned by `/json/users/{username}`.
    Identity
);

attribute_record!(
    /// Server capability snapshot from `/json/serverinfo/*`.
    ServerInfo
);

impl Identity {
    pub fn username(&self) -> Option<&str> {
        self.first_str("username")
    }

    pub fn mail(&self) -> Option<&str> {
        self.first_str("mail")
    }
}

/// Payload for `/json/users/?_action=create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIdentity {
    pub username: String,
    pub userpassword: String,
    pub mail: String,
}

/// Token returned by a successful authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionToken {
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(rename = "successUrl", default, skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One input or output slot of a callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One prompt of a challenge, e.g. `NameCallback` or `PasswordCallback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Callback {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<CallbackSlot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<CallbackSlot>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Callback {
    /// The `prompt` output, when the server sent one.
    pub fn prompt(&self) -> Option<&str> {
        self.output
            .iter()
            .find(|slot| slot.name.as_deref() == Some("prompt"))
            .and_then(|slot| slot.value.as_str())
    }
}

/// One round of the server's callback authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthChallenge {
    #[serde(rename = "authId", default, skip_serializing_if = "Option::is_none")]
    pub auth_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub callbacks: Vec<Callback>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthChallenge {
    /// Set the first input slot of the first callback of type `kind`.
    /// Returns false when no such callback (or slot) exists.
    pub fn fill(&mut self, kind: &str, value: Value) -> bool {
        match self
            .callbacks
            .iter_mut()
            .find(|callback| callback.kind == kind)
            .and_then(|callback| callback.input.first_mut())
        {
            Some(slot) => {
                slot.value = value;
                true
            }
            None => false,
        }
    }

    pub fn callback(&self, kind: &str) -> Option<&Callback> {
        self.callbacks.iter().find(|callback| callback.kind == kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.callbacks.iter().map(|callback| callback.kind.as_str())
    }
}

/// Python-style truthiness, used where the server's flags may arrive as
/// booleans, strings or numbers.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
