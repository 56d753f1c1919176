//! Actions, their type strings, and the action creators generated for handlers.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{SliceError, SliceResult};

/// Prefix shared by every derived action type.
pub const ACTION_TYPE_PREFIX: &str = "@@";

/// Segment inserted between domain and member for status-tracking actions.
pub const SET_RUNNING: &str = "SET_RUNNING";

/// The type string of an action, e.g. `@@COUNTER/INCREMENT`.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct ActionType(Arc<str>);

impl ActionType {
    /// Accept a type string verbatim.
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(Arc::from(s.as_ref()))
    }

    /// `@@<DOMAIN>/<MEMBER>`, both parts constant-cased.
    pub fn derive(domain: &str, member: &str) -> Self {
        Self::new(format!(
            "{}{}/{}",
            ACTION_TYPE_PREFIX,
            constant_case(domain),
            constant_case(member)
        ))
    }

    /// `@@<DOMAIN>/SET_RUNNING/<MEMBER>`, dispatched around a tracked effect.
    pub fn set_running(domain: &str, member: &str) -> Self {
        Self::new(format!(
            "{}{}/{}/{}",
            ACTION_TYPE_PREFIX,
            constant_case(domain),
            SET_RUNNING,
            constant_case(member)
        ))
    }

    /// The type string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ActionType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActionType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&ActionCreator> for ActionType {
    fn from(creator: &ActionCreator) -> Self {
        creator.action_type().clone()
    }
}

/// Upper-snake-case a name: `fetchUser` becomes `FETCH_USER`, `my-domain`
/// becomes `MY_DOMAIN` and `loadXMLFile` becomes `LOAD_XML_FILE`.
pub fn constant_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut word = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !word.is_empty() {
                words.push(std::mem::take(&mut word));
            }
            continue;
        }

        if c.is_uppercase() && !word.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut word));
            }
        }

        word.extend(c.to_uppercase());
    }

    if !word.is_empty() {
        words.push(word);
    }

    words.join("_")
}

/// The positional arguments of an action.
///
/// A payload is always an ordered sequence. A single value that is not a
/// sequence is delivered as one argument.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Payload(Vec<Value>);

impl Payload {
    /// No arguments.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Exactly one argument, even if it is itself an array.
    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    /// Spread an array into positional arguments; anything else becomes the
    /// sole argument.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(args) => Self(args),
            other => Self(vec![other]),
        }
    }

    /// Serialize each argument.
    pub fn try_from_args<T: Serialize>(args: &[T]) -> SliceResult<Self> {
        args.iter()
            .map(|a| serde_json::to_value(a).map_err(SliceError::from))
            .collect::<SliceResult<Vec<_>>>()
            .map(Self)
    }

    /// The argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Deserialize the argument at `index`.
    pub fn arg_as<T: DeserializeOwned>(&self, index: usize) -> SliceResult<T> {
        let value = self.0.get(index).ok_or_else(|| SliceError::Payload {
            index,
            reason: format!("missing (the action carries {} arguments)", self.0.len()),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| SliceError::Payload {
            index,
            reason: e.to_string(),
        })
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the arguments in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    /// The arguments as a slice.
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

impl From<Vec<Value>> for Payload {
    fn from(args: Vec<Value>) -> Self {
        Self(args)
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Self::single(b)
    }
}

/// A dispatched message: a type and its positional payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    action_type: ActionType,
    #[serde(default)]
    payload: Payload,
}

impl Action {
    /// Constructor
    pub fn new(action_type: impl Into<ActionType>, payload: impl Into<Payload>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: payload.into(),
        }
    }

    /// Accessor
    pub fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    /// Accessor
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Split into type and payload.
    pub fn into_parts(self) -> (ActionType, Payload) {
        (self.action_type, self.payload)
    }
}

/// Generated in place of a handler's body: calling it builds the action that
/// triggers the handler.
#[derive(Clone, Debug)]
pub struct ActionCreator {
    member: String,
    action_type: ActionType,
    running: Option<crate::Selector>,
}

impl ActionCreator {
    pub(crate) fn new(member: String, action_type: ActionType) -> Self {
        Self {
            member,
            action_type,
            running: None,
        }
    }

    pub(crate) fn with_running(mut self, running: crate::Selector) -> Self {
        self.running = Some(running);
        self
    }

    /// Build an action of this creator's type.
    pub fn create(&self, payload: impl Into<Payload>) -> Action {
        Action::new(self.action_type.clone(), payload)
    }

    /// Convenience for a payload given as a list of values.
    pub fn call(&self, args: Vec<Value>) -> Action {
        self.create(Payload::from(args))
    }

    /// The resolved action type.
    pub fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    /// The slice member this creator was generated for.
    pub fn member(&self) -> &str {
        &self.member
    }

    /// For status-tracked effects, the selector of the `<member>.running` flag.
    pub fn running(&self) -> Option<&crate::Selector> {
        self.running.as_ref()
    }
}
