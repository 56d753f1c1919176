#![allow(missing_docs)]

use thiserror::Error;

use crate::{ActionType, MemberKind};

/// Everything that can go wrong while building a slice or while reading and
/// writing its state.
///
/// None of these are transient. Configuration errors surface while a slice is
/// being built, protocol violations surface at the offending call, and lookup
/// failures mean a slice's reducer was never installed where its selectors
/// expect it.
#[derive(Error, Debug)]
pub enum SliceError {
    // -- configuration --
    #[error("A slice has already been registered with the domain {0:?}. Please make sure all slice domains are unique.")]
    DuplicateDomain(String),

    #[error("{member:?} cannot be declared as a {requested}: it has already been declared as a {existing}")]
    ConflictingTag {
        member: String,
        existing: MemberKind,
        requested: MemberKind,
    },

    #[error("{0:?} is declared twice")]
    DuplicateMember(String),

    #[error("{0:?} is a reserved member name")]
    ReservedMember(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Member {member:?} of slice {domain:?} does not have an action type. Is it declared with a dynamic action type?")]
    NoActionType { domain: String, member: String },

    #[error("Slice {domain:?} has no member {member:?}")]
    UnknownMember { domain: String, member: String },

    // -- protocol --
    #[error("Cannot write {field:?} of slice {domain:?} outside of a reducer. External code may not mutate slice state, dispatch an action instead.")]
    AccessDenied { domain: String, field: String },

    #[error("{field:?} of slice {domain:?} is derived and cannot be written")]
    ReadOnlyField { domain: String, field: String },

    #[error("Slice {domain:?} has no field {field:?}")]
    UnknownField { domain: String, field: String },

    #[error("{field:?} of slice {domain:?} was read outside of a reducer or a derived field. Apply its selector to the container state instead.")]
    SelectorNotValue { domain: String, field: String },

    #[error("Derived field {field:?} of slice {domain:?} depends on itself")]
    DerivedCycle { domain: String, field: String },

    #[error("Action payload argument {index}: {reason}")]
    Payload { index: usize, reason: String },

    // -- lookup --
    #[error("Could not retrieve the store subdomain {0:?}. Either the associated reducer is not loaded or it is loaded under a different name.")]
    MissingDomain(String),

    #[error("Reducer {member:?} failed on {action_type}: {source}")]
    Handler {
        member: String,
        action_type: ActionType,
        #[source]
        source: Box<SliceError>,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SliceResult<T> = Result<T, SliceError>;

impl SliceError {
    /// Build an [`SliceError::InvalidOption`] from anything printable.
    pub fn invalid_option(msg: impl std::fmt::Display) -> Self {
        Self::InvalidOption(msg.to_string())
    }

    /// Whether this error belongs to the configuration class, i.e. it can only
    /// arise while a slice is being built.
    pub fn is_configuration(&self) -> bool {
        use SliceError::*;
        matches!(
            self,
            DuplicateDomain(_)
                | ConflictingTag { .. }
                | DuplicateMember(_)
                | ReservedMember(_)
                | InvalidOption(_)
                | NoActionType { .. }
                | UnknownMember { .. }
        )
    }
}

/// An error raised while running an effect routine. These are never handled
/// by this crate: they are handed to whatever runs the routine.
#[derive(Error, Debug)]
pub enum EffectError {
    #[error("Effect {routine} failed: {source}")]
    Handler {
        routine: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Effect {0} panicked")]
    Panicked(String),

    #[error("The container's action channel has closed")]
    ChannelClosed,

    #[error(transparent)]
    Slice(#[from] SliceError),
}

pub type EffectResult<T = ()> = Result<T, EffectError>;
