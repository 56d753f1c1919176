//! Member tagging and classification.
//!
//! Every member declared on a [`SliceBuilder`](crate::SliceBuilder) is tagged
//! with exactly one [`MemberKind`]. Classification partitions the tagged
//! members into stored fields, derived fields, reducers, effects and bare
//! action builders, keeping declaration order.

use serde_json::Value;

use crate::effect::EffectFn;
use crate::{DeriveFn, HandlerMeta, ListenTo, ReduceFn, SliceError, SliceResult};

/// Names that are never treated as slice members.
pub const MEMBER_BLACKLIST: &[&str] = &[
    "constructor",
    "prototype",
    "name",
    "length",
    "caller",
    "arguments",
    "displayName",
];

/// Suffix of the generated status field of a tracked effect.
pub const RUNNING_SUFFIX: &str = ".running";

/// The role a member plays in its slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MemberKind {
    #[display(fmt = "stored field")]
    Stored,
    #[display(fmt = "derived field")]
    Derived,
    #[display(fmt = "reducer")]
    Reducer,
    #[display(fmt = "effect")]
    Effect,
    #[display(fmt = "action")]
    Action,
}

pub(crate) enum MemberDef {
    Stored(Value),
    Derived(DeriveFn),
    Reducer { meta: HandlerMeta, body: ReduceFn },
    Effect { meta: HandlerMeta, body: EffectFn },
    Action(ListenTo),
}

impl MemberDef {
    pub(crate) fn kind(&self) -> MemberKind {
        match self {
            MemberDef::Stored(_) => MemberKind::Stored,
            MemberDef::Derived(_) => MemberKind::Derived,
            MemberDef::Reducer { .. } => MemberKind::Reducer,
            MemberDef::Effect { .. } => MemberKind::Effect,
            MemberDef::Action(_) => MemberKind::Action,
        }
    }
}

/// The tagged members of a slice under construction.
#[derive(Default)]
pub(crate) struct Members {
    defs: Vec<(String, MemberDef)>,
}

impl Members {
    /// Tag a member. Blacklisted names are skipped with a warning.
    pub(crate) fn tag(&mut self, name: String, def: MemberDef) -> SliceResult<()> {
        if MEMBER_BLACKLIST.contains(&name.as_str()) {
            tracing::warn!(member = %name, "skipping blacklisted member name");
            return Ok(());
        }
        if name.is_empty() {
            return Err(SliceError::invalid_option(format!(
                "a {} must have a name",
                def.kind()
            )));
        }
        if name.contains(RUNNING_SUFFIX) {
            return Err(SliceError::ReservedMember(name));
        }
        if let Some((_, existing)) = self.defs.iter().find(|(n, _)| *n == name) {
            let existing = existing.kind();
            let requested = def.kind();
            return Err(if existing == requested {
                SliceError::DuplicateMember(name)
            } else {
                SliceError::ConflictingTag {
                    member: name,
                    existing,
                    requested,
                }
            });
        }
        self.defs.push((name, def));
        Ok(())
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.iter().map(|(n, _)| n.as_str())
    }

    pub(crate) fn classify(self) -> Classified {
        let mut out = Classified::default();
        for (name, def) in self.defs {
            match def {
                MemberDef::Stored(initial) => out.fields.push((name, FieldKind::Stored(initial))),
                MemberDef::Derived(derive) => out.fields.push((name, FieldKind::Derived(derive))),
                MemberDef::Reducer { meta, body } => out.handlers.push(Handler {
                    name,
                    meta,
                    body: HandlerBody::Reduce(body),
                }),
                MemberDef::Effect { meta, body } => out.handlers.push(Handler {
                    name,
                    meta,
                    body: HandlerBody::Effect(body),
                }),
                MemberDef::Action(to) => out.actions.push((name, to)),
            }
        }
        out
    }
}

pub(crate) enum FieldKind {
    Stored(Value),
    Derived(DeriveFn),
}

pub(crate) enum HandlerBody {
    Reduce(ReduceFn),
    Effect(EffectFn),
}

pub(crate) struct Handler {
    pub name: String,
    pub meta: HandlerMeta,
    pub body: HandlerBody,
}

/// Members partitioned by role, each list in declaration order.
#[derive(Default)]
pub(crate) struct Classified {
    pub fields: Vec<(String, FieldKind)>,
    pub handlers: Vec<Handler>,
    pub actions: Vec<(String, ListenTo)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn reducer() -> MemberDef {
        MemberDef::Reducer {
            meta: HandlerMeta::default(),
            body: Arc::new(|_: &mut crate::Access<'_>, _: &crate::Payload| Ok(())),
        }
    }

    #[test]
    fn conflicting_tags_are_rejected() {
        let mut members = Members::default();
        members.tag("load".into(), reducer()).unwrap();
        let err = members
            .tag("load".into(), MemberDef::Action(ListenTo::Dynamic))
            .unwrap_err();
        assert!(matches!(
            err,
            SliceError::ConflictingTag {
                existing: MemberKind::Reducer,
                requested: MemberKind::Action,
                ..
            }
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn same_tag_twice_is_a_duplicate() {
        let mut members = Members::default();
        members.tag("count".into(), MemberDef::Stored(0.into())).unwrap();
        assert!(matches!(
            members.tag("count".into(), MemberDef::Stored(1.into())),
            Err(SliceError::DuplicateMember(_))
        ));
    }

    #[test]
    fn blacklisted_names_are_skipped() {
        let mut members = Members::default();
        members.tag("name".into(), MemberDef::Stored(0.into())).unwrap();
        members.tag("displayName".into(), reducer()).unwrap();
        assert_eq!(members.names().count(), 0);
        assert!(members.classify().fields.is_empty());
    }

    #[test]
    fn running_fields_are_reserved() {
        let mut members = Members::default();
        assert!(matches!(
            members.tag("load.running".into(), MemberDef::Stored(false.into())),
            Err(SliceError::ReservedMember(_))
        ));
    }

    #[test]
    fn classification_keeps_declaration_order() {
        let mut members = Members::default();
        members.tag("b".into(), MemberDef::Stored(0.into())).unwrap();
        members.tag("inc".into(), reducer()).unwrap();
        members
            .tag(
                "a".into(),
                MemberDef::Derived(Arc::new(|_: &crate::Access<'_>| Ok(Value::Null))),
            )
            .unwrap();
        members
            .tag("ping".into(), MemberDef::Action(ListenTo::Dynamic))
            .unwrap();

        let classified = members.classify();
        let fields: Vec<_> = classified.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(fields, vec!["b", "a"]);
        assert_eq!(classified.handlers.len(), 1);
        assert_eq!(classified.actions.len(), 1);
    }
}
