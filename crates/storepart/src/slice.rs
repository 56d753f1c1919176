//! Declaring slices and compiling them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use must_future::MustBoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::effect::{Call, EffectContext, EffectRoutine, Watch};
use crate::gate::{FieldDef, FieldDefs};
use crate::member::{Classified, FieldKind, HandlerBody, MemberDef, Members, RUNNING_SUFFIX};
use crate::reducer::{Listener, ListenerMap};
use crate::{
    Access, Action, ActionCreator, ActionType, Container, DomainRegistry, EffectOptions, ListenTo,
    Payload, ReducerOptions, Selector, SliceError, SliceReducer, SliceResult, SliceState,
};

/// Collects the members of a slice. Errors are deferred to
/// [`SliceBuilder::build`], which reports the first one.
pub struct SliceBuilder {
    domain: String,
    members: Members,
    error: Option<SliceError>,
}

impl SliceBuilder {
    fn declare(mut self, name: impl Into<String>, def: SliceResult<MemberDef>) -> Self {
        if self.error.is_none() {
            if let Err(e) = def.and_then(|def| self.members.tag(name.into(), def)) {
                self.error = Some(e);
            }
        }
        self
    }

    /// A stored field and its initial value.
    pub fn field(self, name: impl Into<String>, initial: impl Serialize) -> Self {
        let def = serde_json::to_value(initial)
            .map(MemberDef::Stored)
            .map_err(SliceError::from);
        self.declare(name, def)
    }

    /// A field computed from the others on every read.
    pub fn derived<F>(self, name: impl Into<String>, derive: F) -> Self
    where
        F: Fn(&Access<'_>) -> SliceResult<Value> + Send + Sync + 'static,
    {
        self.declare(name, Ok(MemberDef::Derived(Arc::new(derive))))
    }

    /// A mutation handler, run inside the slice's reducer.
    pub fn reducer<F>(self, name: impl Into<String>, options: ReducerOptions, body: F) -> Self
    where
        F: Fn(&mut Access<'_>, &Payload) -> SliceResult<()> + Send + Sync + 'static,
    {
        self.declare(
            name,
            Ok(MemberDef::Reducer {
                meta: options.meta,
                body: Arc::new(body),
            }),
        )
    }

    /// An effect handler, run by the slice's effect routines.
    pub fn effect<F>(self, name: impl Into<String>, options: EffectOptions, body: F) -> Self
    where
        F: Fn(EffectContext, Payload) -> MustBoxFuture<'static, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.declare(
            name,
            Ok(MemberDef::Effect {
                meta: options.meta,
                body: Arc::new(body),
            }),
        )
    }

    /// An action creator with no handler behind it.
    pub fn action(self, name: impl Into<String>, action_type: impl Into<ListenTo>) -> Self {
        self.declare(name, Ok(MemberDef::Action(action_type.into())))
    }

    /// Compile the slice and claim its domain in `registry`.
    ///
    /// Nothing is claimed when compilation fails, so a rejected slice does not
    /// block its domain.
    pub fn build(self, registry: &DomainRegistry) -> SliceResult<Slice> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let domain = self.domain;
        if domain.is_empty() {
            return Err(SliceError::invalid_option("a slice must have a domain"));
        }
        if registry.contains(&domain) {
            return Err(SliceError::DuplicateDomain(domain));
        }

        let declared: HashSet<String> = self.members.names().map(str::to_string).collect();
        let Classified {
            fields: field_members,
            handlers,
            actions,
        } = self.members.classify();

        // fields, including the status field of every tracked effect
        let mut defs = FieldDefs::new(domain.clone());
        let mut initial = SliceState::new();
        for (name, kind) in field_members {
            match kind {
                FieldKind::Stored(value) => {
                    initial.insert(name.clone(), Arc::new(value));
                    defs.push(name, FieldDef::Stored);
                }
                FieldKind::Derived(derive) => defs.push(name, FieldDef::Derived(derive)),
            }
        }
        for handler in &handlers {
            handler.meta.validate(&handler.name)?;
            if is_tracked(&handler.body, handler.meta.track_status()) {
                let field = running_field(&handler.name);
                initial.insert(field.clone(), Arc::new(Value::Bool(false)));
                defs.push(field, FieldDef::Stored);
            }
        }
        let fields = Arc::new(defs);
        let selectors: HashMap<String, Selector> = fields
            .order()
            .iter()
            .map(|f| (f.clone(), Selector::new(fields.clone(), f.clone())))
            .collect();

        // action creators
        let mut creators: HashMap<String, ActionCreator> = HashMap::new();
        for handler in &handlers {
            if !handler.meta.has_dynamic_type() {
                continue;
            }
            let mut creator =
                ActionCreator::new(handler.name.clone(), ActionType::derive(&domain, &handler.name));
            if is_tracked(&handler.body, handler.meta.track_status()) {
                if let Some(running) = selectors.get(&running_field(&handler.name)) {
                    creator = creator.with_running(running.clone());
                }
            }
            creators.insert(handler.name.clone(), creator);
        }
        // bare actions may name each other in any order; resolve them in
        // passes until a pass makes no progress
        let mut pending: Vec<&(String, ListenTo)> = actions.iter().collect();
        while !pending.is_empty() {
            let mut waiting = Vec::new();
            let mut error = None;
            for &entry in &pending {
                let (name, to) = entry;
                let resolved = Resolver {
                    domain: &domain,
                    declared: &declared,
                    creators: &creators,
                }
                .resolve(to, name);
                match resolved {
                    Ok(action_type) => {
                        creators.insert(name.clone(), ActionCreator::new(name.clone(), action_type));
                    }
                    Err(e) => {
                        error.get_or_insert(e);
                        waiting.push(entry);
                    }
                }
            }
            match error {
                Some(e) if waiting.len() == pending.len() => return Err(e),
                _ => pending = waiting,
            }
        }

        // reducer listeners and effect routines
        let resolver = Resolver {
            domain: &domain,
            declared: &declared,
            creators: &creators,
        };
        let mut listeners = ListenerMap::new();
        let mut effects = Vec::new();
        for handler in handlers {
            let types = handler
                .meta
                .listened()
                .iter()
                .map(|to| resolver.resolve(to, &handler.name))
                .collect::<SliceResult<Vec<_>>>()?;

            match handler.body {
                HandlerBody::Reduce(body) => {
                    for action_type in types {
                        listeners.entry(action_type).or_default().push(Listener {
                            member: handler.name.clone(),
                            body: body.clone(),
                        });
                    }
                }
                HandlerBody::Effect(body) => {
                    let tracking = if handler.meta.track_status() {
                        let action_type = ActionType::set_running(&domain, &handler.name);
                        let field = running_field(&handler.name);
                        listeners
                            .entry(action_type.clone())
                            .or_default()
                            .push(Listener {
                                member: field.clone(),
                                body: Arc::new(move |access: &mut Access<'_>, payload: &Payload| {
                                    let running = payload.arg(0).cloned().unwrap_or(Value::Bool(false));
                                    access.set(&field, running)
                                }),
                            });
                        Some(action_type)
                    } else {
                        None
                    };

                    let watches = types
                        .into_iter()
                        .enumerate()
                        .map(|(i, action_type)| Watch {
                            action_type,
                            strategy: handler.meta.strategy_for(i),
                        })
                        .collect();
                    effects.push(EffectRoutine::watcher(
                        &domain,
                        &handler.name,
                        Call::new(body, tracking),
                        watches,
                    ));
                }
            }
        }

        registry.claim(&domain)?;

        tracing::debug!(
            %domain,
            fields = fields.order().len(),
            action_types = listeners.len(),
            effects = effects.len(),
            "slice built"
        );

        let reducer = SliceReducer::new(fields.clone(), listeners, Arc::new(initial));
        Ok(Slice(Arc::new(SliceInner {
            fields,
            selectors,
            creators,
            declared,
            reducer,
            effects,
        })))
    }
}

fn is_tracked(body: &HandlerBody, track_status: bool) -> bool {
    track_status && matches!(body, HandlerBody::Effect(_))
}

fn running_field(member: &str) -> String {
    format!("{}{}", member, RUNNING_SUFFIX)
}

struct Resolver<'a> {
    domain: &'a str,
    declared: &'a HashSet<String>,
    creators: &'a HashMap<String, ActionCreator>,
}

impl Resolver<'_> {
    fn resolve(&self, to: &ListenTo, member: &str) -> SliceResult<ActionType> {
        match to {
            ListenTo::Dynamic => Ok(ActionType::derive(self.domain, member)),
            ListenTo::Type(action_type) => Ok(action_type.clone()),
            ListenTo::Member(target) => match self.creators.get(target) {
                Some(creator) => Ok(creator.action_type().clone()),
                None if self.declared.contains(target) => Err(SliceError::NoActionType {
                    domain: self.domain.to_string(),
                    member: target.clone(),
                }),
                None => Err(SliceError::UnknownMember {
                    domain: self.domain.to_string(),
                    member: target.clone(),
                }),
            },
        }
    }
}

struct SliceInner {
    fields: Arc<FieldDefs>,
    selectors: HashMap<String, Selector>,
    creators: HashMap<String, ActionCreator>,
    declared: HashSet<String>,
    reducer: SliceReducer,
    effects: Vec<EffectRoutine>,
}

/// A compiled slice: its reducer, selectors, action creators and effect
/// routines. Cheap to clone.
#[derive(Clone)]
pub struct Slice(Arc<SliceInner>);

impl Slice {
    /// Start declaring a slice stored under `domain`.
    pub fn builder(domain: impl Into<String>) -> SliceBuilder {
        SliceBuilder {
            domain: domain.into(),
            members: Members::default(),
            error: None,
        }
    }

    /// The domain identifier.
    pub fn domain(&self) -> &str {
        self.0.fields.domain()
    }

    /// Field names in declaration order, status fields last.
    pub fn fields(&self) -> &[String] {
        self.0.fields.order()
    }

    /// The state before any action.
    pub fn initial_state(&self) -> Arc<SliceState> {
        self.0.reducer.initial_state()
    }

    /// The reducer, to be installed into a container under [`Slice::domain`].
    pub fn reducer(&self) -> SliceReducer {
        self.0.reducer.clone()
    }

    /// Shorthand for `self.reducer().reduce(state, action)`.
    pub fn reduce(&self, state: &Arc<SliceState>, action: &Action) -> SliceResult<Arc<SliceState>> {
        self.0.reducer.reduce(state, action)
    }

    /// One routine per effect handler.
    pub fn effects(&self) -> &[EffectRoutine] {
        &self.0.effects
    }

    /// The selector of a field.
    pub fn select(&self, field: &str) -> SliceResult<Selector> {
        self.0
            .selectors
            .get(field)
            .cloned()
            .ok_or_else(|| SliceError::UnknownField {
                domain: self.domain().to_string(),
                field: field.to_string(),
            })
    }

    /// Read a field of the container's current state.
    pub fn select_in(&self, field: &str, container: &dyn Container) -> SliceResult<Arc<Value>> {
        self.select(field)?.apply(container)
    }

    /// The view of this slice available outside reducers: reads yield
    /// selectors and writes are refused.
    pub fn access(&self) -> Access<'_> {
        Access::immutable(&self.0.fields, &self.0.selectors)
    }

    /// The action creator generated for a member.
    pub fn action(&self, member: &str) -> SliceResult<&ActionCreator> {
        match self.0.creators.get(member) {
            Some(creator) => Ok(creator),
            None if self.0.declared.contains(member) => Err(SliceError::NoActionType {
                domain: self.domain().to_string(),
                member: member.to_string(),
            }),
            None => Err(SliceError::UnknownMember {
                domain: self.domain().to_string(),
                member: member.to_string(),
            }),
        }
    }

    /// Every generated action creator.
    pub fn actions(&self) -> impl Iterator<Item = &ActionCreator> {
        self.0.creators.values()
    }
}

impl std::fmt::Debug for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slice")
            .field("domain", &self.domain())
            .field("fields", &self.fields())
            .field("effects", &self.0.effects)
            .finish()
    }
}
