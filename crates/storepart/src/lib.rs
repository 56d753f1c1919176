//! # storepart
//!
//! Declare a slice of application state once, as a set of named members, and
//! get back everything a unidirectional-data-flow container needs to run it:
//!
//! - a reducer applying dispatched [`Action`]s to the slice's state,
//! - a memoized [`Selector`] for every field,
//! - an [`ActionCreator`] for every handler,
//! - an [`EffectRoutine`] for every effect handler.
//!
//! ```ignore
//! let registry = DomainRegistry::new();
//! let counter = Slice::builder("counter")
//!     .field("count", 0)
//!     .derived("double", |a| Ok(json!(a.get_as::<i64>("count")? * 2)))
//!     .reducer("add", ReducerOptions::new(), |a, args| {
//!         let (x, y): (i64, i64) = (args.arg_as(0)?, args.arg_as(1)?);
//!         a.set("count", x + y)
//!     })
//!     .build(&registry)?;
//!
//! let add = counter.action("add")?.call(vec![json!(1), json!(2)]);
//! assert_eq!(add.action_type().as_str(), "@@COUNTER/ADD");
//! ```
//!
//! State is only ever written from inside a reducer, through the [`Access`]
//! handed to the handler. Everywhere else fields are read through selectors.
//! The container itself lives outside this crate, behind the [`Container`]
//! trait.

mod action;
mod container;
mod error;
mod gate;
mod member;
mod metadata;
mod reducer;
mod registry;
mod selector;
mod slice;
mod state;

pub mod effect;

pub use action::*;
pub use container::*;
pub use effect::{EffectContext, EffectFn, EffectRoutine, InvocationEnd};
pub use error::*;
pub use gate::{Access, AccessMode, DeriveFn, Read, ReduceFn};
pub use member::{MemberKind, MEMBER_BLACKLIST, RUNNING_SUFFIX};
pub use metadata::*;
pub use reducer::SliceReducer;
pub use registry::DomainRegistry;
pub use selector::Selector;
pub use slice::{Slice, SliceBuilder};
pub use state::*;

pub use must_future::MustBoxFuture;
