#![warn(missing_docs)]
//! # storepart_host
//!
//! Runs [`storepart`] slices: the [`Store`] container they are installed
//! into, the [`EffectRunner`] their effect routines run on, the lookup of the
//! current store used by the registration functions in [`api`], discovery of
//! slices to install at startup, and log setup.
//!
//! ```ignore
//! let store = Store::builder(HostConfig::load("host.yaml")?)
//!     .slice(&counter)
//!     .preloaded_state(json!({ "counter": { "count": 3 } }))
//!     .build()?;
//! store.dispatch(counter.action("add")?.call(vec![json!(1), json!(2)]))?;
//! assert_eq!(store.snapshot_json(), json!({ "counter": { "count": 3 } }));
//! ```

pub mod api;
mod config;
mod current;
mod discovery;
mod error;
mod runner;
mod store;
pub mod trace;

pub use config::*;
pub use current::*;
pub use discovery::*;
pub use error::*;
pub use runner::*;
pub use store::*;
