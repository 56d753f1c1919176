//! Registration against whatever store is current.
//!
//! Each function looks the store up with [`current_store`] and fails with
//! [`HostError::NoCurrentContainer`] when there is none.
//!
//! [`HostError::NoCurrentContainer`]: crate::HostError::NoCurrentContainer

use storepart::{EffectRoutine, Slice, SliceReducer};

use crate::{current_store, HostResult, Store};

/// The current store.
pub fn get_store() -> HostResult<Store> {
    current_store()
}

/// Install a slice's reducer into the current store and start its effects.
pub fn register_slice(slice: &Slice) -> HostResult<()> {
    current_store()?.install_slice(slice)
}

/// Install a reducer into the current store.
pub fn register_reducer(reducer: SliceReducer) -> HostResult<()> {
    current_store()?.install_reducers([reducer])
}

/// Start an effect routine against the current store. Returns false if it
/// was already running.
pub fn register_effect(routine: &EffectRoutine) -> HostResult<bool> {
    current_store()?.run_effect(routine)
}
