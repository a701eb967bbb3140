//! Storage for negotiated client capabilities.

use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        PoisonError,
        RwLock,
    },
};

/// Holds the capability the client negotiated for one handler's method.
///
/// Written by the negotiation path, read by the handler. A call should take one snapshot with
/// [`get`](CapabilitySlot::get) when it starts: a renegotiation while the call is running replaces
/// the slot's value but not the snapshot, so in-flight calls are unaffected and new calls see the
/// latest value.
pub struct CapabilitySlot<C> {
    value: RwLock<Option<Arc<C>>>,
    generation: AtomicU64,
}

impl<C> CapabilitySlot<C> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        CapabilitySlot {
            value: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Stores a newly negotiated capability, returning the negotiation generation it belongs to.
    pub fn set(&self, capability: C) -> u64 {
        let mut value = self.value.write().unwrap_or_else(PoisonError::into_inner);
        *value = Some(Arc::new(capability));
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the current capability, or `None` if nothing has been negotiated yet.
    pub fn get(&self) -> Option<Arc<C>> {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns how many times a capability has been stored.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns `true` once a capability has been negotiated.
    pub fn is_set(&self) -> bool {
        self.generation() > 0
    }
}

impl<C> Default for CapabilitySlot<C> {
    fn default() -> Self {
        CapabilitySlot::new()
    }
}

impl<C: Debug> Debug for CapabilitySlot<C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(CapabilitySlot))
            .field("value", &self.get())
            .field("generation", &self.generation())
            .finish()
    }
}
