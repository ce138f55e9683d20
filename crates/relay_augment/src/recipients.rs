//! Recipient-set augmentation for data-table serialization callbacks.
//!
//! The host only sends a player's local data tables to that player. The
//! wrappers installed here let the original callback decide as usual and,
//! whenever it produces data, add the relay pseudo-client (or the local
//! client on a combined client and server instance) to the recipients.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::trace;

use crate::hooks::Hook;
use crate::host::{
    send_proxy_fn, EngineServer, RecipientSet, RelayDirector, SendProxyCall, SendProxyFn,
};

/// Highest number of client slots a recipient set can address.
pub const MAX_CLIENT_SLOTS: usize = 255;

/// Slot of the local client on a combined client and server instance.
pub const LOCAL_CLIENT_SLOT: usize = 0;

const WORD_BITS: usize = u32::BITS as usize;
const WORDS: usize = (MAX_CLIENT_SLOTS + WORD_BITS - 1) / WORD_BITS;

/// Fixed-width recipient bitset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientBits {
    words: [u32; WORDS],
}

impl RecipientBits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `slot`. Returns `false` when the slot is out of range.
    pub fn set(&mut self, slot: usize) -> bool {
        if slot >= MAX_CLIENT_SLOTS {
            return false;
        }
        self.words[slot / WORD_BITS] |= 1 << (slot % WORD_BITS);
        true
    }

    pub fn is_set(&self, slot: usize) -> bool {
        slot < MAX_CLIENT_SLOTS && self.words[slot / WORD_BITS] & (1 << (slot % WORD_BITS)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Marked slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_CLIENT_SLOTS).filter(move |slot| self.is_set(*slot))
    }
}

impl RecipientSet for RecipientBits {
    fn add_slot(&mut self, slot: usize) {
        self.set(slot);
    }
}

/// Decides which extra slot should receive augmented updates.
pub struct RecipientAugmenter {
    engine: Arc<dyn EngineServer>,
    director: Arc<dyn RelayDirector>,
}

impl RecipientAugmenter {
    pub fn new(engine: Arc<dyn EngineServer>, director: Arc<dyn RelayDirector>) -> Self {
        Self { engine, director }
    }

    /// The slot to add for the current process role, if any.
    pub fn extra_slot(&self) -> Option<usize> {
        if !self.engine.is_dedicated_server() {
            return Some(LOCAL_CLIENT_SLOT);
        }

        let client = self.director.active_relay_client()?;
        let slot = client.slot_index();
        match usize::try_from(slot) {
            Ok(slot) => Some(slot),
            Err(_) => {
                trace!("Relay client reports invalid slot {}", slot);
                None
            }
        }
    }

    /// Adds the extra slot to `recipients`; returns the slot added.
    pub fn augment(&self, recipients: &mut dyn RecipientSet) -> Option<usize> {
        let slot = self.extra_slot()?;
        recipients.add_slot(slot);
        Some(slot)
    }

    /// Runs `original` and augments `recipients` when it produced data.
    ///
    /// The original's result is returned unchanged.
    pub fn forward(
        &self,
        original: &SendProxyFn,
        call: &SendProxyCall,
        mut recipients: Option<&mut dyn RecipientSet>,
    ) -> Option<NonNull<c_void>> {
        let result = original(call, reborrow(&mut recipients));

        if result.is_some() {
            if let Some(set) = recipients {
                self.augment(set);
            }
        }
        result
    }
}

fn reborrow<'s>(
    recipients: &'s mut Option<&mut dyn RecipientSet>,
) -> Option<&'s mut dyn RecipientSet> {
    match recipients {
        Some(set) => Some(&mut **set),
        None => None,
    }
}

/// Builds the wrapper installed in front of a serialization callback.
///
/// A missing original is reported and the table is skipped for this call.
pub fn wrap_send_proxy(
    hook: Arc<Hook<SendProxyFn>>,
    augmenter: Arc<RecipientAugmenter>,
) -> Arc<SendProxyFn> {
    send_proxy_fn(move |call, recipients| {
        let original = match hook.original() {
            Ok(original) => original,
            Err(err) => {
                err.report();
                return None;
            }
        };
        augmenter.forward(original.as_ref(), call, recipients)
    })
}
