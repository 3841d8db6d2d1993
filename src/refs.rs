//! Reference and deferred-id tables.
//!
//! Both sides of the codec assign monotonically increasing ids to composite
//! values in first-visit order: the encoder right before it recurses into a
//! composite's children, the decoder the moment a composite opens. As long as
//! both follow that rule the sequences line up and a back-reference `@n`
//! written by one side names the same value slot on the other.

use std::collections::HashMap;

use crate::value::Value;

/// Encode-side reference table keyed by value identity.
///
/// A clone of every registered handle is retained for the duration of the
/// encode call so an `Arc` pointer can never be freed and reused for a
/// different value while its id is still live. The table is dropped with the
/// call, so nothing outlives the operation.
#[derive(Debug, Default)]
pub(crate) struct IdentityTable {
    ids: HashMap<usize, u64>,
    keepalive: Vec<Value>,
    next: u64,
}

impl IdentityTable {
    /// Returns the id previously assigned to this identity, if any.
    pub fn lookup(&self, identity: usize) -> Option<u64> {
        self.ids.get(&identity).copied()
    }

    /// Assigns the next id to a value and pins its handle alive.
    pub fn assign(&mut self, identity: usize, value: &Value) -> u64 {
        let id = self.next;
        self.next += 1;
        self.ids.insert(identity, id);
        self.keepalive.push(value.clone());
        id
    }
}

/// Decode-side reference table: id is the position of first open.
#[derive(Debug, Default)]
pub(crate) struct IndexTable {
    slots: Vec<Value>,
}

impl IndexTable {
    /// Registers a value at the next slot and returns its id.
    ///
    /// Composites are registered while still empty, before their children
    /// parse, so a back-reference produced mid-composite resolves to the same
    /// identity the finished composite will have.
    pub fn register(&mut self, value: Value) -> u64 {
        let id = self.slots.len() as u64;
        self.slots.push(value);
        id
    }

    /// Replaces the value at an already-registered slot.
    ///
    /// Staged forms (set/map/pattern/field-collection/plugin) reserve their
    /// slot at open time and patch in the materialized value on close.
    pub fn patch(&mut self, id: u64, value: Value) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = value;
        }
    }

    /// Resolves a back-reference.
    pub fn get(&self, id: u64) -> Option<Value> {
        self.slots.get(id as usize).cloned()
    }
}

/// Encode-side id assignment for deferred sources.
///
/// Deferred ids live in their own counter space, separate from reference ids:
/// a resolution line's numeric prefix indexes this table, never the reference
/// table.
#[derive(Debug, Default)]
pub(crate) struct DeferredIds {
    ids: HashMap<usize, u64>,
    keepalive: Vec<Value>,
    next: u64,
}

impl DeferredIds {
    /// Returns the id previously assigned to this source, if any.
    pub fn lookup(&self, identity: usize) -> Option<u64> {
        self.ids.get(&identity).copied()
    }

    /// Assigns the next deferred id and pins the handle alive.
    pub fn assign(&mut self, identity: usize, value: &Value) -> u64 {
        let id = self.next;
        self.next += 1;
        self.ids.insert(identity, id);
        self.keepalive.push(value.clone());
        id
    }
}
