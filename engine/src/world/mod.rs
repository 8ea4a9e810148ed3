//! World State - typed blackboard for one session
//!
//! Holds the most recently produced instance of each data type. Every type
//! has exactly one slot: writing a type again replaces the earlier value.
//! Values are stored as JSON so snapshots can be parked while a session
//! waits for external input.

use sdk::errors::EngineError;
use sdk::types::{TypeKey, Typed};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Immutable copy of a world, used for planning and suspension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    values: BTreeMap<TypeKey, Value>,
}

impl WorldSnapshot {
    pub fn get(&self, key: &TypeKey) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Mutable single-slot-per-type store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldState {
    values: BTreeMap<TypeKey, Value>,
}

impl WorldState {
    /// Create an empty world
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a world seeded with one typed value
    pub fn with<T: Typed + Serialize>(value: &T) -> Result<Self, EngineError> {
        let mut world = Self::new();
        world.put_typed(value)?;
        Ok(world)
    }

    /// Rebuild a world from a snapshot
    pub fn from_snapshot(snapshot: WorldSnapshot) -> Self {
        Self {
            values: snapshot.values,
        }
    }

    pub fn get(&self, key: &TypeKey) -> Option<&Value> {
        self.values.get(key)
    }

    /// Decode the slot for `T`, if present
    pub fn get_as<T: Typed + DeserializeOwned>(&self) -> Result<Option<T>, EngineError> {
        match self.values.get(&TypeKey::of::<T>()) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Write a value, replacing any earlier value of the same type
    pub fn put(&mut self, key: impl Into<TypeKey>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Encode and write a typed value
    pub fn put_typed<T: Typed + Serialize>(&mut self, value: &T) -> Result<(), EngineError> {
        let encoded = serde_json::to_value(value)?;
        self.values.insert(TypeKey::of::<T>(), encoded);
        Ok(())
    }

    pub fn remove(&mut self, key: &TypeKey) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.values.contains_key(key)
    }

    /// Types currently materialized, in key order
    pub fn types(&self) -> impl Iterator<Item = &TypeKey> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Take an immutable copy
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            values: self.values.clone(),
        }
    }

    /// Replace the whole world with a snapshot
    pub fn restore(&mut self, snapshot: WorldSnapshot) {
        self.values = snapshot.values;
    }
}
