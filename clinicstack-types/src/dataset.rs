//! The full application dataset: collection name to ordered records.

use crate::record::{Record, json_type_name};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Collections the application always expects to exist.
///
/// A full load guarantees every one of these keys is present, even when no
/// source had any data for it.
pub const KNOWN_COLLECTIONS: &[&str] = &[
    "patients",
    "appointments",
    "bookings",
    "queue",
    "visits",
    "prescriptions",
    "lab_results",
    "medical_records",
    "revenue",
    "expenses",
    "invoices",
    "payments",
    "inventory",
    "stock_movements",
    "suppliers",
    "services",
    "doctors",
    "staff",
    "users",
    "settings",
];

/// Every collection of the application, keyed by name.
///
/// Within a collection, record order is insertion order and `id`s are
/// unique as long as records are only added through [`Dataset::upsert`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset(BTreeMap<String, Vec<Record>>);

impl Dataset {
    /// Creates a dataset with no collections at all.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a dataset with every known collection present and empty.
    #[must_use]
    pub fn empty() -> Self {
        Self::new().normalized()
    }

    /// Adds any missing known collection as an empty sequence.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for name in KNOWN_COLLECTIONS {
            self.0.entry((*name).to_string()).or_default();
        }
        self
    }

    /// Parses a dataset from a JSON value, validating its shape.
    ///
    /// The value must be an object whose members are arrays of objects.
    /// `null` members are read as empty collections.
    pub fn from_value(value: Value) -> Result<Self> {
        let members = match value {
            Value::Object(members) => members,
            other => return Err(Error::NotAnObject(json_type_name(&other))),
        };

        let mut collections = BTreeMap::new();
        for (name, member) in members {
            let records = match member {
                Value::Null => Vec::new(),
                Value::Array(items) => items
                    .into_iter()
                    .map(Record::from_value)
                    .collect::<Result<Vec<_>>>()
                    .map_err(|_| Error::InvalidCollection {
                        collection: name.clone(),
                    })?,
                _ => return Err(Error::InvalidCollection { collection: name }),
            };
            collections.insert(name, records);
        }
        Ok(Self(collections))
    }

    /// Returns a collection's records, or an empty slice if it does not exist.
    pub fn collection(&self, name: &str) -> &[Record] {
        self.0.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns a mutable collection, creating it if needed.
    pub fn collection_mut(&mut self, name: &str) -> &mut Vec<Record> {
        self.0.entry(name.to_string()).or_default()
    }

    /// Returns true if the collection key exists (even if empty).
    pub fn has_collection(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Replaces or inserts a whole collection.
    pub fn insert_collection(&mut self, name: impl Into<String>, records: Vec<Record>) {
        self.0.insert(name.into(), records);
    }

    /// Finds a record by id.
    pub fn find(&self, collection: &str, id: &str) -> Option<&Record> {
        self.collection(collection)
            .iter()
            .find(|r| r.id() == Some(id))
    }

    /// Inserts or replaces a record by id.
    ///
    /// Creates the collection if needed. Returns true if an existing record
    /// was replaced. Records without an `id` are always appended.
    pub fn upsert(&mut self, collection: &str, record: Record) -> bool {
        let records = self.collection_mut(collection);
        let existing = record
            .id()
            .and_then(|id| records.iter().position(|r| r.id() == Some(id)));

        match existing {
            Some(index) => {
                records[index] = record;
                true
            }
            None => {
                records.push(record);
                false
            }
        }
    }

    /// Removes a record by id, returning it. Missing collection or id is a no-op.
    pub fn remove(&mut self, collection: &str, id: &str) -> Option<Record> {
        let records = self.0.get_mut(collection)?;
        let index = records.iter().position(|r| r.id() == Some(id))?;
        Some(records.remove(index))
    }

    /// Iterates over collection names.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over `(collection, records)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Iterates mutably over `(collection, records)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<Record>)> {
        self.0.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of records across all collections.
    pub fn total_records(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Returns true if no collection holds any record.
    pub fn is_empty(&self) -> bool {
        self.total_records() == 0
    }

    /// Unwraps into the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, Vec<Record>> {
        self.0
    }
}

impl From<BTreeMap<String, Vec<Record>>> for Dataset {
    fn from(collections: BTreeMap<String, Vec<Record>>) -> Self {
        Self(collections)
    }
}

impl TryFrom<Value> for Dataset {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}
