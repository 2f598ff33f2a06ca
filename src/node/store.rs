//! Local partition: the slice of the dataset this node owns.
//!
//! Shared between the listener and the operator task, so every access
//! goes through the mutex.

use crate::common::Payload;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct Partition {
    map: Mutex<HashMap<String, Payload>>,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, silently replacing any previous payload for `key`
    pub fn insert(&self, key: &str, payload: Payload) {
        self.map.lock().unwrap().insert(key.to_string(), payload);
    }

    pub fn get(&self, key: &str) -> Option<Payload> {
        self.map.lock().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys held locally, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.map.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(value: &str) -> Payload {
        let mut p = Payload::new();
        p.insert("STATE".into(), value.into());
        p
    }

    #[test]
    fn test_insert_get() {
        let partition = Partition::new();
        assert!(partition.is_empty());
        partition.insert("EVT1", payload("OHIO"));
        assert!(partition.contains("EVT1"));
        assert_eq!(partition.get("EVT1"), Some(payload("OHIO")));
        assert_eq!(partition.get("EVT2"), None);
    }

    #[test]
    fn test_overwrite_silently() {
        let partition = Partition::new();
        partition.insert("EVT1", payload("OHIO"));
        partition.insert("EVT1", payload("IOWA"));
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.get("EVT1"), Some(payload("IOWA")));
    }

    #[test]
    fn test_keys_sorted() {
        let partition = Partition::new();
        partition.insert("b", payload("x"));
        partition.insert("a", payload("y"));
        assert_eq!(partition.keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
