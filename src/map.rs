//! Mutable-mapping frontend over a [Handle].
//!
//! [Map] adds default-value dispatch and mapping-API sugar (fetch, merge, retain,
//! equality) on top of the handle's four primitives. It contains no concurrency or
//! persistence logic; everything here is delegation.

use crate::{
    handle::{Handle, Iter},
    store::{self, Config},
};
use thiserror::Error;

/// Errors that can occur when interacting with a [Map].
#[derive(Debug, Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] store::Error),
    #[error("key not found: {0:?}")]
    KeyNotFound(Vec<u8>),
}

/// Strategy invoked for keys absent from the store, supplying the value [Map::get]
/// reports instead of `None`.
pub trait DefaultStrategy {
    fn value_for(&self, missing_key: &[u8]) -> Vec<u8>;
}

/// A [DefaultStrategy] returning the same value for every missing key.
pub struct ConstantDefault(Vec<u8>);

impl ConstantDefault {
    pub fn new(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl DefaultStrategy for ConstantDefault {
    fn value_for(&self, _: &[u8]) -> Vec<u8> {
        self.0.clone()
    }
}

/// A persistent, process-shared mutable mapping.
pub struct Map {
    handle: Handle,
    default: Option<Box<dyn DefaultStrategy>>,
}

impl Map {
    /// Open a map with no default strategy: absent keys read as `None`.
    pub fn init(config: Config) -> Result<Self, Error> {
        Ok(Self {
            handle: Handle::init(config)?,
            default: None,
        })
    }

    /// Open a map whose missing-key reads are answered by `strategy`.
    pub fn with_default(
        config: Config,
        strategy: Box<dyn DefaultStrategy>,
    ) -> Result<Self, Error> {
        Ok(Self {
            handle: Handle::init(config)?,
            default: Some(strategy),
        })
    }

    /// Replace the default strategy (or remove it with `None`).
    pub fn set_default(&mut self, strategy: Option<Box<dyn DefaultStrategy>>) {
        self.default = strategy;
    }

    /// The value for `key`, or the default strategy's answer when absent.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        match self.handle.get(key)? {
            Some(value) => Ok(Some(value)),
            None => Ok(self.default.as_ref().map(|d| d.value_for(key))),
        }
    }

    /// The stored value for `key`; absent keys are an error. The default strategy does
    /// not apply.
    pub fn fetch(&mut self, key: &[u8]) -> Result<Vec<u8>, Error> {
        self.handle
            .get(key)?
            .ok_or_else(|| Error::KeyNotFound(key.to_vec()))
    }

    /// The stored value for `key`, or `fallback` when absent.
    pub fn fetch_or(&mut self, key: &[u8], fallback: Vec<u8>) -> Result<Vec<u8>, Error> {
        Ok(self.handle.get(key)?.unwrap_or(fallback))
    }

    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        Ok(self.handle.put(key, value)?)
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<(), Error> {
        Ok(self.handle.delete(key)?)
    }

    pub fn contains_key(&mut self, key: &[u8]) -> Result<bool, Error> {
        Ok(self.handle.contains(key)?)
    }

    pub fn len(&mut self) -> Result<usize, Error> {
        Ok(self.handle.len()?)
    }

    pub fn is_empty(&mut self) -> Result<bool, Error> {
        Ok(self.handle.is_empty()?)
    }

    /// One fresh pass over the then-current published state.
    pub fn iter(&mut self) -> Result<Iter, Error> {
        Ok(self.handle.iter()?)
    }

    pub fn keys(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        let mut keys = Vec::new();
        for entry in self.handle.iter()? {
            keys.push(entry?.0);
        }
        Ok(keys)
    }

    pub fn values(&mut self) -> Result<Vec<Vec<u8>>, Error> {
        let mut values = Vec::new();
        for entry in self.handle.iter()? {
            values.push(entry?.1);
        }
        Ok(values)
    }

    /// Insert every pair, overwriting existing keys.
    pub fn merge<I>(&mut self, pairs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        for (key, value) in pairs {
            self.handle.put(&key, &value)?;
        }
        Ok(())
    }

    /// Insert every pair, resolving collisions with `combine(key, existing, incoming)`.
    /// `existing` is the stored value only; the default strategy does not apply.
    pub fn merge_with<I, F>(&mut self, pairs: I, mut combine: F) -> Result<(), Error>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
        F: FnMut(&[u8], Option<Vec<u8>>, Vec<u8>) -> Vec<u8>,
    {
        for (key, value) in pairs {
            let existing = self.handle.get(&key)?;
            let resolved = combine(&key, existing, value);
            self.handle.put(&key, &resolved)?;
        }
        Ok(())
    }

    /// Replace the entire contents with `pairs`.
    pub fn replace<I>(&mut self, pairs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        Ok(self.handle.replace(pairs)?)
    }

    /// Keep only the pairs `pred` approves of.
    pub fn retain<F>(&mut self, mut pred: F) -> Result<(), Error>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        for entry in self.handle.iter()? {
            let (key, value) = entry?;
            if !pred(&key, &value) {
                self.handle.delete(&key)?;
            }
        }
        Ok(())
    }

    /// Whether both maps hold the same pairs. Compares stored values only.
    pub fn content_eq(&mut self, other: &mut Map) -> Result<bool, Error> {
        if self.len()? != other.len()? {
            return Ok(false);
        }
        for entry in self.handle.iter()? {
            let (key, value) = entry?;
            if other.handle.get(&key)? != Some(value) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), Error> {
        Ok(self.handle.clear()?)
    }

    /// Publish pending writes and release descriptors. Idempotent.
    pub fn close(&mut self) -> Result<(), Error> {
        Ok(self.handle.close()?)
    }

    /// The generation the open read session is pinned to, if any.
    pub fn uid(&self) -> Option<&str> {
        self.handle.uid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(dir: &tempfile::TempDir) -> Map {
        Map::init(Config {
            path: dir.path().join("store"),
        })
        .unwrap()
    }

    #[test]
    fn test_default_strategy_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = Map::with_default(
            Config {
                path: dir.path().join("store"),
            },
            Box::new(ConstantDefault::new(b"fallback".to_vec())),
        )
        .unwrap();

        assert_eq!(map.get(b"missing").unwrap(), Some(b"fallback".to_vec()));
        map.insert(b"present", b"stored").unwrap();
        assert_eq!(map.get(b"present").unwrap(), Some(b"stored".to_vec()));

        // The default never leaks into membership or fetch.
        assert!(!map.contains_key(b"missing").unwrap());
        assert!(matches!(map.fetch(b"missing"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_per_key_strategy() {
        struct KeyEcho;
        impl DefaultStrategy for KeyEcho {
            fn value_for(&self, missing_key: &[u8]) -> Vec<u8> {
                let mut value = b"missing:".to_vec();
                value.extend_from_slice(missing_key);
                value
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut map = Map::with_default(
            Config {
                path: dir.path().join("store"),
            },
            Box::new(KeyEcho),
        )
        .unwrap();
        assert_eq!(map.get(b"abc").unwrap(), Some(b"missing:abc".to_vec()));
    }

    #[test]
    fn test_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = map(&dir);
        map.insert(b"k", b"v").unwrap();

        assert_eq!(map.fetch(b"k").unwrap(), b"v".to_vec());
        assert!(matches!(
            map.fetch(b"missing"),
            Err(Error::KeyNotFound(key)) if key == b"missing"
        ));
        assert_eq!(
            map.fetch_or(b"missing", b"fb".to_vec()).unwrap(),
            b"fb".to_vec()
        );
    }

    #[test]
    fn test_merge_with_combine() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = map(&dir);
        map.insert(b"a", b"1").unwrap();

        map.merge_with(
            vec![(b"a".to_vec(), b"2".to_vec()), (b"b".to_vec(), b"3".to_vec())],
            |_, existing, incoming| match existing {
                Some(mut existing) => {
                    existing.extend_from_slice(b"+");
                    existing.extend_from_slice(&incoming);
                    existing
                }
                None => incoming,
            },
        )
        .unwrap();

        assert_eq!(map.get(b"a").unwrap(), Some(b"1+2".to_vec()));
        assert_eq!(map.get(b"b").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn test_retain() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = map(&dir);
        map.insert(b"keep", b"yes").unwrap();
        map.insert(b"drop", b"no").unwrap();

        map.retain(|_, value| value == b"yes").unwrap();
        assert!(map.contains_key(b"keep").unwrap());
        assert!(!map.contains_key(b"drop").unwrap());
        assert_eq!(map.len().unwrap(), 1);
    }

    #[test]
    fn test_content_eq() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let mut a = map(&dir_a);
        let mut b = map(&dir_b);

        a.insert(b"x", b"1").unwrap();
        b.insert(b"x", b"1").unwrap();
        assert!(a.content_eq(&mut b).unwrap());

        b.insert(b"y", b"2").unwrap();
        assert!(!a.content_eq(&mut b).unwrap());

        a.insert(b"y", b"other").unwrap();
        assert!(!a.content_eq(&mut b).unwrap());
    }

    #[test]
    fn test_keys_values_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = map(&dir);
        map.insert(b"first", b"1").unwrap();
        map.insert(b"second", b"2").unwrap();
        map.insert(b"third", b"3").unwrap();

        assert_eq!(
            map.keys().unwrap(),
            vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
        );
        assert_eq!(
            map.values().unwrap(),
            vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]
        );
    }

    #[test]
    fn test_replace_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = map(&dir);
        map.insert(b"old", b"v").unwrap();
        map.replace(vec![(b"new".to_vec(), b"v".to_vec())]).unwrap();
        assert!(!map.contains_key(b"old").unwrap());
        assert!(map.contains_key(b"new").unwrap());

        map.clear().unwrap();
        assert!(map.is_empty().unwrap());
    }
}
