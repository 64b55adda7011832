//! JSON document store over a key-value backend.
//!
//! Every mutation goes through [`Db::transact`]: the closure reads documents,
//! stages writes, and the writes are committed together only when the closure
//! returns `Ok`. The in-process backend holds its lock for the whole closure, so
//! a read-check-write sequence such as a like toggle cannot interleave with
//! another request.
//!
//! The Spin KV backend has no lock and no compare-and-swap. Its closures read
//! live data and its commits go key by key, so two concurrent requests that
//! read the same document both commit and the last write wins.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

trait KvRead {
    fn read(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

impl KvRead for HashMap<String, Vec<u8>> {
    fn read(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.get(key).cloned())
    }
}

#[cfg(target_arch = "wasm32")]
impl KvRead for spin_sdk::key_value::Store {
    fn read(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.get(key)
            .map_err(|e| anyhow::anyhow!("key-value read of '{}' failed: {:?}", key, e))
    }
}

/// Staged view of the store for the duration of one transaction.
pub struct Txn<'a> {
    view: &'a dyn KvRead,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl<'a> Txn<'a> {
    fn new(view: &'a dyn KvRead) -> Self {
        Self {
            view,
            writes: BTreeMap::new(),
        }
    }

    /// Reads a document, seeing this transaction's own staged writes first.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let raw = match self.writes.get(key) {
            Some(staged) => staged.clone(),
            None => self.view.read(key)?,
        };
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
                anyhow::anyhow!("corrupt document at '{}': {}", key, e)
            })?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        self.writes
            .insert(key.to_string(), Some(serde_json::to_vec(value)?));
        Ok(())
    }

    pub fn delete(&mut self, key: &str) {
        self.writes.insert(key.to_string(), None);
    }

    pub fn exists(&self, key: &str) -> anyhow::Result<bool> {
        match self.writes.get(key) {
            Some(staged) => Ok(staged.is_some()),
            None => Ok(self.view.read(key)?.is_some()),
        }
    }
}

enum Backend {
    Memory(Mutex<HashMap<String, Vec<u8>>>),
    #[cfg(target_arch = "wasm32")]
    Spin(spin_sdk::key_value::Store),
}

pub struct Db {
    backend: Backend,
}

impl Default for Db {
    fn default() -> Self {
        Self::memory()
    }
}

impl Db {
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(HashMap::new())),
        }
    }

    /// Spin's default key-value store. Spin offers neither multi-key
    /// transactions nor isolation between instances, so staged writes are
    /// committed key by key and concurrent read-modify-writes can be lost.
    #[cfg(target_arch = "wasm32")]
    pub fn open_default() -> anyhow::Result<Self> {
        let store = spin_sdk::key_value::Store::open_default()
            .map_err(|e| anyhow::anyhow!("cannot open default key-value store: {:?}", e))?;
        Ok(Self {
            backend: Backend::Spin(store),
        })
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        self.transact(|txn| txn.get_json(key))
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = match &self.backend {
            Backend::Memory(map) => map
                .lock()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            #[cfg(target_arch = "wasm32")]
            Backend::Spin(store) => store
                .get_keys()
                .map_err(|e| anyhow::anyhow!("key listing failed: {:?}", e))?
                .into_iter()
                .filter(|k| k.starts_with(prefix))
                .collect(),
        };
        keys.sort();
        Ok(keys)
    }

    pub fn transact<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Txn<'_>) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        match &self.backend {
            Backend::Memory(map) => {
                let mut guard = map.lock();
                let (result, writes) = {
                    let mut txn = Txn::new(&*guard);
                    let result = f(&mut txn);
                    (result, txn.writes)
                };
                if result.is_ok() {
                    for (key, value) in writes {
                        match value {
                            Some(bytes) => {
                                guard.insert(key, bytes);
                            }
                            None => {
                                guard.remove(&key);
                            }
                        }
                    }
                }
                result
            }
            #[cfg(target_arch = "wasm32")]
            Backend::Spin(store) => {
                let (result, writes) = {
                    let mut txn = Txn::new(store);
                    let result = f(&mut txn);
                    (result, txn.writes)
                };
                if result.is_ok() {
                    for (key, value) in writes {
                        let written = match value {
                            Some(bytes) => store.set(&key, &bytes),
                            None => store.delete(&key),
                        };
                        written.map_err(|e| {
                            anyhow::anyhow!("key-value write of '{}' failed: {:?}", key, e)
                        })?;
                    }
                }
                result
            }
        }
    }
}
