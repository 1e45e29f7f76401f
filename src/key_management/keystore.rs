// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::errors::Error;
use crate::shim::crypto::SignatureType;
use ahash::HashMap;

/// `KeyInfo` holds the type of key and the private key bytes.
#[derive(Clone, PartialEq, Debug, Eq)]
pub struct KeyInfo {
    key_type: SignatureType,
    private_key: Vec<u8>,
}

impl KeyInfo {
    /// Return a new `KeyInfo` given the key type and private key
    pub fn new(key_type: SignatureType, private_key: Vec<u8>) -> Self {
        KeyInfo {
            key_type,
            private_key,
        }
    }

    pub fn key_type(&self) -> SignatureType {
        self.key_type
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

/// In-memory set of [`KeyInfo`]s resolved by name.
#[derive(Default, Clone, PartialEq, Debug, Eq)]
pub struct KeyStore {
    key_info: HashMap<String, KeyInfo>,
}

impl KeyStore {
    /// Return all of the key names that are stored in the `KeyStore`
    pub fn list(&self) -> Vec<String> {
        self.key_info.keys().cloned().collect()
    }

    /// Return `KeyInfo` that corresponds to a given key
    pub fn get(&self, k: &str) -> Result<KeyInfo, Error> {
        self.key_info.get(k).cloned().ok_or(Error::KeyInfo)
    }

    /// Save a key/`KeyInfo` pair to the `KeyStore`
    pub fn put(&mut self, key: String, key_info: KeyInfo) -> Result<(), Error> {
        if self.key_info.contains_key(&key) {
            return Err(Error::KeyExists);
        }
        self.key_info.insert(key, key_info);
        Ok(())
    }

    /// Remove the key and corresponding `KeyInfo` from the `KeyStore`
    pub fn remove(&mut self, key: &str) -> Result<KeyInfo, Error> {
        self.key_info.remove(key).ok_or(Error::KeyNotExists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_rejects_duplicates() {
        let mut ks = KeyStore::default();
        let info = KeyInfo::new(SignatureType::Secp256k1, vec![1; 32]);
        ks.put("wallet-a".into(), info.clone()).unwrap();
        assert_eq!(ks.put("wallet-a".into(), info.clone()), Err(Error::KeyExists));
        assert_eq!(ks.get("wallet-a").unwrap(), info);
        ks.remove("wallet-a").unwrap();
        assert_eq!(ks.get("wallet-a"), Err(Error::KeyInfo));
    }
}
