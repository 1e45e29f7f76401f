// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{KeyInfo, KeyStore, errors::Error, wallet_helpers};
use crate::shim::address::Address;
use crate::shim::crypto::{Signature, SignatureType};
use ahash::HashMap;

/// A key, this contains a `KeyInfo`, an address, and a public key.
#[derive(Clone, PartialEq, Debug, Eq)]
pub struct Key {
    pub key_info: KeyInfo,
    pub public_key: Vec<u8>,
    pub address: Address,
}

impl TryFrom<KeyInfo> for Key {
    type Error = Error;

    fn try_from(key_info: KeyInfo) -> Result<Self, Self::Error> {
        let public_key = wallet_helpers::to_public(key_info.key_type(), key_info.private_key())?;
        let address = wallet_helpers::new_address(key_info.key_type(), &public_key)?;
        Ok(Key {
            key_info,
            public_key,
            address,
        })
    }
}

/// Generates a fresh key of the given type.
pub fn generate_key(typ: SignatureType) -> Result<Key, Error> {
    let private_key = wallet_helpers::generate(typ)?;
    Key::try_from(KeyInfo::new(typ, private_key))
}

fn keystore_name(addr: &Address) -> String {
    format!("wallet-{addr}")
}

/// A wallet is a collection of private keys with optional persistence and
/// optional encryption.
#[derive(Clone, PartialEq, Debug, Eq, Default)]
pub struct Wallet {
    keys: HashMap<Address, Key>,
    keystore: KeyStore,
}

impl Wallet {
    /// Return a new wallet with a given `KeyStore`
    pub fn new(keystore: KeyStore) -> Self {
        Wallet {
            keys: HashMap::default(),
            keystore,
        }
    }

    /// Return the key that is resolved by a given address.
    pub fn find_key(&mut self, addr: &Address) -> Result<Key, Error> {
        if let Some(k) = self.keys.get(addr) {
            return Ok(k.clone());
        }
        let key_info = self.keystore.get(&keystore_name(addr))?;
        let new_key = Key::try_from(key_info)?;
        self.keys.insert(*addr, new_key.clone());
        Ok(new_key)
    }

    /// Return the resultant `Signature` after signing a given message
    pub fn sign(&mut self, addr: &Address, msg: &[u8]) -> Result<Signature, Error> {
        let key = self.find_key(addr).map_err(|_| Error::KeyNotExists)?;
        wallet_helpers::sign(key.key_info.key_type(), key.key_info.private_key(), msg)
    }

    /// Add `KeyInfo` to the wallet, return the address that resolves to this
    /// newly added `KeyInfo`
    pub fn import(&mut self, key_info: KeyInfo) -> Result<Address, Error> {
        let k = Key::try_from(key_info)?;
        self.keystore
            .put(keystore_name(&k.address), k.key_info.clone())?;
        let address = k.address;
        self.keys.insert(address, k);
        Ok(address)
    }

    /// Generate a new address that fits the requirement of the given
    /// `SignatureType`
    pub fn generate_addr(&mut self, typ: SignatureType) -> Result<Address, Error> {
        let key = generate_key(typ)?;
        self.import(key.key_info)
    }

    pub fn has_key(&mut self, addr: &Address) -> bool {
        self.find_key(addr).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shim::crypto;

    #[test]
    fn generate_then_sign() {
        let mut wallet = Wallet::default();
        let addr = wallet.generate_addr(SignatureType::Secp256k1).unwrap();
        assert!(wallet.has_key(&addr));

        let sig = wallet.sign(&addr, b"voucher bytes").unwrap();
        crypto::verify(&sig, b"voucher bytes", &addr).unwrap();
    }

    #[test]
    fn sign_with_unknown_address_fails() {
        let mut wallet = Wallet::default();
        let stranger = generate_key(SignatureType::Secp256k1).unwrap().address;
        assert!(!wallet.has_key(&stranger));
        assert_eq!(wallet.sign(&stranger, b"x"), Err(Error::KeyNotExists));
    }

    #[test]
    fn import_is_idempotent_error() {
        let mut wallet = Wallet::default();
        let key = generate_key(SignatureType::Secp256k1).unwrap();
        wallet.import(key.key_info.clone()).unwrap();
        assert_eq!(wallet.import(key.key_info), Err(Error::KeyExists));
    }
}
