// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::errors::Error;
use crate::shim::address::Address;
use crate::shim::crypto::{SECP_SIG_LEN, Signature, SignatureType};
use crate::utils::encoding::blake2b_256;
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;

/// Return the public key for a given private key and `SignatureType`
pub fn to_public(sig_type: SignatureType, private_key: &[u8]) -> Result<Vec<u8>, Error> {
    match sig_type {
        SignatureType::Secp256k1 => {
            let private_key =
                SigningKey::from_slice(private_key).map_err(|err| Error::Other(err.to_string()))?;
            let public_key = private_key.verifying_key().to_encoded_point(false);
            Ok(public_key.as_bytes().to_vec())
        }
        other => Err(Error::UnsupportedKeyType(format!("{other:?}"))),
    }
}

/// Return a new Address that is of a given `SignatureType` and uses the
/// supplied public key
pub fn new_address(sig_type: SignatureType, public_key: &[u8]) -> Result<Address, Error> {
    match sig_type {
        SignatureType::Secp256k1 => {
            Address::new_secp256k1(public_key).map_err(|err| Error::Other(err.to_string()))
        }
        other => Err(Error::UnsupportedKeyType(format!("{other:?}"))),
    }
}

/// Sign takes in `SignatureType`, private key and message. Returns a Signature
/// for that message
pub fn sign(sig_type: SignatureType, private_key: &[u8], msg: &[u8]) -> Result<Signature, Error> {
    match sig_type {
        SignatureType::Secp256k1 => {
            let priv_key =
                SigningKey::from_slice(private_key).map_err(|err| Error::Other(err.to_string()))?;
            let msg_hash = blake2b_256(msg);
            let (sig, recovery_id) = priv_key
                .sign_prehash_recoverable(&msg_hash)
                .map_err(|err| Error::Other(err.to_string()))?;
            let mut new_bytes = [0; SECP_SIG_LEN];
            new_bytes[..SECP_SIG_LEN - 1].copy_from_slice(&sig.to_bytes());
            new_bytes[SECP_SIG_LEN - 1] = recovery_id.to_byte();
            Ok(Signature::new_secp256k1(new_bytes.to_vec()))
        }
        other => Err(Error::UnsupportedKeyType(format!("{other:?}"))),
    }
}

/// Generate a new private key
pub fn generate(sig_type: SignatureType) -> Result<Vec<u8>, Error> {
    match sig_type {
        SignatureType::Secp256k1 => {
            let key = SigningKey::random(&mut OsRng);
            Ok(key.to_bytes().to_vec())
        }
        other => Err(Error::UnsupportedKeyType(format!("{other:?}"))),
    }
}
