// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use super::fvm_shared_latest::crypto::signature::{SECP_SIG_LEN, Signature, SignatureType};

use crate::shim::address::{Address, Protocol};
use crate::utils::encoding::blake2b_256;
use anyhow::{Context as _, ensure};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};

/// Length of an uncompressed secp256k1 public key.
pub const SECP_PUB_LEN: usize = 65;

/// Checks if a signature is valid given data and address.
pub fn verify(signature: &Signature, data: &[u8], addr: &Address) -> anyhow::Result<()> {
    match signature.sig_type {
        SignatureType::Secp256k1 => verify_secp256k1_sig(&signature.bytes, data, addr),
        other => anyhow::bail!("unsupported signature type {other:?}"),
    }
}

/// Recovers the signer of `data` and checks it against `addr`. The signed
/// digest is the `blake2b-256` hash of `data`, as for every Filecoin secp256k1
/// signature.
pub fn verify_secp256k1_sig(signature: &[u8], data: &[u8], addr: &Address) -> anyhow::Result<()> {
    ensure!(
        addr.protocol() == Protocol::Secp256k1,
        "cannot validate a secp256k1 signature against a {} address",
        addr.protocol()
    );

    let hash = blake2b_256(data);
    let pub_key = recover_secp_public_key(&hash, signature)?;
    let rec_addr = Address::new_secp256k1(&pub_key)?;

    // check address against recovered address
    ensure!(rec_addr == *addr, "secp256k1 signature verification failed");

    Ok(())
}

/// Recovers the uncompressed public key from a 65 byte `r || s || v` signature.
pub fn recover_secp_public_key(
    hash: &[u8; 32],
    signature: &[u8],
) -> anyhow::Result<[u8; SECP_PUB_LEN]> {
    ensure!(
        signature.len() == SECP_SIG_LEN,
        "invalid secp256k1 signature length. Was {}, must be {}",
        signature.len(),
        SECP_SIG_LEN
    );
    let (rs, v) = signature.split_at(SECP_SIG_LEN - 1);
    let sig = EcdsaSignature::from_slice(rs)?;
    let recovery_id = v
        .first()
        .copied()
        .and_then(RecoveryId::from_byte)
        .context("invalid secp256k1 recovery id")?;

    let key = VerifyingKey::recover_from_prehash(&hash[..], &sig, recovery_id)?;
    let point = key.to_encoded_point(false);
    point
        .as_bytes()
        .try_into()
        .context("unexpected public key length")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_management::{generate_key, sign};

    #[test]
    fn secp_sign_and_verify() {
        let key = generate_key(SignatureType::Secp256k1).unwrap();
        let message = b"important protocol message";
        let signature = sign(SignatureType::Secp256k1, key.key_info.private_key(), message).unwrap();

        verify(&signature, message, &key.address).unwrap();
    }

    #[test]
    fn secp_verify_rejects_other_signer() {
        let key = generate_key(SignatureType::Secp256k1).unwrap();
        let other = generate_key(SignatureType::Secp256k1).unwrap();
        let message = b"important protocol message";
        let signature = sign(SignatureType::Secp256k1, key.key_info.private_key(), message).unwrap();

        assert!(verify(&signature, message, &other.address).is_err());
    }

    #[test]
    fn secp_verify_rejects_tampered_message() {
        let key = generate_key(SignatureType::Secp256k1).unwrap();
        let signature = sign(SignatureType::Secp256k1, key.key_info.private_key(), b"pay 10").unwrap();

        assert!(verify(&signature, b"pay 99", &key.address).is_err());
    }

    #[test]
    fn secp_verify_rejects_short_signature() {
        let key = generate_key(SignatureType::Secp256k1).unwrap();
        let signature = Signature::new_secp256k1(vec![0; 12]);

        assert!(verify(&signature, b"data", &key.address).is_err());
    }
}
