//! Wallet addresses and recovery of personal-message signatures.
//!
//! Voters prove ownership of an address by signing text with their wallet
//! using the `personal_sign` scheme: the message is prefixed with
//! `"\x19Ethereum Signed Message:\n<len>"`, hashed with Keccak-256, and
//! signed with secp256k1. We never verify against a known public key; the
//! signer's address is recovered from the signature and compared instead.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use k256::{
    ecdsa::{RecoveryId, Signature, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Length of a recoverable signature: `r || s || v`.
pub const SIGNATURE_LENGTH: usize = 65;

const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Keccak-256 of the given bytes.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Keccak256::digest(data.as_ref()).into()
}

/// Decode a hex string, with or without a `0x` prefix, in either case.
pub fn decode_hex(value: &str) -> Option<Vec<u8>> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    HEXLOWER_PERMISSIVE.decode(digits.as_bytes()).ok()
}

/// Encode bytes as lowercase hex with a `0x` prefix.
pub fn encode_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", HEXLOWER.encode(bytes.as_ref()))
}

/// A 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// The address controlled by the given public key: the last 20 bytes of
    /// the Keccak-256 of the uncompressed point (without its tag byte).
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.as_affine().to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut bytes = [0; 20];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

/// Addresses display in lowercase, so string comparison is case-insensitive
/// once both sides have been through `Address`.
impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", HEXLOWER.encode(&self.0))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s.trim()).ok_or(AddressParseError::Encoding)?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| AddressParseError::Length(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("address is not valid hex")]
    Encoding,
    #[error("address must be 20 bytes, got {0}")]
    Length(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature is not valid hex")]
    Encoding,
    #[error("signature must be {SIGNATURE_LENGTH} bytes, got {0}")]
    Length(usize),
    #[error("invalid recovery byte {0}")]
    RecoveryByte(u8),
    #[error("signature does not recover to a public key")]
    Unrecoverable,
}

/// The digest a wallet signs for `personal_sign(message)`.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("{PERSONAL_MESSAGE_PREFIX}{}", message.len()));
    hasher.update(message);
    hasher.finalize().into()
}

/// Recover the address that produced `signature` over `message`.
///
/// The recovery byte may be given either raw (0/1) or with the legacy
/// offset of 27.
pub fn recover_personal_signer(message: &str, signature: &str) -> Result<Address, SignatureError> {
    let bytes = decode_hex(signature.trim()).ok_or(SignatureError::Encoding)?;
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(SignatureError::Length(bytes.len()));
    }

    let v = bytes[SIGNATURE_LENGTH - 1];
    let recovery_id = match v {
        0 | 1 => RecoveryId::from_byte(v),
        27 | 28 => RecoveryId::from_byte(v - 27),
        _ => None,
    }
    .ok_or(SignatureError::RecoveryByte(v))?;

    let signature = Signature::from_slice(&bytes[..SIGNATURE_LENGTH - 1])
        .map_err(|_| SignatureError::Unrecoverable)?;
    let key = VerifyingKey::recover_from_prehash(
        &personal_message_hash(message),
        &signature,
        recovery_id,
    )
    .map_err(|_| SignatureError::Unrecoverable)?;

    Ok(Address::from_verifying_key(&key))
}

/// A wallet for signing challenges and votes in tests.
#[cfg(test)]
pub mod wallet {
    use k256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    use super::*;

    pub struct TestWallet {
        key: SigningKey,
    }

    impl TestWallet {
        pub fn random() -> Self {
            Self {
                key: SigningKey::random(&mut OsRng),
            }
        }

        pub fn from_secret(secret: &str) -> Self {
            let bytes = decode_hex(secret).unwrap();
            Self {
                key: SigningKey::from_slice(&bytes).unwrap(),
            }
        }

        pub fn address(&self) -> Address {
            Address::from_verifying_key(self.key.verifying_key())
        }

        pub fn signing_key(&self) -> &SigningKey {
            &self.key
        }

        /// Sign as `personal_sign` does, with the legacy `v` offset.
        pub fn sign(&self, message: &str) -> String {
            let (signature, recovery_id) = self
                .key
                .sign_prehash_recoverable(&personal_message_hash(message))
                .unwrap();
            let mut bytes = signature.to_bytes().to_vec();
            bytes.push(27 + recovery_id.to_byte());
            encode_hex(bytes)
        }
    }
}
