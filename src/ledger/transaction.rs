//! Dynamic-fee (type 2) transactions.

use k256::ecdsa::SigningKey;
use rlp::RlpStream;

use crate::model::signature::{encode_hex, keccak256, Address};

use super::{LedgerError, TxHash};

/// Envelope type byte for dynamic-fee transactions.
pub const TRANSACTION_TYPE: u8 = 0x02;

/// An unsigned dynamic-fee transaction with no value transfer and an
/// empty access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u64,
    pub max_fee_per_gas: u64,
    pub gas_limit: u64,
    pub to: Address,
    pub data: Vec<u8>,
}

/// A signed transaction, ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: TxHash,
}

impl Eip1559Transaction {
    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.chain_id);
        stream.append(&self.nonce);
        stream.append(&self.max_priority_fee_per_gas);
        stream.append(&self.max_fee_per_gas);
        stream.append(&self.gas_limit);
        stream.append(&self.to.as_bytes().to_vec());
        stream.append(&0_u64); // value
        stream.append(&self.data);
        stream.begin_list(0); // access list
    }

    /// The bytes whose hash is signed.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        typed(stream)
    }

    pub fn sign(&self, key: &SigningKey) -> Result<SignedTransaction, LedgerError> {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&keccak256(self.signing_payload()))
            .map_err(|e| LedgerError::Signing(e.to_string()))?;
        let bytes = signature.to_bytes();

        let mut stream = RlpStream::new_list(12);
        self.append_fields(&mut stream);
        stream.append(&u64::from(recovery_id.is_y_odd()));
        stream.append(&strip_leading_zeros(&bytes[..32]));
        stream.append(&strip_leading_zeros(&bytes[32..]));
        let raw = typed(stream);

        Ok(SignedTransaction {
            hash: TxHash(encode_hex(keccak256(&raw))),
            raw,
        })
    }
}

fn typed(stream: RlpStream) -> Vec<u8> {
    let mut out = vec![TRANSACTION_TYPE];
    out.extend_from_slice(&stream.out());
    out
}

/// Scalars are encoded as minimal big-endian integers.
fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}
