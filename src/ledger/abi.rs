//! Just enough of the contract ABI encoding for the voting contract's
//! static-typed functions.

use crate::model::signature::keccak256;

use super::LedgerError;

/// Size of one ABI word.
pub const WORD: usize = 32;

/// The 4-byte function selector for a canonical signature such as
/// `"hasVoted(bytes32)"`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature);
    [hash[0], hash[1], hash[2], hash[3]]
}

/// A `uint256` word holding `value`.
pub fn uint(value: u64) -> [u8; WORD] {
    let mut word = [0; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Calldata for a function taking only static 32-byte arguments.
pub fn encode_call(signature: &str, args: &[[u8; WORD]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(arg);
    }
    data
}

fn first_word(data: &[u8]) -> Result<&[u8], LedgerError> {
    data.get(..WORD).ok_or_else(|| {
        LedgerError::Malformed(format!("expected a 32-byte word, got {} bytes", data.len()))
    })
}

/// Decode a returned `bool`.
pub fn decode_bool(data: &[u8]) -> Result<bool, LedgerError> {
    let word = first_word(data)?;
    match (word[..WORD - 1].iter().all(|b| *b == 0), word[WORD - 1]) {
        (true, 0) => Ok(false),
        (true, 1) => Ok(true),
        _ => Err(LedgerError::Malformed("invalid bool word".to_string())),
    }
}

/// Decode a returned `uint256` that must fit in a `u64`.
pub fn decode_u64(data: &[u8]) -> Result<u64, LedgerError> {
    let word = first_word(data)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(LedgerError::Malformed("uint256 overflows u64".to_string()));
    }
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(bytes))
}
