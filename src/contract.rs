//! ABI surface of the TimeMaze contract.
//!
//! ```text
//! function submitResult(bytes32 inputHandle, bytes inputProof)
//! function mintProof(string metadataUri)
//! event ResultSubmitted(address indexed player, bytes32 inputHandle, uint64 timestamp)
//! ```

use fhevm_crypto::{keccak256, Address};

use crate::error::{Error, Result};
use crate::types::{CiphertextHandle, EncryptedPayload, LogEntry, TransactionRequest, Word};

pub const SUBMIT_RESULT_SIGNATURE: &str = "submitResult(bytes32,bytes)";
pub const MINT_PROOF_SIGNATURE: &str = "mintProof(string)";
pub const RESULT_SUBMITTED_SIGNATURE: &str = "ResultSubmitted(address,bytes32,uint64)";

/// First four bytes of the Keccak hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic 0 of an event.
pub fn event_topic(signature: &str) -> Word {
    keccak256(signature.as_bytes())
}

pub fn u64_word(value: u64) -> Word {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// `None` if the word does not fit in 64 bits.
pub fn word_to_u64(word: &Word) -> Option<u64> {
    if word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    Some(u64::from_be_bytes(tail))
}

/// Length-prefixed, right-padded dynamic `bytes`/`string` tail.
fn encode_dynamic(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&u64_word(data.len() as u64));
    out.extend_from_slice(data);
    let padding = (32 - data.len() % 32) % 32;
    out.extend(std::iter::repeat(0u8).take(padding));
}

fn read_word(data: &[u8], offset: usize) -> Result<Word> {
    offset
        .checked_add(32)
        .and_then(|end| data.get(offset..end))
        .and_then(|slice| <Word>::try_from(slice).ok())
        .ok_or_else(|| Error::InvalidResponse(format!("ABI data too short at offset {}", offset)))
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize> {
    word_to_u64(&read_word(data, offset)?)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| Error::InvalidResponse(format!("ABI length overflow at offset {}", offset)))
}

fn read_dynamic(args: &[u8], head_offset: usize) -> Result<Vec<u8>> {
    let start = read_usize(args, head_offset)?;
    let len = read_usize(args, start)?;
    start
        .checked_add(32)
        .and_then(|from| from.checked_add(len).map(|to| from..to))
        .and_then(|range| args.get(range))
        .map(<[u8]>::to_vec)
        .ok_or_else(|| Error::InvalidResponse("ABI dynamic value out of bounds".to_string()))
}

fn strip_selector<'a>(calldata: &'a [u8], signature: &str) -> Result<&'a [u8]> {
    match calldata.split_first_chunk::<4>() {
        Some((sel, args)) if *sel == selector(signature) => Ok(args),
        _ => Err(Error::InvalidResponse(format!(
            "calldata is not a {} call",
            signature
        ))),
    }
}

pub fn encode_submit_result(handle: &CiphertextHandle, input_proof: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 32 * 4 + input_proof.len());
    out.extend_from_slice(&selector(SUBMIT_RESULT_SIGNATURE));
    out.extend_from_slice(handle.as_bytes());
    out.extend_from_slice(&u64_word(0x40));
    encode_dynamic(&mut out, input_proof);
    out
}

pub fn decode_submit_result(calldata: &[u8]) -> Result<(CiphertextHandle, Vec<u8>)> {
    let args = strip_selector(calldata, SUBMIT_RESULT_SIGNATURE)?;
    let handle = CiphertextHandle(read_word(args, 0)?);
    let proof = read_dynamic(args, 32)?;
    Ok((handle, proof))
}

pub fn encode_mint_proof(metadata_uri: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 32 * 3 + metadata_uri.len());
    out.extend_from_slice(&selector(MINT_PROOF_SIGNATURE));
    out.extend_from_slice(&u64_word(0x20));
    encode_dynamic(&mut out, metadata_uri.as_bytes());
    out
}

pub fn decode_mint_proof(calldata: &[u8]) -> Result<String> {
    let args = strip_selector(calldata, MINT_PROOF_SIGNATURE)?;
    String::from_utf8(read_dynamic(args, 0)?)
        .map_err(|e| Error::InvalidResponse(format!("metadata URI is not UTF-8: {}", e)))
}

/// Decoded `ResultSubmitted` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultSubmitted {
    pub player: Address,
    pub input_handle: CiphertextHandle,
    pub timestamp: u64,
}

impl ResultSubmitted {
    pub fn topics(&self) -> Vec<Word> {
        vec![
            event_topic(RESULT_SUBMITTED_SIGNATURE),
            self.player.to_word(),
        ]
    }

    pub fn encode_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(self.input_handle.as_bytes());
        data.extend_from_slice(&u64_word(self.timestamp));
        data
    }

    /// Decode from a log. Topic 0 is not checked; callers filter on it.
    pub fn decode(log: &LogEntry) -> Result<Self> {
        let player_word = log
            .topics
            .get(1)
            .ok_or_else(|| Error::InvalidResponse("ResultSubmitted log has no player topic".to_string()))?;
        let player = Address::from_slice(&player_word[12..])?;
        let input_handle = CiphertextHandle(read_word(&log.data, 0)?);
        let timestamp = word_to_u64(&read_word(&log.data, 32)?)
            .ok_or_else(|| Error::InvalidResponse("timestamp does not fit in uint64".to_string()))?;
        Ok(Self {
            player,
            input_handle,
            timestamp,
        })
    }
}

/// Deployed TimeMaze contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeMaze {
    pub address: Address,
}

impl TimeMaze {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// `submitResult(handles[0], inputProof)`.
    pub fn submit_result(&self, payload: &EncryptedPayload) -> Result<TransactionRequest> {
        let handle = payload
            .handles
            .first()
            .ok_or_else(|| Error::Encoding("payload has no ciphertext handle".to_string()))?;
        Ok(TransactionRequest {
            to: self.address,
            data: encode_submit_result(handle, &payload.input_proof),
        })
    }

    pub fn mint_proof(&self, metadata_uri: &str) -> TransactionRequest {
        TransactionRequest {
            to: self.address,
            data: encode_mint_proof(metadata_uri),
        }
    }
}
