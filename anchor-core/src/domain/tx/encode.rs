use crate::foundation::{Hash32, Outpoint, Txid};
use sha2::{Digest, Sha256};

pub const TX_VERSION: u32 = 1;
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

#[derive(Clone, Debug, PartialEq)]
pub struct TxInput {
    pub previous_output: Outpoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// Serialized wire bytes. Txids are written in internal (reversed)
    /// byte order, the opposite of their display form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            write_outpoint(&mut out, &input.previous_output);
            write_varint(&mut out, input.script_sig.len() as u64);
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut out, output.script_pubkey.len() as u64);
            out.extend_from_slice(&output.script_pubkey);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + 4; // version + lock_time
        size += varint_size(self.inputs.len() as u64);
        for input in &self.inputs {
            size += 32 + 4; // outpoint
            size += varint_size(input.script_sig.len() as u64) + input.script_sig.len();
            size += 4; // sequence
        }
        size += varint_size(self.outputs.len() as u64);
        for output in &self.outputs {
            size += 8;
            size += varint_size(output.script_pubkey.len() as u64) + output.script_pubkey.len();
        }
        size
    }

    /// Transaction id: double-SHA-256 of the wire bytes, displayed reversed.
    pub fn txid(&self) -> Txid {
        let digest = sha256d(&self.serialize());
        let mut reversed = digest;
        reversed.reverse();
        Txid::new(reversed)
    }
}

pub fn sha256d(data: &[u8]) -> Hash32 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

pub(crate) fn write_outpoint(out: &mut Vec<u8>, outpoint: &Outpoint) {
    let mut txid_bytes = *outpoint.txid.as_bytes();
    txid_bytes.reverse();
    out.extend_from_slice(&txid_bytes);
    out.extend_from_slice(&outpoint.vout.to_le_bytes());
}

pub(crate) fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

pub(crate) fn varint_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}
