use thiserror::Error;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// VarInts wider than 32 bits don't exist in the protocol, so decoding stops
/// after 5 bytes.
const MAX_BYTES: usize = 5;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum VarIntError {
    #[error("VarInt continuation exceeds 5 bytes")]
    TooLong,
    #[error("input ended before VarInt terminated")]
    Incomplete,
}

pub fn encode(mut value: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_BYTES);
    loop {
        if value & !(SEGMENT_BITS as u32) == 0 {
            out.push(value as u8);
            return out;
        }
        out.push((value as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        value >>= 7;
    }
}

/// Decodes a VarInt from the front of `data`, returning the value and the
/// number of bytes consumed.
pub fn decode(data: &[u8]) -> Result<(u32, usize), VarIntError> {
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_BYTES {
            return Err(VarIntError::TooLong);
        }
        value |= ((byte & SEGMENT_BITS) as u32) << (7 * i);
        if byte & CONTINUE_BIT == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(VarIntError::Incomplete)
}
