/// Recursive-length-prefix encoding for legacy transactions
///
/// Only the encoder is needed: the registry client builds and signs
/// transactions but never parses them.

/// Encode a byte string
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return vec![bytes[0]];
    }
    let mut out = length_prefix(bytes.len(), 0x80);
    out.extend_from_slice(bytes);
    out
}

/// Encode an unsigned integer as its minimal big-endian byte string
pub fn encode_uint(value: u128) -> Vec<u8> {
    encode_scalar(&value.to_be_bytes())
}

/// Encode a big-endian integer of any width, dropping leading zero bytes
pub fn encode_scalar(be_bytes: &[u8]) -> Vec<u8> {
    let first = be_bytes.iter().position(|b| *b != 0).unwrap_or(be_bytes.len());
    encode_bytes(&be_bytes[first..])
}

/// Encode a list of already-encoded items
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(Vec::len).sum();
    let mut out = length_prefix(payload_len, 0xc0);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn length_prefix(len: usize, offset: u8) -> Vec<u8> {
    if len < 56 {
        return vec![offset + len as u8];
    }
    let len_bytes = (len as u64).to_be_bytes();
    let first = len_bytes.iter().position(|b| *b != 0).unwrap_or(len_bytes.len() - 1);
    let len_bytes = &len_bytes[first..];
    let mut out = vec![offset + 55 + len_bytes.len() as u8];
    out.extend_from_slice(len_bytes);
    out
}
