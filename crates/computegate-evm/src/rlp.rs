//! Recursive-length-prefix encoding, just enough for legacy transactions

/// Append a byte string
pub fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    match bytes {
        [b] if *b < 0x80 => out.push(*b),
        _ => {
            encode_length(out, bytes.len(), 0x80);
            out.extend_from_slice(bytes);
        }
    }
}

/// Append an unsigned integer as its minimal big-endian byte string
pub fn encode_uint(out: &mut Vec<u8>, value: u128) {
    let be = value.to_be_bytes();
    let start = be.iter().position(|b| *b != 0).unwrap_or(be.len());
    encode_bytes(out, &be[start..]);
}

/// Append a big-endian scalar with leading zeros stripped (signature r/s)
pub fn encode_scalar(out: &mut Vec<u8>, be: &[u8]) {
    let start = be.iter().position(|b| *b != 0).unwrap_or(be.len());
    encode_bytes(out, &be[start..]);
}

/// Wrap already-encoded items in a list header
pub fn encode_list(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    encode_length(&mut out, payload.len(), 0xc0);
    out.extend_from_slice(payload);
    out
}

fn encode_length(out: &mut Vec<u8>, len: usize, offset: u8) {
    if len <= 55 {
        out.push(offset + len as u8);
    } else {
        let be = (len as u64).to_be_bytes();
        let start = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
        out.push(offset + 55 + (be.len() - start) as u8);
        out.extend_from_slice(&be[start..]);
    }
}
