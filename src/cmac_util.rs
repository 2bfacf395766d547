//! AES-CMAC (RFC 4493) and ISO/IEC 9797-1 Method 2 padding.
//!
//! The subkey derivation and CBC-MAC chaining are delegated to the
//! `cmac`/`aes` crates; this module only owns the two things generic CMAC
//! examples get wrong for this protocol family: the odd-indexed 8-byte
//! truncation used on the wire, and the M2 pad/unpad convention.

use aes::Aes128;
use cmac::{Cmac, Mac};

/// `CMAC(K, M)` per RFC 4493, full 16-byte tag.
pub fn cmac(key: &[u8; 16], message: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key).expect("key is 16 bytes");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Truncate a 16-byte CMAC tag to the 8 bytes shipped on the wire.
///
/// This is NOT a prefix: it is the bytes at odd indices 1,3,5,...,15.
pub fn truncate8(tag: &[u8; 16]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (i, o) in out.iter_mut().enumerate() {
        *o = tag[1 + i * 2];
    }
    out
}

/// ISO/IEC 9797-1 Method 2 padding: append 0x80 then zero-fill to a
/// positive multiple of 16. A message already block-aligned gets a full
/// extra padding block.
pub fn pad_m2(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out.push(0x80);
    while out.len() % 16 != 0 {
        out.push(0x00);
    }
    out
}

/// Strip an M2 pad: trailing 0x00 bytes then one trailing 0x80. If no 0x80
/// is found, the buffer is returned unchanged (never an error).
pub fn unpad_m2(data: &[u8]) -> Vec<u8> {
    let mut end = data.len();
    while end > 0 && data[end - 1] == 0x00 {
        end -= 1;
    }
    if end > 0 && data[end - 1] == 0x80 {
        data[..end - 1].to_vec()
    } else {
        data.to_vec()
    }
}
