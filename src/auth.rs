//! EV2-First mutual authentication (component D).
//!
//! Two APDUs with the card, both encrypted/decrypted under the long-term
//! key in AES-CBC with a zero IV, end with a pair of CMAC-derived session
//! keys and a fresh transaction id. See spec §4.D for the exact byte
//! layouts; this module follows it literally.

use crate::apdu::{transmit, Apdu, Transport};
use crate::cmac_util::cmac;
use crate::crypto::{cbc_decrypt, cbc_encrypt};
use crate::error::{Error, Result};
use crate::rng::RandomSource;
use crate::session::Session;

const ZERO_IV: [u8; 16] = [0u8; 16];

fn rotate_left_1(buf: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..15].copy_from_slice(&buf[1..]);
    out[15] = buf[0];
    out
}

fn rotate_right_1(buf: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[1..].copy_from_slice(&buf[..15]);
    out[0] = buf[15];
    out
}

/// Run EV2-First against `transport` with long-term key `key` at key number
/// `key_no` (0..=0x0F). Draws RndA from `rng`. Returns a fresh `Session` on
/// success; leaves no session state on any failure.
pub fn authenticate_ev2_first(
    transport: &mut dyn Transport,
    key: &[u8; 16],
    key_no: u8,
    rng: &mut dyn RandomSource,
) -> Result<Session> {
    if key_no > 0x0F {
        return Err(Error::ProtocolParameter(format!(
            "key number {key_no:#04X} out of range 0x00..=0x0F"
        )));
    }

    // Part 1: `90 71 00 00 02 n 00 00`.
    let part1 = Apdu::new(0x90, 0x71, 0x00, 0x00, vec![key_no, 0x00]);
    let (body, sw) = transmit(transport, &part1)?;
    if sw != 0x91AF {
        return Err(Error::UnexpectedStatus { sw });
    }
    if body.len() != 16 {
        return Err(Error::ShortResponse {
            expected: 16,
            actual: body.len(),
        });
    }

    let rnd_b: [u8; 16] = cbc_decrypt(key, &ZERO_IV, &body)
        .try_into()
        .expect("16 bytes in, 16 out");
    let rnd_a = rng.next_16();
    let rnd_b_rot = rotate_left_1(&rnd_b);

    let mut m = Vec::with_capacity(32);
    m.extend_from_slice(&rnd_a);
    m.extend_from_slice(&rnd_b_rot);
    let e = cbc_encrypt(key, &ZERO_IV, &m);

    // Part 2: `90 AF 00 00 20 E 00`.
    let part2 = Apdu::new(0x90, 0xAF, 0x00, 0x00, e);
    let (body, sw) = transmit(transport, &part2)?;
    if sw != 0x9100 {
        return Err(Error::UnexpectedStatus { sw });
    }
    if body.len() != 32 {
        return Err(Error::ShortResponse {
            expected: 32,
            actual: body.len(),
        });
    }

    let dec = cbc_decrypt(key, &ZERO_IV, &body);
    let ti: [u8; 4] = dec[0..4].try_into().unwrap();
    let rnd_a_rot: [u8; 16] = dec[4..20].try_into().unwrap();
    let rnd_a_check = rotate_right_1(&rnd_a_rot);
    if rnd_a_check != rnd_a {
        return Err(Error::AuthFailure);
    }

    let (kenc, kmac) = derive_session_keys(key, &rnd_a, &rnd_b);
    Ok(Session::new(kenc, kmac, ti, key_no))
}

/// SV1/SV2 CMAC-KDF per spec §4.D step 7.
fn derive_session_keys(key: &[u8; 16], rnd_a: &[u8; 16], rnd_b: &[u8; 16]) -> ([u8; 16], [u8; 16]) {
    let mut mix = [0u8; 26];
    mix[0..2].copy_from_slice(&rnd_a[0..2]);
    for i in 0..6 {
        mix[2 + i] = rnd_a[2 + i] ^ rnd_b[i];
    }
    mix[8..18].copy_from_slice(&rnd_b[6..16]);
    mix[18..26].copy_from_slice(&rnd_a[8..16]);

    let mut sv1 = Vec::with_capacity(32);
    sv1.extend_from_slice(&[0xA5, 0x5A, 0x00, 0x01, 0x00, 0x80]);
    sv1.extend_from_slice(&mix);

    let mut sv2 = Vec::with_capacity(32);
    sv2.extend_from_slice(&[0x5A, 0xA5, 0x00, 0x01, 0x00, 0x80]);
    sv2.extend_from_slice(&mix);

    (cmac(key, &sv1), cmac(key, &sv2))
}
