//! Secure-messaging codec (component E): wraps/unwraps a single application
//! command under an authenticated `Session`.
//!
//! A `Session` is an exclusive resource — see spec §5. Nothing here takes a
//! lock; callers confine a `Session` to one thread or serialize access
//! themselves around the whole wrap/transmit/unwrap critical section.

use crate::apdu::{transmit, Apdu, Transport};
use crate::cmac_util::{cmac, pad_m2, truncate8, unpad_m2};
use crate::crypto::{cbc_decrypt, cbc_encrypt, ecb_encrypt_block};
use crate::error::{Error, Result};
use crate::session::Session;

/// Wrap and send one application command under `session`, returning the
/// decrypted plaintext response and the card's status word.
///
/// On any failure after the transmit step, `session` is left
/// not-authenticated (MAC mismatch) or simply not advanced (all other
/// failures); the counter is only ever bumped after successful MAC
/// verification.
pub fn wrap(
    transport: &mut dyn Transport,
    session: &mut Session,
    ins: u8,
    header: &[u8],
    data: &[u8],
) -> Result<(Vec<u8>, u16)> {
    if !session.is_authenticated() {
        return Err(Error::ProtocolParameter(
            "session is not authenticated".into(),
        ));
    }

    let ivc = command_iv(session);
    let encrypted = if data.is_empty() {
        Vec::new()
    } else {
        cbc_encrypt(&session.kenc, &ivc, &pad_m2(data))
    };

    let mut mac_input = Vec::with_capacity(1 + 2 + 4 + header.len() + encrypted.len());
    mac_input.push(ins);
    mac_input.extend_from_slice(&session.cmd_ctr.to_le_bytes());
    mac_input.extend_from_slice(&session.ti);
    mac_input.extend_from_slice(header);
    mac_input.extend_from_slice(&encrypted);
    let mact = truncate8(&cmac(&session.kmac, &mac_input));

    let mut command_data = Vec::with_capacity(header.len() + encrypted.len() + 8);
    command_data.extend_from_slice(header);
    command_data.extend_from_slice(&encrypted);
    command_data.extend_from_slice(&mact);

    let apdu = Apdu::new(0x90, ins, 0x00, 0x00, command_data);
    let (body, sw) = transmit(transport, &apdu)?;

    if sw & 0xFF00 != 0x9100 {
        return Err(Error::UnexpectedStatus { sw });
    }
    if body.len() < 8 {
        return Err(Error::ShortResponse {
            expected: 8,
            actual: body.len(),
        });
    }

    let (resp_enc, resp_mact) = body.split_at(body.len() - 8);
    let cmd_ctr_next = session.cmd_ctr.wrapping_add(1);

    let mut mac_input2 = Vec::with_capacity(1 + 2 + 4 + resp_enc.len());
    mac_input2.push((sw & 0x00FF) as u8);
    mac_input2.extend_from_slice(&cmd_ctr_next.to_le_bytes());
    mac_input2.extend_from_slice(&session.ti);
    mac_input2.extend_from_slice(resp_enc);
    let expected_mact = truncate8(&cmac(&session.kmac, &mac_input2));

    if expected_mact != resp_mact {
        session.invalidate();
        return Err(Error::MacMismatch);
    }

    let plaintext = if resp_enc.is_empty() {
        Vec::new()
    } else {
        let ivr = response_iv(session, cmd_ctr_next);
        unpad_m2(&cbc_decrypt(&session.kenc, &ivr, resp_enc))
    };

    session.cmd_ctr = cmd_ctr_next;
    Ok((plaintext, sw))
}

fn command_iv(session: &Session) -> [u8; 16] {
    let mut plain = [0u8; 16];
    plain[0] = 0xA5;
    plain[1] = 0x5A;
    plain[2..6].copy_from_slice(&session.ti);
    plain[6..8].copy_from_slice(&session.cmd_ctr.to_le_bytes());
    ecb_encrypt_block(&session.kenc, &plain)
}

fn response_iv(session: &Session, cmd_ctr_next: u16) -> [u8; 16] {
    let mut plain = [0u8; 16];
    plain[0] = 0x5A;
    plain[1] = 0xA5;
    plain[2..6].copy_from_slice(&session.ti);
    plain[6..8].copy_from_slice(&cmd_ctr_next.to_le_bytes());
    ecb_encrypt_block(&session.kenc, &plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::authenticate_ev2_first;
    use crate::rng::FixedRng;
    use hex_literal::hex;
    use std::collections::VecDeque;

    struct ScriptedTransport {
        responses: VecDeque<(Vec<u8>, u16)>,
        sent: Vec<Vec<u8>>,
    }

    impl Transport for ScriptedTransport {
        fn transmit_raw(&mut self, apdu: &[u8]) -> Result<(Vec<u8>, u16)> {
            self.sent.push(apdu.to_vec());
            self.responses
                .pop_front()
                .ok_or_else(|| Error::Transport("script exhausted".into()))
        }
    }

    fn fixed_session() -> Session {
        // Same fixed handshake vector as auth::tests::ev2_first_fixed_vector.
        let key = [0u8; 16];
        let rnd_b = hex!("CAFEBABEDEADBEEF0123456789ABCDEF");
        let rnd_a = hex!("00112233445566778899AABBCCDDEEFF");
        let ti = hex!("11223344");

        let rnd_b_enc = cbc_encrypt(&key, &[0u8; 16], &rnd_b);
        let rnd_a_rot = {
            let mut out = [0u8; 16];
            out[1..].copy_from_slice(&rnd_a[..15]);
            out[0] = rnd_a[15];
            out
        };
        let mut second_plain = Vec::with_capacity(32);
        second_plain.extend_from_slice(&ti);
        second_plain.extend_from_slice(&rnd_a_rot);
        second_plain.extend_from_slice(&[0u8; 12]);
        let second_enc = cbc_encrypt(&key, &[0u8; 16], &second_plain);

        let mut transport = ScriptedTransport {
            responses: VecDeque::from([(rnd_b_enc, 0x91AF), (second_enc, 0x9100)]),
            sent: vec![],
        };
        let mut rng = FixedRng(rnd_a);
        authenticate_ev2_first(&mut transport, &key, 0x00, &mut rng).unwrap()
    }

    /// Scenario 2 from spec §8: wrap GetFileSettings(file=0x02) at CmdCtr=0.
    #[test]
    fn wrap_get_file_settings_matches_vector() {
        let mut session = fixed_session();
        let mut transport = ScriptedTransport {
            // Response body doesn't matter for this assertion; we only
            // inspect the outgoing APDU, but transmit() still needs a
            // well-formed (failing-to-verify-is-fine) response to return.
            responses: VecDeque::from([(vec![0u8; 8], 0x9100)]),
            sent: vec![],
        };

        // We expect a MAC mismatch since the scripted response is bogus;
        // what we actually assert is the outgoing wire bytes.
        let _ = wrap(&mut transport, &mut session, 0xF5, &[0x02], &[]);

        let sent = &transport.sent[0];
        // CLA INS P1 P2 Lc [H=02 || MACt(8)] Le
        assert_eq!(sent[0], 0x90);
        assert_eq!(sent[1], 0xF5);
        assert_eq!(sent[4], 0x09); // Lc = 1 (header) + 0 (no data) + 8 (mac)
        assert_eq!(sent[5], 0x02);

        let mac_input = {
            let mut v = vec![0xF5u8, 0x00, 0x00];
            v.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);
            v.push(0x02);
            v
        };
        let expected_mact = truncate8(&cmac(&session_fixed_kmac(), &mac_input));
        assert_eq!(&sent[6..14], &expected_mact);
    }

    fn session_fixed_kmac() -> [u8; 16] {
        fixed_session().kmac
    }

    /// Scenario 3 from spec §8: unwrap a scripted card response and check
    /// the counter advances exactly once.
    #[test]
    fn unwrap_advances_counter_on_success() {
        let mut session = fixed_session();
        let kenc = session.kenc;
        let kmac = session.kmac;
        let ti = session.ti;

        let plaintext = b"hello settings!!".to_vec(); // 16 bytes, block aligned after pad
        let padded = pad_m2(&plaintext);
        let cmd_ctr_next = session.cmd_ctr.wrapping_add(1);
        let mut ivr_plain = [0u8; 16];
        ivr_plain[0] = 0x5A;
        ivr_plain[1] = 0xA5;
        ivr_plain[2..6].copy_from_slice(&ti);
        ivr_plain[6..8].copy_from_slice(&cmd_ctr_next.to_le_bytes());
        let ivr = ecb_encrypt_block(&kenc, &ivr_plain);
        let enc = cbc_encrypt(&kenc, &ivr, &padded);

        let sw: u16 = 0x9100;
        let mut mac_in = Vec::new();
        mac_in.push((sw & 0xFF) as u8);
        mac_in.extend_from_slice(&cmd_ctr_next.to_le_bytes());
        mac_in.extend_from_slice(&ti);
        mac_in.extend_from_slice(&enc);
        let mact = truncate8(&cmac(&kmac, &mac_in));

        let mut body = enc.clone();
        body.extend_from_slice(&mact);

        let mut transport = ScriptedTransport {
            responses: VecDeque::from([(body, sw)]),
            sent: vec![],
        };

        let (out, got_sw) = wrap(&mut transport, &mut session, 0xF5, &[0x02], &[]).unwrap();
        assert_eq!(got_sw, 0x9100);
        assert_eq!(out, plaintext);
        assert_eq!(session.cmd_ctr, 1);
        assert!(session.is_authenticated());
    }

    #[test]
    fn bit_flip_in_response_body_breaks_mac() {
        let mut session = fixed_session();
        let mut transport = ScriptedTransport {
            responses: VecDeque::from([(vec![0xFFu8; 8], 0x9100)]),
            sent: vec![],
        };
        let err = wrap(&mut transport, &mut session, 0xF5, &[0x02], &[]).unwrap_err();
        assert!(matches!(err, Error::MacMismatch));
        assert!(!session.is_authenticated());
    }

    #[test]
    fn bad_sw_leaves_counter_unchanged() {
        let mut session = fixed_session();
        let mut transport = ScriptedTransport {
            responses: VecDeque::from([(vec![], 0x6A82)]),
            sent: vec![],
        };
        let err = wrap(&mut transport, &mut session, 0xF5, &[0x02], &[]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { sw: 0x6A82 }));
        assert_eq!(session.cmd_ctr, 0);
        assert!(session.is_authenticated());
    }
}
