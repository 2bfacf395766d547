//! Application-level orchestrators (component H) plus the plain-APDU
//! plumbing needed to get a card from factory defaults to a working SDM
//! tag: `ChangeKey`, `ChangeFileSettings`, `GetFileSettings`,
//! `GetSDMReadCounter`, UID/ATS diagnostics, and a plain NDEF write. None of
//! these introduce new secure-messaging semantics; they compose the codec,
//! the FileSettings builder and the NDEF builder the way a provisioning
//! tool has to.

use crate::apdu::{transmit, Apdu, Transport};
use crate::crc32::crc32_ieee;
use crate::error::{Error, Result};
use crate::file_settings::{self, FileSettings, SdmBuildParams};
use crate::ndef::SdmNdef;
use crate::secure_messaging::wrap;
use crate::session::Session;

const NDEF_AID: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];
const NDEF_FILE_ID: u16 = 0xE104;

/// `GET UID`: CLA=0xFF pseudo-APDU, diagnostics only.
pub fn get_uid(transport: &mut dyn Transport) -> Result<Vec<u8>> {
    let apdu = Apdu::new(0xFF, 0xCA, 0x00, 0x00, vec![]);
    let (body, sw) = transmit(transport, &apdu)?;
    if sw != 0x9000 {
        return Err(Error::UnexpectedStatus { sw });
    }
    Ok(body)
}

/// `GET ATS`: CLA=0xFF pseudo-APDU, diagnostics only.
pub fn get_ats(transport: &mut dyn Transport) -> Result<Vec<u8>> {
    let apdu = Apdu::new(0xFF, 0xCA, 0x01, 0x00, vec![]);
    let (body, sw) = transmit(transport, &apdu)?;
    if sw != 0x9000 {
        return Err(Error::UnexpectedStatus { sw });
    }
    Ok(body)
}

/// `ChangeKey`: install `new_key` at `target_key_no` under an authenticated
/// `session`. Payload is `(newKey XOR oldKey) || keyVersion || CRC32(newKey)`
/// sent as the plaintext `D` of a secure-messaging `0xC4` command with
/// `H = target_key_no`.
pub fn change_key(
    transport: &mut dyn Transport,
    session: &mut Session,
    target_key_no: u8,
    old_key: &[u8; 16],
    new_key: &[u8; 16],
    key_version: u8,
) -> Result<()> {
    let mut payload = Vec::with_capacity(21);
    for i in 0..16 {
        payload.push(new_key[i] ^ old_key[i]);
    }
    payload.push(key_version);
    payload.extend_from_slice(&crc32_ieee(new_key).to_le_bytes());

    let (_, sw) = wrap(transport, session, 0xC4, &[target_key_no], &payload)?;
    if sw != 0x9100 {
        return Err(Error::UnexpectedStatus { sw });
    }
    Ok(())
}

/// `ChangeFileSettings` with SDM enabled, under an authenticated `session`.
pub fn change_file_settings_sdm(
    transport: &mut dyn Transport,
    session: &mut Session,
    file_no: u8,
    params: &SdmBuildParams,
) -> Result<()> {
    let payload = file_settings::build_sdm_change_file_settings(params);
    let (_, sw) = wrap(transport, session, 0x5F, &[file_no], &payload)?;
    if sw != 0x9100 {
        return Err(Error::UnexpectedStatus { sw });
    }
    Ok(())
}

/// `GetFileSettings`: tries the plain form first (`90 F5 00 00 01 fileNo 00`),
/// falling back to the secure-messaging form when `session` is authenticated
/// and the plain attempt is refused.
pub fn get_file_settings(
    transport: &mut dyn Transport,
    session: Option<&mut Session>,
    file_no: u8,
) -> Result<FileSettings> {
    let plain = Apdu::new(0x90, 0xF5, 0x00, 0x00, vec![file_no]);
    let (body, sw) = transmit(transport, &plain)?;
    if sw == 0x9100 {
        return file_settings::parse(&body);
    }

    let session = session.ok_or(Error::UnexpectedStatus { sw })?;
    let (body, sw) = wrap(transport, session, 0xF5, &[file_no], &[])?;
    if sw != 0x9100 {
        return Err(Error::UnexpectedStatus { sw });
    }
    file_settings::parse(&body)
}

/// `GetSDMReadCounter`: plain form first, secure fallback. The counter is a
/// 24-bit little-endian value in the first 3 response bytes.
pub fn get_sdm_read_counter(
    transport: &mut dyn Transport,
    session: Option<&mut Session>,
    file_no: u8,
) -> Result<u32> {
    let plain = Apdu::new(0x90, 0xF6, 0x00, 0x00, vec![file_no]);
    let (body, sw) = transmit(transport, &plain)?;
    if sw == 0x9100 {
        return parse_counter(&body);
    }

    let session = session.ok_or(Error::UnexpectedStatus { sw })?;
    let (body, sw) = wrap(transport, session, 0xF6, &[file_no], &[])?;
    if sw != 0x9100 {
        return Err(Error::UnexpectedStatus { sw });
    }
    parse_counter(&body)
}

fn parse_counter(body: &[u8]) -> Result<u32> {
    if body.len() < 3 {
        return Err(Error::ShortResponse {
            expected: 3,
            actual: body.len(),
        });
    }
    Ok(file_settings::read_u24_le(&body[..3]))
}

/// Select the NDEF application, select the NDEF file, and write `ndef`'s
/// bytes via plain chunked `UPDATE BINARY`. No secure messaging: this is
/// ordinary ISO/IEC 7816-4 file access, run before SDM has anything to
/// authenticate against.
pub fn write_ndef_plain(transport: &mut dyn Transport, ndef: &SdmNdef) -> Result<()> {
    let select_app = Apdu::new(0x00, 0xA4, 0x04, 0x00, NDEF_AID.to_vec()).without_le();
    let (_, sw) = transmit(transport, &select_app)?;
    if sw & 0xFF00 != 0x9000 {
        return Err(Error::UnexpectedStatus { sw });
    }

    let select_file = Apdu::new(0x00, 0xA4, 0x00, 0x0C, NDEF_FILE_ID.to_be_bytes().to_vec())
        .without_le();
    let (_, sw) = transmit(transport, &select_file)?;
    if sw & 0xFF00 != 0x9000 {
        return Err(Error::UnexpectedStatus { sw });
    }

    let mut offset: u16 = 0;
    for chunk in ndef.bytes.chunks(255) {
        let p1 = (offset >> 8) as u8;
        let p2 = (offset & 0xFF) as u8;
        let apdu = Apdu::new(0x00, 0xD6, p1, p2, chunk.to_vec()).without_le();
        let (_, sw) = transmit(transport, &apdu)?;
        if sw != 0x9000 {
            return Err(Error::UnexpectedStatus { sw });
        }
        offset += chunk.len() as u16;
    }

    Ok(())
}

/// Parameters for the end-to-end provisioning flow.
pub struct ProvisionParams<'a> {
    pub factory_key: [u8; 16],
    pub new_key: Option<([u8; 16], u8)>,
    pub file_no: u8,
    pub sdm_params: SdmBuildParams,
    pub ndef: &'a SdmNdef,
}

/// Authenticate with the factory default key, optionally rotate it, enable
/// SDM on `file_no`, and write the NDEF template. Pure composition of D, H,
/// F and G — no protocol logic of its own.
pub fn provision(
    transport: &mut dyn Transport,
    rng: &mut dyn crate::rng::RandomSource,
    key_no: u8,
    params: ProvisionParams,
) -> Result<Session> {
    let mut session =
        crate::auth::authenticate_ev2_first(transport, &params.factory_key, key_no, rng)?;

    if let Some((new_key, key_version)) = params.new_key {
        change_key(
            transport,
            &mut session,
            key_no,
            &params.factory_key,
            &new_key,
            key_version,
        )?;
    }

    change_file_settings_sdm(transport, &mut session, params.file_no, &params.sdm_params)?;
    write_ndef_plain(transport, params.ndef)?;

    Ok(session)
}

/// Authenticate with the old key and install a new one at the same key
/// number. Returns the session left behind by `ChangeKey` for any further
/// provisioning the caller wants to chain.
pub fn rotate_key(
    transport: &mut dyn Transport,
    rng: &mut dyn crate::rng::RandomSource,
    key_no: u8,
    old_key: &[u8; 16],
    new_key: &[u8; 16],
    key_version: u8,
) -> Result<Session> {
    let mut session = crate::auth::authenticate_ev2_first(transport, old_key, key_no, rng)?;
    change_key(transport, &mut session, key_no, old_key, new_key, key_version)?;
    Ok(session)
}
