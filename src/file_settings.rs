//! FileSettings TLV codec (component F): parse the card's variable-layout
//! file metadata, and build a ChangeFileSettings payload that turns SDM on.
//!
//! The tail fields after the fixed 7-byte prefix are each conditionally
//! present depending on earlier bits/nibbles; see spec §4.F's predicate
//! table. Parsing and building must walk that table in the same order or
//! the remaining fields silently misalign.

use crate::error::{Error, Result};

pub(crate) fn read_u24_le(bytes: &[u8]) -> u32 {
    bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16
}

fn write_u24_le(out: &mut Vec<u8>, value: u32) {
    out.push((value & 0xFF) as u8);
    out.push(((value >> 8) & 0xFF) as u8);
    out.push(((value >> 16) & 0xFF) as u8);
}

/// The SDM-specific tail of a FileSettings record, present only when SDM is
/// enabled in `FileOption`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SdmSettings {
    pub sdm_options: u8,
    pub sdm_meta_read: u8,
    pub sdm_file_read: u8,
    pub sdm_ctr_ret: u8,
    pub uid_offset: Option<u32>,
    pub sdm_read_ctr_offset: Option<u32>,
    pub picc_data_offset: Option<u32>,
    pub sdm_mac_input_offset: Option<u32>,
    pub sdm_enc_offset: Option<u32>,
    pub sdm_enc_length: Option<u32>,
    pub sdm_mac_offset: Option<u32>,
    pub sdm_read_ctr_limit: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSettings {
    pub file_type: u8,
    pub file_option: u8,
    pub ar1: u8,
    pub ar2: u8,
    pub file_size: u32,
    pub sdm: Option<SdmSettings>,
}

impl FileSettings {
    pub fn sdm_enabled(&self) -> bool {
        self.file_option & 0x40 != 0
    }
}

/// Parse a FileSettings TLV per spec §4.F. Short input at any step is a
/// `ParseError`; unexpected trailing bytes are tolerated.
pub fn parse(data: &[u8]) -> Result<FileSettings> {
    if data.len() < 7 {
        return Err(Error::ParseError(format!(
            "FileSettings too short: {} bytes, need at least 7",
            data.len()
        )));
    }

    let file_type = data[0];
    let file_option = data[1];
    let ar1 = data[2];
    let ar2 = data[3];
    let file_size = read_u24_le(&data[4..7]);

    if file_option & 0x40 == 0 {
        return Ok(FileSettings {
            file_type,
            file_option,
            ar1,
            ar2,
            file_size,
            sdm: None,
        });
    }

    let mut idx = 7;
    let need = |idx: usize, n: usize| -> Result<()> {
        if data.len() < idx + n {
            Err(Error::ParseError(format!(
                "FileSettings truncated: need {n} more bytes at offset {idx}, have {}",
                data.len()
            )))
        } else {
            Ok(())
        }
    };

    need(idx, 3)?;
    let sdm_options = data[idx];
    let sdm_ar = data[idx + 1] as u16 | (data[idx + 2] as u16) << 8;
    idx += 3;

    let sdm_meta_read = ((sdm_ar >> 12) & 0x0F) as u8;
    let sdm_file_read = ((sdm_ar >> 8) & 0x0F) as u8;
    let sdm_ctr_ret = (sdm_ar & 0x0F) as u8;

    let mut sdm = SdmSettings {
        sdm_options,
        sdm_meta_read,
        sdm_file_read,
        sdm_ctr_ret,
        ..Default::default()
    };

    if sdm_options & 0x80 != 0 && sdm_meta_read == 0x0E {
        need(idx, 3)?;
        sdm.uid_offset = Some(read_u24_le(&data[idx..idx + 3]));
        idx += 3;
    }

    if sdm_options & 0x40 != 0 && sdm_meta_read == 0x0E {
        need(idx, 3)?;
        sdm.sdm_read_ctr_offset = Some(read_u24_le(&data[idx..idx + 3]));
        idx += 3;
    }

    if sdm_meta_read <= 0x04 {
        need(idx, 3)?;
        sdm.picc_data_offset = Some(read_u24_le(&data[idx..idx + 3]));
        idx += 3;
    }

    if sdm_file_read != 0x0F {
        need(idx, 3)?;
        sdm.sdm_mac_input_offset = Some(read_u24_le(&data[idx..idx + 3]));
        idx += 3;
    }

    if sdm_file_read != 0x0F && sdm_options & 0x10 != 0 {
        need(idx, 6)?;
        sdm.sdm_enc_offset = Some(read_u24_le(&data[idx..idx + 3]));
        idx += 3;
        sdm.sdm_enc_length = Some(read_u24_le(&data[idx..idx + 3]));
        idx += 3;
    }

    if sdm_file_read != 0x0F {
        need(idx, 3)?;
        sdm.sdm_mac_offset = Some(read_u24_le(&data[idx..idx + 3]));
        idx += 3;
    }

    if sdm_options & 0x20 != 0 {
        need(idx, 3)?;
        sdm.sdm_read_ctr_limit = Some(read_u24_le(&data[idx..idx + 3]));
    }

    Ok(FileSettings {
        file_type,
        file_option,
        ar1,
        ar2,
        file_size,
        sdm: Some(sdm),
    })
}

/// Parameters for an SDM-enabled ChangeFileSettings payload (spec §4.F
/// Build). This tool never emits ENC fields or a counter limit.
pub struct SdmBuildParams {
    pub comm_mode: u8,
    pub ar1: u8,
    pub ar2: u8,
    pub sdm_options: u8,
    pub sdm_meta_read: u8,
    pub sdm_file_read: u8,
    pub sdm_ctr_ret: u8,
    pub uid_offset: u32,
    pub sdm_read_ctr_offset: u32,
    pub sdm_mac_input_offset: u32,
    pub sdm_mac_offset: u32,
}

/// Build the ChangeFileSettings payload (to be sent as the encrypted `D`
/// of a secure-messaging command with `H = FileNo`, `INS = 0x5F`).
pub fn build_sdm_change_file_settings(params: &SdmBuildParams) -> Vec<u8> {
    let file_option = (params.comm_mode & 0x03) | 0x40;
    let sdm_ar: u16 = ((params.sdm_meta_read as u16 & 0x0F) << 12)
        | ((params.sdm_file_read as u16 & 0x0F) << 8)
        | (0x0F << 4)
        | (params.sdm_ctr_ret as u16 & 0x0F);

    let mut out = Vec::new();
    out.push(file_option);
    out.push(params.ar1);
    out.push(params.ar2);
    out.push(params.sdm_options);
    out.extend_from_slice(&sdm_ar.to_le_bytes());

    if params.sdm_options & 0x80 != 0 && params.sdm_meta_read == 0x0E {
        write_u24_le(&mut out, params.uid_offset);
    }
    if params.sdm_options & 0x40 != 0 && params.sdm_meta_read == 0x0E {
        write_u24_le(&mut out, params.sdm_read_ctr_offset);
    }
    if params.sdm_file_read != 0x0F {
        write_u24_le(&mut out, params.sdm_mac_input_offset);
    }
    if params.sdm_file_read != 0x0F {
        write_u24_le(&mut out, params.sdm_mac_offset);
    }

    out
}
