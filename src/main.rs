#![allow(dead_code)]

mod apdu;
mod auth;
mod cmac_util;
mod crc32;
mod crypto;
mod error;
mod file_settings;
mod ndef;
mod ops;
mod rng;
mod secure_messaging;
mod session;
mod transport;

use anyhow::{Context, Result};
use argh::FromArgs;
use file_settings::SdmBuildParams;
use rng::ThreadRng;
use std::fs;
use std::path::PathBuf;
use transport::PcscTransport;

/// NTAG 424 DNA EV2 secure-messaging tool: authenticate, inspect and
/// provision Secure Dynamic Messaging on a card over a PC/SC reader.
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Diagnose(DiagnoseArgs),
    Auth(AuthArgs),
    GetFileSettings(GetFileSettingsArgs),
    GetSdmCounter(GetSdmCounterArgs),
    ChangeKey(ChangeKeyArgs),
    Provision(ProvisionArgs),
    RotateKey(RotateKeyArgs),
}

/// Print UID and ATS without authenticating.
#[derive(FromArgs)]
#[argh(subcommand, name = "diagnose")]
struct DiagnoseArgs {}

/// Run EV2-First and print the derived session keys.
#[derive(FromArgs)]
#[argh(subcommand, name = "auth")]
struct AuthArgs {
    /// path to a 32-hex-char key file
    #[argh(option)]
    key_file: PathBuf,
    /// key number, 0x00..=0x0F
    #[argh(option, default = "0")]
    key_no: u8,
}

/// Read and print a file's FileSettings.
#[derive(FromArgs)]
#[argh(subcommand, name = "get-file-settings")]
struct GetFileSettingsArgs {
    /// file number
    /// file number
    #[argh(option)]
    file_no: u8,
    /// path to a 32-hex-char key file; if omitted, only the plain attempt is tried
    #[argh(option)]
    key_file: Option<PathBuf>,
    /// key number, 0x00..=0x0F
    #[argh(option, default = "0")]
    key_no: u8,
}

/// Read a file's SDM read counter.
#[derive(FromArgs)]
#[argh(subcommand, name = "get-sdm-counter")]
struct GetSdmCounterArgs {
    /// file number
    #[argh(option)]
    file_no: u8,
    /// path to a 32-hex-char key file; if omitted, only the plain attempt is tried
    #[argh(option)]
    key_file: Option<PathBuf>,
    /// key number, 0x00..=0x0F
    #[argh(option, default = "0")]
    key_no: u8,
}

/// Install a new key at a given key number.
#[derive(FromArgs)]
#[argh(subcommand, name = "change-key")]
struct ChangeKeyArgs {
    /// path to the current (old) 32-hex-char key file
    #[argh(option)]
    old_key_file: PathBuf,
    /// path to the new 32-hex-char key file
    #[argh(option)]
    new_key_file: PathBuf,
    /// key number to install the new key at
    #[argh(option)]
    target_key_no: u8,
    /// key version to assign to the new key
    #[argh(option, default = "1")]
    key_version: u8,
    /// key number to authenticate with
    #[argh(option, default = "0")]
    auth_key_no: u8,
}

/// Provision a blank card: authenticate with the factory key, optionally
/// install a new key, enable SDM on a file and write its NDEF template.
#[derive(FromArgs)]
#[argh(subcommand, name = "provision")]
struct ProvisionArgs {
    /// path to the factory 32-hex-char key file
    #[argh(option)]
    factory_key_file: PathBuf,
    /// path to a new 32-hex-char key file to install; if omitted, the factory key is kept
    #[argh(option)]
    new_key_file: Option<PathBuf>,
    /// key version to assign to the new key
    #[argh(option, default = "1")]
    key_version: u8,
    /// file number to enable SDM on
    #[argh(option, default = "2")]
    file_no: u8,
    /// base URL for the NDEF SDM template
    #[argh(option)]
    base_url: String,
}

/// Authenticate with the old key, install a new one, and save it to disk.
#[derive(FromArgs)]
#[argh(subcommand, name = "rotate-key")]
struct RotateKeyArgs {
    /// path to the current (old) 32-hex-char key file
    #[argh(option)]
    old_key_file: PathBuf,
    /// path to the new 32-hex-char key file
    #[argh(option)]
    new_key_file: PathBuf,
    /// key version to assign to the new key
    #[argh(option, default = "1")]
    key_version: u8,
    /// key number to authenticate with
    #[argh(option, default = "0")]
    key_no: u8,
}

fn read_key_file(path: &PathBuf) -> Result<[u8; 16]> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading key file {}", path.display()))?;
    let bytes = hex::decode(raw.trim())
        .with_context(|| format!("key file {} is not valid hex", path.display()))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("key must be 16 bytes, got {}", v.len()))
}

fn write_key_file(path: &PathBuf, key: &[u8; 16]) -> Result<()> {
    fs::write(path, hex::encode(key))
        .with_context(|| format!("writing key file {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli: Cli = argh::from_env();
    let mut transport =
        PcscTransport::connect_first_reader().context("connecting to a PC/SC reader")?;

    match cli.command {
        Command::Diagnose(_) => {
            let uid = ops::get_uid(&mut transport).context("GET UID")?;
            let ats = ops::get_ats(&mut transport).context("GET ATS")?;
            println!("UID: {}", hex::encode_upper(&uid));
            println!("ATS: {}", hex::encode_upper(&ats));
        }
        Command::Auth(args) => {
            let key = read_key_file(&args.key_file)?;
            let mut rng = ThreadRng;
            let session =
                auth::authenticate_ev2_first(&mut transport, &key, args.key_no, &mut rng)
                    .context("EV2-First authentication")?;
            log::debug!("TI = {}", hex::encode_upper(session.ti));
            println!("KEnc: {}", hex::encode_upper(session.kenc));
            println!("KMac: {}", hex::encode_upper(session.kmac));
            println!("TI:   {}", hex::encode_upper(session.ti));
        }
        Command::GetFileSettings(args) => {
            let mut session = match &args.key_file {
                Some(path) => {
                    let key = read_key_file(path)?;
                    let mut rng = ThreadRng;
                    Some(
                        auth::authenticate_ev2_first(&mut transport, &key, args.key_no, &mut rng)
                            .context("EV2-First authentication")?,
                    )
                }
                None => None,
            };
            let fs_settings =
                ops::get_file_settings(&mut transport, session.as_mut(), args.file_no)
                    .context("GetFileSettings")?;
            println!("{fs_settings:#?}");
        }
        Command::GetSdmCounter(args) => {
            let mut session = match &args.key_file {
                Some(path) => {
                    let key = read_key_file(path)?;
                    let mut rng = ThreadRng;
                    Some(
                        auth::authenticate_ev2_first(&mut transport, &key, args.key_no, &mut rng)
                            .context("EV2-First authentication")?,
                    )
                }
                None => None,
            };
            let counter =
                ops::get_sdm_read_counter(&mut transport, session.as_mut(), args.file_no)
                    .context("GetSDMReadCounter")?;
            println!("SDM read counter: {counter}");
        }
        Command::ChangeKey(args) => {
            let old_key = read_key_file(&args.old_key_file)?;
            let new_key = read_key_file(&args.new_key_file)?;
            let mut rng = ThreadRng;
            let mut session = auth::authenticate_ev2_first(
                &mut transport,
                &old_key,
                args.auth_key_no,
                &mut rng,
            )
            .context("EV2-First authentication")?;
            ops::change_key(
                &mut transport,
                &mut session,
                args.target_key_no,
                &old_key,
                &new_key,
                args.key_version,
            )
            .context("ChangeKey")?;
            println!("key {} updated", args.target_key_no);
        }
        Command::Provision(args) => {
            let factory_key = read_key_file(&args.factory_key_file)?;
            let new_key = args
                .new_key_file
                .as_ref()
                .map(read_key_file)
                .transpose()?
                .map(|k| (k, args.key_version));

            let sdm_ndef = ndef::build_sdm_ndef(&args.base_url).context("building SDM NDEF")?;
            let sdm_params = SdmBuildParams {
                comm_mode: 0x00,
                ar1: 0xE0,
                ar2: 0xEE,
                sdm_options: 0xC1,
                sdm_meta_read: 0x0E,
                sdm_file_read: 0x00,
                sdm_ctr_ret: 0x00,
                uid_offset: sdm_ndef.uid_offset as u32,
                sdm_read_ctr_offset: sdm_ndef.ctr_offset as u32,
                sdm_mac_input_offset: sdm_ndef.mac_input_offset as u32,
                sdm_mac_offset: sdm_ndef.mac_offset as u32,
            };

            let mut rng = ThreadRng;
            ops::provision(
                &mut transport,
                &mut rng,
                0x00,
                ops::ProvisionParams {
                    factory_key,
                    new_key,
                    file_no: args.file_no,
                    sdm_params,
                    ndef: &sdm_ndef,
                },
            )
            .context("provisioning")?;
            println!(
                "card provisioned with SDM URL template for {}",
                args.base_url
            );
        }
        Command::RotateKey(args) => {
            let old_key = read_key_file(&args.old_key_file)?;
            let mut rng = ThreadRng;
            let new_key = rng::RandomSource::next_16(&mut rng);
            ops::rotate_key(
                &mut transport,
                &mut ThreadRng,
                args.key_no,
                &old_key,
                &new_key,
                args.key_version,
            )
            .context("rotating key")?;
            write_key_file(&args.new_key_file, &new_key)?;
            println!(
                "key {} rotated, new key written to {}",
                args.key_no,
                args.new_key_file.display()
            );
        }
    }

    Ok(())
}
