//! Concrete `Transport` over a real PC/SC reader.
//!
//! This module is the out-of-scope "external collaborator" from spec §1
//! made concrete: reader enumeration, connection lifetime and raw
//! `transmit` live here, behind the same `Transport` trait the
//! secure-messaging core already programs against. No EV2 semantics leak
//! in here.

use pcsc::{Card, Context, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use crate::apdu::Transport;
use crate::error::{Error, Result};

pub struct PcscTransport {
    // Kept alive alongside `card`: the PC/SC context owns the underlying
    // resource manager connection the card handle was issued from.
    _ctx: Context,
    card: Card,
}

impl PcscTransport {
    /// Connect to the first available PC/SC reader.
    pub fn connect_first_reader() -> Result<Self> {
        let ctx = Context::establish(Scope::User)
            .map_err(|e| Error::Transport(format!("PC/SC context establish failed: {e}")))?;

        let mut buf = [0u8; 2048];
        let mut readers = ctx
            .list_readers(&mut buf)
            .map_err(|e| Error::Transport(format!("failed to list readers: {e}")))?;
        let reader = readers
            .next()
            .ok_or_else(|| Error::Transport("no PC/SC readers found".into()))?;

        let card = ctx
            .connect(reader, ShareMode::Shared, Protocols::ANY)
            .map_err(|e| Error::Transport(format!("failed to connect to card: {e}")))?;
        Ok(Self { _ctx: ctx, card })
    }
}

impl Transport for PcscTransport {
    fn transmit_raw(&mut self, apdu: &[u8]) -> Result<(Vec<u8>, u16)> {
        let mut resp = [0u8; MAX_BUFFER_SIZE];
        let resp = self
            .card
            .transmit(apdu, &mut resp)
            .map_err(|e| Error::Transport(format!("transmit failed: {e}")))?;

        if resp.len() < 2 {
            return Err(Error::Transport(format!(
                "response shorter than SW: {} bytes",
                resp.len()
            )));
        }
        let (body, sw_bytes) = resp.split_at(resp.len() - 2);
        let sw = u16::from_be_bytes([sw_bytes[0], sw_bytes[1]]);
        Ok((body.to_vec(), sw))
    }
}
