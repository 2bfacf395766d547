//! APDU framing and the transport adapter (component B).
//!
//! The adapter's only job is to turn a raw `transmit` into `(body, sw)` and
//! to retry once on `0x6CXX` ("wrong Le"). It never interprets SW beyond
//! that: a non-success status word is a perfectly normal return value here.

use crate::error::{Error, Result};

/// A short-form command APDU: `CLA INS P1 P2 [Lc data] [Le]`.
#[derive(Clone, Debug)]
pub struct Apdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    pub le: Option<u8>,
}

impl Apdu {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: Some(0x00),
        }
    }

    /// Drop the trailing `Le` byte (some ISO commands, e.g. plain `SELECT`,
    /// carry no expected-response-length byte at all).
    pub fn without_le(mut self) -> Self {
        self.le = None;
        self
    }

    /// Serialize to wire bytes. Returns `ProtocolParameter` if `data` does
    /// not fit short-form encoding (Lc must fit in one byte).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.data.len() > 255 {
            return Err(Error::ProtocolParameter(format!(
                "command data length {} exceeds short-form APDU limit of 255",
                self.data.len()
            )));
        }
        let mut out = Vec::with_capacity(5 + self.data.len() + 1);
        out.push(self.cla);
        out.push(self.ins);
        out.push(self.p1);
        out.push(self.p2);
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            out.push(le);
        }
        Ok(out)
    }
}

/// The one seam between this crate's protocol core and a real reader.
///
/// Implementations fail only on transport-level errors (no reader, card
/// removed mid-exchange, USB/PCSC error); a non-success status word is a
/// normal, successful `transmit`.
pub trait Transport {
    fn transmit_raw(&mut self, apdu: &[u8]) -> Result<(Vec<u8>, u16)>;
}

/// Send `apdu`, re-issuing once with `Le` taken from a `0x6CXX` response.
///
/// Returns the body and status word of whichever exchange was final.
pub fn transmit(transport: &mut dyn Transport, apdu: &Apdu) -> Result<(Vec<u8>, u16)> {
    let bytes = apdu.to_bytes()?;
    let (body, sw) = transport.transmit_raw(&bytes)?;
    if sw & 0xFF00 == 0x6C00 {
        let mut retry = apdu.clone();
        retry.le = Some((sw & 0x00FF) as u8);
        let retry_bytes = retry.to_bytes()?;
        return transport.transmit_raw(&retry_bytes);
    }
    Ok((body, sw))
}

#[cfg(test)]
mod tests {
    use super::*;
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
                .ok_or_else(|| Error::Transport("no scripted response left".into()))
        }
    }

    #[test]
    fn le_retry_on_6c() {
        let mut transport = ScriptedTransport {
            responses: VecDeque::from([(vec![], 0x6C10), (vec![0xAA; 16], 0x9000)]),
            sent: vec![],
        };
        let apdu = Apdu::new(0x00, 0xB0, 0x00, 0x00, vec![]);
        let (body, sw) = transmit(&mut transport, &apdu).unwrap();
        assert_eq!(sw, 0x9000);
        assert_eq!(body, vec![0xAA; 16]);
        assert_eq!(transport.sent.len(), 2);
        // Second APDU must have Le = 0x10 taken from the 0x6C10 status.
        assert_eq!(*transport.sent[1].last().unwrap(), 0x10);
    }

    #[test]
    fn no_retry_on_other_status() {
        let mut transport = ScriptedTransport {
            responses: VecDeque::from([(vec![1, 2, 3], 0x9000)]),
            sent: vec![],
        };
        let apdu = Apdu::new(0x00, 0xB0, 0x00, 0x00, vec![]);
        let (body, sw) = transmit(&mut transport, &apdu).unwrap();
        assert_eq!(sw, 0x9000);
        assert_eq!(body, vec![1, 2, 3]);
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn oversized_data_rejected() {
        let apdu = Apdu::new(0x90, 0x00, 0x00, 0x00, vec![0u8; 256]);
        assert!(matches!(
            apdu.to_bytes(),
            Err(Error::ProtocolParameter(_))
        ));
    }
}
