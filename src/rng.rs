//! RNG capability for the EV2-First handshake.
//!
//! The handshake needs 16 random bytes for RndA. Rather than drawing from a
//! process-wide RNG, the authenticator takes this small capability so tests
//! (and the `NTAG_RNDA` debug override) can inject a fixed value.

use rand::RngCore;

pub trait RandomSource {
    fn next_16(&mut self) -> [u8; 16];
}

/// Default source: the thread-local CSPRNG.
pub struct ThreadRng;

impl RandomSource for ThreadRng {
    fn next_16(&mut self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut buf);
        buf
    }
}

/// Fixed source for tests and the `NTAG_RNDA` override.
pub struct FixedRng(pub [u8; 16]);

impl RandomSource for FixedRng {
    fn next_16(&mut self) -> [u8; 16] {
        self.0
    }
}
