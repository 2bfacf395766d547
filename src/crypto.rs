//! Shared AES-CBC/ECB helpers used by the EV2-First handshake and the
//! secure-messaging codec. Both sites need raw, unpadded block cipher
//! operations (the protocol does its own ISO 9797-1 M2 padding), so this
//! lives in one place instead of being duplicated per caller.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::Aes128;
use cbc::{Decryptor, Encryptor};

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;

/// AES-CBC encrypt `plaintext` (must already be block-aligned) under `key`
/// with the given 16-byte IV.
pub fn cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    let mut enc = Aes128CbcEnc::new(key.into(), iv.into());
    for chunk in buf.chunks_mut(16) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    buf
}

/// AES-CBC decrypt `ciphertext` (must be block-aligned) under `key` with the
/// given 16-byte IV.
pub fn cbc_decrypt(key: &[u8; 16], iv: &[u8; 16], ciphertext: &[u8]) -> Vec<u8> {
    let mut buf = ciphertext.to_vec();
    let mut dec = Aes128CbcDec::new(key.into(), iv.into());
    for chunk in buf.chunks_mut(16) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    buf
}

/// AES-ECB single-block encrypt, used for command/response IV derivation.
pub fn ecb_encrypt_block(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(key.into());
    let mut out = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    out.into()
}
