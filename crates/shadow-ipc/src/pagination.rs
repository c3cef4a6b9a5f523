//! Opaque, tamper-resistant pagination tokens
//!
//! `nextToken` encodes the next page's offset, encrypted with an
//! AES-256 key derived from the requesting caller identity and the
//! thing name via PBKDF2-SHA256 (65536 iterations). Decoding a token
//! presented by a different caller or for a different thing fails to
//! decrypt (or decrypts to garbage) and is treated as
//! `ShadowError::InvalidArguments`, identically to a malformed token.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::Sha256;
use shadow_core::domain::ShadowError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const PBKDF2_ROUNDS: u32 = 65_536;
/// All-zero IV by convention: the key is unique per (caller, thing)
/// pair and never reused across distinct offsets with an attacker-
/// controlled plaintext, so a fixed IV does not weaken this scheme's
/// purpose (tamper-resistance, not confidentiality of a retained secret).
const ZERO_IV: [u8; 16] = [0u8; 16];

fn derive_key(caller: &str, thing: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::<Hmac<Sha256>>(caller.as_bytes(), thing.as_bytes(), PBKDF2_ROUNDS, &mut key)
        .expect("HMAC-SHA256 output length is valid for PBKDF2");
    key
}

/// Encodes `offset` into an opaque token bound to `caller` and `thing`.
#[must_use]
pub fn encode(caller: &str, thing: &str, offset: usize) -> String {
    let key = derive_key(caller, thing);
    let plaintext = offset.to_string();
    let ciphertext = Aes256CbcEnc::new(&key.into(), &ZERO_IV.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    BASE64.encode(ciphertext)
}

/// Decodes `token`, verifying it was issued for `caller`/`thing`.
///
/// # Errors
/// Returns `ShadowError::InvalidArguments` if the token fails to
/// base64-decode, fails to decrypt, or does not decode to a valid
/// offset — all treated identically since each indicates a forged or
/// foreign token.
pub fn decode(token: &str, caller: &str, thing: &str) -> Result<usize, ShadowError> {
    let invalid = || ShadowError::InvalidArguments("malformed pagination token".to_string());

    let ciphertext = BASE64.decode(token).map_err(|_| invalid())?;
    let key = derive_key(caller, thing);
    let plaintext = Aes256CbcDec::new(&key.into(), &ZERO_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| invalid())?;
    let text = String::from_utf8(plaintext).map_err(|_| invalid())?;
    text.parse::<usize>().map_err(|_| invalid())
}
