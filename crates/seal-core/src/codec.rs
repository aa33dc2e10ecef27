//! Encrypt-then-MAC transform between plaintext session blobs and records.
//!
//! - Cipher: AES-256-CBC, PKCS7 padding, fresh 16-byte IV per write
//! - MAC: HMAC-SHA256 over `iv || ALGORITHM_ID || ciphertext`
//!
//! The MAC is always checked, in constant time, before any decryption is
//! attempted. Bad padding after a valid MAC is reported the same way as a MAC
//! mismatch.

use crate::error::{Result, SessionError};
use crate::keys::{fill_random, KeyPair};
use crate::record::{SessionRecord, IV_LEN, MAC_LEN};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand_core::{CryptoRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Bound into every MAC. Changing it invalidates all stored records.
pub const ALGORITHM_ID: &[u8] = b"aes-256-cbc+hmac-sha256/v1";

pub fn encrypt<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    keys: &KeyPair,
    rng: &mut R,
) -> Result<SessionRecord> {
    let mut iv = [0u8; IV_LEN];
    fill_random(rng, &mut iv)?;

    let ciphertext = Aes256CbcEnc::new(keys.enc_key().into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let mac = compute_mac(keys, &iv, &ciphertext)?;

    Ok(SessionRecord {
        mac,
        iv,
        ciphertext,
    })
}

pub fn decrypt(record: &SessionRecord, keys: &KeyPair) -> Result<Zeroizing<Vec<u8>>> {
    let expected = compute_mac(keys, &record.iv, &record.ciphertext)?;
    if expected[..].ct_eq(&record.mac[..]).unwrap_u8() != 1 {
        return Err(SessionError::AuthenticationFailure);
    }

    let plaintext = Aes256CbcDec::new(keys.enc_key().into(), &record.iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&record.ciphertext)
        .map_err(|_| SessionError::AuthenticationFailure)?;
    Ok(Zeroizing::new(plaintext))
}

fn compute_mac(keys: &KeyPair, iv: &[u8], ciphertext: &[u8]) -> Result<[u8; MAC_LEN]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(keys.auth_key())
        .map_err(|_| SessionError::InvalidKey("authentication key rejected by HMAC".into()))?;
    mac.update(iv);
    mac.update(ALGORITHM_ID);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().into())
}
