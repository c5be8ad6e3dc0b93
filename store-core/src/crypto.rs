//! # Crypto primitives
//!
//! Authenticated symmetric encryption (AES-256-GCM) for entity bodies,
//! asymmetric key wrap (RSA-OAEP, SHA-256) for the Subscribe handshake,
//! and the CSPRNG used to mint the master key and per-worker RSA pairs.
//!
//! This module generalizes the teacher's `crypto.rs` (which concatenated
//! nonce + ciphertext into one base64 blob for a single SQLite column)
//! into an on-disk format that carries `iv` and `tag` as separate
//! metadata fields alongside a bare ciphertext blob.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{StoreError, StoreResult};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
const RSA_KEY_BITS: usize = 2048;

/// A 256-bit AES key. Zeroized on drop so it never lingers in process
/// memory after the guarding cell releases it.
pub type SymmetricKey = Zeroizing<[u8; KEY_LEN]>;

/// The result of an `encrypt` call: ciphertext plus the nonce and tag
/// that must be persisted alongside it in `EntityMetadata`.
pub struct Encrypted {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
}

/// Generates a uniformly random 256-bit symmetric key.
pub fn generate_symmetric() -> SymmetricKey {
    let mut bytes = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    Zeroizing::new(bytes)
}

/// Encrypts `plaintext` under `key`, generating a fresh nonce
/// internally. Fails only on allocation/RNG errors.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> StoreResult<Encrypted> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut with_tag = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| StoreError::Internal(format!("encryption failed: {e}")))?;

    // `aes_gcm::Aead::encrypt` appends the tag to the ciphertext; split
    // it back out so the metadata record can carry it separately.
    if with_tag.len() < TAG_LEN {
        return Err(StoreError::Internal("ciphertext shorter than tag".into()));
    }
    let tag_offset = with_tag.len() - TAG_LEN;
    let tag_slice = with_tag.split_off(tag_offset);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_slice);

    Ok(Encrypted {
        ciphertext: with_tag,
        nonce: nonce_bytes,
        tag,
    })
}

/// Decrypts `ciphertext` under `key` using the given `nonce`/`tag`.
/// Fails with `IntegrityError` on tag mismatch — callers must treat
/// this as fatal and refuse to return data.
pub fn decrypt(
    key: &SymmetricKey,
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
) -> StoreResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
    let nonce = Nonce::from_slice(nonce);

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(nonce, combined.as_slice())
        .map_err(|_| StoreError::IntegrityError("GCM tag mismatch".into()))
}

/// Generates an ephemeral 2048-bit RSA key pair for one Processing
/// Worker handshake.
pub fn generate_rsa() -> StoreResult<(RsaPrivateKey, RsaPublicKey)> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| StoreError::Internal(format!("RSA keygen failed: {e}")))?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}

/// Serializes an RSA public key to PEM (SubjectPublicKeyInfo), the
/// format carried as `pub_pem` in the `Subscribe` RPC.
pub fn marshal_pub_pem(public: &RsaPublicKey) -> StoreResult<Vec<u8>> {
    public
        .to_public_key_pem(Default::default())
        .map(|s| s.into_bytes())
        .map_err(|e| StoreError::Internal(format!("PEM encode failed: {e}")))
}

/// Parses a PEM-encoded RSA public key.
pub fn parse_pub_pem(bytes: &[u8]) -> StoreResult<RsaPublicKey> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StoreError::InvalidArgument(format!("pub_pem is not UTF-8: {e}")))?;
    RsaPublicKey::from_public_key_pem(text)
        .map_err(|e| StoreError::InvalidArgument(format!("unparsable RSA public key: {e}")))
}

/// Wraps the 32-byte symmetric key under `public` using RSA-OAEP
/// (SHA-256). Used only for the one-shot key transport during
/// Subscribe — never for bulk data.
pub fn wrap(public: &RsaPublicKey, key: &SymmetricKey) -> StoreResult<Vec<u8>> {
    let mut rng = rand::thread_rng();
    public
        .encrypt(&mut rng, Oaep::new::<Sha256>(), key.as_ref())
        .map_err(|e| StoreError::Internal(format!("key wrap failed: {e}")))
}

/// Unwraps a wrapped symmetric key using the Processing Worker's
/// ephemeral RSA private key. The private key may be dropped
/// immediately after this call returns.
pub fn unwrap(private: &RsaPrivateKey, wrapped: &[u8]) -> StoreResult<SymmetricKey> {
    let plain = private
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|e| StoreError::Internal(format!("key unwrap failed: {e}")))?;
    if plain.len() != KEY_LEN {
        return Err(StoreError::Internal(format!(
            "unwrapped key has unexpected length {}",
            plain.len()
        )));
    }
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&plain);
    Ok(Zeroizing::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = generate_symmetric();
        let plaintext = b"hello, encrypted world";
        let enc = encrypt(&key, plaintext).unwrap();
        let out = decrypt(&key, &enc.ciphertext, &enc.nonce, &enc.tag).unwrap();
        assert_eq!(out, plaintext);
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let key = generate_symmetric();
        let enc = encrypt(&key, b"payload").unwrap();
        let mut bad_tag = enc.tag;
        bad_tag[0] ^= 0xFF;
        let result = decrypt(&key, &enc.ciphertext, &enc.nonce, &bad_tag);
        assert!(matches!(result, Err(StoreError::IntegrityError(_))));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = generate_symmetric();
        let mut enc = encrypt(&key, b"payload").unwrap();
        enc.ciphertext[0] ^= 0xFF;
        let result = decrypt(&key, &enc.ciphertext, &enc.nonce, &enc.tag);
        assert!(result.is_err());
    }

    #[test]
    fn rsa_wrap_unwrap_round_trip() {
        let (private, public) = generate_rsa().unwrap();
        let key = generate_symmetric();
        let wrapped = wrap(&public, &key).unwrap();
        let unwrapped = unwrap(&private, &wrapped).unwrap();
        assert_eq!(key.as_ref(), unwrapped.as_ref());
    }

    #[test]
    fn pem_round_trip() {
        let (_priv, public) = generate_rsa().unwrap();
        let pem = marshal_pub_pem(&public).unwrap();
        let parsed = parse_pub_pem(&pem).unwrap();
        assert_eq!(public, parsed);
    }
}
