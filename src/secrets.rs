use std::fs;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Result, StudioError};

const MASTER_KEY_FILE: &str = "master.key";
const KEY_VERSION: u32 = 1;
const ALGORITHM: &str = "xchacha20poly1305";
const HKDF_SALT: &[u8] = b"nanostudio-credentials-v1";

/// Encrypted API key as persisted alongside the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedKey {
    pub alg: String,
    pub key_version: u32,
    pub nonce: String,
    pub ciphertext: String,
}

fn master_key_path(dir: &Path) -> std::path::PathBuf {
    dir.join(MASTER_KEY_FILE)
}

fn read_master_key(dir: &Path) -> Result<Option<[u8; 32]>> {
    let path = master_key_path(dir);
    let encoded = match fs::read_to_string(&path) {
        Ok(contents) => contents.trim().to_string(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|err| StudioError::Crypto(format!("invalid master key: {err}")))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StudioError::Crypto("master key length invalid".to_string()))?;
    Ok(Some(key))
}

pub fn get_or_create_master_key(dir: &Path) -> Result<[u8; 32]> {
    if let Some(key) = read_master_key(dir)? {
        return Ok(key);
    }

    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);

    fs::create_dir_all(dir)?;
    let path = master_key_path(dir);
    fs::write(&path, URL_SAFE_NO_PAD.encode(key))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(key)
}

fn derive_key(master_key: &[u8; 32], profile_id: &str) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(Some(HKDF_SALT), master_key);
    let mut derived = [0u8; 32];
    hkdf.expand(profile_id.as_bytes(), &mut derived)
        .map_err(|_| StudioError::Crypto("key derivation failed".to_string()))?;
    Ok(derived)
}

pub fn encrypt_api_key(
    master_key: &[u8; 32],
    profile_id: &str,
    api_key: &str,
) -> Result<EncryptedKey> {
    let key = derive_key(master_key, profile_id)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key)
        .map_err(|_| StudioError::Crypto("invalid encryption key".to_string()))?;

    let mut nonce_bytes = [0u8; 24];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: api_key.as_bytes(),
                aad: profile_id.as_bytes(),
            },
        )
        .map_err(|_| StudioError::Crypto("encryption failed".to_string()))?;

    Ok(EncryptedKey {
        alg: ALGORITHM.to_string(),
        key_version: KEY_VERSION,
        nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
    })
}

pub fn decrypt_api_key(
    master_key: &[u8; 32],
    profile_id: &str,
    encrypted: &EncryptedKey,
) -> Result<String> {
    if encrypted.key_version > KEY_VERSION {
        return Err(StudioError::Crypto(format!(
            "unsupported key version: {}",
            encrypted.key_version
        )));
    }
    if encrypted.alg != ALGORITHM {
        return Err(StudioError::Crypto(format!(
            "unsupported algorithm: {}",
            encrypted.alg
        )));
    }

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(&encrypted.nonce)
        .map_err(|err| StudioError::Crypto(format!("invalid nonce: {err}")))?;
    if nonce_bytes.len() != 24 {
        return Err(StudioError::Crypto("invalid nonce length".to_string()));
    }
    let ciphertext = URL_SAFE_NO_PAD
        .decode(&encrypted.ciphertext)
        .map_err(|err| StudioError::Crypto(format!("invalid ciphertext: {err}")))?;

    let key = derive_key(master_key, profile_id)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key)
        .map_err(|_| StudioError::Crypto("invalid decryption key".to_string()))?;
    let nonce = XNonce::from_slice(&nonce_bytes);
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &ciphertext,
                aad: profile_id.as_bytes(),
            },
        )
        .map_err(|_| StudioError::Crypto("decryption failed".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| StudioError::Crypto("decrypted key is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("nanostudio-secrets-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    #[test]
    fn master_key_is_created_once_and_reused() {
        let dir = make_temp_dir();
        let first = get_or_create_master_key(&dir).expect("key should be created");
        let second = get_or_create_master_key(&dir).expect("key should be read back");
        assert_eq!(first, second);
        assert!(master_key_path(&dir).exists());
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[test]
    fn api_key_round_trips() {
        let dir = make_temp_dir();
        let master = get_or_create_master_key(&dir).expect("key should be created");
        let encrypted = encrypt_api_key(&master, "official", "AIzaSecret").expect("should encrypt");
        assert_eq!(encrypted.alg, ALGORITHM);
        let plain = decrypt_api_key(&master, "official", &encrypted).expect("should decrypt");
        assert_eq!(plain, "AIzaSecret");
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[test]
    fn decryption_fails_for_a_different_profile() {
        let dir = make_temp_dir();
        let master = get_or_create_master_key(&dir).expect("key should be created");
        let encrypted = encrypt_api_key(&master, "official", "AIzaSecret").expect("should encrypt");
        let result = decrypt_api_key(&master, "custom", &encrypted);
        assert!(matches!(result, Err(StudioError::Crypto(_))));
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let dir = make_temp_dir();
        let master = get_or_create_master_key(&dir).expect("key should be created");
        let mut encrypted =
            encrypt_api_key(&master, "official", "AIzaSecret").expect("should encrypt");
        encrypted.ciphertext = URL_SAFE_NO_PAD.encode(b"garbage");
        let result = decrypt_api_key(&master, "official", &encrypted);
        assert!(matches!(result, Err(StudioError::Crypto(_))));
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }
}
