//! Chiffrement des mots de passe stockés dans la configuration
//!
//! Les secrets (mot de passe MPD, mot de passe du serveur IRC, mot de passe
//! d'arrêt) peuvent être écrits en clair ou sous la forme `encrypted:BASE64`.
//! La clé AES-256 est dérivée de l'identifiant de la machine : un fichier
//! chiffré sur une machine n'est lisible que sur celle-ci.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use base64::Engine;
use sha2::{Digest, Sha256};
use std::{env, fs};

/// Préfixe pour identifier les mots de passe chiffrés
const ENCRYPTED_PREFIX: &str = "encrypted:";

/// Surcharge de l'identifiant machine (conteneurs sans machine-id)
const ENV_MACHINE_ID: &str = "MPD2IRC_MACHINE_ID";

const MACHINE_ID_FILES: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

const KEY_SALT: &[u8] = b"mpd2irc-config-encryption-v1";
const NONCE_SALT: &[u8] = b"mpd2irc-nonce-v1";
const NONCE_LEN: usize = 12;

/// Identifiant stable de la machine
fn machine_id() -> Result<String> {
    if let Ok(id) = env::var(ENV_MACHINE_ID) {
        if !id.trim().is_empty() {
            return Ok(id.trim().to_string());
        }
    }

    for file in MACHINE_ID_FILES {
        if let Ok(id) = fs::read_to_string(file) {
            let id = id.trim();
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
    }

    Err(anyhow!(
        "No machine id found (set {} or provide /etc/machine-id)",
        ENV_MACHINE_ID
    ))
}

fn cipher() -> Result<Aes256Gcm> {
    let mut hasher = Sha256::new();
    hasher.update(machine_id()?.as_bytes());
    hasher.update(KEY_SALT);
    let key = hasher.finalize();

    Aes256Gcm::new_from_slice(&key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
}

/// Chiffre un mot de passe avec la clé de la machine
///
/// Le nonce est dérivé du mot de passe : le même mot de passe donne toujours
/// la même valeur chiffrée. Le résultat encode `nonce(12) + ciphertext`.
///
/// ```rust,ignore
/// let encrypted = encrypt_password("my_password")?;
/// // encrypted = "encrypted:SGVsbG8gV29ybGQh..."
/// ```
pub fn encrypt_password(password: &str) -> Result<String> {
    let cipher = cipher()?;

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(NONCE_SALT);
    let digest = hasher.finalize();
    let nonce_bytes = &digest[..NONCE_LEN];

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce_bytes), password.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(format!(
        "{}{}",
        ENCRYPTED_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(&combined)
    ))
}

/// Déchiffre une valeur `encrypted:BASE64`
///
/// # Errors
///
/// Retourne une erreur si le format est invalide ou si la valeur a été
/// chiffrée sur une autre machine.
pub fn decrypt_password(encrypted: &str) -> Result<String> {
    let base64_data = encrypted
        .strip_prefix(ENCRYPTED_PREFIX)
        .ok_or_else(|| anyhow!("Invalid encrypted password format (missing prefix)"))?;

    let combined = base64::engine::general_purpose::STANDARD
        .decode(base64_data.trim())
        .map_err(|e| anyhow!("Invalid base64: {}", e))?;

    if combined.len() <= NONCE_LEN {
        return Err(anyhow!("Invalid ciphertext (too short)"));
    }
    let (nonce, ciphertext) = combined.split_at(NONCE_LEN);

    let plaintext = cipher()?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("Decryption failed (wrong machine or corrupted data): {}", e))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
}

/// `true` si la valeur commence par `encrypted:`
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Obtient le mot de passe en clair, qu'il soit chiffré ou non
pub fn get_password(value: &str) -> Result<String> {
    if is_encrypted(value) {
        decrypt_password(value)
    } else {
        Ok(value.to_string())
    }
}
