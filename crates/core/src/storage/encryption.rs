use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::errors::CoreError;

/// Argon2id cost parameters, persisted in the snapshot header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    pub parallelism: u32,
}

impl KdfParams {
    pub const MEMORY_RANGE: std::ops::RangeInclusive<u32> = 8..=1_048_576;
    pub const TIME_RANGE: std::ops::RangeInclusive<u32> = 1..=20;
    pub const PARALLELISM_RANGE: std::ops::RangeInclusive<u32> = 1..=16;

    /// Reject parameters that would make key derivation unreasonably expensive
    /// (or invalid for Argon2). Headers are untrusted input.
    pub fn validate(&self) -> Result<(), CoreError> {
        let check = |name: &str, value: u32, range: &std::ops::RangeInclusive<u32>| {
            if range.contains(&value) {
                Ok(())
            } else {
                Err(CoreError::InvalidFileFormat(format!(
                    "KDF {name} out of range: {value} (expected {}..={})",
                    range.start(),
                    range.end()
                )))
            }
        };
        check("memory_cost", self.memory_cost, &Self::MEMORY_RANGE)?;
        check("time_cost", self.time_cost, &Self::TIME_RANGE)?;
        check("parallelism", self.parallelism, &Self::PARALLELISM_RANGE)
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: 65_536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Output of [`seal`]: everything needed besides the password to decrypt.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub salt: [u8; 16],
    pub nonce: [u8; 12],
    /// AES-GCM ciphertext with the 16-byte tag appended
    pub ciphertext: Vec<u8>,
}

/// Derive a 256-bit key from a password with Argon2id.
pub fn derive_key(password: &str, salt: &[u8; 16], params: &KdfParams) -> Result<[u8; 32], CoreError> {
    let argon2_params = Params::new(params.memory_cost, params.time_cost, params.parallelism, Some(32))
        .map_err(|e| CoreError::Encryption(format!("Invalid Argon2 params: {e}")))?;

    let mut key = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params)
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CoreError::Encryption(format!("Key derivation failed: {e}")))?;
    Ok(key)
}

/// Encrypt under a fresh salt and nonce.
pub fn seal(plaintext: &[u8], password: &str, params: &KdfParams) -> Result<Sealed, CoreError> {
    let salt = random_bytes::<16>()?;
    let nonce = random_bytes::<12>()?;
    let key = derive_key(password, &salt, params)?;

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CoreError::Encryption(format!("Failed to create cipher: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CoreError::Encryption(format!("Encryption failed: {e}")))?;

    Ok(Sealed {
        salt,
        nonce,
        ciphertext,
    })
}

/// Decrypt and authenticate. A wrong password or tampered bytes yield
/// `CoreError::Decryption`.
pub fn open(sealed: &Sealed, password: &str, params: &KdfParams) -> Result<Vec<u8>, CoreError> {
    let key = derive_key(password, &sealed.salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CoreError::Encryption(format!("Failed to create cipher: {e}")))?;
    Ok(cipher.decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())?)
}

/// Cryptographically secure random bytes from the OS.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CoreError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf)
        .map_err(|e| CoreError::Encryption(format!("OS random source unavailable: {e}")))?;
    Ok(buf)
}
