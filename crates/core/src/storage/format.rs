use crate::errors::CoreError;

use super::encryption::{KdfParams, Sealed};

/// Magic bytes of an encrypted store snapshot.
pub const MAGIC: &[u8; 4] = b"CFDS";

pub const CURRENT_VERSION: u16 = 1;

/// magic(4) + version(2) + kdf(12) + salt(16) + nonce(12) + length(8)
pub const HEADER_SIZE: usize = 54;

/// Encode a sealed snapshot.
///
/// ```text
/// [CFDS] [version u16] [memory_cost u32] [time_cost u32] [parallelism u32]
/// [salt 16B] [nonce 12B] [ciphertext_len u64] [ciphertext]
/// ```
/// Integers are little-endian.
pub fn encode(params: &KdfParams, sealed: &Sealed) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + sealed.ciphertext.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
    for value in [params.memory_cost, params.time_cost, params.parallelism] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.extend_from_slice(&sealed.salt);
    buf.extend_from_slice(&sealed.nonce);
    buf.extend_from_slice(&(sealed.ciphertext.len() as u64).to_le_bytes());
    buf.extend_from_slice(&sealed.ciphertext);
    buf
}

/// Decode and validate a snapshot file. Trailing bytes after the ciphertext are ignored.
pub fn decode(data: &[u8]) -> Result<(KdfParams, Sealed), CoreError> {
    if data.len() < HEADER_SIZE {
        return Err(CoreError::InvalidFileFormat(format!(
            "Expected at least {HEADER_SIZE} header bytes, got {}",
            data.len()
        )));
    }

    let mut reader = Reader { data, pos: 0 };
    if reader.take::<4>()? != *MAGIC {
        return Err(CoreError::InvalidFileFormat("Not a CFDS snapshot".into()));
    }

    let version = u16::from_le_bytes(reader.take()?);
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let params = KdfParams {
        memory_cost: u32::from_le_bytes(reader.take()?),
        time_cost: u32::from_le_bytes(reader.take()?),
        parallelism: u32::from_le_bytes(reader.take()?),
    };
    params.validate()?;

    let salt = reader.take::<16>()?;
    let nonce = reader.take::<12>()?;
    let len = u64::from_le_bytes(reader.take()?);

    let remaining = data.len() - reader.pos;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= remaining)
        .ok_or_else(|| {
            CoreError::InvalidFileFormat(format!(
                "Snapshot truncated: header declares {len} ciphertext bytes, {remaining} present"
            ))
        })?;

    let ciphertext = data[reader.pos..reader.pos + len].to_vec();
    Ok((
        params,
        Sealed {
            salt,
            nonce,
            ciphertext,
        },
    ))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], CoreError> {
        let bytes: [u8; N] = self
            .data
            .get(self.pos..self.pos + N)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| CoreError::InvalidFileFormat(format!("Header field at offset {} is truncated", self.pos)))?;
        self.pos += N;
        Ok(bytes)
    }
}
