//! Binary index snapshot codec
//!
//! Layout (little-endian):
//! `MAGIC(4) | VERSION(1) | DIMENSION(u32) | COUNT(u64) | COUNT*DIMENSION f32 | SHA-256(32)`
//!
//! A dimension of 0 marks an index that never received a vector.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

use super::AdaptiveIndex;
use crate::domain::semantic_cache::{IndexConfig, VectorIndex};
use crate::domain::DomainError;

const MAGIC: &[u8; 4] = b"SCVI";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 8;
const CHECKSUM_LEN: usize = 32;

/// Serialize dimension and every stored vector in slot order
pub fn encode(index: &AdaptiveIndex) -> Result<Bytes, DomainError> {
    let data = index.storage().as_slice();
    let dimension = u32::try_from(index.dimension().unwrap_or(0))
        .map_err(|_| DomainError::persistence("index dimension does not fit the snapshot header"))?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + data.len() * 4 + CHECKSUM_LEN);
    buf.put_slice(MAGIC);
    buf.put_u8(VERSION);
    buf.put_u32_le(dimension);
    buf.put_u64_le(index.len() as u64);

    for value in data {
        buf.put_f32_le(*value);
    }

    let checksum = Sha256::digest(&buf);
    buf.put_slice(&checksum);

    Ok(buf.freeze())
}

/// Verify and decode a snapshot into a fresh index
pub fn decode(bytes: &[u8], config: IndexConfig) -> Result<AdaptiveIndex, DomainError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(DomainError::persistence("index snapshot is truncated"));
    }

    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(body).as_slice() != checksum {
        return Err(DomainError::persistence("index snapshot checksum mismatch"));
    }

    let mut buf = body;

    if &buf[..4] != MAGIC {
        return Err(DomainError::persistence("index snapshot has bad magic bytes"));
    }
    buf.advance(4);

    let version = buf.get_u8();
    if version != VERSION {
        return Err(DomainError::persistence(format!(
            "unsupported index snapshot version: {}",
            version
        )));
    }

    let dimension = buf.get_u32_le() as usize;
    let count = usize::try_from(buf.get_u64_le())
        .map_err(|_| DomainError::persistence("index snapshot count overflows"))?;

    let expected = count
        .checked_mul(dimension)
        .and_then(|values| values.checked_mul(4))
        .ok_or_else(|| DomainError::persistence("index snapshot size overflows"))?;

    if buf.remaining() != expected {
        return Err(DomainError::persistence(format!(
            "index snapshot holds {} data bytes, header promises {}",
            buf.remaining(),
            expected
        )));
    }

    if dimension == 0 && count > 0 {
        return Err(DomainError::persistence(
            "index snapshot has vectors but no dimension",
        ));
    }

    let mut data = Vec::with_capacity(count * dimension);
    while buf.has_remaining() {
        data.push(buf.get_f32_le());
    }

    let dimension = (dimension > 0).then_some(dimension);
    AdaptiveIndex::from_rows(dimension, data, config)
}
