// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! Apple disk image chunklists.
//!
//! A chunklist splits a disk image into chunks and stores the SHA-256 of each. The header and chunk table are signed,
//! and the signature follows them:
//!
//! ```text
//! +--------+------------------------+-----------+
//! | header | chunk table (36 bytes) | signature |
//! +--------+------------------------+-----------+
//! ```
//!
//! Checking the signature needs Apple's keys, so it is left to [`crate::boot::services::DiskImageVerifier`].

use alloc::vec::Vec;
use bytemuck::{Pod, Zeroable};
use log::debug;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The magic at the start of every chunklist, `CNKL`.
pub const CHUNKLIST_MAGIC: u32 = 0x4C4B_4E43;

/// The only header size that has ever been used.
const HEADER_SIZE: u32 = 0x24;

/// The only file version that has ever been used.
const FILE_VERSION: u8 = 1;

/// Chunks are hashed with SHA-256.
const CHUNK_METHOD_SHA256: u8 = 1;

/// The size of one chunk table entry.
const CHUNK_SIZE: usize = size_of::<RawChunk>();

/// An `Error` that may result from parsing or verifying a chunklist.
#[derive(Error, Debug)]
pub enum ChunklistError {
    /// The file does not start with `CNKL`.
    #[error("Chunklist has a bad magic")]
    BadMagic,

    /// The header has an unsupported size, version or method.
    #[error("Chunklist header is unsupported")]
    Header,

    /// The chunk table or the signature lies outside of the file.
    #[error("Chunklist tables are out of bounds")]
    Bounds,

    /// The signature method does not match the size of the signature.
    #[error("Chunklist signature has an unexpected length ({0} bytes)")]
    SignatureLength(usize),

    /// A chunk does not hash to its recorded value.
    #[error("Chunk {0} does not match the disk image")]
    HashMismatch(usize),

    /// The chunks do not add up to the size of the disk image.
    #[error("Chunklist covers {0} bytes but the disk image has {1}")]
    LengthMismatch(u64, usize),
}

/// The on-disk chunklist header. Every field is little endian.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
struct RawHeader {
    magic: [u8; 4],
    header_size: [u8; 4],
    file_version: u8,
    chunk_method: u8,
    signature_method: u8,
    padding: u8,
    chunk_count: [u8; 8],
    chunk_offset: [u8; 8],
    signature_offset: [u8; 8],
}

/// One on-disk chunk table entry.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
struct RawChunk {
    size: [u8; 4],
    hash: [u8; 32],
}

/// One chunk of a disk image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// The size of the chunk in bytes.
    pub size: u32,

    /// The SHA-256 of the chunk.
    pub hash: [u8; 32],
}

/// A parsed chunklist.
#[derive(Clone, Debug)]
pub struct Chunklist<'a> {
    /// The chunks in image order.
    pub chunks: Vec<Chunk>,

    /// The header and chunk table, which the signature covers.
    pub signed: &'a [u8],

    /// The signature.
    pub signature: &'a [u8],
}

/// Converts an on-disk offset into a `usize`.
fn offset(raw: [u8; 8]) -> Result<usize, ChunklistError> {
    usize::try_from(u64::from_le_bytes(raw)).map_err(|_| ChunklistError::Bounds)
}

impl<'a> Chunklist<'a> {
    /// Parses and bounds checks a chunklist.
    ///
    /// # Errors
    ///
    /// May return an `Error` if the header is unsupported, a table is out of bounds, or the signature has the wrong
    /// size for its method.
    pub fn parse(raw: &'a [u8]) -> Result<Self, ChunklistError> {
        let header_bytes = raw.get(..size_of::<RawHeader>()).ok_or(ChunklistError::Header)?;
        let header: RawHeader = bytemuck::pod_read_unaligned(header_bytes);

        if u32::from_le_bytes(header.magic) != CHUNKLIST_MAGIC {
            return Err(ChunklistError::BadMagic);
        }
        if u32::from_le_bytes(header.header_size) != HEADER_SIZE
            || header.file_version != FILE_VERSION
            || header.chunk_method != CHUNK_METHOD_SHA256
        {
            return Err(ChunklistError::Header);
        }

        let count = offset(header.chunk_count)?;
        let chunk_offset = offset(header.chunk_offset)?;
        let signature_offset = offset(header.signature_offset)?;
        let chunk_end = count
            .checked_mul(CHUNK_SIZE)
            .and_then(|len| len.checked_add(chunk_offset))
            .ok_or(ChunklistError::Bounds)?;
        if chunk_offset < size_of::<RawHeader>()
            || chunk_end > signature_offset
            || signature_offset > raw.len()
        {
            return Err(ChunklistError::Bounds);
        }

        let signature = &raw[signature_offset..];
        let expected = match header.signature_method {
            1 => 256,
            2 => 512,
            _ => return Err(ChunklistError::Header),
        };
        if signature.len() != expected {
            return Err(ChunklistError::SignatureLength(signature.len()));
        }

        let chunks = raw[chunk_offset..chunk_end]
            .chunks_exact(CHUNK_SIZE)
            .map(|bytes| {
                let chunk: RawChunk = bytemuck::pod_read_unaligned(bytes);
                Chunk {
                    size: u32::from_le_bytes(chunk.size),
                    hash: chunk.hash,
                }
            })
            .collect();

        Ok(Self {
            chunks,
            signed: &raw[..signature_offset],
            signature,
        })
    }

    /// Checks that the chunks hash to a disk image.
    ///
    /// # Errors
    ///
    /// May return an `Error` if a chunk does not match, or the chunks do not cover the image exactly.
    pub fn verify_data(&self, data: &[u8]) -> Result<(), ChunklistError> {
        let total: u64 = self.chunks.iter().map(|chunk| u64::from(chunk.size)).sum();
        if u64::try_from(data.len()).ok() != Some(total) {
            return Err(ChunklistError::LengthMismatch(total, data.len()));
        }

        let mut rest = data;
        for (index, chunk) in self.chunks.iter().enumerate() {
            // the total was checked, so every chunk is in bounds
            let (part, tail) = rest.split_at(chunk.size as usize);
            if Sha256::digest(part).as_slice() != chunk.hash {
                debug!("Chunk {index} of {} does not match", self.chunks.len());
                return Err(ChunklistError::HashMismatch(index));
            }
            rest = tail;
        }
        Ok(())
    }
}

/// Builds chunklists for tests.
#[cfg(test)]
pub(crate) fn build_chunklist(data: &[u8], chunk_size: usize, signature_method: u8) -> Vec<u8> {
    let chunks: Vec<&[u8]> = data.chunks(chunk_size).collect();
    let chunk_offset = size_of::<RawHeader>();
    let signature_offset = chunk_offset + chunks.len() * CHUNK_SIZE;

    let header = RawHeader {
        magic: CHUNKLIST_MAGIC.to_le_bytes(),
        header_size: HEADER_SIZE.to_le_bytes(),
        file_version: FILE_VERSION,
        chunk_method: CHUNK_METHOD_SHA256,
        signature_method,
        padding: 0,
        chunk_count: (chunks.len() as u64).to_le_bytes(),
        chunk_offset: (chunk_offset as u64).to_le_bytes(),
        signature_offset: (signature_offset as u64).to_le_bytes(),
    };
    let mut raw = bytemuck::bytes_of(&header).to_vec();
    for chunk in chunks {
        let entry = RawChunk {
            size: (chunk.len() as u32).to_le_bytes(),
            hash: Sha256::digest(chunk).into(),
        };
        raw.extend_from_slice(bytemuck::bytes_of(&entry));
    }
    raw.resize(signature_offset + if signature_method == 2 { 512 } else { 256 }, 0xA5);
    raw
}
