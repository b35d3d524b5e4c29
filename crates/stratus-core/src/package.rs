//! Package framing — the on-wire container of serialized instructions.
//!
//! A package is an immutable byte string:
//!
//! ```text
//! offset  size  field
//! 0       1     flags | version
//!                 bit7 = signature present
//!                 bit6 = digest present (always set by build)
//!                 bits0-5 = version (currently 1)
//! 1       2     N, instruction count, little-endian
//! 3       *     body: N x (varint length || instruction bytes)
//! ...     32    SHA-256 digest over bytes[0..end_of_body]
//! ...     64    Ed25519 signature over the digest (iff bit7)
//! ```
//!
//! The digest covers the header and body exactly as they appear on the
//! wire, flags included. Deserialization verifies progressively: header,
//! chunk by chunk into a running hash, digest, then signature when a
//! verifier is supplied.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::errors::CodecError;
use crate::instruction::{Instruction, InstructionCodec};
use crate::sign::{Sign, Verify, DIGEST_SIZE, SIGNATURE_SIZE};
use crate::varint;

// ── Wire constants ────────────────────────────────────────────────────────────

/// Current package format version. Lives in the low 6 bits of byte 0.
pub const VERSION: u8 = 1;

/// Maximum number of instructions per package.
pub const MAX_INSTRUCTIONS: usize = 0xFFFF;

const FLAG_SIGNATURE: u8 = 0b1000_0000;
const FLAG_DIGEST: u8 = 0b0100_0000;
const VERSION_MASK: u8 = 0b0011_1111;
const HEADER_SIZE: usize = 3;

// ── Package ───────────────────────────────────────────────────────────────────

/// A framed, hashed, optionally signed container of serialized
/// instructions.
///
/// Cheap to clone and to construct over received bytes: accessors slice
/// the underlying buffer in O(1) and verification is deferred to
/// [`Package::deserialize`].
pub struct Package<E> {
    bytes: Bytes,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Package<E> {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> PartialEq for Package<E> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<E> Eq for Package<E> {}

impl<E> fmt::Debug for Package<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("version", &self.version())
            .field("count", &self.count())
            .field("signed", &self.signed())
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl<E> Package<E> {
    /// Wrap an existing byte string without validating it.
    pub fn open(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            _entity: PhantomData,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn flags(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }

    /// Format version carried in the header.
    pub fn version(&self) -> u8 {
        self.flags() & VERSION_MASK
    }

    /// True when the signature flag is set.
    pub fn signed(&self) -> bool {
        self.flags() & FLAG_SIGNATURE != 0
    }

    /// Instruction count claimed by the header.
    pub fn count(&self) -> u16 {
        match self.bytes.get(1..HEADER_SIZE) {
            Some(raw) => u16::from_le_bytes([raw[0], raw[1]]),
            None => 0,
        }
    }

    fn trailer_size(&self) -> usize {
        let mut size = 0;
        if self.flags() & FLAG_DIGEST != 0 {
            size += DIGEST_SIZE;
        }
        if self.flags() & FLAG_SIGNATURE != 0 {
            size += SIGNATURE_SIZE;
        }
        size
    }

    /// The chunk region between header and trailer. Empty when the
    /// buffer is too short to contain one.
    pub fn body(&self) -> &[u8] {
        let end = self.bytes.len().saturating_sub(self.trailer_size());
        self.bytes.get(HEADER_SIZE..end).unwrap_or(&[])
    }

    /// The 32-byte digest, when the digest flag is set and the buffer is
    /// long enough to hold it.
    pub fn digest(&self) -> Option<&[u8]> {
        if self.flags() & FLAG_DIGEST == 0 {
            return None;
        }
        let end = self.bytes.len().checked_sub(if self.signed() { SIGNATURE_SIZE } else { 0 })?;
        let start = end.checked_sub(DIGEST_SIZE)?;
        if start < HEADER_SIZE {
            return None;
        }
        self.bytes.get(start..end)
    }

    /// The 64-byte signature, when the signature flag is set and the
    /// buffer is long enough to hold it.
    pub fn signature(&self) -> Option<&[u8]> {
        if !self.signed() {
            return None;
        }
        let start = self.bytes.len().checked_sub(SIGNATURE_SIZE)?;
        if start < HEADER_SIZE {
            return None;
        }
        self.bytes.get(start..)
    }
}

impl<E: InstructionCodec> Package<E> {
    /// Build a package from instructions, sealing it with a SHA-256
    /// digest and, when a signer is given, an Ed25519 signature.
    pub fn build(
        instructions: &[Instruction<E>],
        signer: Option<&dyn Sign>,
    ) -> Result<Self, CodecError> {
        if instructions.len() > MAX_INSTRUCTIONS {
            return Err(CodecError::serialize(
                "Too many instructions; maximum package size is 65535",
            ));
        }
        let mut flags = VERSION | FLAG_DIGEST;
        if signer.is_some() {
            flags |= FLAG_SIGNATURE;
        }
        let mut buf = Vec::with_capacity(HEADER_SIZE + instructions.len() * 64);
        buf.push(flags);
        buf.extend_from_slice(&(instructions.len() as u16).to_le_bytes());
        for instruction in instructions {
            let serialized = E::encode(instruction)?;
            varint::encode_into(serialized.len() as u64, &mut buf);
            buf.extend_from_slice(&serialized);
        }
        let digest: [u8; DIGEST_SIZE] = Sha256::digest(&buf).into();
        buf.extend_from_slice(&digest);
        if let Some(signer) = signer {
            buf.extend_from_slice(&signer.sign(&digest));
        }
        Ok(Self::open(buf))
    }

    /// Lazily deserialize the contained instructions, verifying the
    /// header and digest along the way.
    pub fn deserialize(&self) -> Reader<'_, E> {
        Reader::new(self.as_bytes(), None)
    }

    /// Like [`Package::deserialize`], additionally checking the trailing
    /// signature against `verifier`.
    pub fn deserialize_signed<'a>(&'a self, verifier: &'a dyn Verify) -> Reader<'a, E> {
        Reader::new(self.as_bytes(), Some(verifier))
    }

    /// True iff the package deserializes completely and its signature
    /// holds under `verifier`.
    pub fn verify(&self, verifier: &dyn Verify) -> bool {
        self.deserialize_signed(verifier).all(|item| item.is_ok())
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

enum ReaderState {
    Header,
    Chunks,
    Trailer,
    Done,
}

/// Lazy instruction iterator over a package.
///
/// Yields each decoded instruction in order, then runs the digest and
/// signature checks; an integrity failure surfaces as the final item.
pub struct Reader<'a, E> {
    buf: &'a [u8],
    pos: usize,
    remaining: u16,
    hasher: Sha256,
    verifier: Option<&'a dyn Verify>,
    state: ReaderState,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E: InstructionCodec> Reader<'a, E> {
    fn new(buf: &'a [u8], verifier: Option<&'a dyn Verify>) -> Self {
        Self {
            buf,
            pos: 0,
            remaining: 0,
            hasher: Sha256::new(),
            verifier,
            state: ReaderState::Header,
            _entity: PhantomData,
        }
    }

    fn read_header(&mut self) -> Result<(), CodecError> {
        let header = self
            .buf
            .get(..HEADER_SIZE)
            .ok_or_else(|| CodecError::deserialize("Wrong package header"))?;
        let flags = header[0];
        if flags & VERSION_MASK != VERSION {
            return Err(CodecError::deserialize("Wrong package version"));
        }
        if flags & FLAG_DIGEST == 0 {
            return Err(CodecError::deserialize("Wrong package header"));
        }
        self.remaining = u16::from_le_bytes([header[1], header[2]]);
        self.hasher.update(header);
        self.pos = HEADER_SIZE;
        Ok(())
    }

    fn read_chunk(&mut self) -> Result<Instruction<E>, CodecError> {
        let (size, consumed) = varint::decode(&self.buf[self.pos..])
            .map_err(|_| CodecError::deserialize("Wrong package size"))?;
        self.hasher.update(&self.buf[self.pos..self.pos + consumed]);
        self.pos += consumed;
        let end = self
            .pos
            .checked_add(size as usize)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| CodecError::deserialize("Wrong package size"))?;
        let chunk = &self.buf[self.pos..end];
        self.hasher.update(chunk);
        self.pos = end;
        E::decode(chunk)
    }

    fn check_trailer(&mut self) -> Result<(), CodecError> {
        let digest: [u8; DIGEST_SIZE] = self.hasher.clone().finalize().into();
        let stored = self
            .buf
            .get(self.pos..self.pos + DIGEST_SIZE)
            .ok_or_else(|| CodecError::verify("Wrong package hash"))?;
        if stored != digest {
            return Err(CodecError::verify("Wrong package hash"));
        }
        self.pos += DIGEST_SIZE;
        if let Some(verifier) = self.verifier {
            let signature: &[u8; SIGNATURE_SIZE] = self
                .buf
                .get(self.pos..self.pos + SIGNATURE_SIZE)
                .and_then(|raw| raw.try_into().ok())
                .ok_or_else(|| CodecError::verify("Wrong package signature"))?;
            if !verifier.verify(&digest, signature) {
                return Err(CodecError::verify("Wrong package signature"));
            }
            self.pos += SIGNATURE_SIZE;
        }
        Ok(())
    }
}

impl<'a, E: InstructionCodec> Iterator for Reader<'a, E> {
    type Item = Result<Instruction<E>, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                ReaderState::Header => match self.read_header() {
                    Ok(()) => self.state = ReaderState::Chunks,
                    Err(err) => {
                        self.state = ReaderState::Done;
                        return Some(Err(err));
                    }
                },
                ReaderState::Chunks if self.remaining == 0 => {
                    self.state = ReaderState::Trailer;
                }
                ReaderState::Chunks => match self.read_chunk() {
                    Ok(instruction) => {
                        self.remaining -= 1;
                        return Some(Ok(instruction));
                    }
                    Err(err) => {
                        self.state = ReaderState::Done;
                        return Some(Err(err));
                    }
                },
                ReaderState::Trailer => {
                    self.state = ReaderState::Done;
                    return match self.check_trailer() {
                        Ok(()) => None,
                        Err(err) => Some(Err(err)),
                    };
                }
                ReaderState::Done => return None,
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
