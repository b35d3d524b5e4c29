//! Stratus package codec — instructions, packages, and the framing that
//! carries them between peers.
//!
//! Peers of a distributed system converge on a shared object set by
//! exchanging *packages*: framed, hashed, optionally signed containers of
//! serialized *instructions*. This crate owns the binary framing and
//! integrity rules; how packages travel and how instructions are applied
//! live in `stratus-transport` and `stratus-exec`.

pub mod errors;
pub mod instruction;
pub mod json;
pub mod package;
pub mod sign;
pub mod varint;

pub use errors::CodecError;
pub use instruction::{AttrMap, Entity, Instruction, InstructionCodec, Method, Payload};
pub use json::JsonEntity;
pub use package::{Package, Reader};
pub use sign::{sha256, Sign, Verify};
