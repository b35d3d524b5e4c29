//! Instructions — addressable, versioned state-change commands.
//!
//! An instruction targets one domain object by OID and names the revision
//! it expects that object to be at. The method (CREATE, UPDATE, DELETE)
//! is derived from the revision and payload, never stored on the wire.

use std::fmt;
use std::hash::Hash;

use serde_json::{Map, Value};

use crate::errors::CodecError;

/// Attribute map carried by UPDATE instructions.
pub type AttrMap = Map<String, Value>;

/// A domain object participating in distributed-state synchronization.
///
/// Every entity carries a stable OID naming it across the system. `merge`
/// applies an UPDATE attribute map and returns the revised value; it is
/// the application's half of the UPDATE semantics.
pub trait Entity: Clone + Send + Sync + 'static {
    type Oid: Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static;

    fn oid(&self) -> Self::Oid;

    fn merge(&self, attrs: &AttrMap) -> Result<Self, CodecError>;
}

/// Application-chosen wire form for instructions.
///
/// The codec must be deterministic and round-tripping; everything else is
/// delegated. The reference JSON serialization lives in [`crate::json`].
pub trait InstructionCodec: Entity + Sized {
    fn encode(instruction: &Instruction<Self>) -> Result<Vec<u8>, CodecError>;

    fn decode(raw: &[u8]) -> Result<Instruction<Self>, CodecError>;
}

/// Derived instruction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Create => "CREATE",
            Method::Update => "UPDATE",
            Method::Delete => "DELETE",
        })
    }
}

/// Instruction payload, shaped by the method.
///
/// A CREATE carries the full object value, an UPDATE carries the
/// attributes to change, a DELETE carries nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<E> {
    Entity(E),
    Attrs(AttrMap),
    None,
}

/// An immutable state-change command addressed to one object.
///
/// Constructors enforce the derivation rule: revision 0 creates and
/// carries the entity; a positive revision with attributes updates; a
/// positive revision without attributes deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction<E: Entity> {
    oid: E::Oid,
    revision: u64,
    payload: Payload<E>,
}

impl<E: Entity> Instruction<E> {
    /// A CREATE of `entity` at revision 0.
    pub fn create(entity: E) -> Self {
        Self {
            oid: entity.oid(),
            revision: 0,
            payload: Payload::Entity(entity),
        }
    }

    /// An UPDATE of the named attributes of `entity`, expected at
    /// `revision`. An empty attribute map derives a DELETE.
    pub fn update(entity: &E, revision: u64, attrs: AttrMap) -> Self {
        debug_assert!(revision > 0, "updates target existing revisions");
        let payload = if attrs.is_empty() {
            Payload::None
        } else {
            Payload::Attrs(attrs)
        };
        Self {
            oid: entity.oid(),
            revision,
            payload,
        }
    }

    /// A DELETE of `entity`, expected at `revision`.
    pub fn delete(entity: &E, revision: u64) -> Self {
        debug_assert!(revision > 0, "deletes target existing revisions");
        Self {
            oid: entity.oid(),
            revision,
            payload: Payload::None,
        }
    }

    /// Reassemble an instruction from decoded wire parts.
    ///
    /// Used by codecs. Fails when the parts violate the derivation rule,
    /// e.g. an entity payload at a positive revision.
    pub fn from_parts(oid: E::Oid, revision: u64, payload: Payload<E>) -> Result<Self, CodecError> {
        let consistent = match payload {
            Payload::Entity(_) => revision == 0,
            Payload::Attrs(ref attrs) => revision > 0 && !attrs.is_empty(),
            Payload::None => revision > 0,
        };
        if !consistent {
            return Err(CodecError::deserialize("Cannot deserialize instruction"));
        }
        Ok(Self {
            oid,
            revision,
            payload,
        })
    }

    /// OID of the target object.
    pub fn oid(&self) -> &E::Oid {
        &self.oid
    }

    /// Revision the target object is expected to be at.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn payload(&self) -> &Payload<E> {
        &self.payload
    }

    /// The derived method.
    pub fn method(&self) -> Method {
        match self.payload {
            Payload::Entity(_) => Method::Create,
            Payload::Attrs(_) => Method::Update,
            Payload::None => Method::Delete,
        }
    }
}
