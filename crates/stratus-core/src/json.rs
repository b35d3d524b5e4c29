//! Reference JSON instruction serialization.
//!
//! Instructions travel as compact UTF-8 JSON arrays:
//!
//! ```text
//! [[kind, *key_parts], revision, payload?]
//! ```
//!
//! A CREATE names only the kind and carries the full value as positional
//! arguments; UPDATE and DELETE name the kind plus the OID key parts, and
//! an UPDATE adds the attribute object. Timestamps travel as ISO-8601
//! strings supplied by the domain type.
//!
//! The serialized form names the record kind; [`JsonEntity`] resolves the
//! decoder. Applications with a custom wire form implement
//! [`InstructionCodec`] directly instead.

use serde_json::Value;

use crate::errors::CodecError;
use crate::instruction::{Entity, Instruction, InstructionCodec, Payload};

/// A domain object that serializes as a positional JSON record.
///
/// Typically implemented on a tagged union of every record kind the
/// application synchronizes; the `kind` string dispatches decoding.
pub trait JsonEntity: Entity {
    /// Kind tag naming the record type of `oid` on the wire.
    fn kind_of(oid: &Self::Oid) -> &'static str;

    /// Key parts identifying the record within its kind.
    fn key_parts(oid: &Self::Oid) -> Vec<Value>;

    /// Rebuild an OID from its kind tag and key parts.
    fn oid_from_parts(kind: &str, keys: &[Value]) -> Option<Self::Oid>;

    /// Positional argument values of the full record.
    fn to_args(&self) -> Vec<Value>;

    /// Rebuild a record from its kind tag and positional arguments.
    fn from_args(kind: &str, args: &[Value]) -> Option<Self>;
}

/// Encode an instruction into the reference JSON form.
pub fn encode<E: JsonEntity>(instruction: &Instruction<E>) -> Result<Vec<u8>, CodecError> {
    let mut head = vec![Value::from(E::kind_of(instruction.oid()))];
    if instruction.revision() > 0 {
        head.extend(E::key_parts(instruction.oid()));
    }
    let mut root = vec![Value::Array(head), Value::from(instruction.revision())];
    match instruction.payload() {
        Payload::Entity(entity) => root.push(Value::Array(entity.to_args())),
        Payload::Attrs(attrs) => root.push(Value::Object(attrs.clone())),
        Payload::None => {}
    }
    serde_json::to_vec(&root).map_err(|err| CodecError::serialize(err.to_string()))
}

/// Decode an instruction from the reference JSON form.
///
/// Any structural mismatch or unknown kind fails with the uniform
/// "Cannot deserialize instruction" error.
pub fn decode<E: JsonEntity>(raw: &[u8]) -> Result<Instruction<E>, CodecError> {
    parse::<E>(raw).ok_or_else(|| CodecError::deserialize("Cannot deserialize instruction"))
}

fn parse<E: JsonEntity>(raw: &[u8]) -> Option<Instruction<E>> {
    let root: Vec<Value> = serde_json::from_slice(raw).ok()?;
    let (head, rest) = root.split_first()?;
    let (kind, keys) = head.as_array()?.split_first()?;
    let kind = kind.as_str()?;
    let revision = rest.first()?.as_u64()?;
    let payload = rest.get(1);
    if rest.len() > 2 {
        return None;
    }
    if revision == 0 {
        let entity = E::from_args(kind, payload?.as_array()?)?;
        Some(Instruction::create(entity))
    } else {
        let oid = E::oid_from_parts(kind, keys)?;
        let payload = match payload {
            Some(value) => Payload::Attrs(value.as_object()?.clone()),
            None => Payload::None,
        };
        Instruction::from_parts(oid, revision, payload).ok()
    }
}

impl<E: JsonEntity> InstructionCodec for E {
    fn encode(instruction: &Instruction<Self>) -> Result<Vec<u8>, CodecError> {
        encode(instruction)
    }

    fn decode(raw: &[u8]) -> Result<Instruction<Self>, CodecError> {
        decode(raw)
    }
}
