//! DWARF type reconstruction for sandboxed WebAssembly targets.
//!
//! Debug information for languages with sum types (Rust-style enums) encodes
//! variant and discriminant structure that a host debugger's base type system
//! cannot represent natively. This crate recovers that structure from DWARF,
//! caches it against the host's own type identities, answers layout queries
//! from the recovered data, and evaluates the vendor location opcode that
//! places values in the execution engine's storage rather than linear memory.

/// Debug information which is parsed from DWARF debugging information.
pub mod debug_info;
/// Walking debug-info entries and extracting variant and template structure.
pub(crate) mod extraction;
/// The Wasm location expression opcode and pluggable value loading.
pub mod expression;
/// The synthetic single-frame execution snapshot presented to the debugger.
pub mod sandbox;
/// Recovered type structure, keyed by the host's opaque type identities.
pub mod type_info;
/// The extension over the host's type system: completion hook and layout queries.
pub mod type_system;
/// Information about a Unit in the debug information.
pub mod unit_info;


pub use self::{debug_info::*, expression::*, sandbox::*, type_info::*, type_system::*};

use gimli::RunTimeEndian;

use std::{io, str::Utf8Error};

/// A simplified type alias of the [`gimli::EndianReader`] type.
pub type EndianReader = gimli::EndianReader<RunTimeEndian, std::rc::Rc<[u8]>>;

/// A debugging information entry backed by [`EndianReader`].
pub(crate) type Die<'abbrev, 'unit> =
    gimli::DebuggingInformationEntry<'abbrev, 'unit, EndianReader>;

/// An error occurred while reconstructing types or evaluating expressions.
#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    /// An IO error occurred when accessing debug data.
    #[error("IO Error while accessing debug data")]
    Io(#[from] io::Error),
    /// An error occurred while accessing debug data.
    #[error("Error accessing debug data")]
    DebugData(#[from] object::read::Error),
    /// Something failed while parsing debug data.
    #[error("Error parsing debug data")]
    Parse(#[from] gimli::read::Error),
    /// Non-UTF8 data was found in the debug data.
    #[error("Non-UTF8 data found in debug data")]
    NonUtf8(#[from] Utf8Error),
    /// A Wasm location opcode was evaluated while no value loader was active.
    #[error("No value loader is active for the current expression evaluation")]
    NoActiveValueLoader,
    /// The active value loader failed to decode a value.
    #[error("Failed to load a value from the execution engine: {message}")]
    ValueLoader {
        /// The loader's description of what went wrong.
        message: String,
    },
    /// A memory read through the debugger proxy failed.
    #[error("{message}")]
    Proxy {
        /// The proxy's description of what went wrong.
        message: String,
    },
    /// Some other error occurred.
    #[error("{0}")]
    Other(String),
}

/// If a `DW_AT_name` attribute exists, return its string value, otherwise `None`.
pub(crate) fn extract_name(
    debug_info: &debug_info::DebugInfo,
    unit: &gimli::Unit<EndianReader>,
    entry: &Die<'_, '_>,
) -> Option<String> {
    let name_attr = entry.attr_value(gimli::DW_AT_name).ok().flatten()?;
    let raw = debug_info.dwarf.attr_string(unit, name_attr).ok()?;
    String::from_utf8(raw.to_vec()).ok()
}

/// Read an unsigned integer attribute, whatever its encoded form.
pub(crate) fn extract_unsigned(entry: &Die<'_, '_>, attribute: gimli::DwAt) -> Option<u64> {
    entry
        .attr_value(attribute)
        .ok()
        .flatten()
        .and_then(|value| value.udata_value())
}

/// Read an attribute referencing another DIE in the same unit.
pub(crate) fn extract_reference(
    entry: &Die<'_, '_>,
    attribute: gimli::DwAt,
) -> Option<gimli::UnitOffset> {
    match entry.attr_value(attribute) {
        Ok(Some(gimli::AttributeValue::UnitRef(offset))) => Some(offset),
        _ => None,
    }
}
