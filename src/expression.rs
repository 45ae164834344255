use crate::{DebugError, EndianReader, debug_info::DebugInfo};

use gimli::Reader;
use serde::Serialize;

use std::rc::Rc;

/// Vendor opcode placing a value in the execution engine's storage rather
/// than linear memory. Operands: a one byte storage kind tag followed by a
/// loader-defined payload.
pub const DW_OP_WASM_LOCATION: gimli::DwOp = gimli::DwOp(0xed);
/// Alternate encoding of [`DW_OP_WASM_LOCATION`] with an integer payload.
pub const DW_OP_WASM_LOCATION_INT: gimli::DwOp = gimli::DwOp(0xee);

/// The well-known storage areas a Wasm location opcode can address.
///
/// The tag byte is defined by the execution engine; loaders receive it raw
/// and may understand values beyond these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum WasmStorageKind {
    /// A function-local slot of the paused frame.
    Local = 0x00,
    /// A module global.
    Global = 0x01,
    /// A slot on the operand stack of the paused frame.
    OperandStack = 0x02,
}

impl TryFrom<u8> for WasmStorageKind {
    type Error = DebugError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(WasmStorageKind::Local),
            0x01 => Ok(WasmStorageKind::Global),
            0x02 => Ok(WasmStorageKind::OperandStack),
            other => Err(DebugError::ValueLoader {
                message: format!("Unknown Wasm storage kind {other:#04x}"),
            }),
        }
    }
}

/// A primitive value held in the execution engine's storage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum WasmValue {
    /// A 32 bit integer.
    I32(i32),
    /// A 64 bit integer.
    I64(i64),
    /// A single precision float.
    F32(f32),
    /// A double precision float.
    F64(f64),
}

impl From<WasmValue> for gimli::Value {
    fn from(value: WasmValue) -> Self {
        match value {
            WasmValue::I32(value) => gimli::Value::I32(value),
            WasmValue::I64(value) => gimli::Value::I64(value),
            WasmValue::F32(value) => gimli::Value::F32(value),
            WasmValue::F64(value) => gimli::Value::F64(value),
        }
    }
}

/// One entry on the location-expression evaluation stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvaluationValue {
    /// A value computed directly on the expression stack.
    Scalar(gimli::Value),
    /// An address in the target's linear memory.
    Address(u64),
}

/// Materializes typed values out of the execution engine's opaque storage.
///
/// At most one loader is active at a time, scoped to a single expression
/// evaluation through [`ValueLoaderGuard`].
pub trait ValueLoader {
    /// Decode one value of the given storage kind, advancing `opcodes` past
    /// the loader-defined payload.
    fn load_value(
        &self,
        storage_kind: u8,
        opcodes: &mut EndianReader,
    ) -> Result<WasmValue, DebugError>;
}

/// Scoped registration of the value loader for one expression evaluation.
///
/// The loader is installed on construction and removed again when the guard
/// drops, on every exit path including unwinding, so a cancelled evaluation
/// never leaks its loader into the next one.
///
/// # Panics
///
/// Panics when a loader is already active. The decode target is single-valued
/// per evaluation, so evaluations cannot nest; attempting to is a caller bug.
pub struct ValueLoaderGuard<'a> {
    debug_info: &'a DebugInfo,
}

impl<'a> ValueLoaderGuard<'a> {
    /// Install `loader` as the active loader of `debug_info`.
    pub fn new(debug_info: &'a DebugInfo, loader: Rc<dyn ValueLoader>) -> Self {
        let mut slot = debug_info.value_loader.borrow_mut();
        assert!(
            slot.is_none(),
            "Cannot nest Wasm expression evaluation contexts"
        );
        *slot = Some(loader);
        drop(slot);

        ValueLoaderGuard { debug_info }
    }
}

impl Drop for ValueLoaderGuard<'_> {
    fn drop(&mut self) {
        *self.debug_info.value_loader.borrow_mut() = None;
    }
}

impl DebugInfo {
    /// Evaluate a vendor-specific DWARF location opcode.
    ///
    /// For [`DW_OP_WASM_LOCATION`] and [`DW_OP_WASM_LOCATION_INT`] this reads
    /// the storage kind tag, hands the remaining operand bytes to the active
    /// value loader and pushes the decoded value onto `stack` as a scalar.
    ///
    /// Returns `Ok(false)` for opcodes this evaluator does not own; those
    /// remain the host's responsibility. Loader failures are returned to the
    /// caller and are never retried.
    pub fn evaluate_vendor_opcode(
        &self,
        opcode: gimli::DwOp,
        opcodes: &mut EndianReader,
        stack: &mut Vec<EvaluationValue>,
    ) -> Result<bool, DebugError> {
        match opcode {
            DW_OP_WASM_LOCATION | DW_OP_WASM_LOCATION_INT => {}
            _ => return Ok(false),
        }

        let loader = self.value_loader.borrow().clone();
        let Some(loader) = loader else {
            return Err(DebugError::NoActiveValueLoader);
        };

        let storage_kind = opcodes.read_u8()?;
        let value = loader.load_value(storage_kind, opcodes)?;

        stack.push(EvaluationValue::Scalar(value.into()));
        Ok(true)
    }
}
