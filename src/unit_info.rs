use crate::{DebugError, Die, EndianReader};

use gimli::{AttributeValue, UnitOffset};

/// A struct containing information about a single compilation unit.
pub struct UnitInfo {
    pub(crate) unit: gimli::Unit<EndianReader>,
    dwarf_language: gimli::DwLang,
}

impl UnitInfo {
    /// Create a new `UnitInfo` from a `gimli::Unit`.
    pub(crate) fn new(unit: gimli::Unit<EndianReader>) -> Self {
        let dwarf_language = if let Ok(Some(AttributeValue::Language(unit_language))) = unit
            .entries_tree(None)
            .and_then(|mut tree| tree.root()?.entry().attr_value(gimli::DW_AT_language))
        {
            unit_language
        } else {
            tracing::warn!("Unable to retrieve DW_AT_language attribute, assuming Rust.");
            gimli::DW_LANG_Rust
        };

        Self {
            unit,
            dwarf_language,
        }
    }

    /// Retrieve the value of the `DW_AT_language` attribute of the compilation unit.
    ///
    /// In the unlikely event that we are unable to retrieve the language, we assume Rust.
    pub fn language(&self) -> gimli::DwLang {
        self.dwarf_language
    }

    /// Fetch the DIE at `offset` in this unit.
    pub(crate) fn entry(&self, offset: UnitOffset) -> Result<Die<'_, '_>, DebugError> {
        Ok(self.unit.entry(offset)?)
    }
}
