use crate::{
    DebugError, EndianReader, expression::ValueLoader, type_info::TypeHandle,
    type_system::TypeLookup, unit_info::UnitInfo,
};

use gimli::RunTimeEndian;
use object::read::{Object, ObjectSection};

use std::{
    borrow,
    cell::{OnceCell, RefCell},
    path::Path,
    rc::Rc,
};

/// The fully qualified name of the opaque-handle pseudo type used by the
/// sandboxed environment. It carries no DWARF definition of its own, so
/// lookups for it synthesize a fixed-width unsigned integer stand-in that can
/// still be moved through the expression interpreter.
pub const EXTERNREF_TYPE_NAME: &str = "externref_t";

const EXTERNREF_BYTE_SIZE: u32 = 4;

/// Debug information which is parsed from DWARF debugging information.
pub struct DebugInfo {
    pub(crate) dwarf: gimli::Dwarf<EndianReader>,
    pub(crate) unit_infos: Vec<UnitInfo>,
    endianness: RunTimeEndian,

    /// The value loader of the expression evaluation currently in flight,
    /// installed and removed by [`crate::expression::ValueLoaderGuard`].
    pub(crate) value_loader: RefCell<Option<Rc<dyn ValueLoader>>>,
    /// The synthesized [`EXTERNREF_TYPE_NAME`] stand-in, cached for the
    /// lifetime of this symbol file.
    externref_type: OnceCell<TypeHandle>,
}

impl DebugInfo {
    /// Read debug info directly from a Wasm module or ELF file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<DebugInfo, DebugError> {
        let data = std::fs::read(path.as_ref())?;
        DebugInfo::from_raw(&data)
    }

    /// Parse debug information directly from a buffer containing a Wasm
    /// module or ELF file.
    pub fn from_raw(data: &[u8]) -> Result<Self, DebugError> {
        let object = object::File::parse(data)?;

        let endianness = if object.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        // Load a section and return as `Cow<[u8]>`.
        let load_section = |id: gimli::SectionId| -> Result<EndianReader, gimli::Error> {
            let data = object
                .section_by_name(id.name())
                .and_then(|section| section.uncompressed_data().ok())
                .unwrap_or_else(|| borrow::Cow::Borrowed(&[][..]));

            Ok(EndianReader::new(Rc::from(&*data), endianness))
        };

        let dwarf = gimli::Dwarf::load(&load_section)?;

        Self::from_dwarf(dwarf, endianness)
    }

    /// Build from already loaded DWARF sections.
    pub(crate) fn from_dwarf(
        dwarf: gimli::Dwarf<EndianReader>,
        endianness: RunTimeEndian,
    ) -> Result<Self, DebugError> {
        let mut unit_infos = Vec::new();

        let mut iter = dwarf.units();

        while let Ok(Some(header)) = iter.next() {
            if let Ok(unit) = dwarf.unit(header) {
                unit_infos.push(UnitInfo::new(unit));
            }
        }

        Ok(DebugInfo {
            dwarf,
            unit_infos,
            endianness,
            value_loader: RefCell::new(None),
            externref_type: OnceCell::new(),
        })
    }

    /// The compilation units of this module.
    pub fn unit_infos(&self) -> &[UnitInfo] {
        &self.unit_infos
    }

    /// Byte order of the parsed module.
    pub fn endianness(&self) -> RunTimeEndian {
        self.endianness
    }

    /// Look up a type by its fully qualified name.
    ///
    /// The single well-known name [`EXTERNREF_TYPE_NAME`] is synthesized once
    /// as a 4-byte unsigned integer and reused for the lifetime of this
    /// symbol file; every other name delegates to the host's standard
    /// declaration-context based lookup.
    pub fn find_type_by_name(
        &self,
        qualified_name: &str,
        host: &mut dyn TypeLookup,
    ) -> Option<TypeHandle> {
        if qualified_name == EXTERNREF_TYPE_NAME {
            return Some(*self.externref_type.get_or_init(|| {
                host.synthesize_unsigned_type(EXTERNREF_TYPE_NAME, EXTERNREF_BYTE_SIZE)
            }));
        }

        host.find_type_by_name(qualified_name)
    }
}
