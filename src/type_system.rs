use crate::{
    debug_info::DebugInfo,
    extraction,
    type_info::{ExtendedTypeInfo, TypeHandle},
    unit_info::UnitInfo,
};

use gimli::UnitOffset;

use std::collections::BTreeMap;

/// Resolves DIE type references to types known to the host.
pub trait TypeResolver {
    /// Resolve the type DIE at `offset` to the host's handle for that type.
    ///
    /// Returns `None` when the DIE does not describe a type the host knows.
    fn resolve_type(&mut self, offset: UnitOffset) -> Option<TypeHandle>;
}

/// The host's own "complete this type from debug info" step, plus the
/// declaration-context linkage its layout algorithm reads.
pub trait TypeCompletion {
    /// Run the host's standard completion for the type at `offset`.
    ///
    /// Returns `false` when the host fails to complete the type.
    fn complete_type(&mut self, offset: UnitOffset, ty: TypeHandle) -> bool;

    /// Make the type DIE at `member_type_offset` visible to the layout
    /// algorithm of the record currently being completed.
    fn link_member_type(&mut self, record: TypeHandle, member_type_offset: UnitOffset);
}

/// The host's generic bit-size computation.
pub trait BitSizeProvider {
    /// Compute the bit size of `ty` the way the host normally would.
    fn bit_size(&self, ty: TypeHandle) -> Option<u64>;
}

/// Name-based type lookup in the host's declaration contexts.
pub trait TypeLookup {
    /// Find a type by its fully qualified name.
    fn find_type_by_name(&mut self, qualified_name: &str) -> Option<TypeHandle>;

    /// Create an unsigned integer type of `byte_size` bytes under `name`.
    fn synthesize_unsigned_type(&mut self, name: &str, byte_size: u32) -> TypeHandle;
}

/// The languages whose sum types are recovered into extended type info.
pub(crate) fn language_has_extended_type_info(language: gimli::DwLang) -> bool {
    matches!(language, gimli::DW_LANG_Rust)
}

/// The extension over the host's type system.
///
/// Owns the extended type info recovered during type completion, keyed by the
/// host's opaque type identities. Entries are created on first demand and
/// kept for the lifetime of this instance; there is no eviction.
#[derive(Default)]
pub struct ExtendedTypeSystem {
    type_info: BTreeMap<TypeHandle, ExtendedTypeInfo>,
}

impl ExtendedTypeSystem {
    /// Create an extension with an empty type info store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only access to the recovered info for `ty`, if any.
    pub fn get(&self, ty: TypeHandle) -> Option<&ExtendedTypeInfo> {
        self.type_info.get(&ty)
    }

    /// Fetch the record for `ty`, creating an empty one on first use.
    pub fn get_or_create(&mut self, ty: TypeHandle) -> &mut ExtendedTypeInfo {
        self.type_info.entry(ty).or_default()
    }

    /// Complete the type at `offset` from its debug info.
    ///
    /// Wraps the host's standard completion in two extra phases for
    /// supported languages:
    ///
    /// 1. link every variant payload type into the host's declaration
    ///    context, so the host's layout algorithm can see and size fields
    ///    that live only inside variant arms;
    /// 2. delegate to the host's completion, propagating its failure;
    /// 3. recover variant parts, template parameters and the record size
    ///    from the entry's children into the type info store.
    ///
    /// Returns whether the host reported successful completion. Extraction
    /// problems never fail completion; they only reduce the recovered info.
    pub fn complete_type_from_dwarf<H>(
        &mut self,
        debug_info: &DebugInfo,
        unit_info: &UnitInfo,
        offset: UnitOffset,
        ty: TypeHandle,
        host: &mut H,
    ) -> bool
    where
        H: TypeResolver + TypeCompletion,
    {
        let language = unit_info.language();
        let supported = language_has_extended_type_info(language);

        if supported {
            let link_result =
                extraction::link_variant_member_types(unit_info, offset, &mut |member_type| {
                    host.link_member_type(ty, member_type)
                });
            if let Err(error) = link_result {
                tracing::warn!(
                    "Failed to link variant member types for {:#010x}: {error:?}",
                    offset.0
                );
            }
        }

        if !host.complete_type(offset, ty) {
            return false;
        }

        if supported {
            let mut info = ExtendedTypeInfo::new(language);

            let variant_parts = extraction::for_each_child(
                unit_info,
                offset,
                gimli::DW_TAG_variant_part,
                |variant_part_entry| {
                    if let Some(variant_part) = extraction::extract_variant_part(
                        debug_info,
                        unit_info,
                        variant_part_entry,
                        host,
                    ) {
                        info.variant_parts.push(variant_part);
                    }
                    Ok(())
                },
            );
            if let Err(error) = variant_parts {
                tracing::warn!(
                    "Failed to recover variant parts for {:#010x}: {error:?}",
                    offset.0
                );
            }

            let template_parameters = extraction::for_each_child(
                unit_info,
                offset,
                gimli::DW_TAG_template_type_parameter,
                |parameter_entry| {
                    if let Some(parameter) = extraction::extract_template_parameter(
                        debug_info,
                        unit_info,
                        parameter_entry,
                        host,
                    ) {
                        info.template_parameters.push(parameter);
                    }
                    Ok(())
                },
            );
            if let Err(error) = template_parameters {
                tracing::warn!(
                    "Failed to recover template parameters for {:#010x}: {error:?}",
                    offset.0
                );
            }

            match unit_info.entry(offset) {
                Ok(entry) => info.byte_size = extraction::record_byte_size(&entry),
                Err(error) => tracing::warn!(
                    "Failed to determine the byte size of {:#010x}: {error:?}",
                    offset.0
                ),
            }

            // Rebuilt from scratch and overwritten, so a host that re-invokes
            // completion for the same type identity does not duplicate the
            // recovered structure.
            *self.get_or_create(ty) = info;
        }

        true
    }

    /// Answer a bit-size query for `ty`.
    ///
    /// A byte size recovered from the debug info takes precedence over the
    /// host's generic computation, which cannot see variant payloads.
    pub fn bit_size<H>(&self, ty: TypeHandle, host: &H) -> Option<u64>
    where
        H: BitSizeProvider,
    {
        if let Some(byte_size) = self.get(ty).and_then(|info| info.byte_size) {
            return Some(u64::from(byte_size) * 8);
        }

        host.bit_size(ty)
    }
}
