use crate::{
    DebugError, Die, debug_info::DebugInfo, extract_name, extract_reference, extract_unsigned,
    type_info::{MemberInfo, TemplateParameterInfo, TypeHandle, VariantInfo, VariantPartInfo},
    type_system::TypeResolver,
    unit_info::UnitInfo,
};

use gimli::UnitOffset;

/// Invoke `visit` for every direct child of the DIE at `offset` whose tag
/// matches `tag`.
///
/// Children with other tags, and everything below the immediate-child level,
/// are skipped; variant structure is always one level deep per construct.
/// Every call drives a fresh cursor, so the walk can be restarted at will.
pub(crate) fn for_each_child<V>(
    unit_info: &UnitInfo,
    offset: UnitOffset,
    tag: gimli::DwTag,
    mut visit: V,
) -> Result<(), DebugError>
where
    V: FnMut(&Die<'_, '_>) -> Result<(), DebugError>,
{
    let mut tree = unit_info.unit.entries_tree(Some(offset))?;
    let root = tree.root()?;
    let mut children = root.children();
    while let Some(child) = children.next()? {
        if child.entry().tag() == tag {
            visit(child.entry())?;
        }
    }
    Ok(())
}

/// Resolve the `DW_AT_type` reference of `entry` through the host's type
/// resolution machinery.
pub(crate) fn resolve_type_reference(
    entry: &Die<'_, '_>,
    resolver: &mut dyn TypeResolver,
) -> Option<TypeHandle> {
    let offset = entry.offset();

    let Some(type_offset) = extract_reference(entry, gimli::DW_AT_type) else {
        tracing::warn!(
            "DW_AT_type reference is missing or not valid for {:#010x}, ignoring entry.",
            offset.0
        );
        return None;
    };

    let Some(ty) = resolver.resolve_type(type_offset) else {
        tracing::warn!(
            "DW_AT_type reference could not be resolved to a type for {:#010x}, ignoring entry.",
            offset.0
        );
        return None;
    };

    Some(ty)
}

/// Extract one `DW_TAG_member` DIE into a [`MemberInfo`].
///
/// The member location must be an unsigned value that fits in 32 bits and the
/// type reference must resolve through the host; otherwise the entry is
/// logged and skipped.
pub(crate) fn extract_member(
    debug_info: &DebugInfo,
    unit_info: &UnitInfo,
    entry: &Die<'_, '_>,
    resolver: &mut dyn TypeResolver,
) -> Option<MemberInfo> {
    let offset = entry.offset();

    let Some(location) = extract_unsigned(entry, gimli::DW_AT_data_member_location) else {
        tracing::warn!(
            "DW_AT_data_member_location is missing for {:#010x}, ignoring entry.",
            offset.0
        );
        return None;
    };
    let Ok(location) = u32::try_from(location) else {
        tracing::warn!(
            "DW_AT_data_member_location > u32::MAX for {:#010x}, ignoring entry.",
            offset.0
        );
        return None;
    };

    let ty = resolve_type_reference(entry, resolver)?;
    let name = extract_name(debug_info, &unit_info.unit, entry).unwrap_or_default();

    Some(MemberInfo { name, location, ty })
}

/// Extract one `DW_TAG_variant` DIE, collecting its member children.
///
/// A variant that ends up without a single valid member is discarded whole;
/// partial variants are never retained.
pub(crate) fn extract_variant(
    debug_info: &DebugInfo,
    unit_info: &UnitInfo,
    entry: &Die<'_, '_>,
    resolver: &mut dyn TypeResolver,
) -> Option<VariantInfo> {
    let offset = entry.offset();

    let discriminant = extract_unsigned(entry, gimli::DW_AT_discr_value);

    let mut members = Vec::new();
    let walk = for_each_child(unit_info, offset, gimli::DW_TAG_member, |member_entry| {
        if let Some(member) = extract_member(debug_info, unit_info, member_entry, resolver) {
            members.push(member);
        }
        Ok(())
    });
    if let Err(error) = walk {
        tracing::warn!(
            "Failed to walk DW_TAG_member children of {:#010x}: {error:?}, ignoring entry.",
            offset.0
        );
        return None;
    }

    if members.is_empty() {
        tracing::warn!(
            "Missing or only non valid DW_TAG_member children for {:#010x}, ignoring entry.",
            offset.0
        );
        return None;
    }

    Some(VariantInfo {
        discriminant,
        members,
    })
}

/// Extract one `DW_TAG_variant_part` DIE: the discriminant member referenced
/// by `DW_AT_discr` plus all valid variant children.
///
/// A variant part without a valid discriminant member, or without a single
/// valid variant, is discarded whole.
pub(crate) fn extract_variant_part(
    debug_info: &DebugInfo,
    unit_info: &UnitInfo,
    entry: &Die<'_, '_>,
    resolver: &mut dyn TypeResolver,
) -> Option<VariantPartInfo> {
    let offset = entry.offset();

    let Some(discr_offset) = extract_reference(entry, gimli::DW_AT_discr) else {
        tracing::warn!(
            "DW_AT_discr is missing or not valid for {:#010x}, ignoring entry.",
            offset.0
        );
        return None;
    };
    let discr_entry = match unit_info.entry(discr_offset) {
        Ok(entry) => entry,
        Err(error) => {
            tracing::warn!(
                "DW_AT_discr does not reference a valid DIE for {:#010x}: {error:?}, ignoring entry.",
                offset.0
            );
            return None;
        }
    };
    let discriminant_member = extract_member(debug_info, unit_info, &discr_entry, resolver)?;

    let mut variants = Vec::new();
    let walk = for_each_child(unit_info, offset, gimli::DW_TAG_variant, |variant_entry| {
        if let Some(variant) = extract_variant(debug_info, unit_info, variant_entry, resolver) {
            variants.push(variant);
        }
        Ok(())
    });
    if let Err(error) = walk {
        tracing::warn!(
            "Failed to walk DW_TAG_variant children of {:#010x}: {error:?}, ignoring entry.",
            offset.0
        );
        return None;
    }

    if variants.is_empty() {
        tracing::warn!(
            "Missing or only non valid DW_TAG_variant children for {:#010x}, ignoring entry.",
            offset.0
        );
        return None;
    }

    Some(VariantPartInfo {
        discriminant_member,
        variants,
    })
}

/// Extract one `DW_TAG_template_type_parameter` DIE.
pub(crate) fn extract_template_parameter(
    debug_info: &DebugInfo,
    unit_info: &UnitInfo,
    entry: &Die<'_, '_>,
    resolver: &mut dyn TypeResolver,
) -> Option<TemplateParameterInfo> {
    let ty = resolve_type_reference(entry, resolver)?;
    let name = extract_name(debug_info, &unit_info.unit, entry);

    Some(TemplateParameterInfo { ty, name })
}

/// Determine the byte size of a record-like DIE.
///
/// Prefers an explicit `DW_AT_byte_size`; otherwise a `DW_AT_bit_size` is
/// rounded up to whole bytes. Applies only to structure, union, class and
/// variant part entries, and rejects sizes that do not fit in 32 bits.
pub(crate) fn record_byte_size(entry: &Die<'_, '_>) -> Option<u32> {
    match entry.tag() {
        gimli::DW_TAG_variant_part
        | gimli::DW_TAG_structure_type
        | gimli::DW_TAG_union_type
        | gimli::DW_TAG_class_type => {}
        _ => return None,
    }

    let byte_size = extract_unsigned(entry, gimli::DW_AT_byte_size)
        .or_else(|| extract_unsigned(entry, gimli::DW_AT_bit_size).map(|bits| bits.div_ceil(8)));

    match byte_size {
        Some(byte_size) if byte_size > u64::from(u32::MAX) => {
            tracing::warn!(
                "Byte size of {:#010x} exceeds u32::MAX, ignoring entry.",
                entry.offset().0
            );
            None
        }
        Some(byte_size) => Some(byte_size as u32),
        None => None,
    }
}

/// Walk every `DW_TAG_variant_part` → `DW_TAG_variant` → `DW_TAG_member`
/// descendant of the DIE at `offset` and report each member's type DIE to
/// `link`.
///
/// The host's layout algorithm does not visit variant arms on its own, so
/// their payload types must be linked into the declaration context before
/// the host's completion runs.
pub(crate) fn link_variant_member_types(
    unit_info: &UnitInfo,
    offset: UnitOffset,
    link: &mut dyn FnMut(UnitOffset),
) -> Result<(), DebugError> {
    for_each_child(unit_info, offset, gimli::DW_TAG_variant_part, |variant_part| {
        for_each_child(
            unit_info,
            variant_part.offset(),
            gimli::DW_TAG_variant,
            |variant| {
                for_each_child(unit_info, variant.offset(), gimli::DW_TAG_member, |member| {
                    match extract_reference(member, gimli::DW_AT_type) {
                        Some(type_offset) => link(type_offset),
                        None => tracing::warn!(
                            "DW_AT_type is missing for {:#010x}, ignoring entry.",
                            member.offset().0
                        ),
                    }
                    Ok(())
                })
            },
        )
    })
}

#[cfg(test)]
mod test {
    use super::{
        extract_member, extract_variant_part, for_each_child, link_variant_member_types,
        record_byte_size,
    };
    use crate::test::{
        FixtureBuilder, MockHost, find_entry_with_name, find_entry_with_tag, sum_type_fixture,
    };

    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn variant_part_is_fully_recovered() {
        let debug_info = sum_type_fixture();
        let unit_info = &debug_info.unit_infos()[0];
        let mut host = MockHost::default();

        let offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_variant_part);
        let entry = unit_info.entry(offset).unwrap();

        let variant_part =
            extract_variant_part(&debug_info, unit_info, &entry, &mut host).unwrap();

        assert_eq!(variant_part.discriminant_member.name, "tag");
        assert_eq!(variant_part.discriminant_member.location, 0);
        assert_eq!(variant_part.variants.len(), 2);

        let discriminants: Vec<_> = variant_part
            .variants
            .iter()
            .map(|variant| variant.discriminant)
            .collect();
        assert_eq!(discriminants, vec![Some(0), Some(1)]);

        assert_eq!(variant_part.variants[0].members[0].name, "x");
        assert_eq!(variant_part.variants[0].members[0].location, 4);
        assert_eq!(variant_part.variants[1].members[0].name, "y");
        assert_eq!(variant_part.variants[1].members[0].location, 4);
    }

    #[test]
    fn invalid_variants_are_silently_excluded() {
        let mut fixture = FixtureBuilder::new(gimli::DW_LANG_Rust);
        let u32_type = fixture.add_base_type("u32", 4);

        let root = fixture.root();
        let outer = fixture.add(root, gimli::DW_TAG_structure_type);
        let variant_part = fixture.add(outer, gimli::DW_TAG_variant_part);

        let discr = fixture.add(variant_part, gimli::DW_TAG_member);
        fixture.set_udata(discr, gimli::DW_AT_data_member_location, 0);
        fixture.set_ref(discr, gimli::DW_AT_type, u32_type);
        fixture.set_ref(variant_part, gimli::DW_AT_discr, discr);

        // A valid variant.
        let variant_a = fixture.add(variant_part, gimli::DW_TAG_variant);
        fixture.set_udata(variant_a, gimli::DW_AT_discr_value, 0);
        let member_a = fixture.add(variant_a, gimli::DW_TAG_member);
        fixture.set_name(member_a, "a");
        fixture.set_udata(member_a, gimli::DW_AT_data_member_location, 4);
        fixture.set_ref(member_a, gimli::DW_AT_type, u32_type);

        // Its only member lacks a data member location, so the whole variant
        // must be discarded rather than retained without members.
        let variant_b = fixture.add(variant_part, gimli::DW_TAG_variant);
        fixture.set_udata(variant_b, gimli::DW_AT_discr_value, 1);
        let member_b = fixture.add(variant_b, gimli::DW_TAG_member);
        fixture.set_name(member_b, "b");
        fixture.set_ref(member_b, gimli::DW_AT_type, u32_type);

        let debug_info = fixture.build();
        let unit_info = &debug_info.unit_infos()[0];
        let mut host = MockHost::default();

        let offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_variant_part);
        let entry = unit_info.entry(offset).unwrap();

        let variant_part =
            extract_variant_part(&debug_info, unit_info, &entry, &mut host).unwrap();

        assert_eq!(variant_part.variants.len(), 1);
        assert_eq!(variant_part.variants[0].members[0].name, "a");
    }

    #[test]
    fn variant_part_without_discriminant_reference_is_discarded() {
        let mut fixture = FixtureBuilder::new(gimli::DW_LANG_Rust);
        let u32_type = fixture.add_base_type("u32", 4);

        let root = fixture.root();
        let outer = fixture.add(root, gimli::DW_TAG_structure_type);
        let variant_part = fixture.add(outer, gimli::DW_TAG_variant_part);

        let variant = fixture.add(variant_part, gimli::DW_TAG_variant);
        let member = fixture.add(variant, gimli::DW_TAG_member);
        fixture.set_udata(member, gimli::DW_AT_data_member_location, 4);
        fixture.set_ref(member, gimli::DW_AT_type, u32_type);

        let debug_info = fixture.build();
        let unit_info = &debug_info.unit_infos()[0];
        let mut host = MockHost::default();

        let offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_variant_part);
        let entry = unit_info.entry(offset).unwrap();

        assert_eq!(
            extract_variant_part(&debug_info, unit_info, &entry, &mut host),
            None
        );
    }

    #[test]
    fn unresolvable_member_types_cascade_into_whole_construct_discard() {
        let debug_info = sum_type_fixture();
        let unit_info = &debug_info.unit_infos()[0];

        // Refuse to resolve both payload types; each variant then has zero
        // valid members and the variant part has zero valid variants.
        let mut host = MockHost::default();
        host.unresolvable
            .insert(find_entry_with_name(&debug_info, "i32"));
        host.unresolvable
            .insert(find_entry_with_name(&debug_info, "f64"));

        let offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_variant_part);
        let entry = unit_info.entry(offset).unwrap();

        assert_eq!(
            extract_variant_part(&debug_info, unit_info, &entry, &mut host),
            None
        );
    }

    #[test]
    fn member_location_exceeding_u32_is_rejected() {
        let mut fixture = FixtureBuilder::new(gimli::DW_LANG_Rust);
        let u32_type = fixture.add_base_type("u32", 4);

        let root = fixture.root();
        let outer = fixture.add(root, gimli::DW_TAG_structure_type);
        let member = fixture.add(outer, gimli::DW_TAG_member);
        fixture.set_udata(
            member,
            gimli::DW_AT_data_member_location,
            u64::from(u32::MAX) + 1,
        );
        fixture.set_ref(member, gimli::DW_AT_type, u32_type);

        let debug_info = fixture.build();
        let unit_info = &debug_info.unit_infos()[0];
        let mut host = MockHost::default();

        let offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_member);
        let entry = unit_info.entry(offset).unwrap();

        assert_eq!(
            extract_member(&debug_info, unit_info, &entry, &mut host),
            None
        );
    }

    #[test]
    fn member_name_defaults_to_empty() {
        let mut fixture = FixtureBuilder::new(gimli::DW_LANG_Rust);
        let u32_type = fixture.add_base_type("u32", 4);

        let root = fixture.root();
        let outer = fixture.add(root, gimli::DW_TAG_structure_type);
        let member = fixture.add(outer, gimli::DW_TAG_member);
        fixture.set_udata(member, gimli::DW_AT_data_member_location, 8);
        fixture.set_ref(member, gimli::DW_AT_type, u32_type);

        let debug_info = fixture.build();
        let unit_info = &debug_info.unit_infos()[0];
        let mut host = MockHost::default();

        let offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_member);
        let entry = unit_info.entry(offset).unwrap();

        let member = extract_member(&debug_info, unit_info, &entry, &mut host).unwrap();
        assert_eq!(member.name, "");
        assert_eq!(member.location, 8);
    }

    #[test_case(8, 1; "exactly one byte")]
    #[test_case(9, 2; "partial bytes round up")]
    #[test_case(1, 1; "single bit")]
    #[test_case(64, 8; "whole word")]
    fn bit_sizes_are_rounded_up_to_bytes(bits: u64, expected: u32) {
        let mut fixture = FixtureBuilder::new(gimli::DW_LANG_Rust);
        let root = fixture.root();
        let record = fixture.add(root, gimli::DW_TAG_structure_type);
        fixture.set_udata(record, gimli::DW_AT_bit_size, bits);

        let debug_info = fixture.build();
        let unit_info = &debug_info.unit_infos()[0];

        let offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_structure_type);
        let entry = unit_info.entry(offset).unwrap();

        assert_eq!(record_byte_size(&entry), Some(expected));
    }

    #[test]
    fn byte_size_attribute_takes_precedence_over_bit_size() {
        let mut fixture = FixtureBuilder::new(gimli::DW_LANG_Rust);
        let root = fixture.root();
        let record = fixture.add(root, gimli::DW_TAG_union_type);
        fixture.set_udata(record, gimli::DW_AT_byte_size, 24);
        fixture.set_udata(record, gimli::DW_AT_bit_size, 9);

        let debug_info = fixture.build();
        let unit_info = &debug_info.unit_infos()[0];

        let offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_union_type);
        let entry = unit_info.entry(offset).unwrap();

        assert_eq!(record_byte_size(&entry), Some(24));
    }

    #[test]
    fn byte_size_is_rejected_for_non_record_tags_and_oversized_values() {
        let mut fixture = FixtureBuilder::new(gimli::DW_LANG_Rust);
        let base_type = fixture.add_base_type("u32", 4);
        fixture.set_udata(base_type, gimli::DW_AT_byte_size, 4);

        let root = fixture.root();
        let record = fixture.add(root, gimli::DW_TAG_structure_type);
        fixture.set_udata(record, gimli::DW_AT_byte_size, u64::from(u32::MAX) + 1);

        let debug_info = fixture.build();
        let unit_info = &debug_info.unit_infos()[0];

        let base_type_offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_base_type);
        let base_type_entry = unit_info.entry(base_type_offset).unwrap();
        assert_eq!(record_byte_size(&base_type_entry), None);

        let record_offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_structure_type);
        let record_entry = unit_info.entry(record_offset).unwrap();
        assert_eq!(record_byte_size(&record_entry), None);
    }

    #[test]
    fn walker_only_visits_matching_direct_children() {
        let mut fixture = FixtureBuilder::new(gimli::DW_LANG_Rust);
        let u32_type = fixture.add_base_type("u32", 4);

        let root = fixture.root();
        let outer = fixture.add(root, gimli::DW_TAG_structure_type);
        fixture.set_name(outer, "outer");
        let direct_member = fixture.add(outer, gimli::DW_TAG_member);
        fixture.set_name(direct_member, "direct");
        fixture.set_ref(direct_member, gimli::DW_AT_type, u32_type);

        // A nested record whose own member must not be visited.
        let inner = fixture.add(outer, gimli::DW_TAG_structure_type);
        fixture.set_name(inner, "inner");
        let nested_member = fixture.add(inner, gimli::DW_TAG_member);
        fixture.set_name(nested_member, "nested");
        fixture.set_ref(nested_member, gimli::DW_AT_type, u32_type);

        let debug_info = fixture.build();
        let unit_info = &debug_info.unit_infos()[0];
        let offset = find_entry_with_name(&debug_info, "outer");

        for _ in 0..2 {
            // Restartable: the second pass sees the same children again.
            let mut visited = Vec::new();
            for_each_child(unit_info, offset, gimli::DW_TAG_member, |entry| {
                visited.push(crate::extract_name(&debug_info, &unit_info.unit, entry));
                Ok(())
            })
            .unwrap();

            assert_eq!(visited, vec![Some("direct".to_string())]);
        }
    }

    #[test]
    fn variant_member_types_are_reported_for_linking() {
        let debug_info = sum_type_fixture();
        let unit_info = &debug_info.unit_infos()[0];

        let offset = find_entry_with_tag(&debug_info, gimli::DW_TAG_structure_type);

        let mut linked = Vec::new();
        link_variant_member_types(unit_info, offset, &mut |type_offset| {
            linked.push(type_offset);
        })
        .unwrap();

        assert_eq!(
            linked,
            vec![
                find_entry_with_name(&debug_info, "i32"),
                find_entry_with_name(&debug_info, "f64"),
            ]
        );
    }
}
