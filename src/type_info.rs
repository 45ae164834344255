use serde::{Serialize, Serializer};

/// Opaque identity of a type within the host type system.
///
/// Handles are assigned by the host and only compared, hashed and stored
/// here; the type graph they index remains owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TypeHandle(u64);

impl TypeHandle {
    /// Wrap a host-assigned raw type identity.
    pub fn new(raw: u64) -> Self {
        TypeHandle(raw)
    }

    /// The raw identity value assigned by the host.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// One field of a variant, or the discriminant field of a variant part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    /// Field name; empty when the member is unnamed.
    pub name: String,
    /// Byte offset of the field within the containing record.
    pub location: u32,
    /// The field's type, resolved through the host.
    pub ty: TypeHandle,
}

/// One alternative payload layout of a sum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantInfo {
    /// The discriminant value that selects this variant, if it has one.
    pub discriminant: Option<u64>,
    /// The payload fields. Never empty; a variant without valid members is
    /// discarded during extraction.
    pub members: Vec<MemberInfo>,
}

/// The discriminant plus all alternative payload layouts of a sum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantPartInfo {
    /// The member whose runtime value selects the active variant.
    pub discriminant_member: MemberInfo,
    /// The alternative layouts. Never empty; a variant part without valid
    /// variants is discarded during extraction.
    pub variants: Vec<VariantInfo>,
}

/// A generic type parameter of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateParameterInfo {
    /// The type the parameter was instantiated with.
    pub ty: TypeHandle,
    /// The parameter name, when the producer emitted one.
    pub name: Option<String>,
}

/// Everything recovered about a type beyond what the host tracks itself.
///
/// One record exists per opaque type identity, created while the type is
/// completed and kept for the lifetime of the owning type system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedTypeInfo {
    /// Source language of the compilation unit the type came from.
    #[serde(serialize_with = "serialize_language")]
    pub language: gimli::DwLang,
    /// The sum-type structure of the record, in declaration order.
    pub variant_parts: Vec<VariantPartInfo>,
    /// The record's generic parameters, in declaration order.
    pub template_parameters: Vec<TemplateParameterInfo>,
    /// Size of the record, from `DW_AT_byte_size` or a rounded-up
    /// `DW_AT_bit_size`.
    pub byte_size: Option<u32>,
}

impl ExtendedTypeInfo {
    pub(crate) fn new(language: gimli::DwLang) -> Self {
        ExtendedTypeInfo {
            language,
            variant_parts: Vec::new(),
            template_parameters: Vec::new(),
            byte_size: None,
        }
    }
}

impl Default for ExtendedTypeInfo {
    fn default() -> Self {
        ExtendedTypeInfo::new(gimli::DwLang(0))
    }
}

fn serialize_language<S>(language: &gimli::DwLang, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u16(language.0)
}
