use bitflags::bitflags;

bitflags! {
    /// Attributes on types
    ///
    /// A "static class" is encoded as a type that is both `ABSTRACT` and `SEALED`.
    pub struct TypeAttributes: u32 {
        const PUBLIC = 0x0000_0001;
        const INTERFACE = 0x0000_0020;
        const ABSTRACT = 0x0000_0080;
        const SEALED = 0x0000_0100;
        const VALUE_TYPE = 0x0000_0200;
    }
}

bitflags! {
    /// Attributes on methods
    pub struct MethodAttributes: u16 {
        const PRIVATE = 0x0001;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const FINAL = 0x0020;
        const VIRTUAL = 0x0040;
        const ABSTRACT = 0x0400;
        const SPECIAL_NAME = 0x0800;
    }
}

bitflags! {
    /// Attributes on fields
    pub struct FieldAttributes: u16 {
        const PRIVATE = 0x0001;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const INIT_ONLY = 0x0020;
        const LITERAL = 0x0040;
    }
}

impl TypeAttributes {
    /// Types that can never have instances (`abstract sealed`)
    pub fn is_static_class(&self) -> bool {
        self.contains(TypeAttributes::ABSTRACT | TypeAttributes::SEALED)
    }
}
