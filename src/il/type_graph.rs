use super::{
    FieldAttributes, MemberName, MethodAttributes, MethodSignature, Name, RenderType,
    TypeAttributes, TypeName, ValueType,
};
use crate::il::code::Opcode;
use crate::util::RefId;
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

/// Handle to a type in a [`TypeGraph`]
pub type TypeId<'g> = RefId<'g, TypeData<'g>>;

/// Handle to a method in a [`TypeGraph`]
pub type MethodId<'g> = RefId<'g, MethodData<'g>>;

/// Handle to a field in a [`TypeGraph`]
pub type FieldId<'g> = RefId<'g, FieldData<'g>>;

pub struct TypeGraphArenas<'g> {
    type_arena: Arena<TypeData<'g>>,
    method_arena: Arena<MethodData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> TypeGraphArenas<'g> {
    pub fn new() -> Self {
        TypeGraphArenas {
            type_arena: Arena::new(),
            method_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for TypeGraphArenas<'g> {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the types whose members are referenced by the instructions being edited
///
/// Symbolic resolution (finding the member a compiled method actually refers to) happens in the
/// patch host. The graph is where the host puts the result: operands refer to methods, fields,
/// and types through the handles returned here, and equality between handles is identity.
pub struct TypeGraph<'g> {
    arenas: &'g TypeGraphArenas<'g>,
    types: FrozenMap<&'g TypeName, TypeId<'g>>,
}

impl<'g> TypeGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g TypeGraphArenas<'g>) -> Self {
        TypeGraph {
            arenas,
            types: FrozenMap::new(),
        }
    }

    pub fn lookup_type(&'g self, name: &TypeName) -> Option<TypeId<'g>> {
        self.types.get(name).map(RefId)
    }

    /// Add a new type to the graph
    pub fn add_type(&self, data: TypeData<'g>) -> TypeId<'g> {
        let data = &*self.arenas.type_arena.alloc(data);
        self.types.insert(&data.name, RefId(data));
        RefId(data)
    }

    /// Add a field to the graph and to its declaring type
    pub fn add_field(&self, field: FieldData<'g>) -> FieldId<'g> {
        let data = RefId(&*self.arenas.field_arena.alloc(field));
        data.declaring_type.0.fields.push(data);
        data
    }

    /// Add a method to the graph and to its declaring type
    ///
    /// If the declaring type already has a method with the same name, signature, generic
    /// arguments, and staticness, that method is returned instead.
    pub fn add_method(&self, method: MethodData<'g>) -> MethodId<'g> {
        if let Some(existing) = method.declaring_type.methods().find(|m| {
            m.name == method.name
                && m.signature == method.signature
                && m.generic_arguments == method.generic_arguments
                && m.is_static() == method.is_static()
        }) {
            existing
        } else {
            let data = RefId(&*self.arenas.method_arena.alloc(method));
            data.declaring_type.0.methods.push(data);
            data
        }
    }
}

pub struct TypeData<'g> {
    /// Name of the type
    pub name: TypeName,

    /// Base type is missing for `System.Object` and interfaces
    pub base_type: Option<TypeId<'g>>,

    pub attributes: TypeAttributes,

    /// Methods
    pub methods: FrozenVec<MethodId<'g>>,

    /// Fields
    pub fields: FrozenVec<FieldId<'g>>,
}

impl<'g> TypeData<'g> {
    pub fn new(
        name: TypeName,
        base_type: Option<TypeId<'g>>,
        attributes: TypeAttributes,
    ) -> TypeData<'g> {
        TypeData {
            name,
            base_type,
            attributes,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.attributes.contains(TypeAttributes::INTERFACE)
    }
}

impl<'g> RefId<'g, TypeData<'g>> {
    /// Methods declared directly on this type
    pub fn methods(self) -> impl Iterator<Item = MethodId<'g>> {
        self.0.methods.iter().map(RefId)
    }

    /// Fields declared directly on this type
    pub fn fields(self) -> impl Iterator<Item = FieldId<'g>> {
        self.0.fields.iter().map(RefId)
    }

    /// Find a field declared on this type or one of its base types
    pub fn field(self, name: &MemberName) -> Option<FieldId<'g>> {
        let mut next_type = Some(self);
        while let Some(typ) = next_type {
            if let Some(field) = typ.fields().find(|f| &f.name == name) {
                return Some(field);
            }
            next_type = typ.base_type;
        }
        None
    }

    /// Methods with the given name declared directly on this type
    pub fn methods_named<'a>(self, name: &'a MemberName) -> impl Iterator<Item = MethodId<'g>> + 'a
    where
        'g: 'a,
    {
        self.methods().filter(move |m| &m.name == name)
    }
}

impl<'g> PartialEq for TypeData<'g> {
    fn eq(&self, other: &TypeData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for TypeData<'g> {}

impl<'g> RenderType for TypeData<'g> {
    fn render_to(&self, write_to: &mut String) {
        self.name.render_to(write_to)
    }
}

impl<'g> RenderType for RefId<'g, TypeData<'g>> {
    fn render_to(&self, write_to: &mut String) {
        self.0.render_to(write_to)
    }
}

impl<'g> Debug for TypeData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

#[derive(PartialEq, Eq)]
pub struct MethodData<'g> {
    /// Declaring type
    pub declaring_type: TypeId<'g>,

    /// Name of the method
    pub name: MemberName,

    /// Type of the method
    pub signature: MethodSignature<TypeId<'g>>,

    /// Type arguments of a generic method instantiation (empty if not generic)
    pub generic_arguments: Vec<ValueType<TypeId<'g>>>,

    pub attributes: MethodAttributes,
}

impl<'g> MethodData<'g> {
    pub fn new(
        declaring_type: TypeId<'g>,
        name: MemberName,
        signature: MethodSignature<TypeId<'g>>,
        attributes: MethodAttributes,
    ) -> MethodData<'g> {
        MethodData {
            declaring_type,
            name,
            signature,
            generic_arguments: vec![],
            attributes,
        }
    }

    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// Number of stack values a call to this method consumes (including the receiver)
    pub fn stack_consumption(&self) -> usize {
        self.signature.stack_consumption(!self.is_static())
    }

    /// Static and non-virtual methods are called directly, everything else goes through virtual
    /// dispatch. This function picks the opcode accordingly.
    pub fn infer_call_opcode(&self) -> Opcode {
        if self.is_static() {
            Opcode::Call
        } else if self.attributes.contains(MethodAttributes::VIRTUAL)
            || self.declaring_type.is_interface()
        {
            Opcode::Callvirt
        } else {
            Opcode::Call
        }
    }
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}::{}:{}",
            self.declaring_type.name.as_str(),
            self.name.as_str(),
            self.signature.render(),
        ))
    }
}

#[derive(PartialEq, Eq)]
pub struct FieldData<'g> {
    /// Declaring type
    ///
    /// Note: this is a pointer back to the type (so don't derive `Debug`)
    pub declaring_type: TypeId<'g>,

    /// Name of the field
    pub name: MemberName,

    /// Type of the field
    pub field_type: ValueType<TypeId<'g>>,

    pub attributes: FieldAttributes,
}

impl<'g> FieldData<'g> {
    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}::{}:{}",
            self.declaring_type.name.as_str(),
            self.name.as_str(),
            self.field_type.render(),
        ))
    }
}
