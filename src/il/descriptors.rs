/// Utility trait for rendering types the way they are written in IL assembly listings
///
/// The rendered form is also what local variables are looked up by (see
/// [`crate::il::code::LocalSelector::OfType`]).
pub trait RenderType {
    /// Turn the type into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the type to a string
    fn render_to(&self, write_to: &mut String);
}

/// Built-in value types
///
/// `String` and `Object` are reference types, but they have dedicated encodings in the IL (and
/// dedicated literal-loading instructions, in the case of strings), so they are listed here.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Boolean,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    IntPtr,
    String,
    Object,
}

impl BaseType {
    /// Is this an integral or floating point type?
    pub fn is_numeric(&self) -> bool {
        !matches!(self, BaseType::Boolean | BaseType::String | BaseType::Object)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, BaseType::String | BaseType::Object)
    }
}

impl RenderType for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let keyword = match self {
            BaseType::Boolean => "bool",
            BaseType::Char => "char",
            BaseType::Int8 => "int8",
            BaseType::UInt8 => "uint8",
            BaseType::Int16 => "int16",
            BaseType::UInt16 => "uint16",
            BaseType::Int32 => "int32",
            BaseType::UInt32 => "uint32",
            BaseType::Int64 => "int64",
            BaseType::UInt64 => "uint64",
            BaseType::Float32 => "float32",
            BaseType::Float64 => "float64",
            BaseType::IntPtr => "native int",
            BaseType::String => "string",
            BaseType::Object => "object",
        };
        write_to.push_str(keyword);
    }
}

/// Generic array type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    pub fn map<T2>(&self, map_element: impl FnOnce(&T) -> T2) -> ArrayType<T2> {
        ArrayType {
            additional_dimensions: self.additional_dimensions,
            element_type: map_element(&self.element_type),
        }
    }

    /// Total number of dimensions in the array type
    ///
    /// This is always just `additional_dimensions + 1`
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }
}

impl<T: RenderType> RenderType for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        self.element_type.render_to(write_to);
        for _ in 0..self.dimensions() {
            write_to.push_str("[]");
        }
    }
}

/// Type of a parameter, local variable, field, or stack value
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueType<Class> {
    Base(BaseType),
    Class(Class),
    PrimitiveArray(ArrayType<BaseType>),
    ClassArray(ArrayType<Class>),
}

impl<C> ValueType<C> {
    pub fn map<C2>(&self, map_class: impl FnOnce(&C) -> C2) -> ValueType<C2> {
        match self {
            ValueType::Base(base) => ValueType::Base(*base),
            ValueType::Class(cls) => ValueType::Class(map_class(cls)),
            ValueType::PrimitiveArray(arr) => ValueType::PrimitiveArray(*arr),
            ValueType::ClassArray(arr) => ValueType::ClassArray(arr.map(map_class)),
        }
    }

    /// Array whose elements have the given type
    pub fn array(element: ValueType<C>) -> ValueType<C> {
        match element {
            ValueType::Base(element_type) => ValueType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            ValueType::Class(element_type) => ValueType::ClassArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            ValueType::PrimitiveArray(arr) => ValueType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            ValueType::ClassArray(arr) => ValueType::ClassArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
        }
    }

    pub fn is_reference(&self) -> bool {
        match self {
            ValueType::Base(base) => base.is_reference(),
            ValueType::Class(_) | ValueType::PrimitiveArray(_) | ValueType::ClassArray(_) => true,
        }
    }

    pub const fn class(class: C) -> ValueType<C> {
        ValueType::Class(class)
    }

    pub const fn boolean() -> ValueType<C> {
        ValueType::Base(BaseType::Boolean)
    }

    pub const fn int32() -> ValueType<C> {
        ValueType::Base(BaseType::Int32)
    }

    pub const fn int64() -> ValueType<C> {
        ValueType::Base(BaseType::Int64)
    }

    pub const fn float32() -> ValueType<C> {
        ValueType::Base(BaseType::Float32)
    }

    pub const fn float64() -> ValueType<C> {
        ValueType::Base(BaseType::Float64)
    }

    pub const fn string() -> ValueType<C> {
        ValueType::Base(BaseType::String)
    }

    pub const fn object() -> ValueType<C> {
        ValueType::Base(BaseType::Object)
    }
}

impl<C: RenderType> RenderType for ValueType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            ValueType::Base(base) => base.render_to(write_to),
            ValueType::Class(cls) => cls.render_to(write_to),
            ValueType::PrimitiveArray(arr) => arr.render_to(write_to),
            ValueType::ClassArray(arr) => arr.render_to(write_to),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodSignature<Class> {
    pub parameters: Vec<ValueType<Class>>,
    pub return_type: Option<ValueType<Class>>, // `None` is for `void` (ie. no return)
}

impl<C> MethodSignature<C> {
    /// Number of stack values a call consumes
    ///
    /// Every parameter takes exactly one stack slot; instance calls also consume the receiver.
    pub fn stack_consumption(&self, has_this_param: bool) -> usize {
        self.parameters.len() + usize::from(has_this_param)
    }

    /// Check whether `prefix` matches the first parameters of this signature
    ///
    /// Extra trailing parameters are accepted, so that a lookup written against an older version
    /// of a method keeps working after parameters are appended upstream.
    pub fn parameters_start_with(&self, prefix: &[ValueType<C>]) -> bool
    where
        C: PartialEq,
    {
        self.parameters.len() >= prefix.len()
            && self.parameters.iter().zip(prefix).all(|(p1, p2)| p1 == p2)
    }
}

impl<C: RenderType> RenderType for MethodSignature<C> {
    fn render_to(&self, write_to: &mut String) {
        match &self.return_type {
            None => write_to.push_str("void"),
            Some(typ) => typ.render_to(write_to),
        };
        write_to.push('(');
        for (idx, parameter) in self.parameters.iter().enumerate() {
            if idx > 0 {
                write_to.push_str(", ");
            }
            parameter.render_to(write_to);
        }
        write_to.push(')');
    }
}

/// Type names are rendered as-is
impl RenderType for super::TypeName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push_str(self.as_ref());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::il::{Name, TypeName};

    #[test]
    fn render_value_types() {
        let player = TypeName::from_str("Game.Player").unwrap();
        assert_eq!(ValueType::<TypeName>::int32().render(), "int32");
        assert_eq!(ValueType::class(player.clone()).render(), "Game.Player");
        assert_eq!(
            ValueType::array(ValueType::array(ValueType::<TypeName>::float32())).render(),
            "float32[][]"
        );
        assert_eq!(
            ValueType::array(ValueType::class(player)).render(),
            "Game.Player[]"
        );
    }

    #[test]
    fn render_signature() {
        let signature: MethodSignature<TypeName> = MethodSignature {
            parameters: vec![ValueType::int32(), ValueType::string()],
            return_type: None,
        };
        assert_eq!(signature.render(), "void(int32, string)");
        assert_eq!(signature.stack_consumption(false), 2);
        assert_eq!(signature.stack_consumption(true), 3);
    }

    #[test]
    fn parameter_prefixes() {
        let signature: MethodSignature<TypeName> = MethodSignature {
            parameters: vec![ValueType::int32(), ValueType::string(), ValueType::boolean()],
            return_type: Some(ValueType::int32()),
        };
        assert!(signature.parameters_start_with(&[]));
        assert!(signature.parameters_start_with(&[ValueType::int32()]));
        assert!(signature.parameters_start_with(&[ValueType::int32(), ValueType::string()]));
        assert!(!signature.parameters_start_with(&[ValueType::string()]));

        let too_long = vec![ValueType::int32(); 4];
        assert!(!signature.parameters_start_with(&too_long));
    }
}
