use super::{AccessMode, CodeCursor, CodeCursorExts, Operand};
use crate::il::{Error, MemberName, MethodId, RenderType, TypeId, ValueType};

/// Declared local variable of the method being edited
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LocalVariable<'g> {
    pub index: u16,
    pub local_type: ValueType<TypeId<'g>>,
}

/// Metadata about the method whose body is being edited
#[derive(Clone, Debug)]
pub struct MethodContext<'g> {
    pub method: MethodId<'g>,
    pub locals: Vec<LocalVariable<'g>>,
}

/// How to pick a local variable
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LocalSelector {
    Index(u16),

    /// Rendered type of the local (eg. `int32` or `Game.Player`). If several locals have this
    /// type, the last one declared is used.
    OfType(String),
}

/// Symbolic description of a value to push onto the stack
#[derive(Clone, Debug)]
pub enum ArgumentDescriptor<'g> {
    /// Receiver of the method being edited
    This,

    /// Parameter of the method being edited (not counting the receiver)
    Parameter {
        index: usize,
        expected: ValueType<TypeId<'g>>,
    },

    Local(LocalSelector),

    /// Field declared on a type or its base types. Instance fields are read from the receiver.
    Field(TypeId<'g>, MemberName),

    /// Integer, floating point, or string constant
    Literal(Operand<'g>),

    /// Result of calling a method with arguments
    Call(MethodId<'g>, Vec<ArgumentDescriptor<'g>>),
}

/// Emits the instructions that push arguments described symbolically
pub struct ArgumentLoader<'a, 'g> {
    context: &'a MethodContext<'g>,
}

impl<'a, 'g> ArgumentLoader<'a, 'g> {
    pub fn new(context: &'a MethodContext<'g>) -> ArgumentLoader<'a, 'g> {
        ArgumentLoader { context }
    }

    /// Insert instructions loading each argument (in order), and return the types of the
    /// loaded values
    ///
    /// If any argument cannot be loaded, the instructions inserted for the others are removed
    /// again before the error is returned.
    pub fn load(
        &self,
        cursor: &mut CodeCursor<'g>,
        descriptors: &[ArgumentDescriptor<'g>],
    ) -> Result<Vec<ValueType<TypeId<'g>>>, Error> {
        atomically(cursor, |cursor| self.load_all(cursor, descriptors))
    }

    /// Load arguments, then insert a call to the overload of `name` on `declaring_type` whose
    /// parameters have exactly the types of the arguments
    ///
    /// For instance methods, the first argument is the receiver and is not compared.
    pub fn insert_call(
        &self,
        cursor: &mut CodeCursor<'g>,
        declaring_type: TypeId<'g>,
        name: &MemberName,
        descriptors: &[ArgumentDescriptor<'g>],
    ) -> Result<MethodId<'g>, Error> {
        atomically(cursor, |cursor| {
            let types = self.load_all(cursor, descriptors)?;
            let method = select_overload(declaring_type, name, &types)?;
            cursor.invoke(method)?;
            log::debug!("inserted call to {:?}", method);
            Ok(method)
        })
    }

    fn load_all(
        &self,
        cursor: &mut CodeCursor<'g>,
        descriptors: &[ArgumentDescriptor<'g>],
    ) -> Result<Vec<ValueType<TypeId<'g>>>, Error> {
        descriptors
            .iter()
            .map(|descriptor| self.load_one(cursor, descriptor))
            .collect()
    }

    fn load_one(
        &self,
        cursor: &mut CodeCursor<'g>,
        descriptor: &ArgumentDescriptor<'g>,
    ) -> Result<ValueType<TypeId<'g>>, Error> {
        log::trace!("loading {:?}", descriptor);
        match descriptor {
            ArgumentDescriptor::This => self.load_this(cursor),

            ArgumentDescriptor::Parameter { index, expected } => {
                let method = self.context.method;
                let parameters = &method.signature.parameters;
                let out_of_range = || Error::ParameterOutOfRange {
                    index: *index,
                    count: parameters.len(),
                };
                let found = parameters.get(*index).ok_or_else(out_of_range)?;
                if found != expected {
                    return Err(Error::ParameterTypeMismatch {
                        index: *index,
                        expected: expected.render(),
                        found: found.render(),
                    });
                }
                let slot = *index + usize::from(!method.is_static());
                let slot = u16::try_from(slot).map_err(|_| out_of_range())?;
                cursor.load_argument(slot)?;
                Ok(*found)
            }

            ArgumentDescriptor::Local(selector) => {
                let locals = &self.context.locals;
                let local = match selector {
                    LocalSelector::Index(index) => locals
                        .iter()
                        .find(|local| local.index == *index)
                        .ok_or_else(|| Error::MissingLocal(format!("with index {}", index)))?,
                    LocalSelector::OfType(type_name) => locals
                        .iter()
                        .rev()
                        .find(|local| local.local_type.render() == *type_name)
                        .ok_or_else(|| Error::MissingLocal(format!("of type {}", type_name)))?,
                };
                cursor.load_local(local.index)?;
                Ok(local.local_type)
            }

            ArgumentDescriptor::Field(typ, name) => {
                let field = typ
                    .field(name)
                    .ok_or_else(|| Error::MissingMember(format!("{}::{}", typ.name, name)))?;
                if !field.is_static() {
                    self.load_this(cursor)?;
                }
                cursor.access_field(field, AccessMode::Read)?;
                Ok(field.field_type)
            }

            ArgumentDescriptor::Literal(literal) => match literal {
                Operand::Int32(int) => {
                    cursor.const_int(*int)?;
                    Ok(ValueType::int32())
                }
                Operand::Int64(long) => {
                    cursor.const_long(*long)?;
                    Ok(ValueType::int64())
                }
                Operand::Float32(float) => {
                    cursor.const_float(*float)?;
                    Ok(ValueType::float32())
                }
                Operand::Float64(double) => {
                    cursor.const_double(*double)?;
                    Ok(ValueType::float64())
                }
                Operand::String(string) => {
                    cursor.const_string(string.clone())?;
                    Ok(ValueType::string())
                }
                other => Err(Error::UnsupportedLiteral(other.to_string())),
            },

            ArgumentDescriptor::Call(method, arguments) => {
                let return_type = method
                    .signature
                    .return_type
                    .ok_or_else(|| Error::VoidArgument(format!("{:?}", method)))?;
                self.load_all(cursor, arguments)?;
                cursor.invoke(*method)?;
                Ok(return_type)
            }
        }
    }

    fn load_this(&self, cursor: &mut CodeCursor<'g>) -> Result<ValueType<TypeId<'g>>, Error> {
        let method = self.context.method;
        if method.is_static() || method.declaring_type.attributes.is_static_class() {
            return Err(Error::StaticContext(format!("{:?}", method)));
        }
        cursor.load_this()?;
        Ok(ValueType::Class(method.declaring_type))
    }
}

/// Find the one method named `name` on `declaring_type` that accepts arguments of the given types
fn select_overload<'g>(
    declaring_type: TypeId<'g>,
    name: &MemberName,
    argument_types: &[ValueType<TypeId<'g>>],
) -> Result<MethodId<'g>, Error> {
    let mut candidates = declaring_type.methods_named(name).filter(|method| {
        let parameter_types = if method.is_static() {
            Some(argument_types)
        } else {
            argument_types.split_first().map(|(_receiver, rest)| rest)
        };
        parameter_types == Some(method.signature.parameters.as_slice())
    });

    let method = candidates.next().ok_or_else(|| {
        let rendered: Vec<String> = argument_types.iter().map(|t| t.render()).collect();
        Error::MissingMember(format!(
            "{}::{}({})",
            declaring_type.name,
            name,
            rendered.join(", ")
        ))
    })?;
    if let Some(other) = candidates.next() {
        return Err(Error::AmbiguousMethod(
            format!("{:?}", method),
            format!("{:?}", other),
        ));
    }
    Ok(method)
}

/// Run `edit`, removing whatever it inserted if it fails
fn atomically<'g, T>(
    cursor: &mut CodeCursor<'g>,
    edit: impl FnOnce(&mut CodeCursor<'g>) -> Result<T, Error>,
) -> Result<T, Error> {
    let start = cursor.position();
    let length = cursor.len();
    match edit(cursor) {
        Ok(value) => Ok(value),
        Err(error) => {
            let inserted = cursor.len().saturating_sub(length);
            if inserted > 0 && start >= 0 {
                let start = start as usize;
                cursor.remove_in_range(start, start + inserted - 1)?;
            }
            Err(error)
        }
    }
}
