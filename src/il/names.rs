use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields, and locals
///
/// Constructors use reserved names (see [`MemberName::CONSTRUCTOR`]), so `.` is allowed anywhere
/// in the name.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct MemberName(Cow<'static, str>);

/// Namespace-qualified names of types, written as `Some.Namespace.Type`
///
/// Nested types are separated from their enclosing type with `+` (eg. `Outer+Inner`).
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct TypeName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for MemberName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for TypeName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;

    /// Try to construct a name from a string slice
    fn from_str(name: &str) -> Result<Self, String> {
        Self::from_string(name.to_owned())
    }
}

const ILLEGAL_NAME_CHARACTERS: &[char] = &['/', ';', '[', ']', '<', '>', ':', '(', ')', ','];

impl Name for MemberName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(ILLEGAL_NAME_CHARACTERS) {
            Err(format!("Member name '{}' contains an illegal character", name))
        } else if name.contains(char::is_whitespace) {
            Err(format!("Member name '{}' contains whitespace", name))
        } else if name.is_empty() {
            Err(format!("Member name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(MemberName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Name for TypeName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(format!("Type name '{}' is empty", name));
        }
        for segment in name.split(|c: char| c == '.' || c == '+') {
            if segment.is_empty() {
                return Err(format!("Type name '{}' has an empty segment", name));
            }
            if segment.contains(ILLEGAL_NAME_CHARACTERS) || segment.contains(char::is_whitespace)
            {
                return Err(format!(
                    "Type name '{}' contains an illegal character",
                    name
                ));
            }
        }
        Ok(())
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(TypeName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Debug for MemberName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for TypeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for MemberName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for TypeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl MemberName {
    pub const CONSTRUCTOR: Self = Self::name(".ctor");
    pub const STATIC_CONSTRUCTOR: Self = Self::name(".cctor");

    /// Make a name from a string literal already known to be valid
    const fn name(name: &'static str) -> Self {
        MemberName(Cow::Borrowed(name))
    }
}

impl TypeName {
    pub const OBJECT: Self = Self::name("System.Object");
    pub const STRING: Self = Self::name("System.String");

    /// Make a name from a string literal already known to be valid
    const fn name(name: &'static str) -> Self {
        TypeName(Cow::Borrowed(name))
    }

    /// Last segment of the name (eg. `Player` for `Game.Actors.Player`)
    pub fn short_name(&self) -> &str {
        self.as_str()
            .rsplit(|c: char| c == '.' || c == '+')
            .next()
            .unwrap_or_else(|| self.as_str())
    }

    /// Everything before the last `.` (nested type separators are kept)
    pub fn namespace(&self) -> Option<&str> {
        self.as_str().rsplit_once('.').map(|(namespace, _)| namespace)
    }
}
