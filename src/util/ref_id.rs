use stable_deref_trait::StableDeref;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Wrapper type whose "identity" for equality and hashing is determined from the reference itself
/// (ie. the pointer) and not from the underlying data.
///
/// Everything allocated in a [`crate::il::TypeGraph`] is handed out behind one of these, so two
/// handles are equal exactly when they point at the same arena entry.
pub struct RefId<'a, T: ?Sized>(pub &'a T);

impl<'a, T: ?Sized> Clone for RefId<'a, T> {
    fn clone(&self) -> Self {
        RefId(self.0)
    }
}

impl<'a, T: ?Sized> Copy for RefId<'a, T> {}

impl<'a, T: ?Sized> Hash for RefId<'a, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0 as *const T as *const u8, state)
    }
}

impl<'a, 'b, T: ?Sized> PartialEq<RefId<'b, T>> for RefId<'a, T> {
    fn eq(&self, other: &RefId<'b, T>) -> bool {
        std::ptr::eq(self.0 as *const T as *const u8, other.0 as *const T as *const u8)
    }
}

impl<'a, T: ?Sized> Eq for RefId<'a, T> {}

impl<'a, T: ?Sized> Deref for RefId<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

/// Shows the underlying data, not the pointer
impl<'a, T: ?Sized + fmt::Debug> fmt::Debug for RefId<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

unsafe impl<'a, T: ?Sized> StableDeref for RefId<'a, T> {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identity_is_by_address() {
        let one = String::from("same");
        let two = String::from("same");
        assert_eq!(RefId(&one), RefId(&one));
        assert_ne!(RefId(&one), RefId(&two));
        assert_eq!(*RefId(&one), *RefId(&two));
    }
}
