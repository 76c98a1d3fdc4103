//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize as plain strings.

use serde::Serialize;
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }
    };
}

pub(crate) use string_newtype;

string_newtype!(
    /// A repository name that passed [`crate::RepositoryNameValidator`] validation.
    ///
    /// Never empty.
    #[derive(Serialize)]
    #[serde(transparent)]
    RepositoryName
);

impl RepositoryName {
    pub(crate) fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_name_display_and_as_ref() {
        let name = RepositoryName::new_unchecked("library/alpine");
        assert_eq!(name.to_string(), "library/alpine");
        assert_eq!(name.as_str(), "library/alpine");
        assert_eq!(AsRef::<str>::as_ref(&name), "library/alpine");
    }

    #[test]
    fn repository_name_serializes_as_plain_string() {
        let name = RepositoryName::new_unchecked("team/app");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"team/app\"");
    }

    #[test]
    fn repository_name_compares_with_strings() {
        let name = RepositoryName::new_unchecked("a/b");
        assert_eq!(name, "a/b");
        assert_eq!(name, String::from("a/b"));
        assert_eq!(name.into_inner(), "a/b");
    }
}
