//! Flag set utilities
//!
//! Sources and collectors both advertise a small fixed set of characteristics.
//! `flag_set!` generates a `Copy` bitset newtype with named constants, set
//! operations and a `Debug` that prints the flag names.

/// Define a bitset newtype with named flags
macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident: $repr:ty {
            $(
                $(#[$flag_meta:meta])*
                const $flag:ident = $bit:expr;
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name($repr);

        impl $name {
            $(
                $(#[$flag_meta])*
                pub const $flag: Self = Self(1 << $bit);
            )+

            /// The set with no flags
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Raw bit representation
            pub const fn bits(self) -> $repr {
                self.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// True if every flag of `other` is set in `self`
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            pub const fn intersection(self, other: Self) -> Self {
                Self(self.0 & other.0)
            }

            /// `self` with every flag of `other` cleared
            pub const fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }

            /// Set or clear `other` depending on `enabled`
            pub const fn with(self, other: Self, enabled: bool) -> Self {
                if enabled { self.union(other) } else { self.without(other) }
            }

            fn names(self) -> impl Iterator<Item = &'static str> {
                [$((Self::$flag, stringify!($flag))),+]
                    .into_iter()
                    .filter(move |(flag, _)| self.contains(*flag))
                    .map(|(_, name)| name)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                *self = self.union(rhs);
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                self.intersection(rhs)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let names: Vec<&str> = self.names().collect();
                if names.is_empty() {
                    write!(f, "{}(empty)", stringify!($name))
                } else {
                    write!(f, "{}({})", stringify!($name), names.join(" | "))
                }
            }
        }
    };
}

pub(crate) use flag_set;
