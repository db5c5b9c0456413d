/*++

Licensed under the Apache-2.0 license.

File Name:

    macros.rs

Abstract:

    Macros used by the project

--*/

/// Declares a fieldless enum backed by literal values of `$type`, plus a
/// catch-all `$invalid` variant that every unknown value decodes to.
#[macro_export]
macro_rules! emu_enum {
    (
        $(#[$($enum_attrs:tt)*])*
        $vis:vis $enum_name:ident;
        $type:ty;
        {
            $(
                $(#[$($attrs:tt)*])*
                $name:ident = $value:literal,
            )*
        };
        $invalid:ident
    ) => {
        $(#[$($enum_attrs)*])*
        $vis enum $enum_name {
            $(
                $(#[$($attrs)*])*
                $name,
            )*
            $invalid
        }

        impl $enum_name {
            /// Returns false for the catch-all variant.
            #[allow(dead_code)]
            pub const fn is_valid(&self) -> bool {
                !matches!(self, $enum_name::$invalid)
            }
        }

        impl From<$enum_name> for $type {
            fn from(val: $enum_name) -> $type {
                match val {
                    $($enum_name::$name => $value,)*
                    $enum_name::$invalid => panic!(),
                }
            }
        }

        impl From<$type> for $enum_name {
            fn from(val: $type) -> $enum_name{
                match val {
                    $($value => $enum_name::$name,)*
                    _ => $enum_name::$invalid,
                }
            }
        }

        impl std::fmt::Display for $enum_name{
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                match self {
                    $($enum_name::$name => write!(f, stringify!($name)),)*
                    _ => write!(f, stringify!($invalid)),
                }
            }
        }
    };
}
