use std::fmt;

pub trait IntoRaw<T: Clone> {
    fn into_raw(self) -> T;
}

/// A value that is either one of the known variants of `TK`, or the raw backing value when it
/// does not correspond to any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownOrRaw<TU: Clone, TK: IntoRaw<TU>> {
    Known(TK),
    Unknown(TU),
}

impl<TU: Clone, TK: IntoRaw<TU>> IntoRaw<TU> for KnownOrRaw<TU, TK> {
    fn into_raw(self) -> TU {
        match self {
            KnownOrRaw::Known(known) => known.into_raw(),
            KnownOrRaw::Unknown(raw) => raw,
        }
    }
}

impl<TU: Clone, TK: IntoRaw<TU> + TryFrom<TU>> From<TU> for KnownOrRaw<TU, TK> {
    fn from(raw: TU) -> Self {
        match TK::try_from(raw.clone()) {
            Ok(known) => KnownOrRaw::Known(known),
            Err(_) => KnownOrRaw::Unknown(raw),
        }
    }
}

impl<TU: Clone, TK: IntoRaw<TU> + Copy + PartialEq> KnownOrRaw<TU, TK> {
    pub fn is(&self, known: TK) -> bool {
        matches!(self, KnownOrRaw::Known(k) if *k == known)
    }
}

/// Implement IntoRaw and TryFrom<Raw> for an enum that is represented by a raw value.
/// The enum must implement [`strum_macros::EnumIter`]
macro_rules! impl_partial_enum {
    ($enum_name:ty, $backing:ty) => {
        impl $crate::definitions::util::IntoRaw<$backing> for $enum_name {
            fn into_raw(self) -> $backing {
                self as $backing
            }
        }
        impl TryFrom<$backing> for $enum_name {
            type Error = ();
            fn try_from(raw: $backing) -> ::core::result::Result<Self, Self::Error> {
                use ::strum::IntoEnumIterator;
                use $crate::definitions::util::IntoRaw;
                match Self::iter().find(|&v| v.into_raw() == raw) {
                    Some(v) => Ok(v),
                    None => Err(()),
                }
            }
        }
    };
}

pub(crate) use impl_partial_enum;

/// Formats a borrowed byte string as upper case hex, for logs and redacted `Debug` output.
#[derive(Clone, Copy)]
pub struct DisplayBytesAsHex<'a>(&'a [u8]);

impl fmt::Display for DisplayBytesAsHex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{byte:02X}"))
    }
}

impl fmt::Debug for DisplayBytesAsHex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<'a> From<&'a [u8]> for DisplayBytesAsHex<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        DisplayBytesAsHex(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for DisplayBytesAsHex<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        DisplayBytesAsHex(bytes)
    }
}
