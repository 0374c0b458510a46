//! Typed identifiers.
//!
//! The original engine represented "no such id" with an all-ones sentinel
//! value compared by hand at every call site. Here every identifier is a
//! plain newtype and the absence of an id is expressed with `Option<_>`
//! instead, so the type system catches a forgotten check.

use std::fmt;

macro_rules! id_type {
    ($name:ident, $repr:ty, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            /// Wraps a raw value.
            #[must_use]
            pub const fn new(value: $repr) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn get(self) -> $repr {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(FrameId, usize, "Index of a frame within the catalog's flat frame table.");
id_type!(VideoId, u32, "Index of a video within the catalog.");
id_type!(ShotId, u32, "Index of a shot within its parent video.");
id_type!(KeywordId, u32, "Index of a keyword within the keyword table.");
id_type!(SynsetId, u32, "WordNet-style synset identifier attached to a keyword.");
id_type!(FrameNum, u32, "Frame number within a video, as encoded in the source filename.");
id_type!(Hour, u8, "Hour of day in `[0, 24)`, used by the time-of-day filter.");
id_type!(Weekday, u8, "Day of week in `[0, 7)`, Monday-indexed.");
id_type!(Year, u16, "Calendar year, used by metadata-derived filters.");
id_type!(ContextId, usize, "Index of a search context within a session's history.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_raw_value() {
        let id = FrameId::new(42);
        assert_eq!(id.get(), 42);
        assert_eq!(FrameId::from(42), id);
    }

    #[test]
    fn orders_by_raw_value() {
        assert!(FrameId::new(1) < FrameId::new(2));
    }
}
