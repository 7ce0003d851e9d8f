//! Attribute and filter bitmasks
//!
//! The attribute bits are inverted relative to ECMAScript descriptor
//! booleans: `READ_ONLY` means `writable: false`, and so on. Every
//! translation to or from a host descriptor goes through the helpers here.

bitflags::bitflags! {
    /// Property attributes.
    ///
    /// `NONE` (no bits) is a writable, enumerable, configurable property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyAttribute: u8 {
        /// `writable: false`
        const READ_ONLY = 1 << 0;
        /// `enumerable: false`
        const DONT_ENUM = 1 << 1;
        /// `configurable: false`
        const DONT_DELETE = 1 << 2;
    }
}

impl PropertyAttribute {
    pub const NONE: Self = Self::empty();

    /// Translate host descriptor booleans into attribute bits
    pub fn from_descriptor(writable: bool, enumerable: bool, configurable: bool) -> Self {
        let mut attrs = Self::NONE;
        attrs.set(Self::READ_ONLY, !writable);
        attrs.set(Self::DONT_ENUM, !enumerable);
        attrs.set(Self::DONT_DELETE, !configurable);
        attrs
    }

    pub fn is_writable(self) -> bool {
        !self.contains(Self::READ_ONLY)
    }

    pub fn is_enumerable(self) -> bool {
        !self.contains(Self::DONT_ENUM)
    }

    pub fn is_configurable(self) -> bool {
        !self.contains(Self::DONT_DELETE)
    }
}

bitflags::bitflags! {
    /// Key filter for own-property enumeration.
    ///
    /// The empty set (`ALL_PROPERTIES`) keeps every key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyFilter: u8 {
        const ONLY_WRITABLE = 1 << 0;
        const ONLY_ENUMERABLE = 1 << 1;
        const ONLY_CONFIGURABLE = 1 << 2;
        const SKIP_STRINGS = 1 << 3;
        const SKIP_SYMBOLS = 1 << 4;
    }
}

impl PropertyFilter {
    pub const ALL_PROPERTIES: Self = Self::empty();

    /// Whether a key with the given own descriptor survives this filter.
    ///
    /// Accessor properties have no `writable` field and count as
    /// non-writable.
    pub fn includes(self, writable: bool, enumerable: bool, configurable: bool, is_symbol: bool) -> bool {
        if self.contains(Self::ONLY_WRITABLE) && !writable {
            return false;
        }
        if self.contains(Self::ONLY_ENUMERABLE) && !enumerable {
            return false;
        }
        if self.contains(Self::ONLY_CONFIGURABLE) && !configurable {
            return false;
        }
        if is_symbol {
            !self.contains(Self::SKIP_SYMBOLS)
        } else {
            !self.contains(Self::SKIP_STRINGS)
        }
    }
}

/// Whether key collection stops at the object or walks its prototypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyCollectionMode {
    OwnOnly,
    #[default]
    IncludePrototypes,
}

/// Whether canonical array-index keys are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFilter {
    #[default]
    IncludeIndices,
    SkipIndices,
}

/// Target of `ObjectRef::set_integrity_level`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityLevel {
    Frozen,
    Sealed,
}
