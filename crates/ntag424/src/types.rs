//! Key, file and permission identifiers of the chip's application.

/// One of the five AES-128 application key slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeySpecifier {
    /// Application master key. Authenticates key changes and settings.
    Key0,
    /// Application key 1.
    Key1,
    /// Application key 2.
    Key2,
    /// Application key 3.
    Key3,
    /// Application key 4.
    Key4,
}

impl KeySpecifier {
    /// All slots in ascending order.
    pub const ALL: [Self; 5] = [Self::Key0, Self::Key1, Self::Key2, Self::Key3, Self::Key4];

    /// Slot number as sent on the wire.
    pub const fn number(self) -> u8 {
        match self {
            Self::Key0 => 0,
            Self::Key1 => 1,
            Self::Key2 => 2,
            Self::Key3 => 3,
            Self::Key4 => 4,
        }
    }

    /// Slot for a wire number, if in range.
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            0 => Some(Self::Key0),
            1 => Some(Self::Key1),
            2 => Some(Self::Key2),
            3 => Some(Self::Key3),
            4 => Some(Self::Key4),
            _ => None,
        }
    }

    /// The next slot in ordinal order, if any.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Key0 => Some(Self::Key1),
            Self::Key1 => Some(Self::Key2),
            Self::Key2 => Some(Self::Key3),
            Self::Key3 => Some(Self::Key4),
            Self::Key4 => None,
        }
    }

    /// The permission nibble naming exactly this slot.
    pub const fn permission(self) -> Permission {
        match self {
            Self::Key0 => Permission::Key0,
            Self::Key1 => Permission::Key1,
            Self::Key2 => Permission::Key2,
            Self::Key3 => Permission::Key3,
            Self::Key4 => Permission::Key4,
        }
    }
}

/// A 4-bit access condition: a specific key slot, free access, or no access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Requires a session authenticated with key slot 0.
    Key0,
    /// Requires a session authenticated with key slot 1.
    Key1,
    /// Requires a session authenticated with key slot 2.
    Key2,
    /// Requires a session authenticated with key slot 3.
    Key3,
    /// Requires a session authenticated with key slot 4.
    Key4,
    /// Free access, no authentication required.
    All,
    /// Access denied to everyone.
    None,
}

impl Permission {
    /// Wire nibble value.
    pub const fn nibble(self) -> u8 {
        match self {
            Self::Key0 => 0x0,
            Self::Key1 => 0x1,
            Self::Key2 => 0x2,
            Self::Key3 => 0x3,
            Self::Key4 => 0x4,
            Self::All => 0xe,
            Self::None => 0xf,
        }
    }

    /// Decode a nibble. Reserved values collapse to [`Permission::None`],
    /// matching how the chip treats them.
    pub const fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0x0 => Self::Key0,
            0x1 => Self::Key1,
            0x2 => Self::Key2,
            0x3 => Self::Key3,
            0x4 => Self::Key4,
            0xe => Self::All,
            _ => Self::None,
        }
    }
}

/// Wire protection for a single command exchange, configured per file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CommunicationMode {
    /// No protection.
    #[default]
    Plain,
    /// Command and response carry a truncated CMAC.
    Mac,
    /// MAC plus AES-CBC encryption of the data field.
    Full,
}

/// One of the three standard files of the factory application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileSpecifier {
    /// Capability container, file number 1, 32 bytes.
    CapabilityContainer,
    /// NDEF data, file number 2, 256 bytes.
    Ndef,
    /// Proprietary data, file number 3, 128 bytes.
    Proprietary,
}

impl FileSpecifier {
    /// File number as sent on the wire.
    pub const fn number(self) -> u8 {
        match self {
            Self::CapabilityContainer => 1,
            Self::Ndef => 2,
            Self::Proprietary => 3,
        }
    }

    /// Fixed size of the file as shipped from the factory.
    pub const fn nominal_size(self) -> u32 {
        match self {
            Self::CapabilityContainer => 32,
            Self::Ndef => 256,
            Self::Proprietary => 128,
        }
    }
}
