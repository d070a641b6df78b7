//! Command codes, status words and factory defaults.

/// The all-zero AES-128 key every chip ships with in slots 0 through 4.
pub const DEFAULT_KEY: [u8; 16] = [0u8; 16];

/// Native command codes (placed in the INS position of the wrapping APDU).
pub mod ins {
    /// AuthenticateEV2First, part 1.
    pub const AUTH_EV2_FIRST: u8 = 0x71;
    /// Additional frame; continues a multi-part exchange.
    pub const ADDITIONAL_FRAME: u8 = 0xaf;
    /// GetCardUID (full communication mode).
    pub const GET_CARD_UID: u8 = 0x51;
    /// ChangeFileSettings (full communication mode).
    pub const CHANGE_FILE_SETTINGS: u8 = 0x5f;
    /// GetKeyVersion (MAC communication mode).
    pub const GET_KEY_VERSION: u8 = 0x64;
    /// ReadData.
    pub const READ_DATA: u8 = 0xad;
    /// WriteData.
    pub const WRITE_DATA: u8 = 0x8d;
    /// ChangeKey (full communication mode).
    pub const CHANGE_KEY: u8 = 0xc4;
    /// GetFileSettings (MAC communication mode).
    pub const GET_FILE_SETTINGS: u8 = 0xf5;
}

/// Status words.
pub mod status {
    /// SW1 of every well-formed native response.
    pub const MAJOR_OK: u8 = 0x91;
    /// Operation complete.
    pub const MINOR_OK: u8 = 0x00;
    /// More frames expected; answer with an additional frame.
    pub const MINOR_ADDITIONAL_FRAME: u8 = 0xaf;
    /// Authentication opener rejected; see
    /// [`AuthError::UnsupportedRetry`](crate::AuthError::UnsupportedRetry).
    pub const MINOR_AUTH_RETRY: u8 = 0xad;
}
