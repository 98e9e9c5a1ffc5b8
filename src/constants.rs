//! Chain parameters and wallet file format constants.

/// Prepended to every wallet file so a reader can tell it is one: "If I pull
/// that off, would you die?\n"
pub const IS_A_WALLET_IDENTIFIER: [u8; 35] = [
    0x49, 0x66, 0x20, 0x49, 0x20, 0x70, 0x75, 0x6c, 0x6c, 0x20, 0x74, 0x68, 0x61, 0x74, 0x20,
    0x6f, 0x66, 0x66, 0x2c, 0x20, 0x77, 0x6f, 0x75, 0x6c, 0x64, 0x20, 0x79, 0x6f, 0x75, 0x20,
    0x64, 0x69, 0x65, 0x3f, 0x0a,
];

/// Prepended to the plaintext before encryption, so a successful decryption
/// can be told apart from garbage: "You're a big guy.\n"
pub const IS_CORRECT_PASSWORD_IDENTIFIER: [u8; 18] = [
    0x59, 0x6f, 0x75, 0x27, 0x72, 0x65, 0x20, 0x61, 0x20, 0x62, 0x69, 0x67, 0x20, 0x67, 0x75,
    0x79, 0x2e, 0x0a,
];

/// PBKDF2 rounds for the wallet key. Part of the file format; existing
/// wallets can only be opened with the same value.
pub const PBKDF2_ITERATIONS: u32 = 500_000;

pub const SALT_SIZE: usize = 16;

pub const KEY_SIZE: usize = 32;

/// Bumped whenever the JSON layout inside the container changes.
pub const WALLET_FILE_FORMAT_VERSION: u32 = 0;

/// Varint-encoded in front of every standard address ("TRTL").
pub const ADDRESS_BASE58_PREFIX: u64 = 3_914_525;

pub const STANDARD_ADDRESS_LENGTH: usize = 99;

/// Seconds between blocks.
pub const DIFFICULTY_TARGET: u64 = 30;

pub const GENESIS_BLOCK_TIMESTAMP: u64 = 1_512_800_692;

/// How far in the future a block timestamp may be. New wallets start syncing
/// this far before "now" so no block they could appear in is skipped.
pub const BLOCK_FUTURE_TIME_LIMIT: u64 = 60 * 60 * 2;

/// Number of recent block hashes kept as sync checkpoints.
pub const LAST_KNOWN_BLOCK_HASHES_SIZE: usize = 50;

/// Blocks requested from the daemon per sync round.
pub const BLOCKS_PER_SYNC_REQUEST: usize = 100;
