//! Block numbering.
//!
//! Block numbers live in a single byte but cycle over 1..=255: zero is
//! never produced, so 255 is followed by 1 rather than 0.

/// The block number of the first DATA packet of every transfer.
pub const FIRST_BLOCK: u8 = 1;
/// The largest block number before wrapping back to [`FIRST_BLOCK`].
pub const LAST_BLOCK: u8 = 255;

/// The block that follows `blk`.
pub fn next_block(blk: u8) -> u8 {
    if blk == LAST_BLOCK {
        FIRST_BLOCK
    } else {
        blk + 1
    }
}

/// The block that precedes `blk`.
pub fn prev_block(blk: u8) -> u8 {
    if blk <= FIRST_BLOCK {
        LAST_BLOCK
    } else {
        blk - 1
    }
}
