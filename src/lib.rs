//! A minimal TFTP-style file transfer over UDP.
//!
//! A [`tftp::client`] downloads one named file from a server; a
//! [`tftp::server`] serves files to many clients at once, one task per
//! request. Transfers are stop-and-wait: at most one DATA block is in
//! flight, block numbers are a single byte cycling over 1..=255, and a
//! block shorter than 512 bytes ends the transfer.

pub mod tftp;
