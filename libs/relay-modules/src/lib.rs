//! Built-in reference [`Module`](relay_core::Module) implementations.
//!
//! The individual protocol decoders (ISO8583, JWT, LDAP BER, SMTP/SASL,
//! FIX, Solace, EBCDIC, Base64, HTTP Basic) are out of scope (spec §1)
//! and live as external collaborators; this crate supplies the two
//! conforming modules the teacher's `original_source/` ships *enabled*
//! by default, so the pipeline has something real to run end to end:
//! a byte-repr display module and a hex-dump display module, one
//! variant per direction.

mod display;
mod hex_dump;

pub use display::{DisplayClient, DisplayServer};
pub use hex_dump::{HexDumpClient, HexDumpServer};
