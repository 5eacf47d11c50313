//! Authentication artifacts for the signed exchanges.
//!
//! Two families: HMAC-SHA256 over a canonical query string (symmetric-key
//! platforms) and Starknet typed-data signatures exchanged for a bearer
//! token (Paradex). Both are pure functions of payload, key material and
//! timestamps; the caller supplies everything.

pub mod hmac;
pub mod typed_data;
