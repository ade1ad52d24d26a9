//! Document id generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

use dcatd_core::{DocId, Result};

/// Random bytes per id (80 bits).
pub const ID_ENTROPY_BYTES: usize = 10;

/// A fresh URL-safe id: 10 random bytes, base64url without padding.
pub fn generate_id() -> Result<DocId> {
    let mut bytes = [0u8; ID_ENTROPY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    DocId::parse(&URL_SAFE_NO_PAD.encode(bytes))
}
