/// bcrypt work factor for stored password hashes.
pub const HASH_COST: u32 = 10;

/// Salted hash for storage.
pub fn hash(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, HASH_COST)
}

/// Constant-time via bcrypt. A malformed stored hash never verifies.
pub fn verify(password: &str, stored_hash: &str) -> bool {
    bcrypt::verify(password, stored_hash).unwrap_or(false)
}
