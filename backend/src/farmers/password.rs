use bcrypt::BcryptError;

#[cfg(not(test))]
const COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const COST: u32 = 4;

/// bcrypt hash in the modular crypt format (`$2b$<cost>$...`).
pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    bcrypt::hash(password, COST)
}

/// False for a wrong password and for hashes bcrypt cannot parse.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    match bcrypt::verify(password, encoded) {
        Ok(matches) => matches,
        Err(e) => {
            log::warn!("Stored password hash is unusable: {}", e);
            false
        }
    }
}
