//! Password digests and credential checks.
//!
//! Only digests are ever stored. Neither passwords nor digests are logged.

use sha2::{Digest, Sha256};

use crate::storage::Storage;

/// Lowercase hex SHA-256 digest of a password.
pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// Returns true if `username` names a member whose stored digest matches `password`.
///
/// Members registered without a password can never log in.
pub async fn verify_credentials(
    storage: &Storage,
    username: &str,
    password: &str,
) -> anyhow::Result<bool> {
    let stored = storage.password_hash_for(username).await?;

    Ok(matches!(stored, Some(hash) if hash == hash_password(password)))
}
