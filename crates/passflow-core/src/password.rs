//! Hash y verificación de contraseñas (bcrypt).

use log::warn;

use crate::errors::ServiceError;

/// bcrypt sólo considera los primeros 72 bytes.
const BCRYPT_MAX_LEN: usize = 72;

fn truncate_password(password: &[u8]) -> &[u8] {
    if password.len() > BCRYPT_MAX_LEN {
        warn!("Truncating password to {BCRYPT_MAX_LEN} bytes");
        return &password[..BCRYPT_MAX_LEN];
    }
    password
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, ServiceError> {
    bcrypt::hash(truncate_password(password.as_bytes()), cost).map_err(|e| ServiceError::Other(format!("bcrypt hash: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, ServiceError> {
    bcrypt::verify(truncate_password(password.as_bytes()), hash).map_err(|e| ServiceError::Other(format!("bcrypt verify: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse", 4).expect("hash");
        assert!(verify_password("correct horse", &hash).expect("verify"));
        assert!(!verify_password("wrong horse", &hash).expect("verify"));
    }
}
