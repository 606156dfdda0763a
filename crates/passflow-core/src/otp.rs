//! One-time passwords: TOTP (RFC 6238) y tokens estáticos.

use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::model::{OtpAlgorithm, TotpDevice};

/// Longitud del secreto generado (160 bits, lo recomendado para SHA1).
const SECRET_BYTES: usize = 20;
const STATIC_TOKEN_LEN: usize = 8;

fn hmac_digest(algorithm: OtpAlgorithm, key: &[u8], msg: &[u8]) -> Option<Vec<u8>> {
    let digest = match algorithm {
        OtpAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).ok()?;
            mac.update(msg);
            mac.finalize().into_bytes().to_vec()
        }
        OtpAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).ok()?;
            mac.update(msg);
            mac.finalize().into_bytes().to_vec()
        }
        OtpAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).ok()?;
            mac.update(msg);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Some(digest)
}

/// HOTP (RFC 4226) con truncado dinámico.
pub fn hotp(algorithm: OtpAlgorithm, secret: &[u8], counter: u64, digits: u32) -> Option<String> {
    let digest = hmac_digest(algorithm, secret, &counter.to_be_bytes())?;
    let offset = (*digest.last()? & 0x0f) as usize;
    let slice = digest.get(offset..offset + 4)?;
    let binary = (u32::from(slice[0] & 0x7f) << 24)
                 | (u32::from(slice[1]) << 16)
                 | (u32::from(slice[2]) << 8)
                 | u32::from(slice[3]);
    let modulus = 10u64.checked_pow(digits)?;
    let code = u64::from(binary) % modulus;
    Some(format!("{code:0width$}", width = digits as usize))
}

/// Código TOTP del device en el instante `at`.
pub fn totp_at(device: &TotpDevice, at: DateTime<Utc>) -> Option<String> {
    let secret = hex::decode(&device.secret).ok()?;
    let period = device.period.max(1);
    let counter = (at.timestamp().max(0) as u64) / period;
    hotp(device.algorithm, &secret, counter, device.digits)
}

/// Verifica `code` aceptando `skew` ventanas antes y después de `at`.
pub fn verify_totp(device: &TotpDevice, code: &str, at: DateTime<Utc>, skew: u32) -> bool {
    let Ok(secret) = hex::decode(&device.secret) else {
        return false;
    };
    let code = code.trim();
    if code.len() != device.digits as usize {
        return false;
    }
    let period = device.period.max(1);
    let counter = (at.timestamp().max(0) as u64) / period;
    let skew = u64::from(skew);
    (counter.saturating_sub(skew)..=counter.saturating_add(skew)).any(|c| {
        hotp(device.algorithm, &secret, c, device.digits)
            .is_some_and(|expected| bool::from(expected.as_bytes().ct_eq(code.as_bytes())))
    })
}

pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn generate_static_tokens(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| {
                  (&mut rng).sample_iter(&Alphanumeric)
                            .take(STATIC_TOKEN_LEN)
                            .map(|b| char::from(b).to_ascii_lowercase())
                            .collect()
              })
              .collect()
}

/// URI `otpauth://` para registrar el device en una app autenticadora.
pub fn provisioning_uri(device: &TotpDevice, issuer: &str, account: &str) -> Option<String> {
    let secret = hex::decode(&device.secret).ok()?;
    Some(format!("otpauth://totp/{}:{}?secret={}&issuer={}&algorithm={}&digits={}&period={}",
                 percent_encode(issuer),
                 percent_encode(account),
                 BASE32_NOPAD.encode(&secret),
                 percent_encode(issuer),
                 device.algorithm.uri_name(),
                 device.digits,
                 device.period))
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Vector de prueba del apéndice B de RFC 6238 (SHA1, 8 dígitos).
    fn rfc_device() -> TotpDevice {
        TotpDevice { secret: hex::encode(b"12345678901234567890"),
                     digits: 8,
                     period: 30,
                     algorithm: OtpAlgorithm::Sha1 }
    }

    #[test]
    fn totp_matches_rfc6238_vector() {
        let at = Utc.timestamp_opt(59, 0).single().expect("valid timestamp");
        assert_eq!(totp_at(&rfc_device(), at).as_deref(), Some("94287082"));
        let at = Utc.timestamp_opt(1_111_111_109, 0).single().expect("valid timestamp");
        assert_eq!(totp_at(&rfc_device(), at).as_deref(), Some("07081804"));
    }

    #[test]
    fn verify_accepts_previous_window_within_skew() {
        let device = rfc_device();
        let at = Utc.timestamp_opt(59, 0).single().expect("valid timestamp");
        let later = Utc.timestamp_opt(89, 0).single().expect("valid timestamp");
        let code = totp_at(&device, at).expect("code");
        assert!(verify_totp(&device, &code, later, 1));
        assert!(!verify_totp(&device, &code, later, 0));
        assert!(!verify_totp(&device, "123", later, 1));
    }

    #[test]
    fn provisioning_uri_encodes_secret_as_base32() {
        let uri = provisioning_uri(&rfc_device(), "passflow", "alice@example.com").expect("uri");
        assert!(uri.starts_with("otpauth://totp/passflow:alice%40example.com?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"));
    }
}
