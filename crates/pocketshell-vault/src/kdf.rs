//! Key-encryption-key derivation.
//!
//! Two derivation paths produce a [`Kek`]:
//!
//! - **Password**: PBKDF2-HMAC-SHA256 over the master password and a random
//!   256-bit salt. Deliberately slow; the iteration count is a cost parameter
//!   recorded next to the salt in [`VaultMeta`](crate::meta::VaultMeta).
//! - **Biometric**: HKDF-SHA256 over the secret produced by the
//!   [`BiometricBridge`](crate::biometric::BiometricBridge), with an all-zero
//!   salt and a domain-separation info string. The secret is already high
//!   entropy, so derivation is instant.
//!
//! Both functions are pure: no state and no I/O.

use std::num::NonZeroU32;

use ring::{hkdf, pbkdf2};
use zeroize::Zeroizing;

use crate::crypto::{KEY_LEN, Kek};
use crate::error::{Result, VaultError};

/// Length of the PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 32;

/// PBKDF2 iteration count, 600,000 per OWASP 2023 for HMAC-SHA256.
///
/// This is also the count assumed for metadata records that predate the
/// `iterations` field.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// HKDF info string for the biometric KEK. Binds the derived key to vault
/// DEK wrapping so the same biometric secret yields unrelated keys elsewhere.
pub const BIOMETRIC_KEK_INFO: &str = "pocketshell-vault/biometric-kek/v1";

/// HKDF salt: fixed, all zero, one hash length.
const HKDF_ZERO_SALT: [u8; 32] = [0u8; 32];

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Derive a KEK from a `password` and a stored `salt`.
///
/// Deterministic for a given `(password, salt, iterations)`. An empty
/// password is valid input.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if `iterations` is zero.
pub fn derive_kek_from_password(password: &[u8], salt: &[u8], iterations: u32) -> Result<Kek> {
    let iterations = NonZeroU32::new(iterations).ok_or_else(|| VaultError::Crypto {
        reason: "PBKDF2 iteration count must be non-zero".into(),
    })?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(PBKDF2_ALG, iterations, salt, password, &mut key[..]);

    tracing::debug!(iterations = iterations.get(), "derived password KEK via PBKDF2");
    Ok(Kek::from_array(key))
}

/// Derive a KEK from a biometric-bound secret via HKDF-SHA256.
///
/// `domain_info` is the HKDF info string; pass [`BIOMETRIC_KEK_INFO`] unless
/// the vault was configured otherwise.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if `prf_output` is empty or HKDF expansion
/// fails.
pub fn derive_kek_from_biometric(prf_output: &[u8], domain_info: &[u8]) -> Result<Kek> {
    if prf_output.is_empty() {
        return Err(VaultError::Crypto {
            reason: "biometric secret is empty".into(),
        });
    }

    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &HKDF_ZERO_SALT);
    let prk = salt.extract(prf_output);
    let info = [domain_info];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| VaultError::Crypto {
            reason: "HKDF expansion failed".into(),
        })?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    okm.fill(&mut key[..]).map_err(|_| VaultError::Crypto {
        reason: "HKDF output fill failed".into(),
    })?;

    tracing::debug!("derived biometric KEK via HKDF");
    Ok(Kek::from_array(key))
}

/// Generate a fresh random PBKDF2 salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    crate::crypto::fill_random(&mut salt)?;
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = 1_000;

    #[test]
    fn password_kek_is_deterministic() {
        let salt = generate_salt().unwrap();
        let a = derive_kek_from_password(b"hunter2", &salt, FAST).unwrap();
        let b = derive_kek_from_password(b"hunter2", &salt, FAST).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn password_kek_depends_on_every_input() {
        let salt = generate_salt().unwrap();
        let other_salt = generate_salt().unwrap();
        let base = derive_kek_from_password(b"hunter2", &salt, FAST).unwrap();

        let other_pw = derive_kek_from_password(b"hunter3", &salt, FAST).unwrap();
        let other_s = derive_kek_from_password(b"hunter2", &other_salt, FAST).unwrap();
        let other_it = derive_kek_from_password(b"hunter2", &salt, FAST + 1).unwrap();

        assert_ne!(base.as_bytes(), other_pw.as_bytes());
        assert_ne!(base.as_bytes(), other_s.as_bytes());
        assert_ne!(base.as_bytes(), other_it.as_bytes());
    }

    #[test]
    fn empty_password_is_accepted() {
        let salt = generate_salt().unwrap();
        assert!(derive_kek_from_password(b"", &salt, FAST).is_ok());
    }

    #[test]
    fn zero_iterations_rejected() {
        let salt = generate_salt().unwrap();
        assert!(matches!(
            derive_kek_from_password(b"pw", &salt, 0),
            Err(VaultError::Crypto { .. })
        ));
    }

    #[test]
    fn pbkdf2_matches_rfc_vector() {
        // RFC 7914 section 11: PBKDF2-HMAC-SHA256, P="passwd", S="salt", c=1.
        let kek = derive_kek_from_password(b"passwd", b"salt", 1).unwrap();
        assert_eq!(
            &kek.as_bytes()[..8],
            &[0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f]
        );
    }

    #[test]
    fn biometric_kek_is_domain_separated() {
        let secret = [9u8; 32];
        let a = derive_kek_from_biometric(&secret, BIOMETRIC_KEK_INFO.as_bytes()).unwrap();
        let b = derive_kek_from_biometric(&secret, BIOMETRIC_KEK_INFO.as_bytes()).unwrap();
        let other = derive_kek_from_biometric(&secret, b"some-other-feature").unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), other.as_bytes());
    }

    #[test]
    fn empty_biometric_secret_rejected() {
        assert!(derive_kek_from_biometric(&[], BIOMETRIC_KEK_INFO.as_bytes()).is_err());
    }
}
