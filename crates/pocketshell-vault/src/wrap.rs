//! Wrapping the DEK under a KEK.
//!
//! A [`WrappedKey`] is the only form in which the DEK ever reaches durable
//! storage. There is exactly one per enrolled unlock path: one under the
//! password KEK and, when biometric unlock is enrolled, one under the
//! biometric KEK.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::crypto::{self, Dek, Kek};
use crate::error::{Result, VaultError};

/// The DEK encrypted under a KEK with AES-256-GCM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// 96-bit nonce, fresh for every wrap.
    #[serde(with = "codec::b64")]
    pub iv: Vec<u8>,
    /// Encrypted key bytes followed by the 128-bit tag.
    #[serde(with = "codec::b64")]
    pub ciphertext: Vec<u8>,
}

/// Wrap `dek` under `kek` with a freshly generated IV.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if the RNG or cipher fails.
pub fn wrap(kek: &Kek, dek: &Dek) -> Result<WrappedKey> {
    let (iv, ciphertext) = crypto::encrypt(dek.as_bytes(), kek.as_bytes())?;
    Ok(WrappedKey {
        iv: iv.to_vec(),
        ciphertext,
    })
}

/// Recover the DEK from `wrapped` using `kek`.
///
/// # Errors
///
/// Returns [`VaultError::AuthFailure`] on any failure. A wrong KEK, a
/// modified ciphertext or IV, and a plaintext of the wrong length cannot be
/// told apart by the caller.
pub fn unwrap(kek: &Kek, wrapped: &WrappedKey) -> Result<Dek> {
    let plaintext = crypto::decrypt(&wrapped.iv, &wrapped.ciphertext, kek.as_bytes())?;
    Dek::from_slice(&plaintext).map_err(|_| VaultError::AuthFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf;

    fn kek(password: &str) -> Kek {
        kdf::derive_kek_from_password(password.as_bytes(), b"0123456789abcdef", 1_000).unwrap()
    }

    #[test]
    fn wrap_then_unwrap_recovers_dek() {
        let dek = Dek::generate().unwrap();
        let wrapped = wrap(&kek("pw"), &dek).unwrap();

        assert_eq!(wrapped.iv.len(), crypto::NONCE_LEN_BYTES);
        assert_eq!(wrapped.ciphertext.len(), crypto::KEY_LEN + crypto::TAG_LEN);

        let recovered = unwrap(&kek("pw"), &wrapped).unwrap();
        assert_eq!(recovered.as_bytes(), dek.as_bytes());
    }

    #[test]
    fn rewrap_uses_a_fresh_iv() {
        let dek = Dek::generate().unwrap();
        let k = kek("pw");
        let a = wrap(&k, &dek).unwrap();
        let b = wrap(&k, &dek).unwrap();
        assert_ne!(a.iv, b.iv);
    }

    #[test]
    fn wrong_kek_is_auth_failure() {
        let dek = Dek::generate().unwrap();
        let wrapped = wrap(&kek("pw"), &dek).unwrap();

        assert!(matches!(
            unwrap(&kek("not-pw"), &wrapped),
            Err(VaultError::AuthFailure)
        ));
    }

    #[test]
    fn tampering_is_the_same_failure_as_a_wrong_key() {
        let dek = Dek::generate().unwrap();
        let k = kek("pw");

        let mut bad_iv = wrap(&k, &dek).unwrap();
        bad_iv.iv[3] ^= 0xff;
        let mut bad_ct = wrap(&k, &dek).unwrap();
        bad_ct.ciphertext[0] ^= 0x01;
        let mut truncated = wrap(&k, &dek).unwrap();
        truncated.iv.truncate(4);

        for wrapped in [bad_iv, bad_ct, truncated] {
            assert!(matches!(unwrap(&k, &wrapped), Err(VaultError::AuthFailure)));
        }
    }

    #[test]
    fn wrong_length_plaintext_is_auth_failure() {
        let k = kek("pw");
        let (iv, ciphertext) = crypto::encrypt(&[1u8; 16], k.as_bytes()).unwrap();
        let wrapped = WrappedKey {
            iv: iv.to_vec(),
            ciphertext,
        };
        assert!(matches!(unwrap(&k, &wrapped), Err(VaultError::AuthFailure)));
    }
}
