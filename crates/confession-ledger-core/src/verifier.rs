//! Signature verification for admission.

use crate::crypto::{recover_identity, Identity, RecoverableSignature};

/// Recovers the identity behind a `personal_sign` signature.
///
/// Stateless. Comparing the recovered identity against the one a caller
/// claims is left to the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureVerifier;

impl SignatureVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Recover the signer of `message`, or `None` if the signature is
    /// malformed or does not recover.
    pub fn verify(&self, message: &[u8], signature: &RecoverableSignature) -> Option<Identity> {
        recover_identity(message, signature)
    }

    /// Like [`verify`](Self::verify), accepting the hex signature text a
    /// client sends.
    pub fn verify_hex(&self, message: &[u8], signature_hex: &str) -> Option<Identity> {
        let signature = RecoverableSignature::from_hex(signature_hex).ok()?;
        self.verify(message, &signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn test_verify_recovers_signer() {
        let keypair = Keypair::from_secret(&[0x07; 32]).unwrap();
        let signature = keypair.sign(b"confession").unwrap();
        let verifier = SignatureVerifier::new();

        assert_eq!(verifier.verify(b"confession", &signature), Some(keypair.identity()));
        assert_ne!(verifier.verify(b"confessions", &signature), Some(keypair.identity()));
    }

    #[test]
    fn test_verify_hex() {
        let keypair = Keypair::from_secret(&[0x07; 32]).unwrap();
        let signature = keypair.sign(b"hex").unwrap();
        let verifier = SignatureVerifier::new();

        let hex = signature.to_hex();
        assert_eq!(verifier.verify_hex(b"hex", &hex), Some(keypair.identity()));
        assert_eq!(
            verifier.verify_hex(b"hex", hex.trim_start_matches("0x")),
            Some(keypair.identity())
        );
        assert_eq!(verifier.verify_hex(b"hex", "0xzz"), None);
        assert_eq!(verifier.verify_hex(b"hex", "0x1234"), None);
    }
}
