//! # Payment notification signatures
//!
//! The payment gateway signs every notification it sends with the tenant's server key. The signature is the lowercase
//! hex encoding of
//!
//! ```text
//!    SHA512(order_id + status_code + gross_amount + server_key)
//! ```
//!
//! where the fields are concatenated exactly as they appear in the notification body, with no separators.
use sha2::{digest::Output, Digest, Sha512};
use subtle::ConstantTimeEq;

/// Calculates the signature the gateway would send for the given notification fields.
pub fn calculate_notification_signature(
    order_reference: &str,
    status_code: &str,
    gross_amount: &str,
    secret: &str,
) -> String {
    hex::encode(notification_digest(order_reference, status_code, gross_amount, secret))
}

fn notification_digest(order_reference: &str, status_code: &str, gross_amount: &str, secret: &str) -> Output<Sha512> {
    let mut hasher = Sha512::new();
    hasher.update(order_reference.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(secret.as_bytes());
    hasher.finalize()
}

/// Checks `signature` against the expected digest in constant time. Hex of either case is accepted; anything that is
/// not 64 bytes of hex fails.
pub fn verify_notification_signature(
    signature: &str,
    order_reference: &str,
    status_code: &str,
    gross_amount: &str,
    secret: &str,
) -> bool {
    let Ok(given) = hex::decode(signature.trim()) else {
        return false;
    };
    let expected = notification_digest(order_reference, status_code, gross_amount, secret);
    bool::from(given.as_slice().ct_eq(expected.as_slice()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_signature() {
        let sig = calculate_notification_signature("INV-1001", "200", "150000.00", "SB-Mid-server-key");
        assert_eq!(sig.len(), 128);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // Same inputs, same digest
        assert_eq!(sig, calculate_notification_signature("INV-1001", "200", "150000.00", "SB-Mid-server-key"));
    }

    #[test]
    fn empty_input_digest() {
        // SHA-512 of the empty string
        assert_eq!(
            calculate_notification_signature("", "", "", ""),
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        );
    }

    #[test]
    fn verification() {
        let sig = calculate_notification_signature("INV-1001", "200", "150000.00", "key");
        assert!(verify_notification_signature(&sig, "INV-1001", "200", "150000.00", "key"));
        assert!(verify_notification_signature(&sig.to_uppercase(), "INV-1001", "200", "150000.00", "key"));
        assert!(!verify_notification_signature(&sig, "INV-1001", "200", "150001.00", "key"));
        assert!(!verify_notification_signature(&sig, "INV-1001", "200", "150000.00", "other-key"));
        assert!(!verify_notification_signature("", "INV-1001", "200", "150000.00", "key"));
    }

    #[test]
    fn malformed_signatures_fail() {
        let sig = calculate_notification_signature("INV-1001", "200", "150000.00", "key");
        assert!(verify_notification_signature(&format!(" {sig}\n"), "INV-1001", "200", "150000.00", "key"));
        // Truncated, extended, odd-length and non-hex
        assert!(!verify_notification_signature(&sig[..126], "INV-1001", "200", "150000.00", "key"));
        assert!(!verify_notification_signature(&format!("{sig}00"), "INV-1001", "200", "150000.00", "key"));
        assert!(!verify_notification_signature(&sig[..127], "INV-1001", "200", "150000.00", "key"));
        let garbled = format!("zz{}", &sig[2..]);
        assert!(!verify_notification_signature(&garbled, "INV-1001", "200", "150000.00", "key"));
    }
}
