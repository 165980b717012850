//! Property-based tests for the NaCl primitives.
//!
//! These verify the protocol's universal invariants for arbitrary
//! inputs: envelope roundtrips, keypair derivation purity, and the
//! timestamped nonce layout.

use proptest::prelude::*;

use crate::{
    box_encrypt, box_open, h2, make_nonce_at, secretbox, secretbox_open, Keys, SecretKey,
    SecretboxKey,
};

proptest! {
    /// `box_open(box(m)) == m` across the pair of keypairs.
    #[test]
    fn box_roundtrip(plaintext: Vec<u8>) {
        let alice = Keys::generate();
        let bob = Keys::generate();
        let nonce = make_nonce_at(1_700_000_000, None).unwrap();

        let ctext = box_encrypt(&plaintext, &nonce, &bob.public_key, &alice.secret_key).unwrap();
        let opened = box_open(&ctext, &nonce, &alice.public_key, &bob.secret_key).unwrap();
        prop_assert_eq!(plaintext, opened);
    }

    /// `secretbox_open(secretbox(m)) == m`.
    #[test]
    fn secretbox_roundtrip(plaintext: Vec<u8>) {
        let key = SecretboxKey::generate().unwrap();
        let nonce = make_nonce_at(1_700_000_000, None).unwrap();

        let ctext = secretbox(&plaintext, &nonce, &key).unwrap();
        let opened = secretbox_open(&ctext, &nonce, &key).unwrap();
        prop_assert_eq!(plaintext, opened);
    }

    /// Flipping any ciphertext byte breaks authentication.
    #[test]
    fn secretbox_rejects_bitflips(
        plaintext in prop::collection::vec(any::<u8>(), 1..64),
        flip in any::<prop::sample::Index>(),
    ) {
        let key = SecretboxKey::generate().unwrap();
        let nonce = make_nonce_at(1_700_000_000, None).unwrap();

        let mut ctext = secretbox(&plaintext, &nonce, &key).unwrap();
        let at = flip.index(ctext.len());
        ctext[at] ^= 0x01;
        prop_assert!(secretbox_open(&ctext, &nonce, &key).is_err());
    }

    /// Rebuilding a keypair from its secret half recovers the public half.
    #[test]
    fn keypair_from_secret_recovers_public(raw: [u8; 32]) {
        let keys = Keys::from_secret_key(SecretKey::from_bytes(&raw).unwrap());
        let again = Keys::from_secret_key(SecretKey::from_bytes(&raw).unwrap());
        prop_assert_eq!(keys.public_key, again.public_key);
    }

    /// Seed derivation is a pure function of the seed.
    #[test]
    fn keypair_from_seed_is_pure(seed: Vec<u8>) {
        let a = Keys::from_seed(&seed);
        let b = Keys::from_seed(&seed);
        prop_assert_eq!(a.public_key, b.public_key);
        prop_assert_eq!(a.secret_key.as_bytes(), b.secret_key.as_bytes());
    }

    /// `h2` is deterministic and 32 bytes wide.
    #[test]
    fn h2_is_pure(data: Vec<u8>) {
        prop_assert_eq!(h2(&data), h2(&data));
        prop_assert_eq!(h2(&data).len(), 32);
    }

    /// The nonce header decodes back to the timestamp and extra value.
    #[test]
    fn nonce_header_layout(secs in 0u64..=u32::MAX as u64 * 2, extra: u32) {
        let plain = make_nonce_at(secs, None).unwrap();
        prop_assert_eq!(plain.timestamp(), secs);

        let tagged = make_nonce_at(secs, Some(extra)).unwrap();
        prop_assert_eq!(tagged.timestamp(), secs);
        prop_assert_eq!(&tagged.as_bytes()[8..12], &extra.to_be_bytes());
    }
}
