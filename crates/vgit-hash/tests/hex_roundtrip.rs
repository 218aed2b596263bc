use proptest::prelude::*;
use vgit_hash::{hex, Hasher, ObjectId};

proptest! {
    #[test]
    fn hex_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 20)) {
        let oid = ObjectId::from_bytes(&bytes).unwrap();
        let parsed = ObjectId::from_hex(&oid.to_hex()).unwrap();
        prop_assert_eq!(oid, parsed);
        prop_assert_eq!(parsed.as_bytes(), &bytes[..]);
    }

    #[test]
    fn encode_is_lowercase_and_decodable(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let encoded = hex::hex_encode(&bytes);
        prop_assert_eq!(encoded.len(), bytes.len() * 2);
        prop_assert!(encoded.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let mut decoded = vec![0u8; bytes.len()];
        hex::hex_decode(&encoded, &mut decoded).unwrap();
        prop_assert_eq!(decoded, bytes);
    }

    #[test]
    fn digest_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let a = Hasher::digest(&data).unwrap();
        let b = Hasher::digest(&data).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn object_framing_distinguishes_types(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let blob = Hasher::hash_object("blob", &data).unwrap();
        let commit = Hasher::hash_object("commit", &data).unwrap();
        prop_assert_ne!(blob, commit);
    }
}
