//! Property-based tests for the writer/reader round-trip guarantees, using
//! `proptest` the way `gzp`'s own `test_all_mgzip` test does: small,
//! bounded ranges for `block_size`/`blocks` so cases stay fast, arbitrary
//! payloads for the actual round-trip content.

use std::io::{Read, Write};

use pgzip::{Reader, Writer};
use proptest::prelude::*;

fn decompress(bytes: &[u8]) -> Vec<u8> {
    let mut reader = Reader::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property 1: round-trip identity, for arbitrary payloads and valid
    /// `(level, block_size, blocks)` triples.
    #[test]
    fn round_trip_identity(
        payload in proptest::collection::vec(any::<u8>(), 0..20_000),
        level in prop_oneof![Just(-2), Just(-1), 0..=9],
        block_size in 64usize..4096,
        blocks in 1usize..6,
    ) {
        let mut w = Writer::new_with_level(Vec::new(), level).unwrap();
        w.set_concurrency(block_size as i64, blocks as i64).unwrap();
        w.write_all(&payload).unwrap();
        w.close().unwrap();
        let out = w.into_inner().unwrap();

        prop_assert_eq!(decompress(&out), payload);
    }

    /// Property 2: concatenation of two independent sessions' outputs
    /// decodes to the concatenation of their inputs.
    #[test]
    fn concatenation(
        a in proptest::collection::vec(any::<u8>(), 0..5000),
        b in proptest::collection::vec(any::<u8>(), 0..5000),
    ) {
        let mut wa = Writer::new(Vec::new());
        wa.write_all(&a).unwrap();
        wa.close().unwrap();

        let mut wb = Writer::new(Vec::new());
        wb.write_all(&b).unwrap();
        wb.close().unwrap();

        let mut combined = wa.into_inner().unwrap();
        combined.extend(wb.into_inner().unwrap());

        let mut expected = a.clone();
        expected.extend(b.clone());

        prop_assert_eq!(decompress(&combined), expected);
    }

    /// Property 5: the trailer's CRC-32 and ISIZE reflect the full
    /// uncompressed input.
    #[test]
    fn crc_and_isize_law(payload in proptest::collection::vec(any::<u8>(), 0..20_000)) {
        let mut w = Writer::new(Vec::new());
        w.write_all(&payload).unwrap();
        w.close().unwrap();
        let out = w.into_inner().unwrap();

        let trailer = &out[out.len() - 8..];
        let crc = u32::from_le_bytes(trailer[0..4].try_into().unwrap());
        let isize_ = u32::from_le_bytes(trailer[4..8].try_into().unwrap());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);

        prop_assert_eq!(crc, hasher.finalize());
        prop_assert_eq!(isize_ as u64, payload.len() as u64 % (1u64 << 32));
    }

    /// Property 8: Latin-1 header strings round-trip byte-for-byte.
    #[test]
    fn latin1_round_trip(codes in proptest::collection::vec(0u8..=255, 0..64)) {
        let name: String = codes.iter().map(|&b| b as char).collect();

        let mut w = Writer::builder().name(name.clone()).build(Vec::new()).unwrap();
        w.close().unwrap();
        let out = w.into_inner().unwrap();

        let reader = Reader::new(std::io::Cursor::new(out)).unwrap();
        prop_assert_eq!(reader.first_header().name.as_deref(), Some(name.as_str()));
    }
}
