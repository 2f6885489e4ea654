//! Integration tests covering the round-trip, flush, reset, and checksum
//! guarantees of the writer and reader.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use pgzip::{Reader, Writer};

fn decompress(bytes: &[u8]) -> Vec<u8> {
    let mut reader = Reader::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

fn compress_with(payload: &[u8], level: i32, block_size: usize, blocks: usize) -> Vec<u8> {
    let mut w = Writer::new_with_level(Vec::new(), level).unwrap();
    w.set_concurrency(block_size as i64, blocks as i64).unwrap();
    w.write_all(payload).unwrap();
    w.close().unwrap();
    w.into_inner().unwrap()
}

// Scenario: empty.
#[test]
fn empty_stream_round_trips_to_the_empty_byte_sequence() {
    let mut w = Writer::new(Vec::new());
    w.close().unwrap();
    let out = w.into_inner().unwrap();

    assert_eq!(&out[out.len() - 8..], &[0u8; 8]);
    assert!(decompress(&out).is_empty());
}

// Scenario: metadata round-trip.
#[test]
fn header_metadata_round_trips_exactly() {
    let mut w = Writer::builder()
        .name("name")
        .comment("comment")
        .extra(vec![0x65, 0x78, 0x74, 0x72, 0x61])
        .mod_time(100_000_000)
        .build(Vec::new())
        .unwrap();
    w.write_all(b"payload").unwrap();
    w.close().unwrap();
    let out = w.into_inner().unwrap();

    let reader = Reader::new(std::io::Cursor::new(out.clone())).unwrap();
    let header = reader.first_header();
    assert_eq!(header.name.as_deref(), Some("name"));
    assert_eq!(header.comment.as_deref(), Some("comment"));
    assert_eq!(header.extra.as_deref(), Some(&b"extra"[..]));
    assert_eq!(header.mod_time, 100_000_000);
    drop(reader);

    assert_eq!(decompress(&out), b"payload");
}

// Scenario: flush twice.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn flushing_twice_only_grows_the_sink_on_the_second_flush() {
    let sink = SharedSink::default();
    let mut w = Writer::new(sink.clone());

    w.flush().unwrap();
    let len1 = sink.0.lock().unwrap().len();

    w.write_all(b"x").unwrap();
    let len2 = sink.0.lock().unwrap().len();
    assert_eq!(len1, len2);

    w.flush().unwrap();
    let len3 = sink.0.lock().unwrap().len();
    assert!(len3 > len2);

    w.close().unwrap();
}

// Scenario: concat streams.
#[test]
fn two_sessions_concatenated_decode_as_one_logical_stream() {
    let mut combined = Vec::new();

    let mut w1 = Writer::new(Vec::new());
    w1.write_all(b"hello ").unwrap();
    w1.close().unwrap();
    combined.extend(w1.into_inner().unwrap());

    let mut w2 = Writer::new(Vec::new());
    w2.write_all(b"world\n").unwrap();
    w2.close().unwrap();
    combined.extend(w2.into_inner().unwrap());

    assert_eq!(decompress(&combined), b"hello world\n");
}

// Scenario: large input.
#[test]
fn ten_megabytes_round_trips_exactly_at_level_six() {
    let payload: Vec<u8> = (0..10_000_000)
        .map(|i| b'A' + (i % (b'`' - b'A' + 1) as usize) as u8)
        .collect();

    let out = compress_with(&payload, 6, pgzip::DEFAULT_BLOCK_SIZE, pgzip::DEFAULT_BLOCKS);
    assert_eq!(decompress(&out), payload);
}

// Scenario: reset equivalence.
#[test]
fn reset_then_rewriting_the_same_message_reproduces_the_same_bytes() {
    let mut w = Writer::new(Vec::new());
    w.write_all(b"msg").unwrap();
    w.close().unwrap();
    let buf_a = w.get_ref().unwrap().clone();

    w.reset(Vec::new());
    w.write_all(b"msg").unwrap();
    w.close().unwrap();
    let buf_b = w.into_inner().unwrap();

    assert_eq!(buf_a, buf_b);
}

// Property: round-trip identity, across a spread of configurations.
#[test]
fn round_trips_for_a_range_of_levels_and_block_configs() {
    let payload: Vec<u8> = (0..50_000).map(|i| (i * 7 % 256) as u8).collect();

    for level in [-2, -1, 0, 1, 6, 9] {
        for (block_size, blocks) in [(1024, 1), (1024, 4), (4096, 8)] {
            let out = compress_with(&payload, level, block_size, blocks);
            assert_eq!(
                decompress(&out),
                payload,
                "level={level} block_size={block_size} blocks={blocks}"
            );
        }
    }
}

// Property: size law + CRC law.
#[test]
fn uncompressed_size_and_trailer_reflect_the_full_input() {
    let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);

    let mut w = Writer::new(Vec::new());
    w.write_all(&payload).unwrap();
    w.close().unwrap();
    assert_eq!(w.uncompressed_size(), payload.len() as u64);

    let out = w.into_inner().unwrap();
    let trailer = &out[out.len() - 8..];
    let crc = u32::from_le_bytes(trailer[0..4].try_into().unwrap());
    let isize_ = u32::from_le_bytes(trailer[4..8].try_into().unwrap());

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    assert_eq!(crc, hasher.finalize());
    assert_eq!(isize_ as usize, payload.len());
}

// Property: Latin-1 round-trip.
#[test]
fn latin1_header_fields_round_trip_and_reject_invalid_code_points() {
    let mut w = Writer::builder()
        .name("caf\u{00e9}")
        .build(Vec::new())
        .unwrap();
    w.write_all(b"x").unwrap();
    w.close().unwrap();
    let out = w.into_inner().unwrap();

    let reader = Reader::new(std::io::Cursor::new(out)).unwrap();
    assert_eq!(reader.first_header().name.as_deref(), Some("caf\u{00e9}"));

    assert!(Writer::builder().name("bad\0name").build(Vec::new()).is_err());
    assert!(Writer::builder()
        .name("\u{1f600}")
        .build(Vec::new())
        .is_err());
}

// Property: backpressure law — write never outpaces 2 * blocks in-flight
// buffers; exercised indirectly by forcing many small blocks through a
// narrow worker pool and confirming the output still round-trips.
#[test]
fn narrow_worker_pools_still_round_trip_many_blocks() {
    let payload: Vec<u8> = (0..200_000).map(|i| (i % 250) as u8).collect();
    let out = compress_with(&payload, -1, 512, 1);
    assert_eq!(decompress(&out), payload);
}
