//! Synthetic payload generation
//!
//! Payloads must defeat naive compression shortcuts without making
//! randomness generation scale with the requested size: small payloads are
//! fully random, larger ones tile a single random 1024-byte block.

use axum::body::{Body, Bytes};
use futures::stream;
use rand::RngCore;

use speedmark_common::RANDOM_BLOCK_LEN;

/// Build a response body of exactly `bytes` length.
///
/// For `bytes <= 1024` the buffer is cryptographically random. Above that,
/// one random block is generated and repeated, so `payload[i] ==
/// payload[i % 1024]` and generation cost stays O(1024) regardless of size.
pub fn synthetic_body(bytes: u64) -> Body {
    if bytes == 0 {
        return Body::empty();
    }

    if bytes <= RANDOM_BLOCK_LEN as u64 {
        let mut buf = vec![0u8; bytes as usize];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        return Body::from(buf);
    }

    let mut block = vec![0u8; RANDOM_BLOCK_LEN];
    rand::rngs::OsRng.fill_bytes(&mut block);
    let block = Bytes::from(block);

    let full_blocks = bytes / RANDOM_BLOCK_LEN as u64;
    let remainder = (bytes % RANDOM_BLOCK_LEN as u64) as usize;

    // Bytes clones are reference-counted, so the stream repeats the one
    // block without copying it per chunk.
    let tail = if remainder > 0 {
        Some(block.slice(..remainder))
    } else {
        None
    };
    let chunks = (0..full_blocks)
        .map(move |_| block.clone())
        .chain(tail)
        .map(Ok::<Bytes, std::convert::Infallible>);

    Body::from_stream(stream::iter(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn collect(body: Body) -> Vec<u8> {
        body.collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn exact_length_for_all_size_classes() {
        for bytes in [0u64, 1, 512, 1024, 1025, 4096, 10_000] {
            let payload = collect(synthetic_body(bytes)).await;
            assert_eq!(payload.len() as u64, bytes, "size {bytes}");
        }
    }

    #[tokio::test]
    async fn small_payloads_are_truly_random() {
        let a = collect(synthetic_body(1024)).await;
        let b = collect(synthetic_body(1024)).await;
        // Identical 1024-byte random buffers are vanishingly unlikely.
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn large_payloads_tile_the_first_block() {
        let payload = collect(synthetic_body(10_000)).await;
        for (i, byte) in payload.iter().enumerate() {
            assert_eq!(*byte, payload[i % RANDOM_BLOCK_LEN], "offset {i}");
        }
    }
}
