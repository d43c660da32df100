//! Content-addressed hashing and vector byte codecs.

use sha2::{Digest, Sha256};

/// Computes the cache key for a chunk of text.
///
/// The key covers everything that influences the stored vector: the text
/// itself, the embedding model, and the global chunking/preprocess versions.
/// Bumping either version invalidates every cached embedding.
pub fn text_hash(
    text: &str,
    model: &str,
    chunking_version: u32,
    preprocess_version: u32,
    lang: Option<&str>,
) -> String {
    let key = format!(
        "{}|{}|{}|{}|{}",
        text,
        model,
        chunking_version,
        preprocess_version,
        lang.unwrap_or("")
    );
    let digest = Sha256::digest(key.as_bytes());
    hex_encode(&digest)
}

/// Encodes a vector as little-endian f32 bytes for BYTEA storage.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decodes little-endian f32 bytes back into a vector.
///
/// Trailing bytes that do not form a full f32 are ignored.
pub fn bytes_to_vector(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_hash_determinism() {
        let a = text_hash("hello", "text-embedding-3-large", 1, 1, None);
        let b = text_hash("hello", "text-embedding-3-large", 1, 1, None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_text_hash_sensitivity() {
        let base = text_hash("hello", "text-embedding-3-large", 1, 1, None);

        assert_ne!(base, text_hash("hello!", "text-embedding-3-large", 1, 1, None));
        assert_ne!(base, text_hash("hello", "text-embedding-3-small", 1, 1, None));
        assert_ne!(base, text_hash("hello", "text-embedding-3-large", 2, 1, None));
        assert_ne!(base, text_hash("hello", "text-embedding-3-large", 1, 2, None));
        assert_ne!(base, text_hash("hello", "text-embedding-3-large", 1, 1, Some("uk")));
    }

    #[test]
    fn test_vector_round_trip() {
        let v = vec![0.0f32, 1.0, -1.0, 0.123456, f32::MAX, f32::MIN, 1e-9];
        let decoded = bytes_to_vector(&vector_to_bytes(&v));
        assert_eq!(decoded.len(), v.len());
        for (a, b) in v.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-6, "round trip drifted: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_bytes_to_vector_ignores_trailing() {
        let mut bytes = vector_to_bytes(&[1.0, 2.0]);
        bytes.push(0xFF);
        assert_eq!(bytes_to_vector(&bytes), vec![1.0, 2.0]);
    }

    #[test]
    fn test_empty_vector() {
        assert!(vector_to_bytes(&[]).is_empty());
        assert!(bytes_to_vector(&[]).is_empty());
    }
}
