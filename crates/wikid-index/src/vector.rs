//! Vector blobs and cosine geometry.
//!
//! Vectors are stored as native-endian `f32` blobs, the layout the
//! `sqlite-vec` `vec0` tables read and return.

use zerocopy::IntoBytes;

/// Convert a vector to its blob form.
pub(crate) fn to_blob(vector: &[f32]) -> Vec<u8> {
    vector.as_bytes().to_vec()
}

/// Convert a blob back to a vector.
pub(crate) fn from_blob(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Cosine similarity in [-1, 1]. Zero when either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let denominator = norm(a) * norm(b);
    if denominator > 0.0 {
        (dot(a, b) / denominator).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Cosine distance (`1 - similarity`), the metric of the index.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
