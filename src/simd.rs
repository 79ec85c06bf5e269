//! Dense vector kernels.
//!
//! With the `innr` feature (default) these are the SIMD-dispatched kernels from
//! the `innr` crate; without it, portable iterator versions are compiled in.
//! For unit-normalized embeddings prefer [`dot`] over [`cosine`].
//!
//! ```rust
//! use geolocus::simd::{cosine, dot, norm};
//!
//! let a = [1.0_f32, 0.0, 0.0];
//! let b = [0.6_f32, 0.8, 0.0];
//!
//! assert!((dot(&a, &b) - 0.6).abs() < 1e-6);
//! assert!((cosine(&a, &b) - 0.6).abs() < 1e-6);
//! assert!((norm(&b) - 1.0).abs() < 1e-6);
//! ```

#[cfg(feature = "innr")]
pub use innr::{cosine, dot, norm};

#[cfg(not(feature = "innr"))]
mod fallback {
    const NORM_EPSILON: f32 = 1e-9;

    /// Dot product of two vectors.
    #[inline]
    #[must_use]
    pub fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    /// L2 norm of a vector.
    #[inline]
    #[must_use]
    pub fn norm(v: &[f32]) -> f32 {
        dot(v, v).sqrt()
    }

    /// Cosine similarity between two vectors. Zero vectors have similarity 0.
    #[inline]
    #[must_use]
    pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let d = dot(a, b);
        let na = norm(a);
        let nb = norm(b);
        if na > NORM_EPSILON && nb > NORM_EPSILON {
            d / (na * nb)
        } else {
            0.0
        }
    }
}

#[cfg(not(feature = "innr"))]
pub use fallback::{cosine, dot, norm};
