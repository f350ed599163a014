//! Model wrappers (bi-encoder, cross-encoder) and the query-embedding cache.

pub mod biencoder;
pub mod cache;
pub mod crossencoder;

/// Rough characters-per-token budget used when clamping text client-side.
/// The backing model truncates at its token limit anyway; the clamp just
/// keeps request bodies bounded for pathological inputs (minified JS, blobs).
const CHARS_PER_TOKEN: usize = 4;

/// Truncate `text` to at most `max_length * CHARS_PER_TOKEN` bytes, splitting
/// on a UTF-8 char boundary.
pub(crate) fn clamp_for_model(text: &str, max_length: usize) -> &str {
    let max_bytes = max_length * CHARS_PER_TOKEN;
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_short_text_untouched() {
        assert_eq!(clamp_for_model("short", 512), "short");
    }

    #[test]
    fn test_clamp_long_text() {
        let text = "a".repeat(5000);
        assert_eq!(clamp_for_model(&text, 512).len(), 2048);
    }

    #[test]
    fn test_clamp_respects_utf8_boundary() {
        // é is 2 bytes; an odd byte budget must back off to a boundary
        let text = "é".repeat(2000);
        let clamped = clamp_for_model(&text, 512);
        assert!(clamped.len() <= 2048);
        assert!(clamped.len() % 2 == 0);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
