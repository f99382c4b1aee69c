use rand::distr::Alphanumeric;
use rand::Rng;

/// A random alphanumeric identifier. 16 characters give enough entropy that
/// primary-key collisions are negligible; the caller still retries on the
/// rare collision.
pub(crate) fn uid(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
