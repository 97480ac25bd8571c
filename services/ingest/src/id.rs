use rand::distributions::Alphanumeric;
use rand::Rng;

/// Prefix of image identifiers.
pub const IMAGE_ID_PREFIX: &str = "img";

/// Random characters in an image identifier.
pub const IMAGE_ID_LENGTH: usize = 10;

/// Generate `{prefix}_{random}` with `random_len` characters from `[A-Za-z0-9]`.
///
/// 62^10 possibilities for image ids; treat as statistically unique.
pub fn generate_id(prefix: &str, random_len: usize) -> String {
    let mut id = String::with_capacity(prefix.len() + 1 + random_len);
    id.push_str(prefix);
    id.push('_');
    id.extend(
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(random_len)
            .map(char::from),
    );
    id
}

/// Generate a fresh image identifier.
pub fn new_image_id() -> String {
    generate_id(IMAGE_ID_PREFIX, IMAGE_ID_LENGTH)
}
