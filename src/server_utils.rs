use rand::Rng;

use crate::constants::{DEFAULT_DUCKTAG, DUCKTAG_MAX_CHARS, ROOM_ID_ALPHABET, ROOM_ID_LEN};

pub fn sanitize_ducktag(value: Option<&str>) -> String {
    let trimmed = value.unwrap_or_default().trim();
    if trimmed.is_empty() {
        return DEFAULT_DUCKTAG.to_string();
    }
    trimmed.chars().take(DUCKTAG_MAX_CHARS).collect()
}

/// Room ids are typed by hand, so match them case-insensitively.
pub fn normalize_room_id(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

pub fn random_room_id<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_ID_LEN)
        .map(|_| char::from(ROOM_ID_ALPHABET[rng.random_range(0..ROOM_ID_ALPHABET.len())]))
        .collect()
}
