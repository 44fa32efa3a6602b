//! Fixed field obfuscation used by the frame format.
//!
//! Text fields are run through a substitution table over the 62-symbol
//! alphabet `[a-zA-Z0-9]`; numeric fields are shifted by `25 * index`, where
//! `index` is the record's position in its batch.  Neither transform is a
//! security boundary: the table is fixed for every session and is shipped
//! with every client.
//!
//! | Class     | Forward map                 |
//! |-----------|-----------------------------|
//! | `a`..`z`  | rotate forward 12 (`a→m`)   |
//! | `A`..`Z`  | rotate forward 13 (`A→N`)   |
//! | `0`..`9`  | `(d + 5) mod 10`            |
//!
//! Decoding never recomputes the rotation: the inverse table is derived
//! from the forward table once, at compile time, and looked up per char.

/// Offset applied per batch position to every numeric field.
pub const INDEX_SCALE: f64 = 25.0;

const fn forward_table() -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut c = 0;
    while c < 128 {
        table[c] = c as u8;
        c += 1;
    }
    let mut i = 0;
    while i < 26 {
        table[b'a' as usize + i] = b'a' + ((i + 12) % 26) as u8;
        table[b'A' as usize + i] = b'A' + ((i + 13) % 26) as u8;
        i += 1;
    }
    let mut d = 0;
    while d < 10 {
        table[b'0' as usize + d] = b'0' + ((d + 5) % 10) as u8;
        d += 1;
    }
    table
}

const fn invert(forward: &[u8; 128]) -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut c = 0;
    while c < 128 {
        table[forward[c] as usize] = c as u8;
        c += 1;
    }
    table
}

const FORWARD: [u8; 128] = forward_table();
const INVERSE: [u8; 128] = invert(&FORWARD);

fn map_char(table: &[u8; 128], ch: char) -> char {
    if ch.is_ascii_alphanumeric() {
        table[ch as usize] as char
    } else {
        ch
    }
}

/// Obfuscate plaintext the way the server does.
pub fn encode_text(s: &str) -> String {
    s.chars().map(|ch| map_char(&FORWARD, ch)).collect()
}

/// Recover plaintext from an obfuscated string field.
pub fn decode_text(s: &str) -> String {
    s.chars().map(|ch| map_char(&INVERSE, ch)).collect()
}

pub fn encode_number(value: f64, index: usize) -> f64 {
    value + INDEX_SCALE * index as f64
}

pub fn decode_number(value: f64, index: usize) -> f64 {
    value - INDEX_SCALE * index as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    #[test]
    fn forward_table_matches_wire_samples() {
        assert_eq!(encode_text("a"), "m");
        assert_eq!(encode_text("o"), "a");
        assert_eq!(encode_text("z"), "l");
        assert_eq!(encode_text("A"), "N");
        assert_eq!(encode_text("Z"), "M");
        assert_eq!(encode_text("0"), "5");
        assert_eq!(encode_text("9"), "4");
        assert_eq!(encode_text("S"), "F");
    }

    #[test]
    fn full_alphabet_roundtrips() {
        assert_eq!(decode_text(&encode_text(ALPHABET)), ALPHABET);
        // And in the other direction, since the table is a bijection.
        assert_eq!(encode_text(&decode_text(ALPHABET)), ALPHABET);
    }

    #[test]
    fn table_is_a_permutation_of_the_alphabet() {
        let mut encoded: Vec<char> = encode_text(ALPHABET).chars().collect();
        encoded.sort_unstable();
        let mut expected: Vec<char> = ALPHABET.chars().collect();
        expected.sort_unstable();
        assert_eq!(encoded, expected);
    }

    #[test]
    fn unmapped_characters_pass_through() {
        assert_eq!(decode_text("_-. :/"), "_-. :/");
        assert_eq!(decode_text("héllo✓"), "vézzc✓");
        assert_eq!(decode_text(""), "");
    }

    #[test]
    fn decode_number_inverts_encode() {
        for i in 0..50 {
            for v in [-1000.0, -1.5, 0.0, 42.0, 123_456.0] {
                assert_eq!(decode_number(encode_number(v, i), i), v);
            }
        }
    }

    #[test]
    fn double_decode_only_idempotent_at_index_zero() {
        let v = 700.0;
        assert_eq!(decode_number(decode_number(v, 0), 0), decode_number(v, 0));
        for i in 1..10 {
            assert_ne!(decode_number(decode_number(v, i), i), decode_number(v, i));
        }
    }
}
