//! Quoted/hex-escaped text decoder for message bodies and subjects.
//!
//! Mail bodies arrive with `=XY` escapes for anything outside plain ASCII.
//! Contiguous escapes are gathered into one byte string and decoded as UTF-8
//! so multi-byte characters split across escapes come back whole. Bytes that
//! do not form valid UTF-8 are dropped.
//!
//! A `=` that does not start a two-hex-digit escape is copied through as-is.
//! Encoded mail routinely contains bare `=` signs (soft line breaks, prices,
//! code), and those are kept rather than rejected.

/// Decode `=XY` escape runs in `raw`. Single pass, no backtracking.
pub fn decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut run = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if escape_at(bytes, i).is_none() {
            i += 1;
            continue;
        }

        // `=` is ASCII, so `i` is always a char boundary here.
        out.push_str(&raw[literal_start..i]);
        run.clear();
        while let Some(byte) = escape_at(bytes, i) {
            run.push(byte);
            i += 3;
        }
        for chunk in run.utf8_chunks() {
            out.push_str(chunk.valid());
        }
        literal_start = i;
    }

    out.push_str(&raw[literal_start..]);
    out
}

/// The byte encoded by an `=XY` escape starting at `i`, if there is one.
fn escape_at(bytes: &[u8], i: usize) -> Option<u8> {
    match bytes.get(i..i + 3)? {
        [b'=', hi, lo] if hi.is_ascii_alphanumeric() && lo.is_ascii_alphanumeric() => {
            Some(hex_value(*hi)? << 4 | hex_value(*lo)?)
        }
        _ => None,
    }
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(decode(""), "");
    }

    #[test]
    fn plain_text_is_identity() {
        for text in ["Hello world", "a", "line one\nline two\n", "héllo wörld"] {
            assert_eq!(decode(text), text);
        }
    }

    #[test]
    fn hex_run_decodes() {
        assert_eq!(decode("=48=65=6C=6C=6F"), "Hello");
    }

    #[test]
    fn lowercase_hex_decodes() {
        assert_eq!(decode("=6c=6f"), "lo");
    }

    #[test]
    fn multibyte_character_split_across_escapes() {
        assert_eq!(decode("caf=C3=A9 au lait"), "café au lait");
    }

    #[test]
    fn invalid_utf8_bytes_dropped() {
        assert_eq!(decode("a=FF=41b"), "aAb");
        assert_eq!(decode("x=C3y"), "xy");
    }

    #[test]
    fn bare_equals_preserved() {
        assert_eq!(decode("price = $5"), "price = $5");
        assert_eq!(decode("trailing ="), "trailing =");
        assert_eq!(decode("=4"), "=4");
        assert_eq!(decode("soft=\r\nbreak"), "soft=\r\nbreak");
    }

    #[test]
    fn alphanumeric_non_hex_pair_preserved() {
        assert_eq!(decode("=ZZtop"), "=ZZtop");
        assert_eq!(decode("=41=ZZ"), "A=ZZ");
    }

    #[test]
    fn escaped_equals_sign() {
        assert_eq!(decode("a=3Db"), "a=b");
    }

    #[test]
    fn escapes_between_non_ascii_literals() {
        assert_eq!(decode("héllo =C3=A9 wörld"), "héllo é wörld");
    }

    #[test]
    fn separate_runs_decode_independently() {
        assert_eq!(decode("=48i there, =C3=A9t=C3=A9"), "Hi there, été");
    }
}
