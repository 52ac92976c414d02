//! Outbound text splitting.
//!
//! PRIVMSG/NOTICE bodies that exceed the line byte budget are split
//! into multiple messages: on whitespace where possible, otherwise
//! on character boundaries. Multibyte characters are never split,
//! and lengths are measured in the active text encoding.

fn encoded_char_len(c: char, enc: &'static encoding::Encoding) -> usize {
    let mut buf = [0u8; 4];
    let (bytes, _, _) = enc.encode(c.encode_utf8(&mut buf));
    bytes.len()
}

/// Take one chunk of at most `max_bytes` encoded bytes off `text`.
/// Returns the chunk and the remainder (with one boundary space
/// consumed when the cut landed on whitespace).
fn take_chunk<'a>(
    text: &'a str,
    max_bytes: usize,
    enc: &'static encoding::Encoding,
) -> (&'a str, &'a str) {
    let mut used = 0;
    let mut last_space = None;
    for (i, c) in text.char_indices() {
        let len = encoded_char_len(c, enc);
        if used + len > max_bytes {
            if let Some(space) = last_space {
                return (&text[..space], &text[space + 1..]);
            }
            return (&text[..i], &text[i..]);
        }
        if c == ' ' && i > 0 {
            last_space = Some(i);
        }
        used += len;
    }
    (text, "")
}

/// Split `text` into message-sized chunks of at most `max_bytes`
/// encoded bytes each.
pub fn split_text(text: &str, max_bytes: usize, enc: &'static encoding::Encoding) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let (chunk, next) = take_chunk(rest, max_bytes, enc);
        if chunk.is_empty() {
            // Budget smaller than one character: nothing sane to emit.
            tracing::warn!(max_bytes, "message budget below one character, truncating");
            break;
        }
        chunks.push(chunk.to_owned());
        rest = next.trim_start_matches(' ');
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_text("hello", 100, encoding::UTF_8), ["hello"]);
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(
            split_text("the quick brown fox", 10, encoding::UTF_8),
            ["the quick", "brown fox"]
        );
    }

    #[test]
    fn long_word_splits_on_char_boundary() {
        assert_eq!(
            split_text("abcdefghij", 4, encoding::UTF_8),
            ["abcd", "efgh", "ij"]
        );
    }

    #[test]
    fn multibyte_never_split() {
        // Each ideograph is three UTF-8 bytes; a 4-byte budget fits one.
        assert_eq!(split_text("日本語", 4, encoding::UTF_8), ["日", "本", "語"]);
    }

    #[test]
    fn byte_length_follows_encoding() {
        // In windows-1252 'é' is one byte, so "café au" fits in 7.
        assert_eq!(
            split_text("café au lait", 7, encoding::WINDOWS_1252),
            ["café au", "lait"]
        );
    }

    #[test]
    fn boundary_space_consumed() {
        assert_eq!(split_text("ab cd", 2, encoding::UTF_8), ["ab", "cd"]);
    }
}
