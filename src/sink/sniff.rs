//! File type detection from magic numbers.

/// Returns a file extension (without dot) for `bytes`.
///
/// Recognizes JPEG, PNG, PDF, GIF, MP3 (ID3), WAV and ZIP containers;
/// anything else is `bin`.
#[must_use]
pub fn detect_extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => "png",
        [b'%', b'P', b'D', b'F', b'-', ..] => "pdf",
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => "gif",
        [b'I', b'D', b'3', ..] => "mp3",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => "wav",
        // Also covers docx/xlsx/pptx, which are zip containers.
        [b'P', b'K', ..] => "zip",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_signatures() {
        let cases: [(&[u8], &str); 8] = [
            (&[0xFF, 0xD8, 0xFF, 0xE0], "jpg"),
            (&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00], "png"),
            (b"%PDF-1.7", "pdf"),
            (b"GIF87a....", "gif"),
            (b"GIF89a", "gif"),
            (b"ID3\x04", "mp3"),
            (b"RIFF\x24\x08\x00\x00WAVEfmt ", "wav"),
            (b"PK\x03\x04", "zip"),
        ];
        for (bytes, expected) in cases {
            assert_eq!(detect_extension(bytes), expected);
        }
    }

    #[test]
    fn test_truncated_signatures_fall_back() {
        assert_eq!(detect_extension(&[0xFF, 0xD8]), "bin");
        assert_eq!(detect_extension(b"GIF88a"), "bin");
        assert_eq!(detect_extension(b"RIFF\x00\x00\x00\x00AVI "), "bin");
        assert_eq!(detect_extension(&[]), "bin");
    }
}
