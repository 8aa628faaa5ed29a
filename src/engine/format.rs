//! Extension to codec defaults
//!
//! The output file's extension decides its codec when the caller passes no
//! output options.

use std::path::Path;

/// Lowercased extension of a path, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Default audio codec for an output extension.
///
/// `None` leaves the choice to the engine's own inference.
pub fn codec_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "mp3" => Some("libmp3lame"),
        "wav" => Some("pcm_s16le"),
        "flac" => Some("flac"),
        "ogg" => Some("libvorbis"),
        "opus" => Some("libopus"),
        "m4a" | "aac" => Some("aac"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("mp3", Some("libmp3lame"); "mp3 is lossy lame")]
    #[test_case("wav", Some("pcm_s16le"); "wav is lossless pcm")]
    #[test_case("ogg", Some("libvorbis"); "ogg is vorbis")]
    #[test_case("m4a", Some("aac"); "m4a is aac")]
    #[test_case("mka", None; "unknown is inferred")]
    fn test_codec_for_extension(ext: &str, expected: Option<&str>) {
        assert_eq!(codec_for_extension(ext), expected);
    }

    #[test]
    fn test_extension_is_lowercased() {
        assert_eq!(extension_of(Path::new("/tmp/OUT.MP3")), Some("mp3".to_string()));
        assert_eq!(extension_of(Path::new("/tmp/out")), None);
    }
}
