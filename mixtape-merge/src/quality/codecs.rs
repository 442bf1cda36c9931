//! Codec and container tables

use crate::models::ContainerFormat;

/// Probed codec names treated as lossless
pub fn is_lossless_codec(codec: &str) -> bool {
    let codec = codec.to_ascii_lowercase();
    matches!(codec.as_str(), "flac" | "alac") || codec.starts_with("pcm_")
}

/// Transcoder encoder used for a container
pub fn encoder_for(container: ContainerFormat) -> &'static str {
    match container {
        ContainerFormat::Mp3 => "libmp3lame",
        ContainerFormat::M4a => "aac",
        ContainerFormat::Wav => "pcm_s16le",
        ContainerFormat::Flac => "flac",
        ContainerFormat::Ogg => "libvorbis",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lossless_set() {
        assert!(is_lossless_codec("flac"));
        assert!(is_lossless_codec("ALAC"));
        assert!(is_lossless_codec("pcm_s16le"));
        assert!(is_lossless_codec("pcm_f32le"));
        assert!(!is_lossless_codec("mp3"));
        assert!(!is_lossless_codec("aac"));
        assert!(!is_lossless_codec("vorbis"));
    }

    #[test]
    fn test_encoder_table() {
        assert_eq!(encoder_for(ContainerFormat::Mp3), "libmp3lame");
        assert_eq!(encoder_for(ContainerFormat::M4a), "aac");
        assert_eq!(encoder_for(ContainerFormat::Wav), "pcm_s16le");
        assert_eq!(encoder_for(ContainerFormat::Flac), "flac");
        assert_eq!(encoder_for(ContainerFormat::Ogg), "libvorbis");
    }
}
