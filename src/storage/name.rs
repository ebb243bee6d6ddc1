//! Filename sanitization, collision suffixes, and output-name assembly.

use crate::extract::ContainerFormat;
use crate::parser::VideoId;

/// Fallback stem when sanitization leaves nothing usable.
const FALLBACK_STEM: &str = "video";

/// Strips characters illegal on common filesystems and collapses runs of
/// whitespace (and other stripped characters) into single underscores.
///
/// Allow-list: alphanumerics, `-`, `_`, `.`. Everything else maps to an
/// underscore, consecutive underscores collapse, and leading/trailing
/// underscores are trimmed.
pub(crate) fn sanitize_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            c if c.is_alphanumeric() || matches!(c, '-' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// Sanitizes a full logical filename, preserving its extension.
pub(crate) fn sanitize_logical_name(name: &str) -> String {
    let (stem, ext) = split_extension(name);
    let stem = sanitize_component(stem);
    let stem = if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    };
    format!("{stem}{ext}")
}

/// Splits `name` into stem and extension (extension includes the dot, and
/// is empty when there is none or the name starts with the only dot).
pub(crate) fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

/// Appends a numeric collision suffix before the extension:
/// `clip.mp4` with suffix 2 becomes `clip_2.mp4`.
pub(crate) fn with_suffix(name: &str, suffix: u64) -> String {
    let (stem, ext) = split_extension(name);
    format!("{stem}_{suffix}{ext}")
}

/// Builds the output filename for a media item, applied once at
/// allocation: `<title>_<identifier>.<ext>`.
///
/// The sanitized title is truncated so the whole name fits `max_len`
/// characters; the identifier and extension always survive intact.
#[must_use]
pub fn build_output_name(
    title: &str,
    id: &VideoId,
    container: ContainerFormat,
    max_len: usize,
) -> String {
    let tail = format!("_{}{}", id, container.extension());
    let budget = max_len.saturating_sub(tail.chars().count());

    let mut stem: String = sanitize_component(title).chars().take(budget).collect();
    let trimmed = stem.trim_matches('_');
    if trimmed.len() != stem.len() {
        stem = trimmed.to_string();
    }
    if stem.is_empty() {
        stem = FALLBACK_STEM.chars().take(budget.max(1)).collect();
    }

    format!("{stem}{tail}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id() -> VideoId {
        VideoId::parse("dQw4w9WgXcQ").unwrap()
    }

    // ==================== Sanitization Tests ====================

    #[test]
    fn test_sanitize_strips_illegal_characters() {
        assert_eq!(sanitize_component(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_sanitize_collapses_whitespace_runs() {
        assert_eq!(sanitize_component("My   Great\t\tVideo"), "My_Great_Video");
    }

    #[test]
    fn test_sanitize_trims_edge_underscores() {
        assert_eq!(sanitize_component("  spaced out  "), "spaced_out");
    }

    #[test]
    fn test_sanitize_keeps_unicode_alphanumerics() {
        assert_eq!(sanitize_component("café 北京"), "café_北京");
    }

    #[test]
    fn test_sanitize_logical_name_preserves_extension() {
        assert_eq!(sanitize_logical_name("my clip!.mp4"), "my_clip.mp4");
    }

    #[test]
    fn test_sanitize_logical_name_empty_stem_falls_back() {
        assert_eq!(sanitize_logical_name("???.mp4"), "video.mp4");
    }

    // ==================== Suffix Tests ====================

    #[test]
    fn test_with_suffix_before_extension() {
        assert_eq!(with_suffix("clip.mp4", 2), "clip_2.mp4");
        assert_eq!(with_suffix("clip.mp4", 10), "clip_10.mp4");
    }

    #[test]
    fn test_with_suffix_no_extension() {
        assert_eq!(with_suffix("clip", 3), "clip_3");
    }

    #[test]
    fn test_split_extension_hidden_file() {
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
    }

    // ==================== Output Name Tests ====================

    #[test]
    fn test_output_name_shape() {
        let name = build_output_name("Never Gonna Give", &id(), ContainerFormat::Mp4, 100);
        assert_eq!(name, "Never_Gonna_Give_dQw4w9WgXcQ.mp4");
    }

    #[test]
    fn test_output_name_respects_container() {
        let name = build_output_name("clip", &id(), ContainerFormat::Webm, 100);
        assert!(name.ends_with(".webm"));
    }

    #[test]
    fn test_output_name_truncates_long_title() {
        let title = "x".repeat(500);
        let name = build_output_name(&title, &id(), ContainerFormat::Mp4, 100);
        assert!(name.chars().count() <= 100, "len {}", name.chars().count());
        assert!(name.ends_with("_dQw4w9WgXcQ.mp4"));
    }

    #[test]
    fn test_output_name_blank_title_falls_back() {
        let name = build_output_name("   ", &id(), ContainerFormat::Mp4, 100);
        assert_eq!(name, "video_dQw4w9WgXcQ.mp4");
    }
}
