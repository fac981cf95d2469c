//! Object names for generated images.

use chrono::{DateTime, Utc};

/// How much of the prompt feeds into a derived name.
const PROMPT_PREFIX_CHARS: usize = 20;

const EXTENSION: &str = ".png";

/// Build the object name for a generated image.
///
/// The base is a slug of the caller's filename when one is given, otherwise of the first 20
/// characters of the prompt. Letters, digits, `_`, `-` and whitespace survive, whitespace runs
/// become `_`, and everything is lower-cased, so the name never contains path separators or dot
/// segments. A second-precision UTC timestamp is always appended, so the same prompt yields a
/// different name every second.
pub fn object_name(prompt: &str, filename: Option<&str>, now: DateTime<Utc>) -> String {
    let supplied = filename
        .map(str::trim)
        .map(|f| f.strip_suffix(EXTENSION).unwrap_or(f))
        .filter(|f| !f.is_empty());

    let base = match supplied {
        Some(f) => slug(f.chars()),
        None => slug(prompt.chars().take(PROMPT_PREFIX_CHARS)),
    };

    format!("{}_{}{}", base, now.format("%Y%m%d%H%M%S"), EXTENSION)
}

fn slug(chars: impl Iterator<Item = char>) -> String {
    let kept: String = chars
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let slug = kept.split_whitespace().collect::<Vec<_>>().join("_").to_lowercase();
    if slug.is_empty() { "image".to_string() } else { slug }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, secs).unwrap()
    }

    #[test]
    fn test_derived_from_prompt() {
        assert_eq!(
            object_name("A Cat, wearing a HAT! on the moon", None, at(53)),
            "a_cat_wearing_a_hat_20250314092653.png"
        );
    }

    #[test]
    fn test_only_first_twenty_chars_count() {
        let name = object_name("abcdefghijklmnopqrstuvwxyz", None, at(0));
        assert_eq!(name, "abcdefghijklmnopqrst_20250314092600.png");
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        assert_eq!(object_name("  red\t\tfox   -  x ", None, at(1)), "red_fox_-_x_20250314092601.png");
    }

    #[test]
    fn test_symbol_only_prompt_falls_back() {
        assert_eq!(object_name("!!! ??? ***", None, at(2)), "image_20250314092602.png");
    }

    #[test]
    fn test_supplied_filename_is_used() {
        assert_eq!(object_name("ignored", Some(" sunset "), at(3)), "sunset_20250314092603.png");
        assert_eq!(object_name("ignored", Some("sunset.png"), at(3)), "sunset_20250314092603.png");
    }

    #[test]
    fn test_supplied_filename_cannot_escape_the_bucket_root() {
        assert_eq!(object_name("ignored", Some("../x"), at(6)), "x_20250314092606.png");
        assert_eq!(object_name("ignored", Some("a/./b"), at(6)), "ab_20250314092606.png");
        assert_eq!(
            object_name("a fox", Some("../other-bucket/fox"), at(6)),
            "other-bucketfox_20250314092606.png"
        );
        assert_eq!(object_name("a fox", Some(".."), at(6)), "image_20250314092606.png");
    }

    #[test]
    fn test_long_filename_is_kept_whole() {
        assert_eq!(
            object_name("ignored", Some("My Holiday Photo From The Beach"), at(7)),
            "my_holiday_photo_from_the_beach_20250314092607.png"
        );
    }

    #[test]
    fn test_blank_filename_derives_from_prompt() {
        assert_eq!(object_name("Sunset", Some("   "), at(4)), "sunset_20250314092604.png");
    }

    #[test]
    fn test_deterministic_within_a_second_and_distinct_across_seconds() {
        let prompt = "Mountains at dawn";
        assert_eq!(object_name(prompt, None, at(10)), object_name(prompt, None, at(10)));
        assert_ne!(object_name(prompt, None, at(10)), object_name(prompt, None, at(11)));
    }

    #[test]
    fn test_unicode_letters_survive() {
        assert_eq!(object_name("Café Ñandú", None, at(5)), "café_ñandú_20250314092605.png");
    }
}
