//! Title normalization
//!
//! Pure functions turning noisy catalog titles into comparable keys:
//! grouping keys for identity resolution, console families and URL slugs.

use regex::Regex;
use std::sync::OnceLock;

use crate::utils::normalize_whitespace;

/// Region vocabulary shared with the classifier (lower-case, word matched)
pub(crate) const REGION_TOKENS: &[&str] = &[
    "pal", "ntsc", "ntsc-u", "ntsc-j", "ntscj", "jp", "jpn", "jap", "japan", "japanese",
    "import", "eur", "euro",
];

fn bracketed_region_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternatives = REGION_TOKENS.join("|");
        Regex::new(&format!(
            r"(?i)[\(\[]\s*(?:{alternatives})(?:\s*(?:version|import|only))?\s*[\)\]]"
        ))
        .expect("Invalid regex pattern")
    })
}

fn bare_region_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // longest alternatives first so "ntsc-j" wins over "ntsc"
        let mut tokens = REGION_TOKENS.to_vec();
        tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
        Regex::new(&format!(r"(?i)(?:^|\s)(?:{})(?:$|\s)", tokens.join("|")))
            .expect("Invalid regex pattern")
    })
}

fn leading_region_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:ntsc-u|ntsc-j|ntsc|pal|jp|jpn|japanese|japan)\s+")
            .expect("Invalid regex pattern")
    })
}

/// Remove bracketed and bare region markers, keeping the rest intact
pub(crate) fn strip_region_markers(text: &str) -> String {
    let without_brackets = bracketed_region_re().replace_all(text, " ");
    // Bare tokens are separated by single spaces; run twice so adjacent
    // tokens ("PAL JP") sharing a separator are both removed.
    let once = bare_region_re().replace_all(&without_brackets, " ");
    let twice = bare_region_re().replace_all(&once, " ");
    normalize_whitespace(&twice)
}

/// Normalize a product name into a grouping key.
///
/// Lower-cases, strips region markers (bracketed or bare), drops every
/// non-alphanumeric character and collapses whitespace. Empty input yields
/// an empty key.
pub fn normalize_name(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let stripped = strip_region_markers(text).to_lowercase();
    let kept: String = stripped
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    normalize_whitespace(&kept)
}

/// Console family for a region-qualified console name.
///
/// `"PAL Nintendo 64"` and `"Nintendo 64"` both map to `"Nintendo 64"`.
pub fn console_family(console_name: &str) -> String {
    let without_prefix = leading_region_re().replace(console_name, "");
    let without_brackets = bracketed_region_re().replace_all(&without_prefix, " ");
    normalize_whitespace(&without_brackets)
}

/// Build a URL slug `{console}-{title}`.
///
/// Both parts are lower-cased, accents are folded, every run of
/// non-alphanumeric characters becomes a single hyphen and edge hyphens are
/// trimmed.
pub fn create_slug(console_family: &str, title: &str) -> String {
    let console = slugify(console_family);
    let title = slugify(title);

    match (console.is_empty(), title.is_empty()) {
        (true, _) => title,
        (_, true) => console,
        _ => format!("{console}-{title}"),
    }
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars().flat_map(char::to_lowercase).map(fold_accent) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_strips_region_markers() {
        assert_eq!(normalize_name("Super Mario 64 (PAL)"), "super mario 64");
        assert_eq!(normalize_name("Super Mario 64 [Import]"), "super mario 64");
        assert_eq!(normalize_name("Super Mario 64 JP"), "super mario 64");
        assert_eq!(normalize_name("Super Mario 64"), "super mario 64");
    }

    #[test]
    fn test_normalize_name_punctuation_and_whitespace() {
        assert_eq!(
            normalize_name("  Zelda:   Ocarina of Time! "),
            "zelda ocarina of time"
        );
        assert_eq!(normalize_name("Final-Fantasy VII"), "finalfantasy vii");
    }

    #[test]
    fn test_normalize_name_keeps_embedded_words() {
        // "Palace" and "Japanese" inside words must survive
        assert_eq!(normalize_name("Palace of Doom"), "palace of doom");
        assert_eq!(normalize_name("Pal Jp"), "");
    }

    #[test]
    fn test_normalize_name_empty() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn test_console_family() {
        assert_eq!(console_family("PAL Nintendo 64"), "Nintendo 64");
        assert_eq!(console_family("JP Sega Saturn"), "Sega Saturn");
        assert_eq!(console_family("Nintendo 64"), "Nintendo 64");
        assert_eq!(console_family("Nintendo 64 (PAL)"), "Nintendo 64");
        assert_eq!(console_family("Famicom"), "Famicom");
    }

    #[test]
    fn test_create_slug() {
        assert_eq!(
            create_slug("Nintendo 64", "Super Mario 64"),
            "nintendo-64-super-mario-64"
        );
        assert_eq!(
            create_slug("  Super Nintendo ", "Zelda -- A Link to the Past!"),
            "super-nintendo-zelda-a-link-to-the-past"
        );
        assert_eq!(create_slug("Game Boy", "Pokémon Rouge"), "game-boy-pokemon-rouge");
        assert_eq!(create_slug("", "Tetris"), "tetris");
    }
}
