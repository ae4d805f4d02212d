//! Script and code-mixing classification of comment text

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Linguistic category of one comment. Declaration order is report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PureNative,
    MixedLatinNative,
    CodeMixed,
    Empty,
    Plain,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::PureNative,
        Self::MixedLatinNative,
        Self::CodeMixed,
        Self::Empty,
        Self::Plain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PureNative => "pure_native",
            Self::MixedLatinNative => "mixed_latin_native",
            Self::CodeMixed => "code_mixed",
            Self::Empty => "empty",
            Self::Plain => "plain",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Script-mixed or lexically code-mixed
    pub fn is_mixed(self) -> bool {
        matches!(self, Self::MixedLatinNative | Self::CodeMixed)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which categories end up in partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    MixedOnly,
    #[default]
    All,
}

impl SelectionPolicy {
    pub fn keeps(self, category: Category) -> bool {
        match self {
            Self::MixedOnly => category.is_mixed(),
            Self::All => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MixedOnly => "mixed_only",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named Unicode block treated as the native script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeScript {
    pub name: String,
    pub start: u32,
    pub end: u32,
}

impl Default for NativeScript {
    fn default() -> Self {
        Self::tamil()
    }
}

impl NativeScript {
    pub fn tamil() -> Self {
        Self {
            name: "tamil".into(),
            start: 0x0B80,
            end: 0x0BFF,
        }
    }

    pub fn contains(&self, c: char) -> bool {
        (self.start..=self.end).contains(&(c as u32))
    }
}

/// Keywords and phrases that mark romanized code-mixed comments
pub const DEFAULT_CUES: &[&str] = &[
    "super", "thanks", "anna", "video", "bro", "sir", "hi", "hello", "nalla", "thala",
    "varuma", "romba", "semma", "epdi", "keep it up",
];

/// Basic Latin plus the Latin-1 and Extended-A/B letter blocks
fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || (('\u{00C0}'..='\u{024F}').contains(&c) && c.is_alphabetic())
}

/// Build one case-insensitive, word-bounded alternation over all cues.
/// Spaces inside a phrase match any run of whitespace.
fn cue_regex<'a>(cues: impl IntoIterator<Item = &'a str>) -> Result<Regex, regex::Error> {
    let alternation = cues
        .into_iter()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| {
            c.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
}

/// Total, pure text classifier with an attached selection policy
#[derive(Debug, Clone)]
pub struct Classifier {
    script: NativeScript,
    cues: Regex,
    policy: SelectionPolicy,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(NativeScript::default(), &[], SelectionPolicy::default())
            .expect("built-in cues compile")
    }
}

impl Classifier {
    /// `extra_cues` extend [`DEFAULT_CUES`]
    pub fn new(
        script: NativeScript,
        extra_cues: &[String],
        policy: SelectionPolicy,
    ) -> Result<Self, regex::Error> {
        let cues = cue_regex(
            DEFAULT_CUES
                .iter()
                .copied()
                .chain(extra_cues.iter().map(String::as_str)),
        )?;
        Ok(Self {
            script,
            cues,
            policy,
        })
    }

    pub fn classify(&self, text: &str) -> Category {
        let mut any = false;
        let mut native = false;
        let mut latin = false;
        let mut other_letters = false;
        for c in text.chars() {
            if c.is_whitespace() {
                continue;
            }
            any = true;
            if self.script.contains(c) {
                native = true;
            } else if is_latin_letter(c) {
                latin = true;
            } else if c.is_alphabetic() {
                other_letters = true;
            }
        }

        if !any {
            Category::Empty
        } else if native && !latin && !other_letters {
            Category::PureNative
        } else if native && latin {
            Category::MixedLatinNative
        } else if self.cues.is_match(text) {
            Category::CodeMixed
        } else {
            Category::Plain
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn keeps(&self, category: Category) -> bool {
        self.policy.keeps(category)
    }

    pub fn script(&self) -> &NativeScript {
        &self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Category {
        Classifier::default().classify(text)
    }

    #[test]
    fn empty_and_whitespace() {
        assert_eq!(classify(""), Category::Empty);
        assert_eq!(classify("   \t\n "), Category::Empty);
    }

    #[test]
    fn native_only_is_pure() {
        assert_eq!(classify("வணக்கம்"), Category::PureNative);
        assert_eq!(classify("மிக நன்று!! 100%"), Category::PureNative);
    }

    #[test]
    fn one_latin_letter_makes_it_mixed() {
        assert_eq!(classify("வணக்கம் a"), Category::MixedLatinNative);
        assert_eq!(classify("super வீடியோ"), Category::MixedLatinNative);
    }

    #[test]
    fn cues_are_word_bounded_and_case_insensitive() {
        assert_eq!(classify("nalla video bro"), Category::CodeMixed);
        assert_eq!(classify("SEMMA"), Category::CodeMixed);
        assert_eq!(classify("keep   it up"), Category::CodeMixed);
        // "this" contains "hi" but not as a word
        assert_eq!(classify("this is great"), Category::Plain);
    }

    #[test]
    fn punctuation_only_is_plain() {
        assert_eq!(classify("!!! ... 123"), Category::Plain);
        assert_eq!(classify("🔥🔥"), Category::Plain);
    }

    #[test]
    fn native_with_foreign_letters_is_not_pure() {
        assert_eq!(classify("வணக்கம் नमस्ते"), Category::Plain);
    }

    #[test]
    fn extra_cues_extend_defaults() {
        let c = Classifier::new(
            NativeScript::tamil(),
            &["vera level".to_string()],
            SelectionPolicy::All,
        )
        .unwrap();
        assert_eq!(c.classify("Vera Level"), Category::CodeMixed);
        assert_eq!(c.classify("thala"), Category::CodeMixed);
    }

    #[test]
    fn cue_text_is_escaped() {
        let c = Classifier::new(NativeScript::tamil(), &["a.b".to_string()], SelectionPolicy::All)
            .unwrap();
        assert_eq!(c.classify("a.b"), Category::CodeMixed);
        assert_eq!(c.classify("axb"), Category::Plain);
    }

    #[test]
    fn other_script_ranges() {
        let devanagari = NativeScript {
            name: "devanagari".into(),
            start: 0x0900,
            end: 0x097F,
        };
        let c = Classifier::new(devanagari, &[], SelectionPolicy::All).unwrap();
        assert_eq!(c.classify("नमस्ते"), Category::PureNative);
        assert_eq!(c.classify("वணக்கம்"), Category::Plain);
    }

    #[test]
    fn mixed_only_policy_keeps_mixed_categories() {
        let p = SelectionPolicy::MixedOnly;
        assert!(p.keeps(Category::MixedLatinNative));
        assert!(p.keeps(Category::CodeMixed));
        assert!(!p.keeps(Category::PureNative));
        assert!(!p.keeps(Category::Plain));
        assert!(!p.keeps(Category::Empty));
        assert!(Category::ALL.into_iter().all(|c| SelectionPolicy::All.keeps(c)));
    }

    #[test]
    fn category_names_round_trip() {
        for c in Category::ALL {
            assert_eq!(Category::from_name(c.as_str()), Some(c));
        }
        assert_eq!(Category::from_name("nope"), None);
    }
}
