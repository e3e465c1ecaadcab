//! The post format recognizer.
//!
//! A candidate post is the raw body of a channel message. Two formats are
//! accepted:
//!
//! - **Format A** (3+ non-blank lines): a configured keyword on the first
//!   line, the code on the second, the link on the third.
//! - **Format B** (2 non-blank lines): the code on the first line, the link
//!   on the second.
//!
//! A code is a single token of word characters, Turkish accented letters, and
//! hyphens. A link is a bare or schemed domain with an optional path. After a
//! structural match, the code and link are screened against the banned-word
//! set; any case-insensitive substring hit rejects the post.
//!
//! `recognize` is pure: it owns no state and has no side effects.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::types::ChannelId;

/// Pattern for a valid code token: word characters, Turkish accented letters,
/// and hyphens, with no whitespace or other punctuation.
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\wÇçĞğİıÖöŞşÜü-]+$").expect("code regex should compile")
});

/// Pattern for a valid link: optional scheme, optional www, at least two
/// hostname segments (alphanumeric with internal hyphens), optional path.
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.)?[a-z0-9][a-z0-9-]*(?:\.[a-z0-9][a-z0-9-]*)+(?:/\S*)?$")
        .expect("link regex should compile")
});

/// Which format variant matched, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFormat {
    /// Keyword line, then code, then link.
    Keyword,
    /// Code, then link.
    Bare,
}

impl fmt::Display for PostFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostFormat::Keyword => write!(f, "keyword+code+link"),
            PostFormat::Bare => write!(f, "code+link"),
        }
    }
}

/// Which field a banned word was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannedField {
    Code,
    Link,
}

impl fmt::Display for BannedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BannedField::Code => write!(f, "code"),
            BannedField::Link => write!(f, "link"),
        }
    }
}

/// Why a message was not recognized as a post.
///
/// Rejections are expected outcomes, not faults: they are logged at
/// informational level and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Fewer than two non-blank lines (including empty or whitespace-only text).
    #[error("too-short")]
    TooShort,

    /// Neither format yielded a structurally valid (code, link) pair.
    #[error("no-match")]
    NoMatch,

    /// A banned word was found in the code or the link.
    #[error("banned:{word}")]
    Banned { word: String, field: BannedField },
}

/// The word sets the recognizer consults. Both sets hold lowercased entries;
/// ordered sets make first-match screening deterministic.
#[derive(Debug, Clone, Default)]
pub struct RecognizerRules {
    pub keywords: BTreeSet<String>,
    pub banned_words: BTreeSet<String>,
}

impl RecognizerRules {
    pub fn new(keywords: BTreeSet<String>, banned_words: BTreeSet<String>) -> Self {
        RecognizerRules {
            keywords,
            banned_words,
        }
    }

    /// Returns the first banned word (in set order) contained in `text`,
    /// case-insensitively.
    fn banned_word_in(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.banned_words
            .iter()
            .find(|word| lower.contains(word.as_str()))
            .map(String::as_str)
    }
}

/// A structurally valid, screened (code, link) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedPost {
    pub code: String,
    pub link: String,
    pub format: PostFormat,
}

impl RecognizedPost {
    /// Attaches the source channel, producing the pipeline's post value.
    pub fn with_source(self, source: ChannelId) -> ParsedPost {
        ParsedPost {
            code: self.code,
            link: self.link,
            format: self.format,
            source,
        }
    }
}

/// A recognized post together with the channel it was observed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPost {
    pub code: String,
    pub link: String,
    pub format: PostFormat,
    pub source: ChannelId,
}

/// Maps a raw message body to a recognized post or a rejection reason.
pub fn recognize(text: &str, rules: &RecognizerRules) -> Result<RecognizedPost, Rejection> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() < 2 {
        return Err(Rejection::TooShort);
    }

    let mut matched: Option<(usize, PostFormat)> = None;

    // Format A: keyword line, then code, then link.
    if lines.len() >= 3
        && rules.keywords.contains(&lines[0].to_lowercase())
        && CODE_RE.is_match(lines[1])
        && LINK_RE.is_match(lines[2])
    {
        matched = Some((1, PostFormat::Keyword));
    }

    // Format B: code, then link.
    if matched.is_none() && CODE_RE.is_match(lines[0]) && LINK_RE.is_match(lines[1]) {
        matched = Some((0, PostFormat::Bare));
    }

    let Some((code_idx, format)) = matched else {
        return Err(Rejection::NoMatch);
    };

    let code = lines[code_idx];
    let link = lines[code_idx + 1];

    if let Some(word) = rules.banned_word_in(code) {
        return Err(Rejection::Banned {
            word: word.to_string(),
            field: BannedField::Code,
        });
    }
    if let Some(word) = rules.banned_word_in(link) {
        return Err(Rejection::Banned {
            word: word.to_string(),
            field: BannedField::Link,
        });
    }

    Ok(RecognizedPost {
        code: code.to_string(),
        link: link.to_string(),
        format,
    })
}
