//! Recursive, language-aware character splitting.
//!
//! Text is cut at the first separator of a cascade that occurs in it; the
//! separator stays attached to the start of the following piece so pieces
//! concatenate back to the input. Small pieces are merged greedily into
//! windows of at most `chunk_size` characters, each window seeding the next
//! with up to `chunk_overlap` characters of whole trailing pieces. Pieces
//! that are too large are split again with the rest of the cascade.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::ops::Range;

/// Any ATX heading level, `#` through `######`. Matched as a pattern.
pub const MARKDOWN_HEADING: &str = "\n#{1,6} ";

static HEADING: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(MARKDOWN_HEADING).ok());

/// Paragraphs, lines, words, characters.
pub const FALLBACK_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

const PYTHON: &[&str] = &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""];
const JS: &[&str] = &[
    "\nfunction ", "\nconst ", "\nlet ", "\nvar ", "\nclass ", "\nif ", "\nfor ", "\nwhile ",
    "\nswitch ", "\ncase ", "\ndefault ", "\n\n", "\n", " ", "",
];
const TS: &[&str] = &[
    "\nenum ", "\ninterface ", "\nnamespace ", "\ntype ", "\nclass ", "\nfunction ", "\nconst ",
    "\nlet ", "\nvar ", "\nif ", "\nfor ", "\nwhile ", "\nswitch ", "\ncase ", "\ndefault ",
    "\n\n", "\n", " ", "",
];
const JAVA: &[&str] = &[
    "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ", "\nfor ",
    "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
];
const GO: &[&str] = &[
    "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ", "\ncase ", "\n\n",
    "\n", " ", "",
];
const RUST: &[&str] = &[
    "\nfn ", "\nconst ", "\nlet ", "\nif ", "\nwhile ", "\nfor ", "\nloop ", "\nmatch ", "\n\n",
    "\n", " ", "",
];
const CPP: &[&str] = &[
    "\nclass ", "\nvoid ", "\nint ", "\nfloat ", "\ndouble ", "\nif ", "\nfor ", "\nwhile ",
    "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
];
const RUBY: &[&str] = &[
    "\ndef ", "\nclass ", "\nif ", "\nunless ", "\nwhile ", "\nfor ", "\ndo ", "\nbegin ",
    "\nrescue ", "\n\n", "\n", " ", "",
];
const PHP: &[&str] = &[
    "\nfunction ", "\nclass ", "\nif ", "\nforeach ", "\nwhile ", "\ndo ", "\nswitch ", "\ncase ",
    "\n\n", "\n", " ", "",
];
const SWIFT: &[&str] = &[
    "\nfunc ", "\nclass ", "\nstruct ", "\nenum ", "\nif ", "\nfor ", "\nwhile ", "\ndo ",
    "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
];
const MARKDOWN: &[&str] = &[
    MARKDOWN_HEADING, "```\n", "\n***\n", "\n---\n", "\n___\n", "\n\n", "\n", " ", "",
];
const HTML: &[&str] = &[
    "<body", "<div", "<p", "<br", "<li", "<h1", "<h2", "<h3", "<h4", "<h5", "<h6", "<span",
    "<table", "<tr", "<td", "<th", "<ul", "<ol", "<header", "<footer", "<nav", "<head", "<style",
    "<script", "<meta", "<title", "",
];

/// Separator cascade for a language label, syntax-aware where one is known.
pub fn separators_for(language: &str) -> &'static [&'static str] {
    match language {
        "python" => PYTHON,
        "javascript" | "jsx" => JS,
        "typescript" | "tsx" => TS,
        "java" => JAVA,
        "go" => GO,
        "rust" => RUST,
        "c" | "cpp" => CPP,
        "ruby" => RUBY,
        "php" => PHP,
        "swift" => SWIFT,
        "markdown" => MARKDOWN,
        "html" => HTML,
        _ => FALLBACK_SEPARATORS,
    }
}

/// Window size and overlap, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1500, chunk_overlap: 200 }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn heading(separator: &str) -> Option<&'static Regex> {
    if separator == MARKDOWN_HEADING { HEADING.as_ref() } else { None }
}

fn occurs(text: &str, separator: &str) -> bool {
    match heading(separator) {
        Some(re) => re.is_match(text),
        None => text.contains(separator),
    }
}

/// Splits `text` before every occurrence of `separator`; an empty separator
/// yields one piece per character. Returned ranges are contiguous.
fn split_keep_start(text: &str, separator: &str) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| i..i + c.len_utf8()).collect();
    }
    let starts: Vec<usize> = match heading(separator) {
        Some(re) => re.find_iter(text).map(|m| m.start()).collect(),
        None => text.match_indices(separator).map(|(i, _)| i).collect(),
    };
    let mut bounds: Vec<usize> = vec![0];
    bounds.extend(starts.into_iter().filter(|&i| i > 0));
    bounds.push(text.len());
    bounds.windows(2).map(|w| w[0]..w[1]).filter(|r| !r.is_empty()).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    config: ChunkingConfig,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Byte ranges of the chunks of `text`, in document order.
    pub fn split_spans(&self, text: &str, language: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        self.split_recursive(text, 0, separators_for(language), &mut out);
        out
    }

    fn split_recursive(&self, text: &str, base: usize, separators: &[&str], out: &mut Vec<Range<usize>>) {
        let chosen = separators.iter().position(|s| s.is_empty() || occurs(text, s));
        let (separator, remaining): (&str, &[&str]) = match chosen {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => ("", &[]),
        };

        let mut small: Vec<Range<usize>> = Vec::new();
        for piece in split_keep_start(text, separator) {
            let piece_text = &text[piece.clone()];
            if char_len(piece_text) < self.config.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                self.merge(text, base, &small, out);
                small.clear();
            }
            if remaining.is_empty() {
                out.push(base + piece.start..base + piece.end);
            } else {
                self.split_recursive(piece_text, base + piece.start, remaining, out);
            }
        }
        if !small.is_empty() {
            self.merge(text, base, &small, out);
        }
    }

    fn merge(&self, text: &str, base: usize, pieces: &[Range<usize>], out: &mut Vec<Range<usize>>) {
        let ChunkingConfig { chunk_size, chunk_overlap } = self.config;
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&text[piece.clone()]);
            if total + len > chunk_size && !window.is_empty() {
                Self::emit(text, base, &window, out);
                while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                    let Some((_, dropped)) = window.pop_front() else { break };
                    total -= dropped;
                }
            }
            window.push_back((piece.clone(), len));
            total += len;
        }
        Self::emit(text, base, &window, out);
    }

    fn emit(text: &str, base: usize, window: &VecDeque<(Range<usize>, usize)>, out: &mut Vec<Range<usize>>) {
        let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) else { return };
        if text[first.start..last.end].trim().is_empty() {
            return;
        }
        out.push(base + first.start..base + last.end);
    }
}
