//! Contextual enrichment of chunk text for embedding and keyword indexing.
//!
//! Every chunk is prefixed with a tag line naming its file, language and
//! repository, plus a preview of the file head when the chunk does not
//! already start with it:
//!
//! ```text
//! [File: src/auth.py] [Language: python] [Repo: backend]
//! [File Header]
//! <first 400 chars of the file>
//!
//! ---
//! <original chunk text>
//! ```

use crate::types::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichConfig {
    /// Characters of the file head copied into the preview.
    pub header_preview_chars: usize,
    /// Leading characters compared to decide whether the preview is redundant.
    pub header_match_chars: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self { header_preview_chars: 400, header_match_chars: 100 }
    }
}

fn prefix(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkEnricher {
    config: EnrichConfig,
}

impl ChunkEnricher {
    pub fn new(config: EnrichConfig) -> Self {
        Self { config }
    }

    /// Trimmed head of the document, shared by all of its chunks.
    pub fn file_header<'a>(&self, document: &'a Document) -> &'a str {
        prefix(&document.raw_text, self.config.header_preview_chars).trim()
    }

    pub fn tag_line(document: &Document) -> String {
        let mut tags = Vec::with_capacity(3);
        if !document.source_path.is_empty() {
            tags.push(format!("[File: {}]", document.source_path));
        }
        if !document.language.is_empty() {
            tags.push(format!("[Language: {}]", document.language));
        }
        if let Some(repo) = document.repository.as_deref().filter(|r| !r.is_empty()) {
            tags.push(format!("[Repo: {repo}]"));
        }
        tags.join(" ")
    }

    /// Text the indices see for one chunk; `original` is copied verbatim.
    pub fn embedding_text(&self, document: &Document, file_header: &str, original: &str) -> String {
        let tags = Self::tag_line(document);
        let matches = self.config.header_match_chars;
        let redundant = prefix(file_header.trim(), matches) == prefix(original.trim(), matches);
        if file_header.is_empty() || redundant {
            format!("{tags}\n---\n{original}")
        } else {
            format!("{tags}\n[File Header]\n{file_header}\n\n---\n{original}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("src/auth.py", text)
    }

    #[test]
    fn skips_preview_when_chunk_starts_with_file_head() {
        let d = doc("import os\n\ndef login(): pass\n");
        let enricher = ChunkEnricher::default();
        let text = enricher.embedding_text(&d, enricher.file_header(&d), &d.raw_text);
        assert_eq!(text, format!("[File: src/auth.py] [Language: python]\n---\n{}", d.raw_text));
    }

    #[test]
    fn adds_preview_for_nested_chunks() {
        let d = doc("import os\n\ndef login(): pass\n\ndef reset_token(): pass\n").with_repository("backend");
        let enricher = ChunkEnricher::default();
        let text = enricher.embedding_text(&d, enricher.file_header(&d), "\n\ndef reset_token(): pass\n");
        assert!(text.starts_with("[File: src/auth.py] [Language: python] [Repo: backend]\n[File Header]\nimport os"));
        assert!(text.ends_with("\n---\n\n\ndef reset_token(): pass\n"));
    }

    #[test]
    fn preview_is_bounded() {
        let d = doc(&"a".repeat(1000));
        let enricher = ChunkEnricher::new(EnrichConfig { header_preview_chars: 400, header_match_chars: 100 });
        assert_eq!(enricher.file_header(&d).len(), 400);
    }
}
