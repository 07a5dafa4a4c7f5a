use super::error::DocumentError;
use super::types::{Chunk, Document};

/// Chunking parameters. Sizes are counted in `char`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub sentence_aware: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            sentence_aware: true,
        }
    }
}

impl SplitterConfig {
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidSplitter`] unless `0 < chunk_overlap < chunk_size`.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.chunk_overlap == 0 {
            return Err(DocumentError::InvalidSplitter(
                "chunk_overlap must be greater than 0".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DocumentError::InvalidSplitter(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidSplitter`] if the configuration is invalid.
    pub fn new(config: SplitterConfig) -> Result<Self, DocumentError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split `text` into ordered windows of at most `chunk_size` chars.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let SplitterConfig {
            chunk_size,
            chunk_overlap,
            sentence_aware,
        } = self.config;

        if text.is_empty() {
            return Vec::new();
        }
        if char_len(text) <= chunk_size {
            return vec![text.to_owned()];
        }

        if sentence_aware {
            let pieces: Vec<String> = split_sentences(text)
                .into_iter()
                .flat_map(|s| {
                    if char_len(&s) > chunk_size {
                        split_chars(&s, chunk_size, chunk_overlap)
                    } else {
                        vec![s]
                    }
                })
                .collect();
            merge_sentences(&pieces, chunk_size, chunk_overlap)
        } else {
            split_chars(text, chunk_size, chunk_overlap)
        }
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.content)
            .into_iter()
            .enumerate()
            .map(|(i, content)| Chunk {
                content,
                metadata: document.metadata.clone(),
                chunk_index: i,
            })
            .collect()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on paragraph breaks and on `.`, `?`, `!` followed by a space.
///
/// Concatenating the returned pieces reproduces `text` exactly.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    let mut current = String::new();

    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        current.push(c);

        if c == '\n' && next == Some('\n') {
            current.push('\n');
            i += 1;
            if !current.trim().is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
        } else if matches!(c, '.' | '?' | '!') && next == Some(' ') && !current.trim().is_empty()
        {
            sentences.push(std::mem::take(&mut current));
        }

        i += 1;
    }

    if !current.is_empty() {
        // Trailing whitespace belongs to the last sentence.
        if current.trim().is_empty()
            && let Some(last) = sentences.last_mut()
        {
            last.push_str(&current);
        } else {
            sentences.push(current);
        }
    }

    sentences
}

/// Greedily merge pieces into chunks of at most `chunk_size` chars, carrying
/// trailing pieces worth at most `chunk_overlap` chars into the next chunk.
///
/// Every piece must already fit in `chunk_size`.
fn merge_sentences(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut window_start = 0;

    for (idx, piece) in pieces.iter().enumerate() {
        let piece_len = char_len(piece);
        if !current.is_empty() && current_len + piece_len > chunk_size {
            chunks.push(std::mem::take(&mut current));

            // The carried overlap must leave room for the incoming piece.
            let budget = chunk_overlap.min(chunk_size.saturating_sub(piece_len));
            let mut overlap_len = 0;
            let mut overlap_start = idx;
            for prev in pieces[window_start..idx].iter().rev() {
                let len = char_len(prev);
                if overlap_len + len > budget {
                    break;
                }
                overlap_len += len;
                overlap_start -= 1;
            }
            for s in &pieces[overlap_start..idx] {
                current.push_str(s);
            }
            current_len = overlap_len;
            window_start = overlap_start;
        }

        current.push_str(piece);
        current_len += piece_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Fixed windows of `chunk_size` chars advancing by `chunk_size - overlap`.
///
/// The last window always ends at the end of `text`.
fn split_chars(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}
