use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use scraper::{ElementRef, Html, Node};
use serde::Serialize;
use tracing::{debug, info};

use crate::normalize::is_pruned;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Number of chunks handed to the test strategist per query.
pub const DEFAULT_TOP_K: usize = 6;

/// Split points tried in order, from paragraphs down to single characters.
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Filename the chunk was cut from.
    pub source: String,
    pub content: String,
}

// ── Loading ─────────────────────────────────────────────────────────────────

/// Turn an uploaded file into plain text. HTML is reduced to its text nodes,
/// one per line; everything else is taken as-is.
pub fn load_document(filename: &str, content: &str) -> String {
    if is_html(filename) {
        html_text(content)
    } else {
        content.to_string()
    }
}

pub fn is_html(filename: &str) -> bool {
    let ext = filename.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    filename.contains('.') && matches!(ext.as_str(), "html" | "htm")
}

fn html_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();
    push_text_lines(document.root_element(), &mut lines);
    lines.join("\n")
}

fn push_text_lines(element: ElementRef, lines: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !collapsed.is_empty() {
                    lines.push(collapsed);
                }
            }
            Node::Element(el) if !is_pruned(el.name()) && el.name() != "title" => {
                if let Some(child) = ElementRef::wrap(child) {
                    push_text_lines(child, lines);
                }
            }
            _ => {}
        }
    }
}

// ── Splitting ───────────────────────────────────────────────────────────────

/// Recursive character splitter: cuts on the coarsest separator present, recursing
/// into pieces that are still too long, then packs pieces into overlapping chunks.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(idx).copied().unwrap_or("");
        let remaining = separators.get(idx + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { sep_len };

            if total + len + joined_len(&window) > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_window(&window, separator) {
                    chunks.push(chunk);
                }
                while total > self.chunk_overlap
                    || (total + len + joined_len(&window) > self.chunk_size && total > 0)
                {
                    let Some(first) = window.pop_front() else {
                        break;
                    };
                    let dropped_sep = if window.is_empty() { 0 } else { sep_len };
                    total = total.saturating_sub(char_len(first) + dropped_sep);
                }
            }

            total += len + joined_len(&window);
            window.push_back(piece);
        }

        if let Some(chunk) = join_window(&window, separator) {
            chunks.push(chunk);
        }
        chunks
    }
}

fn join_window(window: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

// ── Index ───────────────────────────────────────────────────────────────────

struct IndexedChunk {
    chunk: Chunk,
    /// Term frequencies, normalized by token count.
    tf: HashMap<String, f32>,
}

/// In-memory similarity index over uploaded documentation.
///
/// Chunks are weighted by TF-IDF and ranked against the query by cosine similarity.
/// Document frequencies are kept up to date on every insert, so IDF always reflects
/// the current contents.
#[derive(Default)]
pub struct KnowledgeBase {
    splitter: TextSplitter,
    chunks: Vec<IndexedChunk>,
    doc_freq: HashMap<String, usize>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_splitter(splitter: TextSplitter) -> Self {
        Self {
            splitter,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn clear(&mut self) {
        info!(dropped = self.chunks.len(), "knowledge base cleared");
        self.chunks.clear();
        self.doc_freq.clear();
    }

    /// Load, split and index one uploaded file. Returns the number of chunks added.
    pub fn ingest(&mut self, filename: &str, content: &str) -> usize {
        let text = load_document(filename, content);
        let pieces = self.splitter.split(&text);
        let added = pieces.len();
        for content in pieces {
            self.add(Chunk {
                source: filename.to_string(),
                content,
            });
        }
        debug!(source = %filename, chunks = added, "document ingested");
        added
    }

    pub fn add(&mut self, chunk: Chunk) {
        let tf = term_frequency(&tokenize(&chunk.content));
        for term in tf.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.chunks.push(IndexedChunk { chunk, tf });
    }

    /// The `k` chunks most similar to `query`, best first. Ties keep insertion order.
    pub fn search(&self, query: &str, k: usize) -> Vec<Chunk> {
        let query_vec = self.tfidf_vector(term_frequency(&tokenize(query)));

        let mut scored: Vec<(f32, usize)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let chunk_vec = self.tfidf_vector(c.tf.clone());
                (cosine_similarity(&query_vec, &chunk_vec), i)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        let results: Vec<Chunk> = scored
            .into_iter()
            .take(k)
            .map(|(_, i)| self.chunks[i].chunk.clone())
            .collect();
        debug!(query_len = query.len(), hits = results.len(), "knowledge base search");
        results
    }

    /// Smoothed IDF: `ln(n / df) + 1`, zero for terms no chunk contains.
    fn idf(&self, term: &str) -> f32 {
        let n = self.chunks.len() as f32;
        match self.doc_freq.get(term) {
            Some(&df) if df > 0 && n > 0.0 => (n / df as f32).ln() + 1.0,
            _ => 0.0,
        }
    }

    fn tfidf_vector(&self, tf: HashMap<String, f32>) -> HashMap<String, f32> {
        tf.into_iter()
            .map(|(term, weight)| {
                let idf = self.idf(&term);
                (term, weight * idf)
            })
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn term_frequency(tokens: &[String]) -> HashMap<String, f32> {
    if tokens.is_empty() {
        return HashMap::new();
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokens {
        *counts.entry(token.clone()).or_insert(0) += 1;
    }
    let total = tokens.len() as f32;
    counts
        .into_iter()
        .map(|(term, count)| (term, count as f32 / total))
        .collect()
}

fn cosine_similarity(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    let dot: f32 = a
        .iter()
        .filter_map(|(term, weight)| b.get(term).map(|w| w * weight))
        .sum();
    let mag_a = a.values().map(|v| v * v).sum::<f32>().sqrt();
    let mag_b = b.values().map(|v| v * v).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Loading ──

    #[test]
    fn html_files_are_reduced_to_text() {
        let text = load_document(
            "page.HTML",
            "<html><head><title>T</title><style>p{}</style></head><body><h1>Checkout</h1><script>x()</script><p>Pay  now</p></body></html>",
        );
        assert_eq!(text, "Checkout\nPay now");
    }

    #[test]
    fn other_files_are_taken_verbatim() {
        assert_eq!(load_document("notes.md", "# <b>raw</b>"), "# <b>raw</b>");
        assert!(!is_html("html"));
        assert!(is_html("a.htm"));
    }

    // ── Splitting ──

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = TextSplitter::default().split("  A short spec.  ");
        assert_eq!(chunks, vec!["A short spec."]);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let words: Vec<String> = (0..200).map(|i| format!("w{i:03}")).collect();
        let text = words.join(" ");
        let splitter = TextSplitter::new(100, 20);
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "chunk too long: {chunk}");
        }
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
        assert!(chunks.last().unwrap().ends_with("w199"));
    }

    #[test]
    fn paragraphs_split_before_words() {
        let para = "word ".repeat(15);
        let text = format!("{para}\n\n{para}");
        let chunks = TextSplitter::new(90, 0).split(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], para.trim());
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(250);
        let chunks = TextSplitter::new(100, 0).split(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 100));
    }

    // ── Search ──

    #[test]
    fn search_ranks_best_match_first() {
        let mut kb = KnowledgeBase::new();
        kb.ingest("auth.md", "Login requires a username and password.");
        kb.ingest("cart.md", "The cart shows items and the checkout button.");
        kb.ingest("faq.md", "Shipping takes three days.");

        let hits = kb.search("checkout cart items", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "cart.md");
    }

    #[test]
    fn rare_terms_outweigh_shared_ones() {
        let mut kb = KnowledgeBase::new();
        kb.ingest("a.md", "common common common alpha");
        kb.ingest("b.md", "common beta beta beta");

        let hits = kb.search("common beta", 1);
        assert_eq!(hits[0].source, "b.md");
    }

    #[test]
    fn idf_tracks_clear_and_reingest() {
        let mut kb = KnowledgeBase::new();
        kb.ingest("a.md", "refund policy");
        kb.clear();
        assert_eq!(kb.idf("refund"), 0.0);

        kb.ingest("b.md", "refund window");
        assert!((kb.idf("refund") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn custom_splitter_is_used_for_ingest() {
        let mut kb = KnowledgeBase::with_splitter(TextSplitter::new(10, 0));
        let added = kb.ingest("long.txt", "alpha beta gamma delta epsilon");
        assert!(added > 1);
        assert_eq!(kb.len(), added);
    }

    #[test]
    fn search_on_empty_base_is_empty() {
        assert!(KnowledgeBase::new().search("anything", 6).is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut kb = KnowledgeBase::new();
        assert_eq!(kb.ingest("a.txt", "alpha"), 1);
        assert_eq!(kb.len(), 1);
        kb.clear();
        assert!(kb.is_empty());
    }
}
