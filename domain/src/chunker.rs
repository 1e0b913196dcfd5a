use crate::models::Chunk;

/// Words per chunk; roughly 400-500 model tokens.
pub const CHUNK_WORDS: usize = 500;

/// Splits `text` on whitespace runs into consecutive, non-overlapping windows of
/// [`CHUNK_WORDS`] words. Only the last window may be shorter. Empty text yields no chunks.
pub fn chunk_text(text: &str, doc_name: &str) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(CHUNK_WORDS)
        .enumerate()
        .map(|(chunk_id, window)| Chunk {
            doc_name: doc_name.to_string(),
            chunk_id,
            text: window.join(" "),
        })
        .collect()
}
