use std::cmp::Ordering;
use std::collections::HashMap;

use crate::encoding::DocId;

/// `log10(n_docs / df)`, or `None` for a term no document contains.
pub fn idf(n_docs: u64, document_frequency: usize) -> Option<f64> {
    if document_frequency == 0 || n_docs == 0 {
        return None;
    }
    Some((n_docs as f64 / document_frequency as f64).log10())
}

/// Score of a document for a one-word query.
pub fn one_word_score(tf: u32, idf: f64, doc_term_count: u64) -> f64 {
    tf as f64 * idf / doc_term_count.max(1) as f64
}

/// Log-scaled term frequency, normalized by document length.
pub fn normalized_tf(tf: u32, doc_term_count: u64) -> f64 {
    let length = if doc_term_count <= 1 {
        1.0
    } else {
        (doc_term_count as f64).log10()
    };
    (1.0 + tf as f64).log10() / length
}

/// Accumulates per-document scores across query terms.
#[derive(Debug, Default)]
pub struct ScoreBoard {
    scores: HashMap<DocId, f64>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, doc_id: DocId, score: f64) {
        *self.scores.entry(doc_id).or_insert(0.0) += score;
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// The `k` best documents, highest score first, ties by ascending id.
    pub fn top_k(self, k: usize) -> Vec<(DocId, f64)> {
        let mut ranked: Vec<(DocId, f64)> = self.scores.into_iter().collect();
        ranked.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_is_monotonic() {
        let n = 1_000;
        let mut previous = f64::INFINITY;
        for df in 1..=n as usize {
            let value = idf(n, df).unwrap();
            assert!(value <= previous, "idf rose at df={df}");
            previous = value;
        }
        assert_eq!(idf(n, n as usize), Some(0.0));
        assert_eq!(idf(n, 0), None);
    }

    #[test]
    fn test_normalized_tf() {
        assert_eq!(normalized_tf(9, 1), 1.0);
        assert_eq!(normalized_tf(9, 0), 1.0);
        assert!((normalized_tf(9, 100) - 0.5).abs() < 1e-12);
        assert!(normalized_tf(3, 10) > normalized_tf(1, 10));
        assert!(normalized_tf(3, 10) > normalized_tf(3, 1000));
    }

    #[test]
    fn test_one_word_score() {
        assert!((one_word_score(4, 0.5, 10) - 0.2).abs() < 1e-12);
        assert_eq!(one_word_score(4, 0.5, 0), 2.0);
    }

    #[test]
    fn test_top_k_orders_by_score_then_id() {
        let mut board = ScoreBoard::new();
        board.add(5, 0.5);
        board.add(3, 0.25);
        board.add(3, 0.25);
        board.add(9, 0.9);
        board.add(1, 0.1);
        assert_eq!(board.len(), 4);

        assert_eq!(board.top_k(3), vec![(9, 0.9), (3, 0.5), (5, 0.5)]);
    }
}
