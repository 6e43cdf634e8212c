//! TF-IDF vectorizer for the sparse backend.
//!
//! Fitted once over the node documents, then used transform-only for
//! queries so they land in the same vocabulary and IDF space.
//!
//! Weighting:
//! - term frequency is the raw count of a term in the document;
//! - `idf(t) = ln((1 + n) / (1 + df(t))) + 1` (smoothed, never zero);
//! - each row is L2-normalised, so the dot product of two rows is their
//!   cosine similarity. All-zero rows stay zero.
//!
//! Feature columns follow the lexicographic order of the vocabulary, so a
//! given corpus always produces the same matrix layout.

use crate::text::tokenize;
use std::collections::{BTreeMap, HashMap};

/// A fitted TF-IDF model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TfidfVectorizer {
    /// term → column
    vocabulary: HashMap<String, usize>,
    /// column → idf weight
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    /// Learn the vocabulary and IDF weights from `docs`.
    ///
    /// A corpus whose documents contain no usable terms yields an empty
    /// vocabulary; every transform then returns a zero-length vector.
    pub fn fit(docs: &[String]) -> Self {
        let mut df: BTreeMap<String, usize> = BTreeMap::new();
        for doc in docs {
            let mut terms = tokenize(doc);
            terms.sort_unstable();
            terms.dedup();
            for term in terms {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        let n = docs.len() as f32;
        let mut vocabulary = HashMap::with_capacity(df.len());
        let mut idf = Vec::with_capacity(df.len());
        // BTreeMap iteration is sorted: column order is lexicographic.
        for (col, (term, count)) in df.into_iter().enumerate() {
            idf.push(((1.0 + n) / (1.0 + count as f32)).ln() + 1.0);
            vocabulary.insert(term, col);
        }

        Self { vocabulary, idf }
    }

    /// Fit on `docs` and return the model together with the document matrix.
    pub fn fit_transform(docs: &[String]) -> (Self, Vec<Vec<f32>>) {
        let model = Self::fit(docs);
        let rows = docs.iter().map(|d| model.transform(d)).collect();
        (model, rows)
    }

    /// Project `doc` into the fitted space. Terms outside the vocabulary are
    /// ignored.
    pub fn transform(&self, doc: &str) -> Vec<f32> {
        let mut row = vec![0.0f32; self.idf.len()];
        for term in tokenize(doc) {
            if let Some(&col) = self.vocabulary.get(&term) {
                row[col] += 1.0;
            }
        }
        for (value, weight) in row.iter_mut().zip(&self.idf) {
            *value *= weight;
        }
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut row {
                *value /= norm;
            }
        }
        row
    }

    /// Number of feature columns.
    pub fn dim(&self) -> usize {
        self.idf.len()
    }

    /// Column of `term`, if it is in the vocabulary.
    pub fn column(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    /// IDF weight of `term`, if it is in the vocabulary.
    pub fn idf(&self, term: &str) -> Option<f32> {
        self.column(term).map(|col| self.idf[col])
    }
}
