//! Triple sources: the built-in demo dataset and uploaded tabular rows.
//!
//! Uploaded rows arrive as JSON objects (one per table row). A row must expose
//! the columns `subject`, `predicate` and `object`, spelled exactly that way.
//! Cell values are not validated beyond that: numbers, booleans and nulls are
//! stringified and used as opaque labels.

use crate::{KgError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;

/// Columns every uploaded row must carry.
pub const REQUIRED_COLUMNS: [&str; 3] = ["subject", "predicate", "object"];

/// A subject-predicate-object fact record.
///
/// The predicate is metadata on the relation between subject and object; it
/// never becomes a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl<S, P, O> From<(S, P, O)> for Triple
where
    S: Into<String>,
    P: Into<String>,
    O: Into<String>,
{
    fn from((s, p, o): (S, P, O)) -> Self {
        Triple::new(s, p, o)
    }
}

// ---------------------------------------------------------------------------
// Text map
// ---------------------------------------------------------------------------

/// Descriptive sentences per entity label.
///
/// Labels are compared byte-for-byte: no case folding, no trimming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TextMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl TextMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sentences recorded for `label`, if any.
    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.entries.get(label).map(Vec::as_slice)
    }

    /// Append `sentence` to `label`'s list unless the identical sentence is
    /// already present. Rows repeating an entity with new text accumulate;
    /// rows repeating the same text do not duplicate it.
    pub fn push(&mut self, label: impl Into<String>, sentence: impl Into<String>) {
        let sentence = sentence.into();
        let sentences = self.entries.entry(label.into()).or_default();
        if !sentences.contains(&sentence) {
            sentences.push(sentence);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(label, sentences)| (label.as_str(), sentences.as_slice()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TextMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = TextMap::new();
        for (label, sentence) in iter {
            map.push(label, sentence);
        }
        map
    }
}

/// Accepted shapes for a text map in a dataset file: either an object
/// (`label -> sentence | [sentences]`) or rows of `{entity, text}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TextsRepr {
    Map(BTreeMap<String, OneOrMany>),
    Rows(Vec<TextRow>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct TextRow {
    entity: String,
    text: String,
}

impl<'de> Deserialize<'de> for TextMap {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let mut map = TextMap::new();
        match TextsRepr::deserialize(deserializer)? {
            TextsRepr::Map(entries) => {
                for (label, value) in entries {
                    match value {
                        OneOrMany::One(sentence) => map.push(label, sentence),
                        OneOrMany::Many(sentences) => {
                            for sentence in sentences {
                                map.push(label.clone(), sentence);
                            }
                        }
                    }
                }
            }
            TextsRepr::Rows(rows) => {
                for row in rows {
                    map.push(row.entity, row.text);
                }
            }
        }
        Ok(map)
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// An ordered triple list plus its text map and a human-readable source name.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub triples: Vec<Triple>,
    pub texts: TextMap,
    pub source: String,
}

#[derive(Deserialize)]
struct DatasetFile {
    triples: Vec<JsonValue>,
    #[serde(default)]
    texts: TextMap,
}

impl Dataset {
    pub fn new(triples: Vec<Triple>, texts: TextMap, source: impl Into<String>) -> Self {
        Self {
            triples,
            texts,
            source: source.into(),
        }
    }

    /// The built-in demo dataset.
    pub fn demo() -> Self {
        Self::new(demo_triples(), demo_text_map(), "built-in demo dataset")
    }

    /// Build a dataset from uploaded table rows.
    ///
    /// # Errors
    ///
    /// Returns [`KgError::Schema`] if any row is not an object exposing all of
    /// [`REQUIRED_COLUMNS`].
    pub fn from_rows(
        rows: &[JsonValue],
        texts: TextMap,
        source: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::new(triples_from_rows(rows)?, texts, source))
    }

    /// Parse a JSON dataset document: `{"triples": [rows], "texts": {...}}`.
    pub fn from_json(raw: &str, source: impl Into<String>) -> Result<Self> {
        let file: DatasetFile = serde_json::from_str(raw)?;
        Self::from_rows(&file.triples, file.texts, source)
    }

    /// Read a JSON dataset document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_json(&raw, source)
    }

    /// Stable content key over the ordered triples and the text map.
    ///
    /// Every field is length-prefixed so that `("ab", "c")` and `("a", "bc")`
    /// hash differently, and every list is count-prefixed so that sentences
    /// cannot pass for labels.
    pub fn content_key(&self) -> String {
        fn count(hasher: &mut blake3::Hasher, n: usize) {
            hasher.update(&(n as u64).to_le_bytes());
        }
        fn field(hasher: &mut blake3::Hasher, s: &str) {
            count(hasher, s.len());
            hasher.update(s.as_bytes());
        }

        let mut hasher = blake3::Hasher::new();
        count(&mut hasher, self.triples.len());
        for t in &self.triples {
            field(&mut hasher, &t.subject);
            field(&mut hasher, &t.predicate);
            field(&mut hasher, &t.object);
        }
        count(&mut hasher, self.texts.len());
        for (label, sentences) in self.texts.iter() {
            field(&mut hasher, label);
            count(&mut hasher, sentences.len());
            for sentence in sentences {
                field(&mut hasher, sentence);
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Status line shown to the user after a successful load.
    pub fn status(&self) -> String {
        format!("Loaded {} triples from {}.", self.triples.len(), self.source)
    }
}

/// Convert table rows into triples, enforcing the three-column schema.
pub fn triples_from_rows(rows: &[JsonValue]) -> Result<Vec<Triple>> {
    rows.iter()
        .map(|row| {
            let obj = row.as_object().ok_or_else(schema_error)?;
            let cell = |col: &str| obj.get(col).map(cell_to_label).ok_or_else(schema_error);
            Ok(Triple {
                subject: cell("subject")?,
                predicate: cell("predicate")?,
                object: cell("object")?,
            })
        })
        .collect()
}

fn schema_error() -> KgError {
    KgError::Schema(format!(
        "dataset must contain columns: {}",
        REQUIRED_COLUMNS.join(", ")
    ))
}

fn cell_to_label(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Demo data
// ---------------------------------------------------------------------------

const DEMO_TRIPLES: &[(&str, &str, &str)] = &[
    ("Asia", "has_topic", "Classical Mechanics"),
    ("Asia", "has_topic", "Quantum Mechanics"),
    ("Asia", "related_to", "Mathematics"),
    ("Classical Mechanics", "has_concept", "Newton's Laws"),
    ("Classical Mechanics", "has_concept", "Energy Conservation"),
    ("Quantum Mechanics", "has_concept", "Wave Function"),
    ("Quantum Mechanics", "has_concept", "Uncertainty Principle"),
    ("Mathematics", "has_topic", "Calculus"),
    ("Calculus", "used_in", "Classical Mechanics"),
    ("Quantum Mechanics", "influences", "Philosophy"),
    ("Philosophy", "has_topic", "Epistemology"),
    ("History of Science", "has_figure", "Isaac Newton"),
    ("History of Science", "has_figure", "Albert Einstein"),
    ("Isaac Newton", "born_in", "1643"),
    ("Albert Einstein", "born_in", "1879"),
    ("Technology", "related_to", "Asia"),
    ("Biology", "has_topic", "Genetics"),
    ("Genetics", "has_concept", "DNA"),
    ("DNA", "discovered_by", "Watson & Crick"),
    ("Astronomy", "has_topic", "Astrophysics"),
    ("Astrophysics", "related_to", "Asia"),
    ("Concept A", "subconcept_of", "Asia"),
    ("Concept B", "subconcept_of", "Asia"),
    ("Sun", "is_a", "Star"),
    ("Sun", "related_to", "Astrophysics"),
    ("Sun", "has_feature", "Solar Flares"),
    ("Solar Flares", "affects", "Space Weather"),
    ("Space Weather", "affects", "Satellite Operations"),
    ("Concept C", "linked_to", "History of Science"),
    ("Sub-A1", "part_of", "Concept A"),
    ("Sub-A2", "part_of", "Concept A"),
    ("Sub-B1", "part_of", "Concept B"),
    ("Sub-C1", "part_of", "Concept C"),
    ("Technology", "used_in", "Satellite Operations"),
    ("Philosophy", "influences", "History of Science"),
    ("Mathematics", "used_in", "Astrophysics"),
];

const DEMO_TEXTS: &[(&str, &str)] = &[
    ("Asia", "Physics is the natural science that studies matter, motion and behavior through space and time."),
    ("Classical Mechanics", "Classical mechanics deals with the motion of bodies under forces such as Newton's laws and energy conservation."),
    ("Quantum Mechanics", "Quantum mechanics studies physical phenomena at the scale of atoms and subatomic particles and includes the wave function and uncertainty principle."),
    ("Mathematics", "Mathematics provides the language and tools used in physical theories, including calculus and linear algebra."),
    ("Calculus", "Calculus is used for describing change and motion, including derivatives and integrals."),
    ("Newton's Laws", "Newton's laws are foundational principles describing how forces affect motion."),
    ("Energy Conservation", "Conservation of energy is a key principle in many physical and engineering systems."),
    ("Wave Function", "The wave function is a mathematical description of the quantum state of a system."),
    ("Uncertainty Principle", "Heisenberg's uncertainty principle limits the precision of position and momentum measurements."),
    ("Philosophy", "Philosophy studies fundamental questions about knowledge, existence, and reasoning."),
    ("History of Science", "The history of science traces the development of scientific ideas and influential figures."),
    ("Isaac Newton", "Isaac Newton, born 1643, formulated laws of motion and universal gravitation."),
    ("Albert Einstein", "Albert Einstein, born 1879, developed the theory of relativity and shaped modern physics."),
    ("Technology", "Technology is the application of scientific knowledge for practical purposes, such as satellites."),
    ("Biology", "Biology studies living organisms and life processes, including genetics and evolution."),
    ("Genetics", "Genetics is the study of heredity and genes, including DNA structure and function."),
    ("DNA", "DNA stores genetic information in living organisms."),
    ("Sun", "The Sun is a G-type main-sequence star at the center of the Solar System; it produces light and solar activity."),
    ("Solar Flares", "Solar flares are sudden eruptions of energy from the Sun's atmosphere that can affect space weather."),
    ("Space Weather", "Space weather describes variable conditions in space driven by solar activity and can impact satellites and communications."),
    ("Satellite Operations", "Satellite operations manage the functioning and control of satellites orbiting Earth."),
    ("Astrophysics", "Astrophysics applies principles of physics and mathematics to study astronomical objects and phenomena."),
    ("Concept A", "Concept A is a placeholder central concept in this demo KG."),
    ("Concept B", "Concept B is another demo concept that connects to Concept A."),
    ("Concept C", "Concept C deals with historical aspects in the demo."),
    ("Sub-A1", "Sub-A1 is a subtopic of Concept A."),
    ("Sub-A2", "Sub-A2 is a subtopic of Concept A."),
    ("Sub-B1", "Sub-B1 is a subtopic of Concept B."),
    ("Sub-C1", "Sub-C1 is a subtopic of Concept C."),
];

/// Triples of the built-in demo dataset, in their canonical order.
pub fn demo_triples() -> Vec<Triple> {
    DEMO_TRIPLES.iter().map(|&t| Triple::from(t)).collect()
}

/// One descriptive sentence per demo entity.
pub fn demo_text_map() -> TextMap {
    DEMO_TEXTS.iter().copied().collect()
}
