//! Regulatory passage retrieval.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CollaboratorError, CollaboratorResult};

/// A ranked passage of regulatory text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    /// Where the passage comes from (document and section).
    pub source: String,
    /// Relevance to the query in `0.0..=1.0`; higher is better.
    #[serde(default)]
    pub score: f32,
}

/// Query → ranked passages.
///
/// Returns an empty list when nothing matches; errors only on transport failure.
pub trait Retrieval: Send + Sync {
    fn query(&self, text: &str, top_k: usize) -> CollaboratorResult<Vec<Passage>>;
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on", "or",
    "the", "to", "what", "with", "does", "do", "how", "which",
];

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

#[derive(Debug, Deserialize)]
struct PassageFile {
    #[serde(rename = "passage", default)]
    passages: Vec<Passage>,
}

/// In-memory directive index scored by query-term overlap.
#[derive(Debug, Clone)]
pub struct DirectiveIndex {
    passages: Vec<(Passage, HashSet<String>)>,
}

impl DirectiveIndex {
    /// Build an index from passages. Stored scores are ignored.
    pub fn from_passages(passages: Vec<Passage>) -> Self {
        Self {
            passages: passages
                .into_iter()
                .map(|p| {
                    let t = terms(&format!("{} {}", p.text, p.source));
                    (p, t)
                })
                .collect(),
        }
    }

    /// Load passages from a TOML file of `[[passage]]` tables.
    pub fn load(path: &Path) -> CollaboratorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CollaboratorError::DirectiveLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let file: PassageFile =
            toml::from_str(&content).map_err(|e| CollaboratorError::DirectiveLoad {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::from_passages(file.passages))
    }

    /// The bundled directive summaries.
    pub fn builtin() -> Self {
        let p = |text: &str, source: &str| Passage {
            text: text.into(),
            source: source.into(),
            score: 0.0,
        };
        Self::from_passages(vec![
            p(
                "Gas metering equipment used for measurement must be calibrated or proved at least \
                 once every 365 days. Meters found outside tolerance must be repaired or replaced \
                 and re-proved before returning to service.",
                "Directive 017, Measurement Requirements: meter proving frequency",
            ),
            p(
                "Temperature and pressure compensation devices and differential pressure \
                 transmitters must be calibrated according to manufacturer specifications and no \
                 less frequently than annually.",
                "Directive 017, Measurement Requirements: secondary devices",
            ),
            p(
                "Calibration and proving records, including the date, technician, as-found and \
                 as-left values, must be retained and produced on request during an audit.",
                "Directive 017, Measurement Requirements: records retention",
            ),
            p(
                "Flare stacks and ignition systems must be inspected at least quarterly; \
                 inspection findings and any corrective maintenance must be logged.",
                "Directive 060, Upstream Petroleum Industry Flaring: inspection",
            ),
            p(
                "Pressure relief valves on pressure equipment must be tested and recertified at \
                 least every six months when in critical service.",
                "Directive 077, Pressure Equipment: relief valve testing",
            ),
            p(
                "Non-compliant measurement equipment must be reported to the compliance officer \
                 and corrective action scheduled within 30 days of detection.",
                "Directive 017, Measurement Requirements: non-compliance handling",
            ),
        ])
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

impl Retrieval for DirectiveIndex {
    fn query(&self, text: &str, top_k: usize) -> CollaboratorResult<Vec<Passage>> {
        let query = terms(text);
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Passage> = self
            .passages
            .iter()
            .filter_map(|(passage, passage_terms)| {
                let hits = query.intersection(passage_terms).count();
                (hits > 0).then(|| Passage {
                    score: hits as f32 / query.len() as f32,
                    ..passage.clone()
                })
            })
            .collect();

        // Stable sort keeps index order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}
