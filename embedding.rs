use crate::error::{Error, Result};
use crate::models::SceneMatch;
use serde_json::Value;

/// Norms below this are left untouched rather than divided by.
pub const MIN_NORM: f32 = 1e-6;

pub fn l2_norm(vec: &[f32]) -> f32 {
    vec.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Scales `vec` to unit length; near-zero vectors come back unchanged.
pub fn normalize_embedding(vec: &[f32]) -> Vec<f32> {
    let norm = l2_norm(vec);
    if norm < MIN_NORM {
        return vec.to_vec();
    }
    vec.iter().map(|v| v / norm).collect()
}

/// Dot product; equals cosine similarity when both inputs are unit vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Immutable label -> unit vector table, kept in catalogue order.
#[derive(Debug, Clone, Default)]
pub struct SceneVectorLibrary {
    entries: Vec<(String, Vec<f32>)>,
    dim: usize,
}

impl SceneVectorLibrary {
    /// Builds the library, normalising every vector. All vectors must share one length.
    pub fn new<I>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let mut entries: Vec<(String, Vec<f32>)> = Vec::new();
        let mut dim = 0usize;
        for (label, vec) in raw {
            if vec.is_empty() {
                return Err(Error::Init(format!("Scene vector '{label}' is empty")));
            }
            if dim == 0 {
                dim = vec.len();
            } else if vec.len() != dim {
                return Err(Error::Init(format!(
                    "Scene vector '{label}' has {} values, expected {dim}",
                    vec.len()
                )));
            }
            if let Some(bad) = vec.iter().find(|v| !v.is_finite()) {
                return Err(Error::Init(format!(
                    "Scene vector '{label}' contains a non-finite value {bad}"
                )));
            }
            if l2_norm(&vec) < MIN_NORM {
                log::warn!("Scene vector '{label}' has near-zero norm and will never match well");
            }
            let normalized = normalize_embedding(&vec);
            match entries.iter_mut().find(|(existing, _)| *existing == label) {
                Some(slot) => slot.1 = normalized,
                None => entries.push((label, normalized)),
            }
        }
        Ok(Self { entries, dim })
    }

    /// Parses a flat `{"LABEL": [f32, ...], ...}` catalogue.
    pub fn from_catalogue_json(json: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(json)
            .map_err(|e| Error::Init(format!("Malformed scene catalogue: {e}")))?;
        let Value::Object(map) = root else {
            return Err(Error::Init("Scene catalogue must be a JSON object".into()));
        };
        let mut raw = Vec::with_capacity(map.len());
        for (label, value) in map {
            let Value::Array(items) = value else {
                return Err(Error::Init(format!("Scene vector '{label}' is not an array")));
            };
            let vec = items
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(|| {
                    Error::Init(format!("Scene vector '{label}' contains a non-numeric value"))
                })?;
            raw.push((label, vec));
        }
        Self::new(raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector length shared by every entry, 0 when empty.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn get(&self, label: &str) -> Option<&[f32]> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_slice())
    }

    /// Linear scan for the highest similarity; ties keep the earlier entry.
    ///
    /// `query` must already be normalised. Non-finite scores never match.
    pub fn best_match(&self, query: &[f32]) -> Result<Option<SceneMatch>> {
        if self.is_empty() {
            return Ok(None);
        }
        if query.len() != self.dim {
            return Err(Error::Codec(format!(
                "Embedding has {} values, scene library expects {}",
                query.len(),
                self.dim
            )));
        }
        let mut best: Option<(&str, f32)> = None;
        for (label, vec) in &self.entries {
            let score = cosine_similarity(query, vec);
            if !score.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((label.as_str(), score));
            }
        }
        Ok(best.map(|(label, score)| SceneMatch {
            label: label.to_string(),
            score,
        }))
    }
}
