//! The five ordered pipeline stages: Preprocess, Classify, Tag, Embed,
//! Postprocess. Each is a free function over plain data so the engine can
//! time, skip, and fail them independently.

use std::collections::HashSet;

use artifactor_core::types::{ClassificationLabel, ClassificationResult, InferenceRequest, Tag};
use sha2::{Digest, Sha256};

/// Embedding vectors are fixed at this dimension (SPEC_FULL.md §4.2).
pub const EMBEDDING_DIM: usize = 384;
/// Maximum number of tags returned by [`tag`].
pub const MAX_TAGS: usize = 10;

#[derive(Debug, Clone)]
pub struct ContentStats {
    pub character_count: usize,
    pub word_count: usize,
    pub line_count: usize,
}

#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub cleaned_content: String,
    pub full_text: String,
    pub stats: ContentStats,
}

/// Stage 1 — normalize whitespace and compute basic statistics. Never fails.
pub fn preprocess(req: &InferenceRequest) -> Preprocessed {
    let cleaned_content = req.content.trim().to_string();
    let stats = ContentStats {
        character_count: cleaned_content.chars().count(),
        word_count: cleaned_content.split_whitespace().count(),
        line_count: cleaned_content.lines().count(),
    };
    let full_text = format!("{} {} {}", req.title, req.description, cleaned_content)
        .trim()
        .to_string();
    Preprocessed {
        cleaned_content,
        full_text,
        stats,
    }
}

const WEB_KEYWORDS: &[&str] = &["html", "css", "javascript", "react", "vue", "angular", "typescript", "frontend"];
const DATA_KEYWORDS: &[&str] = &["pandas", "numpy", "tensorflow", "pytorch", "sklearn", "dataset", "machine learning"];
const DEVOPS_KEYWORDS: &[&str] = &["docker", "kubernetes", "ci/cd", "terraform", "deployment", "container"];
const DB_KEYWORDS: &[&str] = &["sql", "postgresql", "mysql", "mongodb", "redis", "schema", "migration"];

fn keyword_hits(haystack: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| haystack.contains(*k)).count()
}

/// Stage 2 — consult language/content-type/project-category/quality
/// classifiers. Implemented as deterministic keyword heuristics rather than
/// a trained model; each predictor may independently come back empty,
/// matching the "may return partial results" contract.
pub fn classify(req: &InferenceRequest, pre: &Preprocessed) -> ClassificationResult {
    let lower = pre.full_text.to_lowercase();

    let language = if !req.language.is_empty() {
        Some(ClassificationLabel {
            label: req.language.to_lowercase(),
            confidence: 0.95,
            alternatives: Vec::new(),
        })
    } else {
        None
    };

    let content_type = if !req.file_type.is_empty() {
        Some(ClassificationLabel {
            label: req.file_type.to_lowercase(),
            confidence: 0.9,
            alternatives: Vec::new(),
        })
    } else {
        None
    };

    let categories: [(&str, usize); 4] = [
        ("web-development", keyword_hits(&lower, WEB_KEYWORDS)),
        ("data-science", keyword_hits(&lower, DATA_KEYWORDS)),
        ("devops", keyword_hits(&lower, DEVOPS_KEYWORDS)),
        ("database", keyword_hits(&lower, DB_KEYWORDS)),
    ];
    let project_category = categories
        .iter()
        .filter(|(_, hits)| *hits > 0)
        .max_by_key(|(_, hits)| *hits)
        .map(|(name, hits)| ClassificationLabel {
            label: name.to_string(),
            confidence: (*hits as f32 / 4.0).min(1.0),
            alternatives: categories
                .iter()
                .filter(|(n, h)| *n != *name && *h > 0)
                .map(|(n, h)| (n.to_string(), (*h as f32 / 4.0).min(1.0)))
                .collect(),
        });

    // Quality heuristic: longer, non-trivial content scores higher.
    let quality_confidence = if pre.stats.word_count == 0 {
        0.1
    } else if pre.stats.word_count < 20 {
        0.4
    } else {
        0.8
    };
    let quality = Some(ClassificationLabel {
        label: if quality_confidence >= 0.6 { "good".to_string() } else { "low".to_string() },
        confidence: quality_confidence,
        alternatives: Vec::new(),
    });

    ClassificationResult {
        language,
        content_type,
        project_category,
        quality,
    }
}

struct Candidate {
    label: String,
    score: f32,
    source: &'static str,
}

/// Stage 3 — generate up to [`MAX_TAGS`] tags, diversity-filtered so that
/// two tags sharing a hyphen-split word don't both survive (the
/// higher-scored one wins).
pub fn tag(req: &InferenceRequest, pre: &Preprocessed) -> Vec<Tag> {
    let lower = pre.full_text.to_lowercase();
    let mut candidates = Vec::new();

    if !req.file_type.is_empty() {
        candidates.push(Candidate { label: req.file_type.to_lowercase(), score: 1.0, source: "file_type" });
    }
    if !req.language.is_empty() {
        candidates.push(Candidate { label: req.language.to_lowercase(), score: 1.0, source: "language" });
    }

    for (name, keywords) in [
        ("web-development", WEB_KEYWORDS),
        ("data-science", DATA_KEYWORDS),
        ("devops", DEVOPS_KEYWORDS),
        ("database", DB_KEYWORDS),
    ] {
        let hits = keyword_hits(&lower, keywords);
        if hits >= 2 {
            candidates.push(Candidate {
                label: name.to_string(),
                score: (hits as f32 / keywords.len() as f32).min(1.0),
                source: "technology",
            });
        }
    }

    let function_count = pre.cleaned_content.matches("fn ").count()
        + pre.cleaned_content.matches("def ").count()
        + pre.cleaned_content.matches("function ").count();
    let control_structures = pre.cleaned_content.matches("if ").count()
        + pre.cleaned_content.matches("for ").count()
        + pre.cleaned_content.matches("while ").count();
    let complexity_score = function_count * 2 + control_structures + pre.stats.line_count / 50;
    candidates.push(match complexity_score {
        0..=4 => Candidate { label: "simple".to_string(), score: 0.8, source: "complexity" },
        5..=14 => Candidate { label: "moderate".to_string(), score: 0.7, source: "complexity" },
        _ => Candidate { label: "complex".to_string(), score: 0.9, source: "complexity" },
    });

    if pre.stats.line_count > 100 {
        candidates.push(Candidate { label: "large-file".to_string(), score: 0.6, source: "size" });
    } else if pre.stats.line_count < 20 {
        candidates.push(Candidate { label: "small-file".to_string(), score: 0.5, source: "size" });
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected = Vec::new();
    let mut used_words: HashSet<String> = HashSet::new();
    for c in candidates {
        if selected.len() >= MAX_TAGS {
            break;
        }
        let words: HashSet<String> = c.label.split('-').map(|w| w.to_string()).collect();
        if words.iter().any(|w| used_words.contains(w)) {
            continue;
        }
        used_words.extend(words);
        selected.push(Tag { label: c.label, confidence: c.score, source: c.source.to_string() });
    }
    selected
}

/// Stage 4 — a fixed-dimension embedding, deterministic for identical
/// input. Produced by expanding a SHA-256 digest rather than calling out
/// to a real embeddings backend; returns `None` only if `full_text` is
/// empty, mirroring an unavailable-backend result.
pub fn embed(full_text: &str) -> Option<Vec<f32>> {
    if full_text.trim().is_empty() {
        return None;
    }
    let mut out = Vec::with_capacity(EMBEDDING_DIM);
    let mut counter: u32 = 0;
    while out.len() < EMBEDDING_DIM {
        let mut hasher = Sha256::new();
        hasher.update(full_text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for byte in digest.iter() {
            if out.len() >= EMBEDDING_DIM {
                break;
            }
            out.push((*byte as f32 / 127.5) - 1.0);
        }
        counter += 1;
    }
    Some(out)
}

pub struct PostprocessOutput {
    pub quality_score: f32,
    pub read_time_minutes: f32,
}

/// Stage 5 — combine stage outputs into a single quality score (weighted
/// mean of per-stage confidences and size-based factors) plus a read-time
/// estimate.
pub fn postprocess(
    pre: &Preprocessed,
    classification: &ClassificationResult,
    tags: &[Tag],
    embedding: &Option<Vec<f32>>,
) -> PostprocessOutput {
    let quality_factor = classification.quality.as_ref().map(|q| q.confidence).unwrap_or(0.5);
    let tag_factor = if tags.is_empty() { 0.3 } else { 1.0 };
    let embedding_factor = if embedding.is_some() { 1.0 } else { 0.5 };
    let size_factor = if pre.stats.character_count > 100 { 0.8 } else { 0.4 };

    let quality_score = (quality_factor + tag_factor + embedding_factor + size_factor) / 4.0;
    let read_time_minutes = (pre.stats.word_count as f32 / 200.0).max(0.5);

    PostprocessOutput {
        quality_score,
        read_time_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifactor_core::types::{InferencePriority, UserId};
    use chrono::Utc;

    fn req(content: &str, file_type: &str, language: &str) -> InferenceRequest {
        InferenceRequest {
            request_id: String::new(),
            content: content.to_string(),
            title: "title".into(),
            description: "description".into(),
            file_type: file_type.into(),
            language: language.into(),
            user_id: UserId::from("u1".to_string()),
            priority: InferencePriority::High,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn preprocess_computes_stats() {
        let r = req("line one\nline two", "rs", "rust");
        let pre = preprocess(&r);
        assert_eq!(pre.stats.line_count, 2);
        assert!(pre.full_text.contains("line one"));
    }

    #[test]
    fn classify_picks_up_language_and_file_type() {
        let r = req("fn main() {}", "rs", "rust");
        let pre = preprocess(&r);
        let c = classify(&r, &pre);
        assert_eq!(c.language.unwrap().label, "rust");
        assert_eq!(c.content_type.unwrap().label, "rs");
    }

    #[test]
    fn tag_caps_at_max_tags_and_dedupes_shared_words() {
        let r = req("docker kubernetes ci/cd terraform deployment container orchestration", "yaml", "yaml");
        let pre = preprocess(&r);
        let tags = tag(&r, &pre);
        assert!(tags.len() <= MAX_TAGS);
        let labels: Vec<&str> = tags.iter().map(|t| t.label.as_str()).collect();
        assert!(labels.contains(&"devops"));
    }

    #[test]
    fn embed_is_deterministic_and_fixed_dimension() {
        let a = embed("hello world").unwrap();
        let b = embed("hello world").unwrap();
        assert_eq!(a.len(), EMBEDDING_DIM);
        assert_eq!(a, b);
    }

    #[test]
    fn embed_returns_none_for_empty_text() {
        assert!(embed("   ").is_none());
    }

    #[test]
    fn postprocess_quality_score_in_unit_range() {
        let r = req("some content here", "rs", "rust");
        let pre = preprocess(&r);
        let classification = classify(&r, &pre);
        let tags = tag(&r, &pre);
        let embedding = embed(&pre.full_text);
        let out = postprocess(&pre, &classification, &tags, &embedding);
        assert!(out.quality_score >= 0.0 && out.quality_score <= 1.0);
        assert!(out.read_time_minutes >= 0.5);
    }
}
