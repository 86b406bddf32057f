//! Model capability registry and selection.
//!
//! A static table declares what each gateway model accepts natively, what it
//! costs, and which file categories it is a good default for. Selection is
//! score-based: an explicit user preference wins outright, otherwise the
//! `best_for` candidates are scored by modality fit, cost, and context room.

use crate::classify::FileCategory;

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct ModelCapability {
    pub id: &'static str,
    pub supports_text: bool,
    pub supports_image: bool,
    pub supports_pdf: bool,
    pub supports_audio: bool,
    pub supports_video: bool,
    pub max_input_tokens: u64,
    /// USD per million input tokens.
    pub input_cost: f64,
    pub strengths: &'static [&'static str],
    pub best_for: &'static [FileCategory],
}

use FileCategory::*;

pub static REGISTRY: &[ModelCapability] = &[
    ModelCapability {
        id: "openai/gpt-4o-mini",
        supports_text: true,
        supports_image: true,
        supports_pdf: true,
        supports_audio: false,
        supports_video: false,
        max_input_tokens: 128_000,
        input_cost: 0.15,
        strengths: &["fast", "cheap", "general"],
        best_for: &[TextDocument, Code, Data, Image, Pdf, Office, Archive, Folder],
    },
    ModelCapability {
        id: "openai/gpt-4o",
        supports_text: true,
        supports_image: true,
        supports_pdf: false,
        supports_audio: false,
        supports_video: false,
        max_input_tokens: 128_000,
        input_cost: 2.5,
        strengths: &["reasoning", "vision"],
        best_for: &[Image, Code],
    },
    ModelCapability {
        id: "anthropic/claude-3-5-sonnet",
        supports_text: true,
        supports_image: true,
        supports_pdf: true,
        supports_audio: false,
        supports_video: false,
        max_input_tokens: 200_000,
        input_cost: 3.0,
        strengths: &["documents", "long context", "careful edits"],
        best_for: &[Pdf, TextDocument, Code],
    },
    ModelCapability {
        id: "anthropic/claude-3-5-haiku",
        supports_text: true,
        supports_image: true,
        supports_pdf: true,
        supports_audio: false,
        supports_video: false,
        max_input_tokens: 200_000,
        input_cost: 0.8,
        strengths: &["fast", "documents"],
        best_for: &[Pdf, Data],
    },
    ModelCapability {
        id: "google/gemini-1.5-pro",
        supports_text: true,
        supports_image: true,
        supports_pdf: true,
        supports_audio: true,
        supports_video: true,
        max_input_tokens: 2_000_000,
        input_cost: 1.25,
        strengths: &["audio", "video", "huge context"],
        best_for: &[Audio, Video, Pdf],
    },
    ModelCapability {
        id: "google/gemini-1.5-flash",
        supports_text: true,
        supports_image: true,
        supports_pdf: true,
        supports_audio: true,
        supports_video: true,
        max_input_tokens: 1_000_000,
        input_cost: 0.075,
        strengths: &["fast", "cheap", "multimodal"],
        best_for: &[Audio, Video, Image],
    },
];

pub fn lookup(id: &str) -> Option<&'static ModelCapability> {
    REGISTRY.iter().find(|m| m.id == id)
}

fn default_capability() -> &'static ModelCapability {
    lookup(DEFAULT_MODEL).expect("default model is registered")
}

/// Pick the model for a job.
///
/// An explicit, registered preference is used verbatim. Otherwise candidates
/// whose `best_for` covers the category are scored; if none cover it, the
/// default wins.
pub fn select(
    category: FileCategory,
    size_bytes: u64,
    user_pref: Option<&str>,
) -> &'static ModelCapability {
    if let Some(pref) = user_pref {
        if let Some(cap) = lookup(pref) {
            return cap;
        }
        tracing::warn!("model preference '{}' is not registered, selecting automatically", pref);
    }

    let candidates: Vec<&'static ModelCapability> = REGISTRY
        .iter()
        .filter(|m| m.best_for.contains(&category))
        .collect();

    if candidates.is_empty() {
        return default_capability();
    }

    // Ties break toward registry order via max_by precedence on later
    // elements only when strictly greater.
    let mut best = candidates[0];
    let mut best_score = score(best, category, size_bytes);
    for cap in &candidates[1..] {
        let s = score(cap, category, size_bytes);
        if s > best_score {
            best = cap;
            best_score = s;
        }
    }
    best
}

fn score(cap: &ModelCapability, category: FileCategory, size_bytes: u64) -> f64 {
    let mut score = 0.0;
    if cap.supports_video && category == FileCategory::Video {
        score += 100.0;
    }
    if cap.supports_audio && category == FileCategory::Audio {
        score += 100.0;
    }
    if cap.supports_pdf && category == FileCategory::Pdf {
        score += 50.0;
    }
    if cap.supports_image && category == FileCategory::Image {
        score += 50.0;
    }
    score += 10.0 / cap.input_cost;
    if size_bytes > 50_000 && cap.max_input_tokens > 500_000 {
        score += 20.0;
    }
    score
}
