use serde::Serialize;

pub const DEFAULT_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub languages: &'static [&'static str],
    pub size: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelsResponse {
    pub models: &'static [ModelInfo],
}

/// Pre-trained cross-encoders known to work with this service.
pub const MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo {
        name: DEFAULT_MODEL,
        description: "Fast and accurate model for English reranking",
        languages: &["en"],
        size: "~80MB",
    },
    ModelInfo {
        name: "cross-encoder/ms-marco-MiniLM-L-12-v2",
        description: "Larger model with better accuracy",
        languages: &["en"],
        size: "~300MB",
    },
    ModelInfo {
        name: "cross-encoder/mmarco-mMiniLMv2-L12-H384-v1",
        description: "Multilingual model for various languages",
        languages: &["en", "zh", "es", "fr", "de", "it", "pt", "ru"],
        size: "~400MB",
    },
    ModelInfo {
        name: "cross-encoder/quora-distilroberta-base",
        description: "Good for question-answer similarity",
        languages: &["en"],
        size: "~250MB",
    },
];

pub fn find_model(name: &str) -> Option<&'static ModelInfo> {
    MODEL_CATALOG.iter().find(|model| model.name == name)
}

pub fn models_response() -> ModelsResponse {
    ModelsResponse {
        models: MODEL_CATALOG,
    }
}
