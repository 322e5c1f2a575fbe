//! Codeframe tree model, prompt construction and LLM response parsing.
//!
//! The generative model is asked for strict JSON; the response is parsed
//! with serde and then clamped to the configured depth and per-level code
//! count, so a chatty model can never blow up the stored tree.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::JobConfig;

/// One code in the hierarchical codeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub children: Vec<Code>,
}

/// Codes generated for one cluster; the unit of checkpointing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCodes {
    pub cluster: usize,
    pub answer_count: usize,
    pub codes: Vec<Code>,
}

/// The final assembled tree stored on a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeFrame {
    pub codes: Vec<Code>,
}

impl CodeFrame {
    /// Merge per-cluster codes into one tree, in cluster order.
    pub fn from_clusters(mut clusters: Vec<ClusterCodes>) -> Self {
        clusters.sort_by_key(|c| c.cluster);
        Self {
            codes: clusters.into_iter().flat_map(|c| c.codes).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HierarchyParseError {
    #[error("model response was not valid codeframe JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model returned an empty code list")]
    Empty,
}

/// Wire shape of the model's JSON reply.
#[derive(Debug, Deserialize)]
struct LlmCodeFrame {
    codes: Vec<Code>,
}

// How many sample answers from a cluster go into the prompt.
const PROMPT_SAMPLE_SIZE: usize = 30;

/// Build the generation prompt for one cluster of answers.
pub fn cluster_prompt(answers: &[&str], config: &JobConfig) -> String {
    let sample: Vec<String> = answers
        .iter()
        .take(PROMPT_SAMPLE_SIZE)
        .map(|a| format!("- {a}"))
        .collect();

    let mece_rule = if config.mece {
        "\n- Codes at each level must be mutually exclusive and collectively exhaustive (MECE): no overlaps, no gaps"
    } else {
        ""
    };

    format!(
        "You are a survey coding specialist. Derive a hierarchical codeframe \
         for the following group of open-ended survey answers. \
         Respond with ONLY valid JSON, no other text.\n\
         \n\
         Format:\n\
         {{\"codes\": [\n\
           {{\"label\": \"<short code label>\", \"description\": \"<one-sentence description>\", \"children\": [...]}}\n\
         ]}}\n\
         \n\
         Rules:\n\
         - Write labels and descriptions in {language}\n\
         - At most {max_codes} codes per level\n\
         - At most {max_depth} levels deep (children of children count as levels)\n\
         - Every code needs a concise, distinct label{mece_rule}\n\
         \n\
         Answers ({total} in this group, sample below):\n\
         {sample}",
        language = config.target_language,
        max_codes = config.max_codes_per_level,
        max_depth = config.max_depth,
        total = answers.len(),
        sample = sample.join("\n"),
    )
}

/// Parse the model's reply and clamp it to the configured limits.
pub fn parse_cluster_codes(
    text: &str,
    config: &JobConfig,
) -> Result<Vec<Code>, HierarchyParseError> {
    let parsed: LlmCodeFrame = serde_json::from_str(text)?;
    if parsed.codes.is_empty() {
        return Err(HierarchyParseError::Empty);
    }
    Ok(clamp_level(
        parsed.codes,
        config.max_depth,
        config.max_codes_per_level,
    ))
}

fn clamp_level(codes: Vec<Code>, depth_left: u32, max_per_level: u32) -> Vec<Code> {
    codes
        .into_iter()
        .take(max_per_level as usize)
        .map(|mut code| {
            code.children = if depth_left > 1 {
                clamp_level(code.children, depth_left - 1, max_per_level)
            } else {
                Vec::new()
            };
            code
        })
        .collect()
}
