use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::knowledge::Chunk;
use crate::llm::{GenerateError, Generator};
use crate::normalize::normalize;
use crate::prompts::PromptSet;
use crate::selector::build_selector_map;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent Generation Failed: {0}")]
    Generation(#[from] GenerateError),

    #[error("Agent Generation Failed: {0}")]
    InvalidPlan(#[from] serde_json::Error),

    #[error("Error generating script: {0}")]
    Script(GenerateError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub test_id: String,
    #[serde(default = "default_feature")]
    pub feature: String,
    #[serde(default = "default_test_type")]
    pub test_type: String,
    #[serde(default = "default_scenario")]
    pub scenario: String,
    #[serde(default = "default_preconditions")]
    pub preconditions: String,
    #[serde(default)]
    pub test_steps: Vec<String>,
    #[serde(default = "default_expected_result")]
    pub expected_result: String,
    #[serde(default = "default_grounded_in")]
    pub grounded_in: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_feature() -> String {
    "General".into()
}
fn default_test_type() -> String {
    "Positive".into()
}
fn default_scenario() -> String {
    "No description".into()
}
fn default_preconditions() -> String {
    "None".into()
}
fn default_expected_result() -> String {
    "Success".into()
}
fn default_grounded_in() -> String {
    "Unknown".into()
}
fn default_priority() -> String {
    "Medium".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPlan {
    pub test_cases: Vec<TestCase>,
}

/// The two generation steps: test strategist (docs -> test plan) and
/// automation engineer (test case + HTML -> Selenium script).
#[derive(Clone)]
pub struct QaAgents {
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptSet>,
}

impl QaAgents {
    pub fn new(generator: Arc<dyn Generator>, prompts: PromptSet) -> Self {
        Self {
            generator,
            prompts: Arc::new(prompts),
        }
    }

    /// Draft a test plan for `query`, grounded in the retrieved documentation chunks.
    pub async fn generate_test_plan(
        &self,
        query: &str,
        chunks: &[Chunk],
    ) -> Result<TestPlan, AgentError> {
        let context = build_context(chunks);
        let prompt = self.prompts.test_plan_prompt(&context, query);
        info!(
            backend = %self.generator.name(),
            chunks = chunks.len(),
            "generating test plan"
        );

        let response = self
            .generator
            .generate(&prompt, &self.prompts.test_strategist.system)
            .await?;
        let plan: TestPlan = serde_json::from_str(strip_json_fences(&response)).map_err(|e| {
            warn!(error = %e, response_len = response.len(), "model returned an unparseable plan");
            e
        })?;

        debug!(test_cases = plan.test_cases.len(), "test plan parsed");
        Ok(plan)
    }

    /// Draft a Selenium script for one test case, constrained to the selectors found in `html`.
    pub async fn generate_script(
        &self,
        test_case_json: &str,
        html: &str,
    ) -> Result<String, AgentError> {
        let skeleton = normalize(html);
        let selector_map = build_selector_map(html);
        let prompt = self.prompts.script_prompt(
            &skeleton,
            &selector_map.to_prompt_text(),
            test_case_json,
        );
        info!(
            backend = %self.generator.name(),
            selectors = selector_map.len(),
            "generating automation script"
        );

        let response = self
            .generator
            .generate(&prompt, &self.prompts.automation_engineer.system)
            .await
            .map_err(AgentError::Script)?;
        Ok(clean_code_output(&response))
    }
}

/// Render retrieved chunks as `[Source: file]` blocks separated by blank lines.
pub fn build_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[Source: {}]\n{}", c.source, c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Strip a surrounding ```` ```json ```` fence from a model reply.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Remove Markdown code fences (```` ```python ````, bare ```` ``` ````) from generated code.
pub fn clean_code_output(code: &str) -> String {
    code.lines()
        .filter(|line| !is_fence_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn is_fence_line(line: &str) -> bool {
    line.trim_end()
        .strip_prefix("```")
        .is_some_and(|lang| lang.chars().all(|c| c.is_ascii_alphanumeric()))
}
