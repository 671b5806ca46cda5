use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

const TEST_STRATEGIST_SYSTEM: &str = "You are an Expert QA Test Lead.
INSTRUCTIONS:
1. Analyze the provided context.
2. Generate a test plan based ONLY on that context.
3. Output must be valid JSON matching the EXAMPLE below.
4. Do NOT output schema definitions (defs/properties).";

const TEST_STRATEGIST_USER: &str = r#"
CONTEXT:
{context}

JSON EXAMPLE:
{
    "test_cases": [
        {
            "test_id": "TC-001",
            "feature": "Login",
            "test_type": "Positive",
            "scenario": "Successful login",
            "preconditions": "User is on login page",
            "test_steps": ["Enter user", "Click Login"],
            "expected_result": "Dashboard loads",
            "grounded_in": "auth.md",
            "priority": "High"
        }
    ]
}

Generate test plan for: {query}
"#;

const AUTOMATION_ENGINEER_SYSTEM: &str =
    "You are a Senior QA Automation Engineer specializing in robust, production-grade Selenium 4 (Python).";

const AUTOMATION_ENGINEER_USER: &str = r##"
=== INPUT CONTEXT ===
1. HTML SKELETON: a simplified view of the actual DOM. This is your ONLY source of truth.
{html_skeleton}

2. SELECTOR MAP: the only locators you may use, one per line as ROLE: 'label' -> locator.
{selector_map}

3. TEST CASE: the user flow you must automate.
{test_case}

=== SELECTOR RULES (ZERO TOLERANCE FOR HALLUCINATIONS) ===
1. Strict existence: never invent IDs, names or classes. If an attribute is not in the HTML SKELETON or SELECTOR MAP, it does not exist.
2. Map locators to Selenium exactly: Identifier -> By.ID, Name -> By.NAME, XPathByPlaceholder and XPathByNormalizedText -> By.XPATH with the given expression, LinkText -> By.LINK_TEXT.
3. Do not confuse name="q" with id="q". Use the locator kind the map gives you.
4. An element whose locator is Unavailable must not be guessed. Add a comment "# MANUAL INSPECTION REQUIRED: <label>" where it is needed and skip the interaction.
5. For text matching on containers use contains(., 'Text'), never text()='...'.
6. Radio buttons and checkboxes: select by the input's value or id, not by the visible label.

=== INTERACTION RULES ===
1. Dropdowns (<select>): use Select(driver.find_element(...)).select_by_visible_text("Option"). Never send_keys or click options directly.
2. Never use time.sleep(). Use WebDriverWait(driver, 10).until(...) for every interaction:
   EC.element_to_be_clickable for buttons, links and inputs;
   EC.visibility_of_element_located for messages and headings;
   EC.presence_of_element_located only for hidden DOM elements.
3. If the test assumes a prior state (e.g. "Checkout"), perform the setup steps first.

=== CODE STRUCTURE ===
1. Imports: webdriver, By, WebDriverWait, expected_conditions as EC, Select, TimeoutException, NoSuchElementException.
2. Setup: options = webdriver.ChromeOptions(); options.add_argument('--headless'); driver = webdriver.Chrome(options=options).
3. Load the page with driver.get("file:///path/to/uploaded/file.html").
4. Wrap the flow in try/except/finally. On TimeoutException print "FAILED: Element not found". Call driver.quit() in finally.
5. Verify success through visible UI elements (text, messages, headings). Print "SUCCESSFUL" only when assertions pass.

=== OUTPUT FORMAT ===
Return ONLY the raw Python code. No Markdown fences. No conversational filler.
"##;

/// Placeholder used when the selector map has no entries.
pub const NO_SELECTOR_MAP: &str =
    "(no selector map available - rely on the HTML SKELETON only)";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentPrompt {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub user_template: String,
}

/// System prompts and user templates for both agents.
///
/// Templates use `{name}` placeholders; any other braces are left untouched, so
/// JSON examples can be written literally.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptSet {
    #[serde(default = "default_test_strategist")]
    pub test_strategist: AgentPrompt,
    #[serde(default = "default_automation_engineer")]
    pub automation_engineer: AgentPrompt,
}

fn default_test_strategist() -> AgentPrompt {
    AgentPrompt {
        system: TEST_STRATEGIST_SYSTEM.to_string(),
        user_template: TEST_STRATEGIST_USER.to_string(),
    }
}

fn default_automation_engineer() -> AgentPrompt {
    AgentPrompt {
        system: AUTOMATION_ENGINEER_SYSTEM.to_string(),
        user_template: AUTOMATION_ENGINEER_USER.to_string(),
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            test_strategist: default_test_strategist(),
            automation_engineer: default_automation_engineer(),
        }
    }
}

impl PromptSet {
    /// Load overrides from a YAML file. Agents missing from the file keep the built-in prompts.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Prompt file {} not found", path.display()))?;
        let prompts = Self::from_yaml_str(&yaml)
            .with_context(|| format!("Error parsing prompt file {}", path.display()))?;
        info!(path = %path.display(), "loaded prompt overrides");
        Ok(prompts)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn test_plan_prompt(&self, context: &str, query: &str) -> String {
        render(
            &self.test_strategist.user_template,
            &[("context", context), ("query", query)],
        )
    }

    pub fn script_prompt(&self, html_skeleton: &str, selector_map: &str, test_case: &str) -> String {
        let selector_map = if selector_map.is_empty() {
            NO_SELECTOR_MAP
        } else {
            selector_map
        };
        render(
            &self.automation_engineer.user_template,
            &[
                ("html_skeleton", html_skeleton),
                ("selector_map", selector_map),
                ("test_case", test_case),
            ],
        )
    }
}

/// Substitute `{key}` placeholders in a single pass, so substituted values are never re-scanned.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replaced = after.find('}').and_then(|end| {
            let key = &after[..end];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, end))
        });
        match replaced {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_known_placeholders_only() {
        let out = render("{a} and {\"json\": 1} and {b}", &[("a", "X"), ("b", "Y")]);
        assert_eq!(out, "X and {\"json\": 1} and Y");
    }

    #[test]
    fn render_does_not_rescan_values() {
        let out = render("{a}{b}", &[("a", "{b}"), ("b", "2")]);
        assert_eq!(out, "{b}2");
    }

    #[test]
    fn render_keeps_unclosed_brace() {
        assert_eq!(render("tail {", &[]), "tail {");
    }

    #[test]
    fn test_plan_prompt_embeds_context_and_query() {
        let prompt = PromptSet::default().test_plan_prompt("[Source: a.md]\nRules", "checkout");
        assert!(prompt.contains("[Source: a.md]\nRules"));
        assert!(prompt.contains("Generate test plan for: checkout"));
        assert!(prompt.contains("\"test_id\": \"TC-001\""));
    }

    #[test]
    fn script_prompt_marks_missing_map() {
        let prompt = PromptSet::default().script_prompt("<button> Go</button>", "", "{}");
        assert!(prompt.contains(NO_SELECTOR_MAP));
        assert!(prompt.contains("<button> Go</button>"));
    }

    #[test]
    fn script_prompt_keeps_manual_inspection_rule_and_tail() {
        let prompt = PromptSet::default().script_prompt("<input>", "", "{\"test_id\":\"TC-1\"}");
        assert!(prompt.contains("\"# MANUAL INSPECTION REQUIRED: <label>\""));
        assert!(prompt.contains("{\"test_id\":\"TC-1\"}"));
        assert!(prompt.trim_end().ends_with("No conversational filler."));
    }

    #[test]
    fn yaml_overrides_one_agent() {
        let prompts = PromptSet::from_yaml_str(
            "test_strategist:\n  system: Be brief.\n  user_template: 'Q={query}'\n",
        )
        .unwrap();
        assert_eq!(prompts.test_strategist.system, "Be brief.");
        assert_eq!(prompts.test_plan_prompt("", "login"), "Q=login");
        assert_eq!(
            prompts.automation_engineer.system,
            AUTOMATION_ENGINEER_SYSTEM
        );
    }

    #[test]
    fn missing_prompt_file_is_error() {
        let err = PromptSet::from_yaml_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
