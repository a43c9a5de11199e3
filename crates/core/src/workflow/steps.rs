use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Step key recorded on ledger entries written by the submitter
/// (submission and resubmission).
pub const SUBMIT_STEP_KEY: &str = "submit";
pub const SUBMITTER_ROLE: &str = "Submitter";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub key: String,
    pub label: String,
    pub required_role: String,
}

impl StepDefinition {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        required_role: impl Into<String>,
    ) -> Self {
        Self { key: key.into(), label: label.into(), required_role: required_role.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StepRegistryError {
    #[error("step registry must define at least one step")]
    Empty,
    #[error("duplicate step key `{0}`")]
    DuplicateKey(String),
}

/// The fixed, ordered approval sequence. Built once at process start and
/// injected into the engine; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepRegistry {
    steps: Vec<StepDefinition>,
}

impl StepRegistry {
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self, StepRegistryError> {
        if steps.is_empty() {
            return Err(StepRegistryError::Empty);
        }
        for (index, step) in steps.iter().enumerate() {
            if steps[..index].iter().any(|earlier| earlier.key == step.key) {
                return Err(StepRegistryError::DuplicateKey(step.key.clone()));
            }
        }
        Ok(Self { steps })
    }

    /// The built-in five-step contract-closing sequence.
    pub fn standard() -> Self {
        Self {
            steps: vec![
                StepDefinition::new(SUBMIT_STEP_KEY, "Submit", SUBMITTER_ROLE),
                StepDefinition::new("manager_review", "Manager Review", "Manager"),
                StepDefinition::new("finance_review", "Finance Review", "Finance"),
                StepDefinition::new("compliance_review", "Compliance Review", "Compliance"),
                StepDefinition::new("executive_signoff", "Executive Sign-off", "Executive"),
            ],
        }
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step_by_key(&self, key: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.key == key)
    }

    /// First step owned by `role`, matched case-insensitively.
    pub fn step_key_for_role(&self, role: &str) -> Option<&str> {
        let role_key = normalize_key(role);
        self.steps
            .iter()
            .find(|step| normalize_key(&step.required_role) == role_key)
            .map(|step| step.key.as_str())
    }

    /// Sequencing primitive: `None` yields the first step (process start);
    /// a valid key yields the following step; the last step and unknown
    /// keys yield `None`. Callers validate the key separately before
    /// treating `None` as "finalize".
    pub fn next_step_key(&self, current: Option<&str>) -> Option<&str> {
        match current {
            None => self.steps.first().map(|step| step.key.as_str()),
            Some(key) => {
                let position = self.steps.iter().position(|step| step.key == key)?;
                self.steps.get(position + 1).map(|step| step.key.as_str())
            }
        }
    }

    pub fn first_step_key(&self) -> &str {
        &self.steps[0].key
    }

    /// The active step of a freshly created request. Creation itself counts
    /// as completing the nominal first step, so this is the second entry;
    /// a single-step registry falls back to its only step.
    pub fn post_creation_step_key(&self) -> &str {
        self.steps.get(1).map(|step| step.key.as_str()).unwrap_or(self.first_step_key())
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
