//! Per-invocation context and patch branch naming.

use uuid::Uuid;

use crate::constants::BRANCH_SUFFIX_LEN;

/// State owned by exactly one pipeline invocation.
///
/// Created fresh for every run and passed through the stages; never shared
/// between concurrent runs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub instruction: String,
    pub branch: String,
}

impl RunContext {
    pub fn new(instruction: impl Into<String>, branch_prefix: &str) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            instruction: instruction.into(),
            branch: generate_branch_name(branch_prefix),
        }
    }
}

/// `<prefix><8 random hex chars>`, e.g. `auto-fix-3fa85f64`.
pub fn generate_branch_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &suffix[..BRANCH_SUFFIX_LEN])
}
