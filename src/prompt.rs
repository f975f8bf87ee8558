//! Prompt composer.
//!
//! Renders a snapshot and an instruction into the system/user message pair
//! sent to the model. The system message fixes the output schema; the user
//! message embeds every snapshot file verbatim followed by the instruction.
//! Nothing is truncated here.

use crate::models::RepositorySnapshot;

/// The two messages of a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

/// Output contract the validator relies on.
const SYSTEM_PROMPT: &str = "\
You are a senior software engineer editing a repository on behalf of a user.
You receive the current contents of the repository's source files and an instruction.
Decide which files must change, be created, or be deleted to carry out the instruction.

Respond with valid JSON only: exactly one object and no prose, comments, or Markdown \
code fences before or after it. The object has this shape:

{
  \"pr_title\": \"short pull request title\",
  \"pr_body\": \"pull request description (may be empty)\",
  \"changes\": {
    \"<path/relative/to/repository/root>\": {
      \"commit_message\": \"non-empty commit message for this file\",
      \"updated_code\": \"the complete new content of the file\"
    }
  }
}

Rules:
- Include only files that need to change or be created. Omit unchanged files entirely.
- \"updated_code\" is always the full file content, never a diff or an excerpt.
- To delete a file, include it with \"updated_code\" set to an empty string.
- Every entry must have a non-empty \"commit_message\".
- Paths are relative to the repository root and use forward slashes.
- If nothing needs to change, return \"changes\": {}.
- Prefer wrapping generated code at 88 columns.";

/// Build the system/user messages for one run.
pub fn compose_prompt(snapshot: &RepositorySnapshot, instruction: &str) -> ComposedPrompt {
    let mut user = String::new();

    let root = if snapshot.root.is_empty() {
        "the repository root".to_string()
    } else {
        format!("`{}`", snapshot.root)
    };
    user.push_str(&format!(
        "## Repository Files\n\n\
        {} file(s) under {root} on branch `{}`.\n\n",
        snapshot.len(),
        snapshot.git_ref,
    ));

    for (path, content) in snapshot.iter() {
        let fence = fence_for(content);
        user.push_str(&format!("### File: {path}\n\n{fence}\n{content}"));
        if !content.ends_with('\n') {
            user.push('\n');
        }
        user.push_str(&format!("{fence}\n\n"));
    }

    user.push_str(&format!("## Instruction\n\n{instruction}\n"));

    ComposedPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Pick a backtick fence longer than any backtick run inside `content`.
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut current = 0;
    for c in content.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    "`".repeat(longest.max(2) + 1)
}
