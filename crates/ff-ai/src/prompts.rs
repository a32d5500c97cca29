//! Prompt templates for code and documentation generation

use ff_protocol::{CodeType, GenerationRequest};

/// System prompt for code generation
pub const CODE_SYSTEM_PROMPT: &str = r#"You are FlashFusion's senior software engineer.

Rules:
- Return ONLY the requested source code, in a single fenced code block
- No explanations before or after the code
- Production-ready: typed, accessible, with error handling where it matters
- Follow the conventions of the requested framework and language
- Never include real credentials; use environment variables or placeholders
"#;

/// System prompt for documentation generation
pub const DOCS_SYSTEM_PROMPT: &str = r#"You are FlashFusion's technical writer.

Write concise Markdown documentation for the code you are given:
- A one-paragraph overview
- Usage example
- Props, parameters or endpoints in a table where applicable
- Notable edge cases
"#;

/// Build the user prompt for a code-generation request
pub fn build_code_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Generate {} using {}.\n\n",
        request.code_type.describe(),
        request.framework.trim()
    ));

    if let Some(language) = request.language.as_deref().filter(|l| !l.trim().is_empty()) {
        prompt.push_str(&format!("Language: {}\n\n", language.trim()));
    }

    prompt.push_str("## Requirements\n");
    prompt.push_str(request.requirements.trim());
    prompt.push_str("\n\n");

    if !request.features.is_empty() {
        prompt.push_str("## Features\n");
        for feature in &request.features {
            prompt.push_str(&format!("- {feature}\n"));
        }
        prompt.push('\n');
    }

    if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str("## Existing Context\n```\n");
        prompt.push_str(context.trim());
        prompt.push_str("\n```\n\n");
    }

    if let Some(extra) = request
        .options
        .as_ref()
        .and_then(|o| o.custom_instructions.as_deref())
        .filter(|s| !s.trim().is_empty())
    {
        prompt.push_str("## Additional Instructions\n");
        prompt.push_str(extra.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str(type_guidance(request.code_type));
    prompt
}

fn type_guidance(code_type: CodeType) -> &'static str {
    match code_type {
        CodeType::Component => "Export the component as the default export and type its props.\n",
        CodeType::Page => "Include data loading, loading and error states.\n",
        CodeType::Api => "Validate the request body and return typed JSON responses with proper status codes.\n",
        CodeType::Hook => "Return a stable object and clean up subscriptions on unmount.\n",
        CodeType::Utility => "Keep functions pure and export each one by name.\n",
        CodeType::Test => "Cover the happy path, edge cases and failure modes.\n",
        CodeType::FullApp => {
            "Keep every file in the one code block. Start each file with a comment line \
             holding its relative path, e.g. `// src/App.tsx`.\n"
        }
    }
}

/// Build the user prompt for documenting a piece of code
pub fn build_docs_prompt(code: &str, code_type: CodeType) -> String {
    format!(
        "Document the following {}.\n\n```\n{}\n```\n",
        code_type.describe().trim_start_matches("a ").trim_start_matches("an "),
        code.trim()
    )
}
