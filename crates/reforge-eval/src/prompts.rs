use std::borrow::Cow;

use crate::ModificationPlan;

/// Largest code body the pipeline accepts, in bytes.
///
/// Code bodies are always sent whole: a model that only sees part of the
/// object cannot return a complete replacement for it.
pub const MAX_OBJECT_LEN: usize = 200_000;

const MAX_SCHEMA_LEN: usize = 20_000;
const MAX_PROMPT_LEN: usize = 8_000;

const SCORING_BANDS: &str = r#"Score on a 0.0 to 1.0 scale:
- 0.0-0.3: major problems
- 0.4-0.6: significant issues
- 0.7-0.8: minor issues
- 0.9-1.0: no meaningful issues"#;

/// Prompt templates for every pipeline stage
pub struct PipelinePrompts;

impl PipelinePrompts {
    /// Build the planning prompt
    pub fn build_plan_prompt(object_code: &str, api_schema: Option<&str>, request: &str) -> String {
        format!(
            r#"# Modification Planning

You are planning a change to a versioned, persistent code object. Decide which
verification checks the change needs and lay out how to implement it.

## Current Code
```
{code}
```

## API Schema
```
{schema}
```

## Requested Modification
{request}

---

## Decide

1. **constraint_check_needed**: does the change risk breaking public interfaces,
   function signatures, type contracts, or the API schema above? Answer true
   whenever the change touches anything callers depend on.
2. **factuality_check_needed**: does the change involve algorithms, math,
   domain knowledge, external systems, or documentation claims whose
   correctness must be verified? Answer true when in doubt.
3. **plan**: the ordered implementation steps.
4. **reasoning**: why you chose the checks above.

## Required Response Format

End your response with a response block:

<response>
{{"status": "ok", "constraint_check_needed": true, "factuality_check_needed": false, "plan": ["step 1", "step 2"], "reasoning": "..."}}
</response>

If the request cannot be planned at all:

<response>
{{"status": "error", "message": "why"}}
</response>"#,
            code = display_code(object_code),
            schema = display_schema(api_schema),
            request = truncate_text(request, MAX_PROMPT_LEN),
        )
    }

    /// Build the code generation prompt
    pub fn build_generation_prompt(
        object_code: &str,
        request: &str,
        plan: &ModificationPlan,
    ) -> String {
        format!(
            r#"# Code Modification

You are modifying a versioned code object in place. Follow these rules:

- Make the minimal change that satisfies the request.
- Preserve the existing style, naming, and structure.
- Add brief comments explaining non-obvious changes.
- Preserve compatibility for existing callers unless the request says otherwise.
- Return the COMPLETE modified code, not a diff.

## Current Code
```
{code}
```

## Requested Modification
{request}

## Implementation Plan
{plan}

## Planner Reasoning
{reasoning}

---

## Required Response Format

End your response with a response block. `modified_code` must contain the full
replacement code body as a JSON string.

<response>
{{"status": "ok", "modified_code": "...", "modification_summary": "...", "approach": "...", "considerations": ["..."], "risks": ["..."], "suggested_tests": [{{"name": "...", "purpose": "...", "code": "..."}}]}}
</response>"#,
            code = display_code(object_code),
            request = truncate_text(request, MAX_PROMPT_LEN),
            plan = format_steps(&plan.steps),
            reasoning = if plan.reasoning.trim().is_empty() {
                "(none given)"
            } else {
                plan.reasoning.trim()
            },
        )
    }

    /// Build the interface/API constraint review prompt
    pub fn build_constraint_prompt(
        original_code: &str,
        candidate_code: &str,
        api_schema: Option<&str>,
    ) -> String {
        format!(
            r#"# Constraint Review

You are a strict reviewer checking that a code change preserves its contracts.

## Original Code
```
{original}
```

## Modified Code
```
{candidate}
```

## API Schema
```
{schema}
```

---

## Evaluate

1. Are public interfaces and exported functions preserved?
2. Are type and signature contracts consistent?
3. Does the modified code still satisfy the API schema (if any)?
4. Does it avoid regressions relative to the original?

{bands}

## Required Response Format

<response>
{{"status": "ok", "score": 0.85, "issues": ["..."], "analysis": "..."}}
</response>"#,
            original = display_code(original_code),
            candidate = display_code(candidate_code),
            schema = display_schema(api_schema),
            bands = SCORING_BANDS,
        )
    }

    /// Build the technical correctness review prompt
    pub fn build_factuality_prompt(
        request: &str,
        original_code: &str,
        candidate_code: &str,
    ) -> String {
        format!(
            r#"# Factuality Review

You are a reviewer checking a code change for technical correctness.

## Requested Modification
{request}

## Original Code
```
{original}
```

## Modified Code
```
{candidate}
```

---

## Evaluate

1. Are the algorithms and any math correct?
2. Is domain knowledge applied accurately?
3. Are references to external systems, libraries, and APIs accurate?
4. Do comments and documentation match what the code does?

{bands}

## Required Response Format

<response>
{{"status": "ok", "score": 0.85, "issues": ["..."], "analysis": "..."}}
</response>"#,
            request = truncate_text(request, MAX_PROMPT_LEN),
            original = display_code(original_code),
            candidate = display_code(candidate_code),
            bands = SCORING_BANDS,
        )
    }

    /// Build the human-preference review prompt
    pub fn build_preference_prompt(
        request: &str,
        original_code: &str,
        candidate_code: &str,
    ) -> String {
        format!(
            r#"# Preference Review

You are an experienced engineer judging how a human maintainer would feel about
this change.

## Requested Modification
{request}

## Original Code
```
{original}
```

## Modified Code
```
{candidate}
```

---

## Evaluate

1. **Readability**: is the code easy to follow?
2. **Maintainability**: will it be easy to change later?
3. **Design**: is the solution elegant and proportionate?
4. **Completeness**: does it fully address the request?
5. **Documentation**: are comments and docs adequate?

{bands}

## Required Response Format

<response>
{{"status": "ok", "score": 0.85, "strengths": ["..."], "weaknesses": ["..."], "analysis": "..."}}
</response>"#,
            request = truncate_text(request, MAX_PROMPT_LEN),
            original = display_code(original_code),
            candidate = display_code(candidate_code),
            bands = SCORING_BANDS,
        )
    }
}

fn display_code(code: &str) -> &str {
    if code.trim().is_empty() {
        "(empty: this is a new object)"
    } else {
        code
    }
}

fn display_schema(schema: Option<&str>) -> Cow<'_, str> {
    match schema {
        Some(s) if !s.trim().is_empty() => truncate_text(s, MAX_SCHEMA_LEN),
        _ => Cow::Borrowed("(no schema declared)"),
    }
}

fn format_steps(steps: &[String]) -> String {
    if steps.is_empty() {
        return "(no steps given)".to_string();
    }
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to at most `max_len` bytes, preferring a line boundary
pub(crate) fn truncate_text(text: &str, max_len: usize) -> Cow<'_, str> {
    if text.len() <= max_len {
        return Cow::Borrowed(text);
    }

    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &text[..cut];
    let head = match head.rfind('\n') {
        Some(pos) => &head[..pos],
        None => head,
    };

    Cow::Owned(format!(
        "{}\n[... truncated {} bytes ...]",
        head,
        text.len() - head.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_text() {
        assert!(matches!(truncate_text("abc", 10), Cow::Borrowed("abc")));
    }

    #[test]
    fn test_truncate_prefers_line_boundary() {
        let text = "line one\nline two\nline three";
        let truncated = truncate_text(text, 12);
        assert!(truncated.starts_with("line one\n[... truncated"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "ééééé";
        let truncated = truncate_text(text, 3);
        assert!(truncated.starts_with('é'));
    }

    #[test]
    fn test_plan_prompt_marks_new_objects() {
        let prompt = PipelinePrompts::build_plan_prompt("", None, "create a counter");
        assert!(prompt.starts_with("# Modification Planning"));
        assert!(prompt.contains("(empty: this is a new object)"));
        assert!(prompt.contains("(no schema declared)"));
        assert!(prompt.contains("create a counter"));
    }

    #[test]
    fn test_generation_prompt_includes_plan_steps() {
        let plan = ModificationPlan {
            constraint_check_needed: true,
            factuality_check_needed: false,
            steps: vec!["add field".into(), "update getter".into()],
            reasoning: "touches public API".into(),
        };
        let prompt = PipelinePrompts::build_generation_prompt("struct A;", "add a field", &plan);
        assert!(prompt.contains("1. add field\n2. update getter"));
        assert!(prompt.contains("touches public API"));
        assert!(prompt.contains("struct A;"));
    }

    #[test]
    fn test_large_code_bodies_are_sent_whole() {
        let code: String = (0..3000)
            .map(|i| format!("pub fn function_number_{:05}() -> u32 {{ {} }}\n", i, i))
            .collect();
        assert!(code.len() > 60_000 && code.len() <= MAX_OBJECT_LEN);

        let plan = ModificationPlan {
            constraint_check_needed: true,
            factuality_check_needed: true,
            steps: vec![],
            reasoning: String::new(),
        };
        let generation = PipelinePrompts::build_generation_prompt(&code, "rename", &plan);
        let constraint = PipelinePrompts::build_constraint_prompt(&code, &code, None);
        for prompt in [&generation, &constraint] {
            assert!(prompt.contains("function_number_00000"));
            assert!(prompt.contains("function_number_02999"));
            assert!(!prompt.contains("[... truncated"));
        }
    }

    #[test]
    fn test_review_prompts_have_distinct_headings() {
        let constraint = PipelinePrompts::build_constraint_prompt("a", "b", Some("{}"));
        let factuality = PipelinePrompts::build_factuality_prompt("r", "a", "b");
        let preference = PipelinePrompts::build_preference_prompt("r", "a", "b");
        assert!(constraint.starts_with("# Constraint Review"));
        assert!(factuality.starts_with("# Factuality Review"));
        assert!(preference.starts_with("# Preference Review"));
    }
}
