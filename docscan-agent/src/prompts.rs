//! Prompt text for the LLM-backed roles

use serde_json::json;

/// Name of the tool the reader must call with its verdict
pub const VERDICT_TOOL: &str = "record_verdict";

/// System prompt for the page reader
pub const READER_SYSTEM: &str = "\
You are a systematic document scanner. You read exactly one page at a time.
Your job is NOT to answer the user. Your only job is to extract facts from the
page that bear on the user's question.

Rules:
1. Judge only the page you are given. Do not use outside knowledge.
2. Keep extracting even if an earlier page seemed to answer the question:
   later pages may correct or cancel earlier information, so record anything
   that updates, contradicts or supersedes a fact.
3. Report your decision by calling `record_verdict`:
   - relevant page: `relevant = true` and a one or two sentence `summary`
     stating the facts, including dates and changes
   - irrelevant page: `relevant = false` (summary may be omitted)
4. Names that merely resemble the topic (code identifiers, metaphors) are not
   relevant.";

/// User prompt for one page
pub fn reader_prompt(query: &str, page: &str) -> String {
    format!(
        "**User question:** {}\n\n**Page content:**\n```\n{}\n```\n\n\
         Call `{}` with your verdict for this page.",
        query, page, VERDICT_TOOL
    )
}

/// JSON schema of the verdict tool
pub fn verdict_tool_parameters() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "relevant": {
                "type": "boolean",
                "description": "Whether the page contains information bearing on the question"
            },
            "summary": {
                "type": "string",
                "description": "Facts extracted from the page; required when relevant"
            }
        },
        "required": ["relevant"]
    })
}

/// System prompt for the final writer
pub const WRITER_SYSTEM: &str = "\
You are a helpful assistant answering a question from notes that were
extracted from internal documents, in the order the pages were read.

Instructions:
- Use ONLY the notes to answer. Do not make up information that is not in them.
- Notes further down the list come from later pages. When two notes
  contradict each other, the later note wins; mention the change if useful.
- If the notes do not answer the question, say that no information was found.";

/// User prompt for the final writer
pub fn writer_prompt(query: &str, knowledge_base: &str) -> String {
    format!(
        "The user asked: \"{}\"\n\nExtracted notes:\n====================\n{}\n====================",
        query, knowledge_base
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_prompt_embeds_query_and_page() {
        let prompt = reader_prompt("What day is pizza day?", "Monday: Pizza Day");
        assert!(prompt.contains("What day is pizza day?"));
        assert!(prompt.contains("```\nMonday: Pizza Day\n```"));
        assert!(prompt.contains(VERDICT_TOOL));
    }

    #[test]
    fn test_verdict_schema_requires_relevance() {
        let schema = verdict_tool_parameters();
        assert_eq!(schema["required"], json!(["relevant"]));
        assert_eq!(schema["properties"]["summary"]["type"], "string");
    }

    #[test]
    fn test_writer_prompt_wraps_notes() {
        let prompt = writer_prompt("q", "- a\n- b");
        assert!(prompt.contains("====================\n- a\n- b\n===================="));
    }
}
