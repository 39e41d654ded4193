//! LLM prompts for the form-filling pipeline.

use crate::types::{answer::FieldResponse, document::Passage};

/// Prompt turning a parsed form into a JSON field list.
pub const FIELD_LIST_PROMPT: &str = r#"This is a parsed form.
Convert it into a JSON object containing only the list of fields to be
filled in, in the form {"fields": ["...", "..."]}.
Return JSON ONLY, no markdown.

<form>
{form}
</form>"#;

/// Prompt answering one question from retrieved passages.
pub const ANSWER_PROMPT: &str = r#"Context information is below.
---------------------
{context}
---------------------
Given the context information and not prior knowledge, answer the query.
If the context does not contain the answer, say that the information is not available.
Query: {question}
Answer:"#;

/// Prompt merging per-field responses into the final answer object.
pub const SYNTHESIS_PROMPT: &str = r#"You are given a list of fields in an application form and responses to
questions about those fields {scope}. Combine the two into a list of fields
and succinct, factual answers to fill in those fields.

Rules:
- Output a single JSON object mapping each field name exactly as given to its answer string.
- Include every field listed below, and no others.
- Use only facts stated in the responses. Never invent or guess facts.
- If a response does not actually give the answer, use an empty string "" for that field.
- Return JSON ONLY, no markdown.

<responses>
{responses}
</responses>"#;

/// Format the field-list prompt.
pub fn format_field_list_prompt(form_text: &str) -> String {
    FIELD_LIST_PROMPT.replace("{form}", form_text)
}

/// Question asked of the index for one field.
pub fn format_field_question(field: &str, multiple_sources: bool) -> String {
    let scope = if multiple_sources {
        "the source documents"
    } else {
        "the specific source document"
    };
    format!(
        "This is a question about {scope} we have in our database. \
         How would you answer this question about the applicant? {field}"
    )
}

/// Format the retrieval-answer prompt with numbered passages as context.
pub fn format_answer_prompt(question: &str, passages: &[Passage]) -> String {
    let context = passages
        .iter()
        .map(|p| p.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");

    ANSWER_PROMPT
        .replace("{context}", &context)
        .replace("{question}", question)
}

/// Format the synthesis prompt.
pub fn format_synthesis_prompt(filter_identities: &[String], responses: &[FieldResponse]) -> String {
    let scope = if filter_identities.is_empty() {
        "from all indexed documents".to_string()
    } else {
        format!(
            "using information from source document(s): {}",
            filter_identities.join(", ")
        )
    };

    let responses = responses
        .iter()
        .map(|r| {
            let answer = if r.answer.is_blank() {
                "(no information found)"
            } else {
                r.answer.as_str()
            };
            format!("Field: {}\nResponse: {}", r.field, answer)
        })
        .collect::<Vec<_>>()
        .join("\n");

    SYNTHESIS_PROMPT
        .replace("{scope}", &scope)
        .replace("{responses}", &responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::answer::Answer;

    #[test]
    fn test_field_question_varies_with_scope() {
        let single = format_field_question("Full name", false);
        let multi = format_field_question("Full name", true);
        assert!(single.contains("the specific source document"));
        assert!(multi.contains("the source documents"));
        assert!(single.ends_with("Full name"));
        assert!(multi.ends_with("Full name"));
    }

    #[test]
    fn test_synthesis_prompt_lists_every_field() {
        let responses = vec![
            FieldResponse::new("Full name", Answer::value("Ada Lovelace")),
            FieldResponse::blank("Passport number"),
        ];
        let prompt = format_synthesis_prompt(&["visa-1".to_string()], &responses);

        assert!(prompt.contains("Field: Full name\nResponse: Ada Lovelace"));
        assert!(prompt.contains("Field: Passport number\nResponse: (no information found)"));
        assert!(prompt.contains("source document(s): visa-1"));
        assert!(prompt.contains("Never invent"));
    }

    #[test]
    fn test_answer_prompt_includes_passages() {
        let passages = vec![Passage {
            text: "Name: Ada".into(),
            identity: Some("visa-1".into()),
            score: 0.9,
        }];
        let prompt = format_answer_prompt("What is the name?", &passages);
        assert!(prompt.contains("Name: Ada"));
        assert!(prompt.contains("Query: What is the name?"));
    }
}
