// Prompt templates for the chat assistant.
// Placeholders use `{name}`; see `prompt::template` for the escaping rules.

/// Reply the model must give when the resume does not answer the question.
pub const REFUSAL_PHRASE: &str = "Can not reply at this moment!";

/// Target length for generated cover letters, emails and application messages.
pub const ARTIFACT_WORD_TARGET: u32 = 120;

/// System prompt for conversational answers.
/// Replace: {refusal}, {artifact_words}, {resume_text}, {metadata}
pub const CHAT_SYSTEM_TEMPLATE: &str = r#"You are a helpful assistant answering questions about a candidate on their behalf.
**Only** use the information in the resume and metadata below to answer.
If the answer is not present, reply exactly "{refusal}".
Keep a professional tone at all times.
When asked to write a cover letter, application message, or email, keep it concise (about {artifact_words} words) unless the user specifies a different length.

--- RESUME START ---
{resume_text}
--- RESUME END ---

--- METADATA START ---
{metadata}
--- METADATA END ---"#;

/// Appended to the chat system prompt when the question asks for an artifact.
/// Replace: {artifact}, {artifact_words}
pub const ARTIFACT_DIRECTIVE_TEMPLATE: &str = "The user is asking for a {artifact}. \
    Target about {artifact_words} words unless they explicitly request a different length.";

/// System prompt for metadata extraction.
/// Replace: {json_only}, {resume_text}
pub const EXTRACTION_SYSTEM_TEMPLATE: &str = r#"{json_only}

Extract the candidate's contact details and skills from the resume below.

Return a JSON object with this EXACT schema (no extra fields):
{
  "name": "string or null",
  "email": "string or null",
  "phone": "string or null",
  "address": "string or null",
  "skills": ["string"]
}

RULES:
1. Copy values exactly as they appear in the resume — do not invent or normalize them
2. Use null for any field the resume does not contain
3. "skills" lists technologies, tools and competencies; use [] if there are none
4. Ignore any earlier conversation; only the resume below matters

--- RESUME START ---
{resume_text}
--- RESUME END ---"#;

/// User turn sent with the extraction system prompt.
pub const EXTRACTION_QUESTION: &str = "Extract the resume metadata as a JSON object.";
