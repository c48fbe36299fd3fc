//! Prompt Assembler — turns session state plus a new message into a `PromptSpec`.
//!
//! Two modes:
//! - `Chat`: resume + metadata grounded answer, with the window's history.
//! - `Extraction`: resume only, asks for the fixed metadata JSON schema.
//!
//! All untrusted text (resume, metadata) enters prompts through `Template::render`,
//! never through string concatenation or chained `replace` calls.

pub mod prompts;
pub mod template;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::session::{SessionView, Turn};
use prompts::{
    ARTIFACT_DIRECTIVE_TEMPLATE, ARTIFACT_WORD_TARGET, CHAT_SYSTEM_TEMPLATE, EXTRACTION_QUESTION,
    EXTRACTION_SYSTEM_TEMPLATE, REFUSAL_PHRASE,
};
use template::Template;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptBuildError {
    #[error("Unknown prompt mode '{0}'")]
    UnknownMode(String),

    #[error("Template placeholder '{0}' has no value")]
    MissingValue(String),

    #[error("Question must not be empty")]
    EmptyQuestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    Chat,
    Extraction,
}

impl FromStr for PromptMode {
    type Err = PromptBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(PromptMode::Chat),
            "extraction" => Ok(PromptMode::Extraction),
            _ => Err(PromptBuildError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptMode::Chat => f.write_str("chat"),
            PromptMode::Extraction => f.write_str("extraction"),
        }
    }
}

/// An assembled prompt. Only the builders in this module can construct one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptSpec {
    mode: PromptMode,
    system: String,
    history: Vec<Turn>,
    question: String,
}

impl PromptSpec {
    pub fn mode(&self) -> PromptMode {
        self.mode
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn question(&self) -> &str {
        &self.question
    }
}

/// Generated documents that get a length target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    CoverLetter,
    ApplicationMessage,
    Email,
}

const WRITING_VERBS: &[&str] = &[
    "write", "draft", "compose", "generate", "create", "prepare", "craft",
];

impl ArtifactKind {
    /// Detects a request for a generated artifact.
    ///
    /// Cover letters count on mention alone. Emails and messages need a writing verb,
    /// so "what is your email?" stays a plain question.
    pub fn detect(question: &str) -> Option<Self> {
        let q = question.to_lowercase();
        if q.contains("cover letter") || q.contains("coverletter") {
            return Some(ArtifactKind::CoverLetter);
        }

        let wants_writing = WRITING_VERBS.iter().any(|verb| q.contains(verb));
        if !wants_writing {
            return None;
        }
        if q.contains("email") || q.contains("e-mail") {
            Some(ArtifactKind::Email)
        } else if q.contains("message") || q.contains("application") {
            Some(ArtifactKind::ApplicationMessage)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::CoverLetter => "cover letter",
            ArtifactKind::ApplicationMessage => "application message",
            ArtifactKind::Email => "email",
        }
    }
}

pub fn build_prompt(
    mode: PromptMode,
    session: &SessionView,
    question: &str,
) -> Result<PromptSpec, PromptBuildError> {
    match mode {
        PromptMode::Chat => build_chat_prompt(session, question),
        PromptMode::Extraction => build_extraction_prompt(session),
    }
}

/// Builds a grounded conversational prompt carrying the session's history.
pub fn build_chat_prompt(
    session: &SessionView,
    question: &str,
) -> Result<PromptSpec, PromptBuildError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(PromptBuildError::EmptyQuestion);
    }

    let artifact_words = ARTIFACT_WORD_TARGET.to_string();
    let metadata = session.metadata.format_for_prompt();
    let mut system = Template::parse(CHAT_SYSTEM_TEMPLATE).render(&[
        ("refusal", REFUSAL_PHRASE),
        ("artifact_words", &artifact_words),
        ("resume_text", session.resume_text.trim()),
        ("metadata", &metadata),
    ])?;

    if let Some(artifact) = ArtifactKind::detect(question) {
        let directive = Template::parse(ARTIFACT_DIRECTIVE_TEMPLATE).render(&[
            ("artifact", artifact.label()),
            ("artifact_words", &artifact_words),
        ])?;
        system.push_str("\n\n");
        system.push_str(&directive);
    }

    Ok(PromptSpec {
        mode: PromptMode::Chat,
        system,
        history: session.history.clone(),
        question: question.to_string(),
    })
}

/// Builds the metadata extraction prompt. History is deliberately left out.
pub fn build_extraction_prompt(session: &SessionView) -> Result<PromptSpec, PromptBuildError> {
    let system = Template::parse(EXTRACTION_SYSTEM_TEMPLATE).render(&[
        ("json_only", JSON_ONLY_SYSTEM),
        ("resume_text", session.resume_text.trim()),
    ])?;

    Ok(PromptSpec {
        mode: PromptMode::Extraction,
        system,
        history: Vec::new(),
        question: EXTRACTION_QUESTION.to_string(),
    })
}
