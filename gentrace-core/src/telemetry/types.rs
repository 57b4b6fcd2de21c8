/// The logical kinds of backend call the client instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Generate,
    GenerateStream,
    Embed,
}

impl Operation {
    /// Value of the `gen_ai.operation.name` attribute.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::GenerateStream => "generate_stream",
            Self::Embed => "embed",
        }
    }

    /// Span name, `gen_ai.<operation>`.
    pub const fn span_name(self) -> &'static str {
        match self {
            Self::Generate => "gen_ai.generate_content",
            Self::GenerateStream => "gen_ai.generate_content_stream",
            Self::Embed => "gen_ai.embed_content",
        }
    }

    /// Attribute key the input payload is recorded under.
    pub const fn payload_key(self) -> &'static str {
        match self {
            Self::Generate | Self::GenerateStream => super::KEY_PROMPT,
            Self::Embed => super::KEY_CONTENT,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the backend produced, as far as the span cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSummary {
    Text(String),
    Embedding { dimensions: usize },
}

/// Terminal state of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok {
        summary: ResponseSummary,
        total_tokens: Option<u64>,
    },
    Failed {
        message: String,
    },
}

impl Outcome {
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Ok { .. } => None,
            Self::Failed { message } => Some(message),
        }
    }

    pub fn total_tokens(&self) -> Option<u64> {
        match self {
            Self::Ok { total_tokens, .. } => *total_tokens,
            Self::Failed { .. } => None,
        }
    }
}
