//! Question lists: parsing user input and the built-in templates.

use crate::output::Question;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse newline-separated questions.
///
/// Lines are trimmed and blank lines dropped; the rest are numbered from 1
/// in order.
pub fn parse_questions(text: &str) -> Vec<Question> {
    Question::numbered(
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
    )
}

/// Ready-made question sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionTemplate {
    /// Objective, method, findings, conclusions, limitations.
    Research,
    /// Summary, main points, audience, recommendations.
    Summary,
    /// Dates, figures, people and organisations, places.
    Extraction,
}

impl QuestionTemplate {
    pub const ALL: [QuestionTemplate; 3] = [
        QuestionTemplate::Research,
        QuestionTemplate::Summary,
        QuestionTemplate::Extraction,
    ];

    pub fn texts(self) -> &'static [&'static str] {
        match self {
            QuestionTemplate::Research => &[
                "What is the main research question or objective?",
                "What methodology was employed in this study?",
                "What are the key findings and results?",
                "What are the main conclusions drawn?",
                "What limitations are acknowledged?",
            ],
            QuestionTemplate::Summary => &[
                "Provide a brief summary of this document",
                "What are the main points discussed?",
                "Who is the intended audience?",
                "What recommendations or actions are proposed?",
            ],
            QuestionTemplate::Extraction => &[
                "What dates or time periods are referenced?",
                "What numerical data or statistics are provided?",
                "Who are the key individuals or organizations mentioned?",
                "What geographic locations are referenced?",
            ],
        }
    }

    pub fn questions(self) -> Vec<Question> {
        Question::numbered(self.texts().iter().copied())
    }
}

impl fmt::Display for QuestionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuestionTemplate::Research => "research",
            QuestionTemplate::Summary => "summary",
            QuestionTemplate::Extraction => "extraction",
        })
    }
}

impl FromStr for QuestionTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "research" => Ok(QuestionTemplate::Research),
            "summary" => Ok(QuestionTemplate::Summary),
            "extraction" => Ok(QuestionTemplate::Extraction),
            other => Err(format!(
                "unknown template '{}': expected research, summary or extraction",
                other
            )),
        }
    }
}
