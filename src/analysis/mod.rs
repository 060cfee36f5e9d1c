// Analysis module
// Retrieval-grounded vulnerability analysis of a code snippet

pub mod reasoner;
pub mod report;


use itertools::Itertools;
use tracing::{debug, info};

use crate::Result;
use crate::embeddings::Embedder;
use crate::retriever::{QueryResult, Retriever};

pub use reasoner::{OpenRouterClient, Reasoner, ReasonerError};
pub use report::{AnalysisReport, Findings};

pub const SYSTEM_PROMPT: &str = "You are a security code analyzer.";

const NO_REFERENCES: &str = "(no reference vulnerabilities available)";

/// Build the user prompt: reference pattern texts, the snippet, and the four answer items
#[inline]
pub fn build_prompt(references: &QueryResult, snippet: &str) -> String {
    let references = if references.is_empty() {
        NO_REFERENCES.to_string()
    } else {
        references.documents().map(|d| d.text.as_str()).join("\n")
    };

    format!(
        "\n{SYSTEM_PROMPT}\n\n\
         Reference vulnerabilities:\n{references}\n\n\
         Analyze this code:\n{snippet}\n\n\
         Answer:\n\
         1. Vulnerability name (or NONE)\n\
         2. Source → Sink data flow\n\
         3. Why it is vulnerable\n\
         4. How to fix\n"
    )
}

/// Result of analysing one snippet
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub references: QueryResult,
    pub report: AnalysisReport,
}

/// Retrieves reference patterns for a snippet and asks the reasoner about it
pub struct Analyzer<E: Embedder, R: Reasoner> {
    retriever: Retriever<E>,
    reasoner: R,
    top_k: usize,
}

impl<E: Embedder, R: Reasoner> Analyzer<E, R> {
    #[inline]
    pub fn new(retriever: Retriever<E>, reasoner: R, top_k: usize) -> Self {
        Self {
            retriever,
            reasoner,
            top_k,
        }
    }

    #[inline]
    pub fn retriever(&self) -> &Retriever<E> {
        &self.retriever
    }

    #[inline]
    pub fn analyze(&self, snippet: &str) -> Result<Analysis> {
        let references = self.retriever.retrieve(snippet, self.top_k)?;
        if references.is_empty() {
            info!("No reference vulnerabilities found; analysing without grounding");
        } else {
            debug!(
                "Grounding analysis on {}",
                references
                    .documents()
                    .map(|d| format!("{}/{}", d.vulnerability_class, d.pattern_name))
                    .join(", ")
            );
        }

        let prompt = build_prompt(&references, snippet);
        info!(
            "Requesting analysis from {} ({} byte prompt)",
            self.reasoner.model_name(),
            prompt.len()
        );
        let answer = self.reasoner.complete(SYSTEM_PROMPT, &prompt)?;

        Ok(Analysis {
            references,
            report: AnalysisReport::parse(&answer),
        })
    }
}
