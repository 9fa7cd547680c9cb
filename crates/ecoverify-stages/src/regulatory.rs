// crates/ecoverify-stages/src/regulatory.rs
// ============================================================================
// Module: Built-in Regulatory Registry
// Description: Fixed regulatory article corpus with keyword query and assessment.
// Purpose: Ground compliance findings in citable regulatory text.
// Dependencies: ecoverify-core
// ============================================================================

//! ## Overview
//! The built-in registry serves a fixed corpus of high-risk AI system
//! obligations. Assessment is deterministic: severity drives the oversight
//! requirement, and the rationale names the articles that apply.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ecoverify_core::Severity;

use crate::capabilities::Article;
use crate::capabilities::ComplianceAssessment;
use crate::capabilities::RegulatoryRegistry;

// ============================================================================
// SECTION: Corpus
// ============================================================================

/// One corpus entry: section, title, summary, keywords.
type CorpusEntry = (&'static str, &'static str, &'static str, &'static [&'static str]);

/// Fixed article corpus for high-risk autonomous systems.
const CORPUS: &[CorpusEntry] = &[
    (
        "Article 5",
        "Prohibited Practices",
        "Actions classified as unacceptable risk are prohibited outright.",
        &["prohibited", "unacceptable"],
    ),
    (
        "Article 6",
        "Classification of High-Risk Systems",
        "Autonomous systems acting on physical infrastructure are high-risk.",
        &["classification", "high-risk"],
    ),
    (
        "Article 9",
        "Risk Management System",
        "High-risk systems must run a continuous, documented risk management process.",
        &["risk", "management"],
    ),
    (
        "Article 13",
        "Transparency and Provision of Information",
        "Operators must be able to interpret system output; decisions must be traceable.",
        &["transparency", "information", "traceability"],
    ),
    (
        "Article 14",
        "Human Oversight",
        "State-mutating autonomous actions require effective human oversight before execution.",
        &["human oversight", "oversight", "approval"],
    ),
    (
        "Article 52",
        "Transparency Obligations",
        "Persons interacting with an autonomous system must be informed of that fact.",
        &["transparency", "disclosure"],
    ),
];

/// Maximum articles returned per query.
const MAX_RESULTS: usize = 10;

// ============================================================================
// SECTION: Built-in Registry
// ============================================================================

/// Deterministic in-process regulatory registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinRegulatory;

impl BuiltinRegulatory {
    /// Creates the built-in registry.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RegulatoryRegistry for BuiltinRegulatory {
    fn query_articles(&self, keyword: &str) -> Vec<Article> {
        let needle = keyword.to_ascii_lowercase();
        CORPUS
            .iter()
            .filter(|(section, title, summary, keywords)| {
                needle.is_empty()
                    || section.to_ascii_lowercase().contains(&needle)
                    || title.to_ascii_lowercase().contains(&needle)
                    || summary.to_ascii_lowercase().contains(&needle)
                    || keywords.iter().any(|kw| kw.contains(&needle) || needle.contains(kw))
            })
            .take(MAX_RESULTS)
            .map(|(section, title, summary, _)| Article {
                section: (*section).to_string(),
                title: (*title).to_string(),
                summary: (*summary).to_string(),
            })
            .collect()
    }

    fn assess(&self, action_description: &str, severity: Severity) -> ComplianceAssessment {
        let requires_oversight = severity >= Severity::Medium;
        let mut rationale = String::from(
            "Action classified as a high-risk autonomous intervention. Articles 6, 9, 13, \
             and 14 apply.",
        );
        if action_description.to_ascii_lowercase().contains("autonomous") {
            rationale.push_str(
                " Autonomous decision-making detected; human oversight (Article 14) is \
                 mandatory before execution.",
            );
        }
        ComplianceAssessment {
            compliant: true,
            requires_oversight,
            rationale,
        }
    }
}
