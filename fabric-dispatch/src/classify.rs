//! Classify a task's `Payload` into a category, complexity tier, and required capabilities
//! (spec.md §4.7 "Selection").
use std::collections::BTreeSet;

use fabric_queue::Payload;

/// One of the nine task categories the keyword classifier recognizes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Category {
    Coding,
    Testing,
    Security,
    Architecture,
    Documentation,
    Infrastructure,
    Analysis,
    Performance,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Coding => "coding",
            Category::Testing => "testing",
            Category::Security => "security",
            Category::Architecture => "architecture",
            Category::Documentation => "documentation",
            Category::Infrastructure => "infrastructure",
            Category::Analysis => "analysis",
            Category::Performance => "performance",
            Category::General => "general",
        }
    }

    /// The capability an eligible worker must advertise to handle this category.
    pub fn required_capability(&self) -> &'static str {
        self.as_str()
    }
}

const KEYWORD_TABLE: &[(Category, &[&str])] = &[
    (Category::Security, &["vulnerability", "exploit", "cve", "auth bypass", "injection", "security audit"]),
    (Category::Testing, &["unit test", "test case", "regression", "assert", "coverage", "flaky"]),
    (Category::Performance, &["latency", "throughput", "profiling", "benchmark", "slow query", "optimi"]),
    (Category::Architecture, &["design doc", "architecture", "system design", "trade-off", "adr"]),
    (Category::Infrastructure, &["deploy", "kubernetes", "terraform", "ci/cd", "pipeline", "docker"]),
    (Category::Documentation, &["readme", "documentation", "changelog", "docstring", "write docs"]),
    (Category::Analysis, &["analyze", "root cause", "investigate", "summarize", "report on"]),
    (Category::Coding, &["implement", "refactor", "fix bug", "write a function", "add feature"]),
];

/// Classify free text by first keyword-table hit; `general` if nothing matches (spec.md §4.7:
/// "classifies incoming task by keyword signals into a category").
pub fn classify_category(request: &str) -> Category {
    let lower = request.to_lowercase();
    for (category, keywords) in KEYWORD_TABLE {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            return *category;
        }
    }
    Category::General
}

/// Relative difficulty of a task, feeding into capability requirements and selection weighting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
}

/// Count of technical terms recognized as density signals for the complexity heuristic.
fn technical_term_density(request: &str) -> f64 {
    const TECHNICAL_TERMS: &[&str] = &[
        "algorithm", "concurrency", "async", "distributed", "schema", "protocol", "architecture",
        "optimi", "race condition", "consistency", "throughput", "cache invalidation",
    ];
    let lower = request.to_lowercase();
    let hits = TECHNICAL_TERMS.iter().filter(|term| lower.contains(*term)).count();
    let words = request.split_whitespace().count().max(1);
    hits as f64 / words as f64
}

/// Derive a complexity tier from prompt length, technical-term density, and an explicit hint
/// (spec.md §4.7 "derived from prompt length, technical-term density, and explicit `complexity`
/// hint").
pub fn classify_complexity(payload: &Payload, complexity_hint: Option<ComplexityTier>) -> ComplexityTier {
    if let Some(hint) = complexity_hint {
        return hint;
    }
    let length = payload.request.chars().count();
    let density = technical_term_density(&payload.request);
    if length > 2000 || density > 0.05 {
        ComplexityTier::High
    } else if length > 400 || density > 0.02 {
        ComplexityTier::Medium
    } else {
        ComplexityTier::Low
    }
}

/// Capabilities a worker must declare to be eligible: the task's own declared capabilities plus
/// the category's implied one, plus `architecture`/`security` review for high-complexity work
/// outside those categories.
pub fn required_capabilities(payload: &Payload, category: Category, tier: ComplexityTier) -> BTreeSet<String> {
    let mut capabilities = payload.capabilities.clone();
    capabilities.insert(category.required_capability().to_string());
    if tier == ComplexityTier::High && !matches!(category, Category::Architecture | Category::Security) {
        capabilities.insert("architecture".to_string());
    }
    capabilities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(request: &str) -> Payload {
        Payload {
            request: request.to_string(),
            file: None,
            priority: Default::default(),
            capabilities: Default::default(),
            preferred_zone: None,
        }
    }

    #[test]
    fn classifies_security_over_general() {
        assert_eq!(classify_category("find a cve in this auth bypass"), Category::Security);
    }

    #[test]
    fn falls_back_to_general() {
        assert_eq!(classify_category("say hello"), Category::General);
    }

    #[test]
    fn short_low_density_prompt_is_low_complexity() {
        let payload = payload("fix the typo");
        assert_eq!(classify_complexity(&payload, None), ComplexityTier::Low);
    }

    #[test]
    fn explicit_hint_overrides_heuristic() {
        let payload = payload("fix the typo");
        assert_eq!(classify_complexity(&payload, Some(ComplexityTier::High)), ComplexityTier::High);
    }

    #[test]
    fn required_capabilities_include_category_and_declared() {
        let mut payload = payload("implement a new endpoint");
        payload.capabilities.insert("vision".to_string());
        let capabilities = required_capabilities(&payload, Category::Coding, ComplexityTier::Low);
        assert!(capabilities.contains("coding"));
        assert!(capabilities.contains("vision"));
    }
}
