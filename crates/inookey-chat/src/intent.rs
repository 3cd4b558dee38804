//! Keyword intent classifier and the canned follow-up suggestions.
//!
//! Scoring counts how many of a category's keywords occur in the lower-cased
//! message (each keyword at most once). The confidence divides the winning
//! count by the size of the largest keyword list, so it is a relative score
//! and not a probability.

use inookey_core::types::{Intent, IntentScore};

// =============================================================================
// Keyword tables (enumeration order is the tie-break order)
// =============================================================================

const SERVICES: &[&str] = &[
    "service",
    "what do you do",
    "offer",
    "provide",
    "build",
    "develop",
    "create",
    "make",
    "specialize",
    "expertise",
    "capabilities",
];

const PRICING: &[&str] = &[
    "cost",
    "price",
    "how much",
    "pricing",
    "quote",
    "budget",
    "expensive",
    "cheap",
    "affordable",
    "investment",
    "value",
];

const PROCESS: &[&str] = &[
    "process",
    "timeline",
    "how long",
    "duration",
    "steps",
    "workflow",
    "methodology",
    "approach",
    "delivery",
    "30 days",
];

const BOOKING: &[&str] = &[
    "book",
    "schedule",
    "appointment",
    "consultation",
    "meeting",
    "call",
    "contact",
    "reach out",
    "get started",
    "begin",
    "start project",
];

// "AI" is upper-case and is matched against lower-cased text, so it never
// scores. It still counts toward the list length.
const TECHNOLOGY: &[&str] = &[
    "technology",
    "tech stack",
    "framework",
    "language",
    "platform",
    "tools",
    "libraries",
    "AI",
    "machine learning",
    "automation",
];

const SUPPORT: &[&str] = &[
    "support",
    "maintenance",
    "help",
    "assist",
    "ongoing",
    "after launch",
    "updates",
    "bug fixes",
    "improvements",
];

const CATEGORIES: [(Intent, &[&str]); 6] = [
    (Intent::Services, SERVICES),
    (Intent::Pricing, PRICING),
    (Intent::Process, PROCESS),
    (Intent::Booking, BOOKING),
    (Intent::Technology, TECHNOLOGY),
    (Intent::Support, SUPPORT),
];

/// Starter prompts shown before the visitor has typed anything.
pub const STARTER_SUGGESTIONS: [&str; 8] = [
    "Tell me about your services",
    "What are your development timelines?",
    "How much do your services cost?",
    "Book a consultation call",
    "What technologies do you use?",
    "Can you help with AI integration?",
    "What's your development process?",
    "Do you provide maintenance support?",
];

/// Suggestions attached to the fallback reply.
pub const FALLBACK_SUGGESTIONS: [&str; 3] = [
    "Book a consultation call",
    "Tell me about your services",
    "What are your development timelines?",
];

const DEFAULT_SUGGESTIONS: [&str; 4] = [
    "Tell me about your services",
    "What are your development timelines?",
    "How much do your services cost?",
    "Book a consultation call",
];

/// Number of keywords in the longest category list.
fn normalizer() -> usize {
    CATEGORIES
        .iter()
        .map(|(_, keywords)| keywords.len())
        .max()
        .unwrap_or(1)
}

/// Assign an intent and confidence to free text.
pub fn classify(text: &str) -> IntentScore {
    let lower = text.to_lowercase();
    let mut best = Intent::General;
    let mut best_score = 0usize;

    for (intent, keywords) in CATEGORIES {
        let score = keywords.iter().filter(|k| lower.contains(**k)).count();
        if score > best_score {
            best_score = score;
            best = intent;
        }
    }

    IntentScore {
        intent: best,
        confidence: best_score as f64 / normalizer() as f64,
    }
}

/// Follow-up prompts for an intent: three for each category, four otherwise.
pub fn suggestions(intent: Intent) -> Vec<String> {
    let list: &[&str] = match intent {
        Intent::Services => &[
            "Tell me more about your AI integration services",
            "What kind of applications do you build?",
            "Can you explain your development process?",
        ],
        Intent::Pricing => &[
            "Can you provide a rough estimate?",
            "What factors affect pricing?",
            "Do you offer different pricing tiers?",
        ],
        Intent::Process => &[
            "How do you ensure quality in 30 days?",
            "What happens after the 30-day delivery?",
            "Can you explain your development phases?",
        ],
        Intent::Booking => &[
            "What information do you need for a consultation?",
            "How long does the initial consultation take?",
            "What should I prepare for the meeting?",
        ],
        Intent::Technology => &[
            "What AI technologies do you use?",
            "Can you work with our existing tech stack?",
            "How do you handle data security?",
        ],
        Intent::Support => &[
            "What's included in ongoing support?",
            "How do you handle updates and maintenance?",
            "What's your response time for issues?",
        ],
        Intent::General => &DEFAULT_SUGGESTIONS,
    };
    list.iter().map(|s| s.to_string()).collect()
}

/// Suggestions for a free-form intent label; unknown labels get the default list.
pub fn suggestions_for_label(label: &str) -> Vec<String> {
    suggestions(label.parse().unwrap_or(Intent::General))
}

pub fn starter_suggestions() -> Vec<String> {
    STARTER_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}

pub fn fallback_suggestions() -> Vec<String> {
    FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}
