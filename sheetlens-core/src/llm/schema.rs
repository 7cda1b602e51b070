//! Output schemas requested from the model (JSON Schema)

use serde_json::{json, Value};

fn string_array() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

/// Per-record extraction: summary, insights and metrics
pub fn analysis() -> Value {
    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "insights": string_array(),
            "metrics": {
                "type": "object",
                "properties": {
                    "conversionProbability": { "type": "number" },
                    "customerSentiment": { "type": "number" },
                    "dealSizeEstimate": { "type": "number" },
                    "resolutionTimeMinutes": { "type": "number" },
                    "churnRisk": { "type": "number" }
                },
                "required": ["conversionProbability", "customerSentiment", "churnRisk"]
            }
        },
        "required": ["summary", "insights", "metrics"]
    })
}

/// Meta-analysis: feature cards plus narrative
pub fn meta_analysis() -> Value {
    json!({
        "type": "object",
        "properties": {
            "topFeatures": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "impactScore": { "type": "number" }
                    },
                    "required": ["title", "description", "impactScore"]
                }
            },
            "executiveNarrative": { "type": "string" }
        },
        "required": ["topFeatures", "executiveNarrative"]
    })
}

/// Strategic dossiers: yes/no, opportunities/threats, act-now items
pub fn dossiers() -> Value {
    json!({
        "type": "object",
        "properties": {
            "yesNo": { "type": "string" },
            "oppsThreats": { "type": "string" },
            "actNow": string_array()
        },
        "required": ["yesNo", "oppsThreats", "actNow"]
    })
}

/// Column-scoped thematic summary
pub fn column_summary() -> Value {
    json!({
        "type": "object",
        "properties": {
            "keyThemes": string_array(),
            "summary": { "type": "string" },
            "insights": string_array()
        },
        "required": ["keyThemes", "summary", "insights"]
    })
}
