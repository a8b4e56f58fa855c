//! Read-only aggregates over the interaction log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::memory::MemoryStore;

/// Usage summary computed from the log. Purely derived; computing it never
/// mutates anything.
#[derive(Debug, Default)]
pub struct UsageStats {
    pub interactions: usize,
    pub with_feedback: usize,
    pub feedback_by_tag: BTreeMap<String, usize>,
    pub tool_invocations: BTreeMap<String, usize>,
    pub last_interaction_at: Option<DateTime<Utc>>,
}

pub fn collect(memory: &MemoryStore) -> UsageStats {
    let mut stats = UsageStats {
        interactions: memory.len(),
        ..UsageStats::default()
    };

    for interaction in memory.all() {
        if let Some(tag) = &interaction.feedback {
            stats.with_feedback += 1;
            *stats.feedback_by_tag.entry(tag.clone()).or_insert(0) += 1;
        }
        for tool in &interaction.tools_used {
            *stats.tool_invocations.entry(tool.clone()).or_insert(0) += 1;
        }
    }
    stats.last_interaction_at = memory.all().last().map(|i| i.timestamp);

    stats
}

impl UsageStats {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Interactions: {}\n", self.interactions));
        out.push_str(&format!("With feedback: {}\n", self.with_feedback));
        if let Some(at) = self.last_interaction_at {
            out.push_str(&format!("Last activity: {}\n", at.format("%Y-%m-%d %H:%M")));
        }

        if !self.feedback_by_tag.is_empty() {
            out.push_str("Feedback:\n");
            for (tag, count) in &self.feedback_by_tag {
                out.push_str(&format!("  {}: {}\n", tag, count));
            }
        }

        if !self.tool_invocations.is_empty() {
            out.push_str("Tool usage:\n");
            for (tool, count) in &self.tool_invocations {
                out.push_str(&format!("  {}: {}\n", tool, count));
            }
        }

        out
    }
}
