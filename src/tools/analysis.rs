//! Local text utilities: the text analysis and data formatter tools.
//!
//! Both run entirely in-process with no network or index access, so they
//! are always present in the tool catalogue.

use std::collections::HashMap;

/// Words too common to be useful as keywords.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "was", "were",
    "which", "with",
];

/// Summarize a piece of text: counts, average word length, top keywords,
/// and a head/tail preview for longer inputs.
pub fn text_analysis(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return "The text is empty; there is nothing to analyze.".to_string();
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let word_count = words.len();
    let char_count = trimmed.chars().count();
    let sentence_count = trimmed
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let avg_word_len =
        words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / word_count as f64;

    let mut report = String::new();
    report.push_str("Text analysis:\n");
    report.push_str(&format!("- Words: {}\n", word_count));
    report.push_str(&format!("- Characters: {}\n", char_count));
    report.push_str(&format!("- Sentences: {}\n", sentence_count));
    report.push_str(&format!("- Average word length: {:.1}\n", avg_word_len));

    let keywords = top_keywords(&words, 5);
    if !keywords.is_empty() {
        report.push_str(&format!("- Top keywords: {}\n", keywords.join(", ")));
    }

    report.push_str(&preview(trimmed));
    report
}

/// Most frequent non-stop-word terms, most frequent first; frequency ties
/// resolve alphabetically so output is stable.
fn top_keywords(words: &[&str], limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in words {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.len() < 3 || STOP_WORDS.contains(&cleaned.as_str()) {
            continue;
        }
        *counts.entry(cleaned).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

fn preview(text: &str) -> String {
    const HEAD: usize = 200;
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= HEAD * 2 {
        return format!("- Text: {}\n", text);
    }
    let head: String = chars[..HEAD].iter().collect();
    let tail: String = chars[chars.len() - HEAD..].iter().collect();
    format!("- Opens with: {}…\n- Ends with: …{}\n", head.trim_end(), tail.trim_start())
}

/// Reformat delimiter-separated items as a bullet list. Input that already
/// looks like a list passes through unchanged.
pub fn data_formatter(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return "There is no data to format.".to_string();
    }

    let already_formatted = trimmed
        .lines()
        .filter(|l| !l.trim().is_empty())
        .all(|l| {
            let l = l.trim_start();
            l.starts_with("- ") || l.starts_with("* ") || l.starts_with('•')
        });
    if already_formatted {
        return trimmed.to_string();
    }

    let items: Vec<&str> = split_items(trimmed);
    if items.len() <= 1 {
        return format!("- {}", trimmed);
    }

    let mut out = String::from("Formatted data:\n");
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
    out.trim_end().to_string()
}

/// Pick the delimiter that yields the most items: newline, then semicolon,
/// then comma.
fn split_items(text: &str) -> Vec<&str> {
    for sep in ['\n', ';', ','] {
        let parts: Vec<&str> = text
            .split(sep)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() > 1 {
            return parts;
        }
    }
    vec![text]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_counts_words_and_sentences() {
        let report = text_analysis("The database runs fast. The database scales well.");
        assert!(report.contains("- Words: 8"));
        assert!(report.contains("- Sentences: 2"));
        assert!(report.contains("database"));
    }

    #[test]
    fn analysis_skips_stop_words() {
        let report = text_analysis("the the the replication replication cluster");
        assert!(report.contains("Top keywords: replication, cluster"));
    }

    #[test]
    fn analysis_handles_empty_input() {
        assert!(text_analysis("   ").contains("empty"));
    }

    #[test]
    fn analysis_previews_long_text() {
        let long = "start of the text ".repeat(60);
        let report = text_analysis(&long);
        assert!(report.contains("Opens with:"));
        assert!(report.contains("Ends with:"));
    }

    #[test]
    fn formatter_splits_commas() {
        let out = data_formatter("postgres, redis, sqlite");
        assert_eq!(out, "Formatted data:\n- postgres\n- redis\n- sqlite");
    }

    #[test]
    fn formatter_prefers_newlines_over_commas() {
        let out = data_formatter("first, item\nsecond item");
        assert!(out.contains("- first, item"));
        assert!(out.contains("- second item"));
    }

    #[test]
    fn formatter_passes_through_existing_lists() {
        let input = "- one\n- two";
        assert_eq!(data_formatter(input), input);
    }

    #[test]
    fn formatter_single_item() {
        assert_eq!(data_formatter("just one thing"), "- just one thing");
    }
}
