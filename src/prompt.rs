use std::collections::HashMap;

use crate::domain::Article;

/// Number of keyword tokens fed to the labeling prompt.
const KEYWORD_LIMIT: usize = 10;
/// Number of sample member headlines fed to the labeling prompt.
const SAMPLE_HEADLINES: usize = 5;

/// Filler words dropped before keyword counting.
const STOPWORDS: [&str; 36] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "this", "that", "these", "those", "it", "he",
    "she", "they", "news", "report", "breaking", "today", "live", "update", "updates",
    "latest",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// The most frequent content words across the members' headline+summary
/// text. Tokens are split on non-word boundaries and lowercased; stopwords
/// and tokens of length <= 3 are dropped. Frequency ties break toward the
/// earlier first occurrence.
pub fn top_keywords(members: &[Article], limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0usize;

    for member in members {
        let text = member.text_for_analysis().to_lowercase();
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if token.len() <= 3 || is_stopword(token) {
                continue;
            }
            let entry = counts.entry(token.to_string()).or_insert((0, position));
            entry.0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(token, (count, first_seen))| (token, count, first_seen))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.truncate(limit);
    ranked.into_iter().map(|(token, _, _)| token).collect()
}

/// Build the neutral-labeling prompt for one cluster.
pub fn cluster_label_prompt(members: &[Article]) -> String {
    let keywords = top_keywords(members, KEYWORD_LIMIT);
    let headlines: Vec<String> = members
        .iter()
        .take(SAMPLE_HEADLINES)
        .map(|m| format!("- {}", m.headline))
        .collect();

    format!(
        r#"You are labeling a cluster of Indian news articles that cover the same event.

KEYWORDS: {keywords}

SAMPLE HEADLINES:
{headlines}

Write a neutral, non-partisan label for this story. Respond with ONLY a JSON object:
{{
  "headline": "neutral headline for the story",
  "summary": "neutral summary of at most 30 words",
  "category": "one of: Politics, Business, Technology, Sports, Entertainment, General"
}}"#,
        keywords = keywords.join(", "),
        headlines = headlines.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Article, BiasRating, Factuality};
    use chrono::Utc;

    fn article(headline: &str, summary: &str) -> Article {
        Article {
            id: Article::id_for_url(headline),
            source_id: "src".into(),
            source_name: "Source".into(),
            bias_rating: BiasRating::Center,
            factuality: Factuality::High,
            headline: headline.into(),
            summary: summary.into(),
            url: format!("https://example.in/{}", headline.len()),
            image_url: None,
            pub_date: Utc::now(),
            fetched_at: Utc::now(),
            cluster_id: None,
            embedding: None,
            entities: None,
        }
    }

    #[test]
    fn keywords_drop_stopwords_and_short_tokens() {
        let members = vec![article(
            "Parliament passes the budget bill",
            "The budget bill was passed by parliament today",
        )];
        let keywords = top_keywords(&members, 10);
        assert!(keywords.contains(&"parliament".to_string()));
        assert!(keywords.contains(&"budget".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"was".to_string()));
        // "bill" is four characters; "by" and "today" are filtered
        assert!(keywords.contains(&"bill".to_string()));
        assert!(!keywords.contains(&"today".to_string()));
    }

    #[test]
    fn keyword_ties_break_by_first_occurrence() {
        let members = vec![article("alpha budget", "zebra budget")];
        let keywords = top_keywords(&members, 3);
        assert_eq!(keywords[0], "budget");
        assert_eq!(keywords[1], "alpha");
        assert_eq!(keywords[2], "zebra");
    }

    #[test]
    fn prompt_includes_keywords_and_headlines() {
        let members = vec![
            article("Parliament passes budget bill", "Budget session concludes"),
            article("Budget bill clears parliament", "Lower house approves budget"),
        ];
        let prompt = cluster_label_prompt(&members);
        assert!(prompt.contains("budget"));
        assert!(prompt.contains("- Parliament passes budget bill"));
        assert!(prompt.contains("\"category\""));
    }
}
