//! Judge reply parsing.
//!
//! Models wrap their JSON in prose or markdown fences, so the reply is not
//! parsed strictly: the object is taken to span from the first `{` to the
//! last `}`. Replies that still fail are classified rather than rejected.

use serde_json::Value;

use crate::domain::{LeafJudgment, TAG_PARSING_ERROR, TAG_PARSING_FALLBACK};
use crate::judge::JudgeReply;

/// Words that count as a positive verdict when no JSON could be read.
pub const FALLBACK_KEYWORDS: [&str; 5] = [
    "documented",
    "covered",
    "explained",
    "adequately documented",
    "yes",
];

/// Characters of raw output kept as evidence for a degraded judgment.
pub const EVIDENCE_EXCERPT_CHARS: usize = 500;

/// Outcome of reading one judge reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    /// A JSON object with an integer `score` of 0 or 1.
    Valid {
        score: u8,
        reasoning: String,
        evidence: String,
    },
    /// A JSON object was found but its `score` is missing or out of range.
    InvalidScore,
    /// No parseable JSON object in the reply.
    NoJson,
}

/// The substring between the first `{` and the last `}`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a reply into its structured form.
pub fn parse_reply(text: &str) -> ParsedReply {
    let Some(raw) = extract_json_object(text) else {
        return ParsedReply::NoJson;
    };
    let obj = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(obj)) => obj,
        _ => return ParsedReply::NoJson,
    };

    let score = match obj.get("score").and_then(Value::as_u64) {
        Some(s @ (0 | 1)) => s as u8,
        _ => return ParsedReply::InvalidScore,
    };
    let reasoning = obj
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("No reasoning provided")
        .to_string();
    let evidence = match obj.get("evidence") {
        None | Some(Value::Null) => "No evidence provided".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    ParsedReply::Valid {
        score,
        reasoning,
        evidence,
    }
}

/// Keyword heuristic used when a reply cannot be parsed.
pub fn keyword_verdict(text: &str) -> u8 {
    let lower = text.to_lowercase();
    u8::from(FALLBACK_KEYWORDS.iter().any(|k| lower.contains(k)))
}

/// Leading `max_chars` characters of `text`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Convert a first-pass reply into a judgment, degrading gracefully.
pub fn judgment_from_reply(reply: &JudgeReply) -> LeafJudgment {
    match parse_reply(&reply.text) {
        ParsedReply::Valid {
            score,
            reasoning,
            evidence,
        } => LeafJudgment::new(score, reasoning, evidence, reply.tokens),
        ParsedReply::InvalidScore => LeafJudgment::new(
            0,
            format!("{TAG_PARSING_ERROR} - missing or invalid score"),
            excerpt(&reply.text, EVIDENCE_EXCERPT_CHARS),
            reply.tokens,
        ),
        ParsedReply::NoJson => LeafJudgment::new(
            keyword_verdict(&reply.text),
            format!("{TAG_PARSING_FALLBACK} - No valid JSON found"),
            fallback_evidence(&reply.text),
            reply.tokens,
        ),
    }
}

fn fallback_evidence(text: &str) -> String {
    if text.is_empty() {
        "No output received".to_string()
    } else {
        excerpt(text, EVIDENCE_EXCERPT_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_extracted_from_surrounding_prose() {
        let text = r#"blah blah {"score":1,"reasoning":"ok","evidence":"e"} trailing"#;
        assert_eq!(
            parse_reply(text),
            ParsedReply::Valid {
                score: 1,
                reasoning: "ok".to_string(),
                evidence: "e".to_string(),
            }
        );
    }

    #[test]
    fn markdown_fenced_reply_parses() {
        let text = "```json\n{\"criteria\": \"x\", \"score\": 0, \"reasoning\": \"absent\", \"evidence\": \"\"}\n```";
        assert!(matches!(parse_reply(text), ParsedReply::Valid { score: 0, .. }));
    }

    #[test]
    fn missing_braces_mean_no_json() {
        assert_eq!(extract_json_object("} nope {"), None);
        assert_eq!(parse_reply("the feature is documented"), ParsedReply::NoJson);
    }

    #[test]
    fn non_integer_score_is_invalid() {
        assert_eq!(parse_reply(r#"{"score": "1"}"#), ParsedReply::InvalidScore);
        assert_eq!(parse_reply(r#"{"score": 0.5}"#), ParsedReply::InvalidScore);
        assert_eq!(parse_reply(r#"{"score": 7}"#), ParsedReply::InvalidScore);
        assert_eq!(parse_reply(r#"{"reasoning": "?"}"#), ParsedReply::InvalidScore);
    }

    #[test]
    fn structured_evidence_is_stringified() {
        let text = r#"{"score": 1, "evidence": ["Install", "Usage"]}"#;
        match parse_reply(text) {
            ParsedReply::Valid {
                evidence,
                reasoning,
                ..
            } => {
                assert_eq!(evidence, r#"["Install","Usage"]"#);
                assert_eq!(reasoning, "No reasoning provided");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn keyword_heuristic_matches_case_insensitively() {
        assert_eq!(keyword_verdict("This is Adequately Documented."), 1);
        assert_eq!(keyword_verdict("YES"), 1);
        assert_eq!(keyword_verdict("nothing relevant here"), 0);
    }

    #[test]
    fn unparseable_reply_becomes_tagged_fallback() {
        let reply = JudgeReply::new("I think this is covered in the guide");
        let judgment = judgment_from_reply(&reply);
        assert_eq!(judgment.score, 1);
        assert!(judgment.reasoning.starts_with(TAG_PARSING_FALLBACK));
        assert!(judgment.needs_retry());
    }

    #[test]
    fn empty_reply_is_recorded_as_no_output() {
        let judgment = judgment_from_reply(&JudgeReply::new(""));
        assert_eq!(judgment.score, 0);
        assert_eq!(judgment.evidence, "No output received");
    }

    #[test]
    fn invalid_score_becomes_parsing_error() {
        let judgment = judgment_from_reply(&JudgeReply::new(r#"{"score": "yes"}"#));
        assert_eq!(judgment.score, 0);
        assert!(judgment.reasoning.starts_with(TAG_PARSING_ERROR));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé");
    }
}
