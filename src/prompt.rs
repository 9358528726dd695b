//! Assessment prompt assembly.
//!
//! The prompt pins the model to a single JSON object of the `AssessmentResult`
//! shape; the parser only does best-effort extraction beyond that.

use crate::domain::VerseAnalysis;
use crate::util::fill_template;

pub const ASSESSMENT_PROMPT: &str = r#"You are an expert in Quranic Arabic and translation assessment. Evaluate a student's English translation of a Quranic verse.

VERSE INFORMATION:
- Arabic: {ARABIC}
- Reference Translation: "{REFERENCE}"
- Word-by-word meanings: {WORD_MEANINGS}

STUDENT'S TRANSLATION:
"{USER_TRANSLATION}"

TASK: Assess the student's translation accuracy and provide constructive feedback.

SCORING CRITERIA (0-100):
- 90-100: Excellent - captures meaning accurately with proper nuance
- 70-89: Good - main meaning correct with minor issues
- 50-69: Fair - partial understanding, some key elements missing
- 30-49: Needs work - significant gaps in meaning
- 0-29: Incorrect - major misunderstanding

RESPOND WITH ONLY A JSON OBJECT IN THIS EXACT FORMAT (no markdown, no code blocks, no text before or after):
{
  "score": <number 0-100>,
  "feedback": "<1-2 sentences explaining what was good or needs improvement>",
  "correctElements": ["<element 1>", "<element 2>"],
  "missedElements": ["<element 1>", "<element 2>"]
}

Keep feedback encouraging and educational. Focus on meaning, not exact wording."#;

/// Flatten analyzed words into `word = "meaning", word = "meaning"`.
pub fn word_meanings_summary(analysis: &VerseAnalysis) -> String {
  analysis
    .words
    .iter()
    .map(|w| format!("{} = \"{}\"", w.arabic, w.meaning))
    .collect::<Vec<_>>()
    .join(", ")
}

pub fn build_assessment_prompt(
  arabic: &str,
  reference_translation: &str,
  word_meanings: &str,
  user_translation: &str,
) -> String {
  fill_template(
    ASSESSMENT_PROMPT,
    &[
      ("ARABIC", arabic),
      ("REFERENCE", reference_translation),
      ("WORD_MEANINGS", word_meanings),
      ("USER_TRANSLATION", user_translation),
    ],
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::WordAnalysis;

  #[test]
  fn summary_joins_words_with_quoted_meanings() {
    let analysis = VerseAnalysis {
      words: vec![
        WordAnalysis { arabic: "بِسْمِ".into(), meaning: "In the name of".into() },
        WordAnalysis { arabic: "اللَّهِ".into(), meaning: "Allah".into() },
      ],
      ..Default::default()
    };
    assert_eq!(word_meanings_summary(&analysis), "بِسْمِ = \"In the name of\", اللَّهِ = \"Allah\"");
    assert_eq!(word_meanings_summary(&VerseAnalysis::default()), "");
  }

  #[test]
  fn prompt_substitutes_every_placeholder_verbatim() {
    let p = build_assessment_prompt("بِسْمِ", "In the name of Allah...", "w = \"m\"", "my {ARABIC} attempt");
    assert!(p.contains("- Arabic: بِسْمِ"));
    assert!(p.contains("Reference Translation: \"In the name of Allah...\""));
    assert!(p.contains("Word-by-word meanings: w = \"m\""));
    assert!(p.contains("\"my {ARABIC} attempt\""));
    assert!(!p.contains("{REFERENCE}"));
    assert!(p.contains("\"correctElements\""));
  }
}
