//! Tagged question spans from the per-topic `part_<n>.dbt` blobs.
//!
//! A span is a run of `[X]body` segments where the tag letter selects the field:
//!
//! | tag | field |
//! |-----|-------|
//! | `R` | section names, space separated |
//! | `G` | image name |
//! | `Q` | question text |
//! | `W`, `V` | numbered answers, one per line |
//! | `A` | 1-based correct answer |
//! | `T` | advice |
//! | `L` | regulation numbers, space separated |
//! | `C` | comment number |

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{DecodeError, Result};
use crate::fingerprint::FingerprintProfile;
use crate::strings::{decode_blob, transcode};
use crate::tables::{TopicOffset, resolve_span, topic_entries};
use crate::text::{normalize_inline, unify_line_breaks};

static ANSWER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d+\.?\s+").expect("answer marker pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionRecord {
    pub topic_number: i8,
    pub text: String,
    pub image_name: Option<String>,
    pub advice: Option<String>,
    pub correct_answer_index: usize,
    pub answers: Vec<String>,
    pub section_names: Vec<String>,
    pub traffreg_numbers: Vec<i32>,
    pub comment_number: Option<i32>,
}

pub fn parse_question(span: &str, topic_number: i8) -> Result<QuestionRecord> {
    let span = unify_line_breaks(span);
    let mut segments = span.split('[');
    if let Some(leading) = segments.next() {
        if !leading.trim().is_empty() {
            return Err(DecodeError::record(format!(
                "text before first question tag: {:?}",
                leading.trim()
            )));
        }
    }

    let mut text = None;
    let mut image_name = None;
    let mut advice = None;
    let mut correct = None;
    let mut answers = Vec::new();
    let mut section_names = Vec::new();
    let mut traffreg_numbers = Vec::new();
    let mut comment_number = None;

    for segment in segments {
        let Some(tag) = segment.chars().next() else {
            return Err(DecodeError::record("empty question tag"));
        };
        let body = match segment.find(']') {
            Some(close) => &segment[close + 1..],
            None => {
                return Err(DecodeError::record(format!(
                    "unterminated question tag [{segment}"
                )));
            }
        };

        match tag {
            'R' => section_names.extend(body.split_whitespace().map(str::to_string)),
            'G' => image_name = non_empty(body.trim()),
            'Q' => text = non_empty(&normalize_inline(body)),
            'W' | 'V' => answers.extend(split_answers(body)),
            'A' => correct = Some(parse_number::<usize>(body, "correct answer")?),
            'T' => advice = non_empty(&normalize_inline(body)),
            'L' => {
                for number in body.split_whitespace() {
                    traffreg_numbers.push(parse_number::<i32>(number, "regulation number")?);
                }
            }
            'C' => comment_number = Some(parse_number::<i32>(body, "comment number")?),
            other => {
                return Err(DecodeError::record(format!(
                    "unknown question field '{other}'"
                )));
            }
        }
    }

    let text = text.ok_or_else(|| DecodeError::record("question has no text"))?;
    let correct = correct
        .ok_or_else(|| DecodeError::record(format!("question {text:?} has no correct answer")))?;
    if correct == 0 || correct > answers.len() {
        return Err(DecodeError::record(format!(
            "correct answer {correct} out of range for {} answers",
            answers.len()
        )));
    }

    Ok(QuestionRecord {
        topic_number,
        text,
        image_name,
        advice,
        correct_answer_index: correct - 1,
        answers,
        section_names,
        traffreg_numbers,
        comment_number,
    })
}

/// Decodes every question of one topic.
///
/// `entries` may hold the rows of all section tables; only those for
/// `topic_number` are used, in offset order.
pub fn decode_topic(
    blob: &[u8],
    entries: &[TopicOffset],
    topic_number: i8,
    profile: &FingerprintProfile,
) -> Result<Vec<QuestionRecord>> {
    let selected = topic_entries(entries, topic_number);
    let offsets: Vec<i32> = selected.iter().map(|entry| entry.question_offset).collect();

    let mut decoded = blob.to_vec();
    decode_blob(
        &mut decoded,
        profile.string_decoder,
        profile.data_magic,
        topic_number as u8,
    );

    debug!("topic {topic_number}: {} question offsets", offsets.len());
    offsets
        .iter()
        .map(|&offset| {
            let span = resolve_span(&offsets, offset, decoded.len())?;
            parse_question(&transcode(&decoded[span]), topic_number).map_err(|err| match err {
                DecodeError::MalformedRecord(reason) => DecodeError::MalformedRecord(format!(
                    "topic {topic_number} offset {offset}: {reason}"
                )),
                other => other,
            })
        })
        .collect()
}

fn split_answers(body: &str) -> Vec<String> {
    ANSWER_MARKER
        .split(body)
        .map(normalize_inline)
        .filter(|answer| !answer.is_empty())
        .collect()
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| DecodeError::record(format!("invalid {what} '{}'", value.trim())))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Generation, StringDecoderVariant};

    #[test]
    fn parses_full_question() {
        let span = "[R]12 34[Q]What is X?[W]1. A[nl]2. B[nl]3. C[A]2[T]Because Y.";
        let question = parse_question(span, 1).unwrap();
        assert_eq!(question.section_names, vec!["12", "34"]);
        assert_eq!(question.text, "What is X?");
        assert_eq!(question.answers, vec!["A", "B", "C"]);
        assert_eq!(question.correct_answer_index, 1);
        assert_eq!(question.advice.as_deref(), Some("Because Y."));
        assert_eq!(question.image_name, None);
        assert!(question.traffreg_numbers.is_empty());
        assert_eq!(question.comment_number, None);
    }

    #[test]
    fn parses_references() {
        let span = "[G] sign12 [Q]Which sign?\r\n[V]1 Left\r\n2. Ri-\r\nght\r\n[A]1[L]101 102[C]7";
        let question = parse_question(span, 4).unwrap();
        assert_eq!(question.image_name.as_deref(), Some("sign12"));
        assert_eq!(question.answers, vec!["Left", "Right"]);
        assert_eq!(question.correct_answer_index, 0);
        assert_eq!(question.traffreg_numbers, vec![101, 102]);
        assert_eq!(question.comment_number, Some(7));
        assert_eq!(question.topic_number, 4);
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let err = parse_question("[Q]x[W]1. a[A]1[Z]?", 1).unwrap_err();
        assert!(err.to_string().contains("unknown question field 'Z'"));
    }

    #[test]
    fn missing_text_is_fatal() {
        let err = parse_question("[W]1. a[A]1", 1).unwrap_err();
        assert!(err.to_string().contains("no text"));
    }

    #[test]
    fn correct_answer_must_be_in_range() {
        assert!(parse_question("[Q]x[W]1. a[A]0", 1).is_err());
        assert!(parse_question("[Q]x[W]1. a[A]2", 1).is_err());
        assert!(parse_question("[Q]x[W]1. a[A]one", 1).is_err());
    }

    #[test]
    fn decodes_topic_in_offset_order() {
        let profile = FingerprintProfile {
            generation: Generation::Catalogued,
            data_magic: 0x5A17,
            image_magic: 0,
            string_decoder: StringDecoderVariant::V12,
        };
        let first = "[Q]First[W]1. a[nl]2. b[A]2";
        let second = "[R]s1[Q]Second[W]1. c[A]1";
        let mut blob = format!("{first}{second}").into_bytes();
        decode_blob(&mut blob, profile.string_decoder, profile.data_magic, 3);

        let entry = |topic_number, question_offset| TopicOffset {
            topic_number,
            question_offset,
        };
        // Out of order, duplicated, and mixed with another topic.
        let entries = [
            entry(3, first.len() as i32),
            entry(2, 0),
            entry(3, 0),
            entry(3, first.len() as i32),
        ];
        let questions = decode_topic(&blob, &entries, 3, &profile).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "First");
        assert_eq!(questions[0].correct_answer_index, 1);
        assert_eq!(questions[1].text, "Second");
        assert_eq!(questions[1].section_names, vec!["s1"]);
    }
}
