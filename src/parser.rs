//! Raw text → `Question` parsing
//!
//! OCR output is classified one line at a time against an ordered rule
//! list: the option rules for A, B, C and D are tried in that order, then
//! the bare-marker rule, and anything left over is question text.
//!
//! The policy is deliberately greedy and lossy:
//! - an option line for a letter that was already seen replaces the
//!   earlier body (last match wins)
//! - only the first non-option line becomes the question text; later
//!   non-option lines are dropped
//! - multi-line options and questions placed after their options are not
//!   reconstructed, the result simply fails validation or is truncated

use crate::error::ParseError;
use crate::question::{OptionLetter, Question};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// How a single non-blank line was classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// `A) body`, `b. body`, `C: body`
    Option { letter: OptionLetter, body: String },
    /// A letter marker with no body (e.g. a lone `D.`); ignored
    BareMarker,
    /// Anything else; a candidate for the question text
    Text(String),
}

/// Pattern that recognises one option letter
struct OptionRule {
    letter: OptionLetter,
    pattern: Regex,
}

fn option_rules() -> &'static [OptionRule] {
    static RULES: OnceLock<Vec<OptionRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        OptionLetter::ALL
            .iter()
            .map(|&letter| {
                let pattern = format!(r"^(?i:{})[.):]\s*(.+)$", letter.as_char());
                OptionRule {
                    letter,
                    pattern: Regex::new(&pattern).expect("option pattern is a valid regex"),
                }
            })
            .collect()
    })
}

fn bare_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"^[A-Da-d][.):]").expect("marker pattern is a valid regex"))
}

/// Classify one trimmed, non-blank line
pub fn classify_line(line: &str) -> LineClass {
    for rule in option_rules() {
        if let Some(caps) = rule.pattern.captures(line) {
            let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            if !body.is_empty() {
                return LineClass::Option {
                    letter: rule.letter,
                    body: body.to_string(),
                };
            }
        }
    }

    if bare_marker().is_match(line) {
        return LineClass::BareMarker;
    }

    LineClass::Text(line.to_string())
}

/// Single-pass line classifier that builds a `Question`
#[derive(Debug, Default, Clone, Copy)]
pub struct QuestionParser;

impl QuestionParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw extracted text into a validated question
    pub fn parse(&self, raw_text: &str) -> Result<Question, ParseError> {
        let mut text: Option<String> = None;
        let mut options: BTreeMap<OptionLetter, String> = BTreeMap::new();

        for line in raw_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match classify_line(line) {
                LineClass::Option { letter, body } => {
                    if let Some(previous) = options.insert(letter, body) {
                        tracing::trace!("Option {} seen again, replacing {:?}", letter, previous);
                    }
                }
                LineClass::BareMarker => {
                    tracing::trace!("Ignoring bare option marker: {:?}", line);
                }
                LineClass::Text(candidate) => {
                    if text.is_none() {
                        text = Some(candidate);
                    } else {
                        tracing::trace!("Dropping extra text line: {:?}", candidate);
                    }
                }
            }
        }

        if options.len() < Question::MIN_OPTIONS {
            return Err(ParseError::InsufficientOptions {
                found: options.len(),
            });
        }

        let text = text.ok_or(ParseError::NoQuestionText)?;
        Question::new(text, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRANCE: &str =
        "What is the capital of France?\nA) London\nB) Berlin\nC) Paris\nD) Madrid";

    #[test]
    fn test_parse_full_question() {
        let q = QuestionParser::new().parse(FRANCE).unwrap();
        assert_eq!(q.text, "What is the capital of France?");
        assert_eq!(q.options.len(), 4);
        assert_eq!(q.options[&OptionLetter::A], "London");
        assert_eq!(q.options[&OptionLetter::B], "Berlin");
        assert_eq!(q.options[&OptionLetter::C], "Paris");
        assert_eq!(q.options[&OptionLetter::D], "Madrid");
    }

    #[test]
    fn test_separators_and_case() {
        let raw = "Pick one\na. first\nB: second\nc)third";
        let q = QuestionParser::new().parse(raw).unwrap();
        assert_eq!(q.options[&OptionLetter::A], "first");
        assert_eq!(q.options[&OptionLetter::B], "second");
        assert_eq!(q.options[&OptionLetter::C], "third");
        assert!(!q.has_option(OptionLetter::D));
    }

    #[test]
    fn test_last_match_wins() {
        let raw = "Q?\nA) old\nB) b\nA) new";
        let q = QuestionParser::new().parse(raw).unwrap();
        assert_eq!(q.options[&OptionLetter::A], "new");
        assert_eq!(q.options.len(), 2);
    }

    #[test]
    fn test_first_text_line_is_question() {
        let raw = "  \nFirst line\nSecond line\nA) x\nB) y\nTrailing text";
        let q = QuestionParser::new().parse(raw).unwrap();
        assert_eq!(q.text, "First line");
    }

    #[test]
    fn test_insufficient_options() {
        let err = QuestionParser::new().parse("Question?\nA) only").unwrap_err();
        assert_eq!(err, ParseError::InsufficientOptions { found: 1 });

        let err = QuestionParser::new().parse("Just some text\nmore text").unwrap_err();
        assert_eq!(err, ParseError::InsufficientOptions { found: 0 });

        let err = QuestionParser::new().parse("").unwrap_err();
        assert_eq!(err, ParseError::InsufficientOptions { found: 0 });
    }

    #[test]
    fn test_no_question_text() {
        let err = QuestionParser::new().parse("A) one\nB) two\nC) three").unwrap_err();
        assert_eq!(err, ParseError::NoQuestionText);
    }

    #[test]
    fn test_bare_marker_is_not_question_text() {
        let raw = "D.\nReal question\nA) x\nB) y";
        let q = QuestionParser::new().parse(raw).unwrap();
        assert_eq!(q.text, "Real question");
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(
            classify_line("b) Berlin"),
            LineClass::Option {
                letter: OptionLetter::B,
                body: "Berlin".to_string()
            }
        );
        assert_eq!(classify_line("C:"), LineClass::BareMarker);
        assert_eq!(
            classify_line("E) not an option"),
            LineClass::Text("E) not an option".to_string())
        );
        assert_eq!(
            classify_line("Apple: fruit"),
            LineClass::Text("Apple: fruit".to_string())
        );
    }
}
