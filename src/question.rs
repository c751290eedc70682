//! Question data model
//!
//! A `Question` is the prompt text plus up to four lettered options.
//! Option letters are a closed set (A-D), so they are an enum rather
//! than a `char` that every caller has to re-validate.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One of the four option letters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl OptionLetter {
    /// All letters in display order
    pub const ALL: [OptionLetter; 4] = [
        OptionLetter::A,
        OptionLetter::B,
        OptionLetter::C,
        OptionLetter::D,
    ];

    /// Parse a single character, case-insensitive
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(OptionLetter::A),
            'B' => Some(OptionLetter::B),
            'C' => Some(OptionLetter::C),
            'D' => Some(OptionLetter::D),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            OptionLetter::A => 'A',
            OptionLetter::B => 'B',
            OptionLetter::C => 'C',
            OptionLetter::D => 'D',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptionLetter::A => "A",
            OptionLetter::B => "B",
            OptionLetter::C => "C",
            OptionLetter::D => "D",
        }
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionLetter {
    type Err = String;

    /// Accepts exactly one letter, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => OptionLetter::from_char(c).ok_or_else(|| trimmed.to_string()),
            _ => Err(trimmed.to_string()),
        }
    }
}

/// A parsed multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// The prompt line
    pub text: String,
    /// Option bodies keyed by letter (ordered A-D)
    pub options: BTreeMap<OptionLetter, String>,
}

impl Question {
    /// Minimum number of options for a usable question
    pub const MIN_OPTIONS: usize = 2;

    /// Build a question, enforcing non-empty text and at least two options
    pub fn new(
        text: impl Into<String>,
        options: BTreeMap<OptionLetter, String>,
    ) -> Result<Self, ParseError> {
        let text = text.into();
        if options.len() < Self::MIN_OPTIONS {
            return Err(ParseError::InsufficientOptions {
                found: options.len(),
            });
        }
        if text.trim().is_empty() {
            return Err(ParseError::NoQuestionText);
        }
        Ok(Self { text, options })
    }

    /// Letters that may be chosen for this question
    pub fn letters(&self) -> impl Iterator<Item = OptionLetter> + '_ {
        self.options.keys().copied()
    }

    pub fn has_option(&self, letter: OptionLetter) -> bool {
        self.options.contains_key(&letter)
    }

    /// Human-readable list of available letters, e.g. "A, B, or C"
    pub fn letter_list(&self) -> String {
        let letters: Vec<&str> = self.letters().map(OptionLetter::as_str).collect();
        match letters.as_slice() {
            [] => String::new(),
            [one] => (*one).to_string(),
            [first, second] => format!("{} or {}", first, second),
            [init @ .., last] => format!("{}, or {}", init.join(", "), last),
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.text)?;
        for (letter, body) in &self.options {
            writeln!(f, "  {}) {}", letter, body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(OptionLetter, &str)]) -> BTreeMap<OptionLetter, String> {
        pairs.iter().map(|(l, s)| (*l, s.to_string())).collect()
    }

    #[test]
    fn test_letter_parsing() {
        assert_eq!("c".parse::<OptionLetter>(), Ok(OptionLetter::C));
        assert_eq!(" D \n".parse::<OptionLetter>(), Ok(OptionLetter::D));
        assert!("E".parse::<OptionLetter>().is_err());
        assert!("AB".parse::<OptionLetter>().is_err());
        assert!("".parse::<OptionLetter>().is_err());
    }

    #[test]
    fn test_question_requires_two_options() {
        let result = Question::new("Why?", options(&[(OptionLetter::A, "Because")]));
        assert_eq!(result, Err(ParseError::InsufficientOptions { found: 1 }));
    }

    #[test]
    fn test_question_requires_text() {
        let result = Question::new(
            "   ",
            options(&[(OptionLetter::A, "x"), (OptionLetter::B, "y")]),
        );
        assert_eq!(result, Err(ParseError::NoQuestionText));
    }

    #[test]
    fn test_letter_list() {
        let q = Question::new(
            "Pick",
            options(&[
                (OptionLetter::C, "c"),
                (OptionLetter::A, "a"),
                (OptionLetter::B, "b"),
            ]),
        )
        .unwrap();
        assert_eq!(q.letter_list(), "A, B, or C");

        let q = Question::new(
            "Pick",
            options(&[(OptionLetter::A, "a"), (OptionLetter::D, "d")]),
        )
        .unwrap();
        assert_eq!(q.letter_list(), "A or D");
    }
}
