use crate::types::{AggregatorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// Bangumi `subject_type` values accepted by the collections endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SubjectType {
    Book,
    Anime,
    Music,
    Game,
    Real,
}

impl SubjectType {
    pub const ALL: [SubjectType; 5] = [
        SubjectType::Book,
        SubjectType::Anime,
        SubjectType::Music,
        SubjectType::Game,
        SubjectType::Real,
    ];

    pub fn code(self) -> u8 {
        match self {
            SubjectType::Book => 1,
            SubjectType::Anime => 2,
            SubjectType::Music => 3,
            SubjectType::Game => 4,
            SubjectType::Real => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SubjectType::Book => "Book",
            SubjectType::Anime => "Anime",
            SubjectType::Music => "Music",
            SubjectType::Game => "Game",
            SubjectType::Real => "Real",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.label())
    }
}

impl From<SubjectType> for u8 {
    fn from(value: SubjectType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for SubjectType {
    type Error = AggregatorError;

    fn try_from(value: u8) -> Result<Self> {
        SubjectType::ALL
            .into_iter()
            .find(|t| t.code() == value)
            .ok_or_else(|| AggregatorError::InvalidSubjectType(value.to_string()))
    }
}

impl FromStr for SubjectType {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return SubjectType::try_from(code);
        }
        SubjectType::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| AggregatorError::InvalidSubjectType(trimmed.to_string()))
    }
}

/// Ask the operator for a subject type until a valid one is entered.
/// Only end of input ends the loop without a value.
pub fn prompt_subject_type<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<SubjectType> {
    loop {
        writeln!(output, "Enter the subject type to collect:")?;
        for t in SubjectType::ALL {
            writeln!(output, "  {} - {}", t.code(), t.label())?;
        }
        write!(output, "> ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(AggregatorError::General("no subject type entered".to_string()));
        }

        match line.parse::<SubjectType>() {
            Ok(subject_type) => return Ok(subject_type),
            Err(e) => writeln!(output, "{}", e)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_codes_and_labels() {
        assert_eq!("2".parse::<SubjectType>().unwrap(), SubjectType::Anime);
        assert_eq!(" 6 ".parse::<SubjectType>().unwrap(), SubjectType::Real);
        assert_eq!("game".parse::<SubjectType>().unwrap(), SubjectType::Game);
        assert!("5".parse::<SubjectType>().is_err());
        assert!("anything".parse::<SubjectType>().is_err());
    }

    #[test]
    fn prompt_repeats_until_valid() {
        let mut input = Cursor::new("x\n5\n4\n");
        let mut output = Vec::new();
        let chosen = prompt_subject_type(&mut input, &mut output).unwrap();
        assert_eq!(chosen, SubjectType::Game);
        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown.matches("> ").count(), 3);
    }

    #[test]
    fn prompt_fails_on_end_of_input() {
        let mut input = Cursor::new("7\n");
        let mut output = Vec::new();
        assert!(prompt_subject_type(&mut input, &mut output).is_err());
    }
}
