//! Record sources feeding the submission driver.
//!
//! The driver only needs `next_batch`; the CSV reader is the source used by
//! the binary. Lines are `last_name,first_name,document,birthdate,number`.
//! Fields may be double-quoted; a quoted field can hold commas and `""`
//! stands for a literal quote.

use crate::error::RecordError;
use crate::protocol::{Agency, Bet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Sequential, non-restartable producer of bets.
pub trait RecordSource {
    /// Return up to `max` bets. An empty vector means the source is exhausted.
    fn next_batch(&mut self, max: usize) -> Result<Vec<Bet>, RecordError>;
}

/// Reads bets from comma-separated lines.
pub struct CsvSource<R> {
    reader: R,
    agency: Agency,
    line_no: usize,
    at_end: bool,
    total_read: usize,
}

impl CsvSource<BufReader<File>> {
    pub fn open(path: &Path, agency: Agency) -> Result<Self, RecordError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), agency))
    }
}

impl<R: BufRead> CsvSource<R> {
    pub fn new(reader: R, agency: Agency) -> Self {
        Self {
            reader,
            agency,
            line_no: 0,
            at_end: false,
            total_read: 0,
        }
    }

    /// Bets produced so far.
    pub fn total_read(&self) -> usize {
        self.total_read
    }

    fn next_bet(&mut self) -> Result<Option<Bet>, RecordError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                self.at_end = true;
                return Ok(None);
            }
            self.line_no += 1;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if !trimmed.trim().is_empty() {
                return self.parse_line(trimmed).map(Some);
            }
        }
    }

    fn parse_line(&self, line: &str) -> Result<Bet, RecordError> {
        let mut fields = split_fields(line).into_iter();
        let mut next = |field: &'static str| {
            fields.next().ok_or_else(|| RecordError::MissingField {
                line: self.line_no,
                field,
            })
        };

        let last_name = next("last_name")?;
        let first_name = next("first_name")?;
        let document = next("document")?;
        let birthdate = next("birthdate")?;
        let number = next("number")?;

        self.agency
            .bet(&first_name, &last_name, &document, &birthdate, &number)
    }
}

/// Split one line on commas, honouring double-quoted fields.
///
/// An unterminated quote runs to the end of the line. Characters between a
/// closing quote and the next comma are dropped.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        let mut field = String::new();
        let mut more = false;

        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                if c != '"' {
                    field.push(c);
                } else if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    break;
                }
            }
            for c in chars.by_ref() {
                if c == ',' {
                    more = true;
                    break;
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == ',' {
                    more = true;
                    break;
                }
                field.push(c);
            }
        }

        fields.push(field);
        if !more {
            return fields;
        }
    }
}
