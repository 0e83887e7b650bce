//! Editable recipient list. Nothing is validated while editing.

use crate::types::{Recipient, RecipientField};
use anyhow::{anyhow, Context, Result};
use std::io::Read;

/// Ordered list of recipients. Always holds at least one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientList {
    entries: Vec<Recipient>,
}

impl Default for RecipientList {
    fn default() -> Self {
        Self {
            entries: vec![Recipient::default()],
        }
    }
}

impl RecipientList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Recipient] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a blank row.
    pub fn add(&mut self) {
        self.entries.push(Recipient::default());
    }

    /// Remove the row at `index`. Refuses to remove the last remaining row
    /// and ignores out-of-range indices.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.entries.len() <= 1 || index >= self.entries.len() {
            return false;
        }
        self.entries.remove(index);
        true
    }

    pub fn update(
        &mut self,
        index: usize,
        field: RecipientField,
        value: impl Into<String>,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(index) else {
            return false;
        };
        match field {
            RecipientField::Address => entry.address = value.into(),
            RecipientField::Amount => entry.amount = value.into(),
        }
        true
    }

    fn replace(&mut self, entries: Vec<Recipient>) {
        self.entries = if entries.is_empty() {
            vec![Recipient::default()]
        } else {
            entries
        };
    }

    /// Replace the list with pasted `address,amount` or `address amount`
    /// lines. Blank lines are skipped. Returns the number of rows imported.
    pub fn import(&mut self, text: &str) -> Result<usize> {
        let mut entries = Vec::new();
        for (line_num, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parts: Vec<&str> = if trimmed.contains(',') {
                trimmed.split(',').map(str::trim).collect()
            } else {
                trimmed.split_whitespace().collect()
            };
            if parts.len() != 2 {
                return Err(anyhow!(
                    "Line {}: Expected address and amount, got {} parts",
                    line_num + 1,
                    parts.len()
                ));
            }
            entries.push(Recipient::new(parts[0], parts[1]));
        }

        let count = entries.len();
        self.replace(entries);
        Ok(count)
    }

    /// Same as [`import`](Self::import) for CSV data. An `address,amount`
    /// header row is optional.
    pub fn import_csv<R: Read>(&mut self, reader: R) -> Result<usize> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for (index, result) in rdr.records().enumerate() {
            let record =
                result.with_context(|| format!("Line {}: unreadable CSV record", index + 1))?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            if index == 0 && record.get(0).is_some_and(|f| f.eq_ignore_ascii_case("address")) {
                continue;
            }
            if record.len() != 2 {
                let line = record.position().map(|p| p.line()).unwrap_or(index as u64 + 1);
                return Err(anyhow!(
                    "Line {}: Expected address and amount, got {} fields",
                    line,
                    record.len()
                ));
            }
            entries.push(Recipient::new(&record[0], &record[1]));
        }

        let count = entries.len();
        self.replace(entries);
        Ok(count)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut list = Self::default();
        list.import_csv(reader)?;
        Ok(list)
    }
}
