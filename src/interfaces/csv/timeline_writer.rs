use crate::domain::transaction::Transaction;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct TimelineRow<'a> {
    sequence: u64,
    transaction: &'a str,
    author: &'a str,
    r#type: String,
    old_value: String,
    new_value: String,
    comment: &'a str,
    hidden: bool,
    title: String,
}

/// Writes an object's timeline as CSV, one row per transaction.
pub struct TimelineWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TimelineWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// `title` renders the human-readable line of a transaction.
    pub fn write_timeline(
        &mut self,
        xactions: &[Transaction],
        title: impl Fn(&Transaction) -> String,
    ) -> Result<(), csv::Error> {
        for xaction in xactions {
            self.writer.serialize(TimelineRow {
                sequence: xaction.sequence,
                transaction: xaction.phid.as_str(),
                author: xaction.author_phid.as_str(),
                r#type: xaction.r#type.tag(),
                old_value: xaction.old_value.display(),
                new_value: xaction.new_value.display(),
                comment: xaction.comment.as_ref().map_or("", |c| c.content()),
                hidden: xaction.hidden,
                title: title(xaction),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
