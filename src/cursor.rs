use std::sync::Arc;

use tracing::trace;

use crate::error::DbProxyError;
use crate::results::{CustomDbRow, ResultSet};
use crate::stream::RowStream;
use crate::types::RowValues;

/// Pull-based view over the row stream of one `query` call.
///
/// Column names are fixed for the lifetime of the cursor. Once [`next`](Self::next) has
/// reported end of data or an error, every later call reports end of data.
#[derive(Debug)]
pub struct ResultCursor {
    columns: Arc<Vec<String>>,
    rows: Option<RowStream>,
    finished: bool,
}

impl ResultCursor {
    pub(crate) fn new(columns: Vec<String>, rows: Option<RowStream>) -> Self {
        Self {
            columns: Arc::new(columns),
            finished: rows.is_none(),
            rows,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Copy the next row into `dest`.
    ///
    /// Returns `Ok(true)` when a row was written and `Ok(false)` at end of data.
    ///
    /// # Errors
    /// Returns [`DbProxyError::ShapeError`] when the row's arity differs from `dest.len()`, or
    /// whatever error the producer reported while decoding the stream.
    pub async fn next(&mut self, dest: &mut [RowValues]) -> Result<bool, DbProxyError> {
        let Some(row) = self.pull().await? else {
            return Ok(false);
        };
        if row.len() != dest.len() {
            self.finish();
            return Err(DbProxyError::ShapeError {
                expected: dest.len(),
                actual: row.len(),
            });
        }
        for (slot, cell) in dest.iter_mut().zip(row) {
            *slot = cell;
        }
        Ok(true)
    }

    /// Take the next row as an owned [`CustomDbRow`], checked against [`columns`](Self::columns).
    ///
    /// # Errors
    /// Same as [`next`](Self::next).
    pub async fn next_row(&mut self) -> Result<Option<CustomDbRow>, DbProxyError> {
        let mut slots = vec![RowValues::Null; self.columns.len()];
        if self.next(&mut slots).await? {
            Ok(Some(CustomDbRow::new(Arc::clone(&self.columns), slots)))
        } else {
            Ok(None)
        }
    }

    /// Drain the remaining rows into a [`ResultSet`].
    ///
    /// # Errors
    /// Stops at the first shape or decode error and returns it.
    pub async fn collect_result_set(mut self) -> Result<ResultSet, DbProxyError> {
        let mut set = ResultSet::with_columns(Arc::clone(&self.columns));
        let mut slots = vec![RowValues::Null; self.columns.len()];
        while self.next(&mut slots).await? {
            set.add_row_values(slots.clone());
        }
        Ok(set)
    }

    /// Stop consuming. The producer is told to stop at its next send.
    pub fn close(&mut self) {
        self.finish();
    }

    async fn pull(&mut self) -> Result<Option<Vec<RowValues>>, DbProxyError> {
        if self.finished {
            return Ok(None);
        }
        let Some(stream) = self.rows.as_mut() else {
            self.finished = true;
            return Ok(None);
        };
        match stream.recv().await {
            Some(Ok(raw)) => {
                trace!(cells = raw.len(), "row received");
                Ok(Some(raw.into_iter().map(RowValues::from_json).collect()))
            }
            Some(Err(err)) => {
                self.finish();
                Err(err)
            }
            None => {
                self.finish();
                Ok(None)
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(mut stream) = self.rows.take() {
            stream.cancel();
        }
    }
}
