//! Invoice number allocation

/// Hands out strictly increasing invoice numbers for the duration of one
/// run, starting after the highest number already persisted.
///
/// The counter is process-local; the run-level advisory lock guarantees
/// no second allocator exists concurrently.
#[derive(Debug)]
pub struct InvoiceNumberSequence {
    next: i64,
}

impl InvoiceNumberSequence {
    pub fn new(last_used: i64) -> Self {
        Self {
            next: last_used + 1,
        }
    }

    /// The number the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> i64 {
        self.next
    }

    pub fn next(&mut self) -> i64 {
        let number = self.next;
        self.next += 1;
        number
    }
}
