//! Per-document membership filters.

use searchsync_types::{Document, DocumentError};

/// Extension point that can narrow the indexes a document belongs to, e.g.
/// to scope documents per tenant.
///
/// Returning [`DocumentError::Unresolvable`] means the record behind the
/// document cannot be examined at all. For versioned records this is treated
/// as a removal signal; any other error propagates.
pub trait IndexMembershipFilter: Send + Sync {
    fn filter(&self, document: &dyn Document, indexes: Vec<String>) -> Result<Vec<String>, DocumentError>;
}

/// Filter built from a closure.
pub struct FnFilter<F>(pub F);

impl<F> IndexMembershipFilter for FnFilter<F>
where
    F: Fn(&dyn Document, Vec<String>) -> Result<Vec<String>, DocumentError> + Send + Sync,
{
    fn filter(&self, document: &dyn Document, indexes: Vec<String>) -> Result<Vec<String>, DocumentError> {
        (self.0)(document, indexes)
    }
}
