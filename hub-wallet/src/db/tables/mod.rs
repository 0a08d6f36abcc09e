//! Table modules - extend Database with domain-specific methods

mod transactions; // transactions (write-call records)
