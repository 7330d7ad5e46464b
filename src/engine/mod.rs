//! Core engine: the ledger and the resolver that settles it.

pub mod ledger;
pub mod resolver;

pub use ledger::{Ledger, ResetReport};
pub use resolver::{ReconcileOutcome, ReconciliationResult, Resolver, ResolverSettings, VoidPolicy};
