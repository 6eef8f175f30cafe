//! General ledger collaborator (double-entry journal).
//!
//! This crate is the boundary the inventory engine posts to. It owns account
//! references, journal drafts/entries, and the balanced-entry invariant.
//! Chart-of-accounts configuration lives outside this workspace.

pub mod journal;

pub use journal::{
    Account, AccountKind, GeneralLedger, InMemoryLedger, JournalDraft, JournalEntry, JournalLine,
};
