use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

use stockbook_core::{round_money, DomainError, DomainResult, TenantId};

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Account identifier + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1400"
    pub name: String, // e.g. "Inventory Asset"
    pub kind: AccountKind,
}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
        }
    }
}

/// One side of a journal entry (immutable once posted).
///
/// Exactly one of `debit`/`credit` is non-zero. Amounts are rounded half-up
/// to display precision by the draft constructors; nothing downstream rounds
/// again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account: Account,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: Option<String>,
}

impl JournalLine {
    pub fn debit(account: Account, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account,
            debit: round_money(amount),
            credit: Decimal::ZERO,
            description: Some(description.into()),
        }
    }

    pub fn credit(account: Account, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account,
            debit: Decimal::ZERO,
            credit: round_money(amount),
            description: Some(description.into()),
        }
    }
}

/// A journal entry that has not been posted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub tenant_id: TenantId,
    pub date: DateTime<Utc>,
    pub description: String,
    pub source_reference: String,
    pub lines: Vec<JournalLine>,
}

impl JournalDraft {
    pub fn new(
        tenant_id: TenantId,
        date: DateTime<Utc>,
        description: impl Into<String>,
        source_reference: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            date,
            description: description.into(),
            source_reference: source_reference.into(),
            lines: Vec::new(),
        }
    }

    pub fn with_line(mut self, line: JournalLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn push(&mut self, line: JournalLine) {
        self.lines.push(line);
    }

    pub fn total_debits(&self) -> Decimal {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> Decimal {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Validate the double-entry invariant: at least one line, every line
    /// strictly one-sided and positive, and Σdebit == Σcredit to the cent.
    pub fn check_balance(&self) -> DomainResult<()> {
        if self.lines.is_empty() {
            return Err(DomainError::unbalanced_journal(
                "journal entry must have lines",
            ));
        }

        for line in &self.lines {
            let debit_side = line.debit > Decimal::ZERO;
            let credit_side = line.credit > Decimal::ZERO;
            if debit_side == credit_side {
                return Err(DomainError::unbalanced_journal(format!(
                    "line on account {} must be exactly one of debit/credit",
                    line.account.code
                )));
            }
            if line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
                return Err(DomainError::unbalanced_journal(format!(
                    "negative amount on account {}",
                    line.account.code
                )));
            }
        }

        let debits = self.total_debits();
        let credits = self.total_credits();
        if debits != credits {
            return Err(DomainError::unbalanced_journal(format!(
                "debits {debits} != credits {credits}"
            )));
        }

        Ok(())
    }
}

/// A posted, immutable journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    pub tenant_id: TenantId,
    pub date: DateTime<Utc>,
    pub description: String,
    pub source_reference: String,
    pub lines: Vec<JournalLine>,
    pub posted_at: DateTime<Utc>,
}

/// The external ledger boundary.
///
/// `post` must reject unbalanced drafts; this engine never retries a
/// rejected post, it rolls the surrounding unit back instead.
pub trait GeneralLedger: Send + Sync {
    fn post(&self, draft: JournalDraft) -> DomainResult<JournalEntry>;

    /// Entries posted for a tenant, in posting order.
    fn entries(&self, tenant_id: TenantId) -> Vec<JournalEntry>;
}

/// In-memory ledger.
///
/// Intended for tests/dev and as the reference semantics for real backends.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: RwLock<Vec<JournalEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GeneralLedger for InMemoryLedger {
    fn post(&self, draft: JournalDraft) -> DomainResult<JournalEntry> {
        draft.check_balance()?;

        let entry = JournalEntry {
            entry_id: Uuid::now_v7(),
            tenant_id: draft.tenant_id,
            date: draft.date,
            description: draft.description,
            source_reference: draft.source_reference,
            lines: draft.lines,
            posted_at: Utc::now(),
        };

        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::lock_contention("ledger lock poisoned"))?;
        entries.push(entry.clone());

        Ok(entry)
    }

    fn entries(&self, tenant_id: TenantId) -> Vec<JournalEntry> {
        match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .filter(|e| e.tenant_id == tenant_id)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_account(code: &str, kind: AccountKind) -> Account {
        Account::new(code, code, kind)
    }

    fn balanced_draft(tenant_id: TenantId, amount: Decimal) -> JournalDraft {
        JournalDraft::new(tenant_id, Utc::now(), "test entry", "test:1")
            .with_line(JournalLine::debit(
                test_account("1400", AccountKind::Asset),
                amount,
                "debit side",
            ))
            .with_line(JournalLine::credit(
                test_account("2100", AccountKind::Liability),
                amount,
                "credit side",
            ))
    }

    #[test]
    fn balanced_draft_posts() {
        let ledger = InMemoryLedger::new();
        let tenant_id = TenantId::new();

        let entry = ledger.post(balanced_draft(tenant_id, dec!(100.00))).unwrap();
        assert_eq!(entry.lines.len(), 2);
        assert_eq!(ledger.entries(tenant_id).len(), 1);
    }

    #[test]
    fn unbalanced_draft_is_rejected() {
        let ledger = InMemoryLedger::new();
        let tenant_id = TenantId::new();

        let draft = JournalDraft::new(tenant_id, Utc::now(), "bad entry", "test:2")
            .with_line(JournalLine::debit(
                test_account("1400", AccountKind::Asset),
                dec!(100.00),
                "debit",
            ))
            .with_line(JournalLine::credit(
                test_account("2100", AccountKind::Liability),
                dec!(90.00),
                "credit",
            ));

        let err = ledger.post(draft).unwrap_err();
        assert!(matches!(err, DomainError::UnbalancedJournal(_)));
        assert!(ledger.entries(tenant_id).is_empty());
    }

    #[test]
    fn two_sided_line_is_rejected() {
        let tenant_id = TenantId::new();
        let mut draft = JournalDraft::new(tenant_id, Utc::now(), "bad line", "test:3");
        draft.push(JournalLine {
            account: test_account("1400", AccountKind::Asset),
            debit: dec!(10),
            credit: dec!(10),
            description: None,
        });
        draft.push(JournalLine::credit(
            test_account("2100", AccountKind::Liability),
            dec!(0),
            "zero",
        ));

        assert!(matches!(
            draft.check_balance(),
            Err(DomainError::UnbalancedJournal(_))
        ));
    }

    #[test]
    fn line_amounts_round_half_up() {
        let line = JournalLine::debit(
            test_account("1400", AccountKind::Asset),
            dec!(10.005),
            "rounded",
        );
        assert_eq!(line.debit, dec!(10.01));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any sequence of posted entries, the sum of debits
        /// minus credits across the whole ledger is zero.
        #[test]
        fn debits_equal_credits_across_posted_entries(
            cents in prop::collection::vec(1i64..1_000_000i64, 1..10)
        ) {
            let ledger = InMemoryLedger::new();
            let tenant_id = TenantId::new();

            for c in cents {
                let amount = Decimal::new(c, 2);
                ledger.post(balanced_draft(tenant_id, amount)).unwrap();
            }

            let mut total = Decimal::ZERO;
            for entry in ledger.entries(tenant_id) {
                for line in &entry.lines {
                    total += line.debit - line.credit;
                }
            }

            prop_assert_eq!(total, Decimal::ZERO);
        }
    }
}
