//! Payment reconciliation engine.
//!
//! Compares the local donation ledger for a date range against the
//! transactions reported by the payment processor and classifies every
//! pairing. The engine is a pure function; loading rows, calling the
//! processor and persisting discrepancies happen in the worker.
//!
//! Pairing rules, in order:
//!
//! 1. A ledger entry carrying a processor reference pairs with the
//!    transaction whose id or payment-intent id equals that reference.
//!    The pair is `matched`, an `amount_mismatch` (currency differs or the
//!    amounts differ by more than the tolerance) or a `date_mismatch`.
//! 2. Ledger entries without a reference pair with the closest unpaired
//!    transaction of the same currency and amount inside the date
//!    tolerance (when fuzzy matching is enabled).
//! 3. Leftover ledger entries are `unmatched_local`; leftover transactions
//!    inside the range are `unmatched_external`. Transactions outside the
//!    range only exist because the fetch window was padded and are ignored.

use std::collections::{HashMap, HashSet};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Default allowed gap between the ledger date and the processor date.
pub const DEFAULT_DATE_TOLERANCE_DAYS: i64 = 2;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl DateRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn contains(&self, at: Timestamp) -> bool {
        at >= self.start && at < self.end
    }

    /// Widen both ends by `by`.
    pub fn padded(&self, by: Duration) -> Self {
        Self {
            start: self.start - by,
            end: self.end + by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPolicy {
    pub date_tolerance: Duration,
    pub amount_tolerance_cents: i64,
    pub fuzzy_match: bool,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            date_tolerance: Duration::days(DEFAULT_DATE_TOLERANCE_DAYS),
            amount_tolerance_cents: 0,
            fuzzy_match: true,
        }
    }
}

/// One donation from the local ledger. `amount_cents` is net of refunds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub donation_id: DbId,
    pub processor_ref: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub occurred_at: Timestamp,
}

/// One transaction reported by the processor. `amount_cents` is net of
/// refunds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorTransaction {
    pub transaction_id: String,
    pub payment_intent_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub occurred_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    UnmatchedLocal,
    UnmatchedExternal,
    AmountMismatch,
    DateMismatch,
}

impl DiscrepancyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnmatchedLocal => "unmatched_local",
            Self::UnmatchedExternal => "unmatched_external",
            Self::AmountMismatch => "amount_mismatch",
            Self::DateMismatch => "date_mismatch",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unmatched_local" => Some(Self::UnmatchedLocal),
            "unmatched_external" => Some(Self::UnmatchedExternal),
            "amount_mismatch" => Some(Self::AmountMismatch),
            "date_mismatch" => Some(Self::DateMismatch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Reference,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedPair {
    pub donation_id: DbId,
    pub transaction_id: String,
    pub method: MatchMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub donation_id: Option<DbId>,
    pub transaction_id: Option<String>,
    pub local_amount_cents: Option<i64>,
    pub external_amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub local_occurred_at: Option<Timestamp>,
    pub external_occurred_at: Option<Timestamp>,
    pub detail: String,
}

impl Discrepancy {
    fn local_only(entry: &LedgerEntry, detail: String) -> Self {
        Self {
            kind: DiscrepancyKind::UnmatchedLocal,
            donation_id: Some(entry.donation_id),
            transaction_id: None,
            local_amount_cents: Some(entry.amount_cents),
            external_amount_cents: None,
            currency: Some(entry.currency.clone()),
            local_occurred_at: Some(entry.occurred_at),
            external_occurred_at: None,
            detail,
        }
    }

    fn external_only(txn: &ProcessorTransaction) -> Self {
        Self {
            kind: DiscrepancyKind::UnmatchedExternal,
            donation_id: None,
            transaction_id: Some(txn.transaction_id.clone()),
            local_amount_cents: None,
            external_amount_cents: Some(txn.amount_cents),
            currency: Some(txn.currency.clone()),
            local_occurred_at: None,
            external_occurred_at: Some(txn.occurred_at),
            detail: "no donation recorded for processor transaction".to_string(),
        }
    }

    fn paired(
        kind: DiscrepancyKind,
        entry: &LedgerEntry,
        txn: &ProcessorTransaction,
        detail: String,
    ) -> Self {
        Self {
            kind,
            donation_id: Some(entry.donation_id),
            transaction_id: Some(txn.transaction_id.clone()),
            local_amount_cents: Some(entry.amount_cents),
            external_amount_cents: Some(txn.amount_cents),
            currency: Some(entry.currency.clone()),
            local_occurred_at: Some(entry.occurred_at),
            external_occurred_at: Some(txn.occurred_at),
            detail,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub matched: i32,
    pub unmatched_local: i32,
    pub unmatched_external: i32,
    pub amount_mismatch: i32,
    pub date_mismatch: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationOutcome {
    pub matched: Vec<MatchedPair>,
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationOutcome {
    pub fn summary(&self) -> ReconciliationSummary {
        let mut summary = ReconciliationSummary {
            matched: self.matched.len() as i32,
            ..Default::default()
        };
        for d in &self.discrepancies {
            match d.kind {
                DiscrepancyKind::UnmatchedLocal => summary.unmatched_local += 1,
                DiscrepancyKind::UnmatchedExternal => summary.unmatched_external += 1,
                DiscrepancyKind::AmountMismatch => summary.amount_mismatch += 1,
                DiscrepancyKind::DateMismatch => summary.date_mismatch += 1,
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

enum PairResult {
    Matched,
    Mismatch(DiscrepancyKind, String),
}

fn compare_pair(
    entry: &LedgerEntry,
    txn: &ProcessorTransaction,
    policy: &ReconciliationPolicy,
) -> PairResult {
    if !entry.currency.eq_ignore_ascii_case(&txn.currency) {
        return PairResult::Mismatch(
            DiscrepancyKind::AmountMismatch,
            format!(
                "currency differs: ledger {} vs processor {}",
                entry.currency.to_uppercase(),
                txn.currency.to_uppercase()
            ),
        );
    }

    if (entry.amount_cents - txn.amount_cents).abs() > policy.amount_tolerance_cents {
        return PairResult::Mismatch(
            DiscrepancyKind::AmountMismatch,
            format!(
                "amount differs: ledger {} vs processor {} ({})",
                entry.amount_cents,
                txn.amount_cents,
                entry.currency.to_uppercase()
            ),
        );
    }

    let gap = (entry.occurred_at - txn.occurred_at).abs();
    if gap > policy.date_tolerance {
        return PairResult::Mismatch(
            DiscrepancyKind::DateMismatch,
            format!("dates differ by {} hours", gap.num_hours()),
        );
    }

    PairResult::Matched
}

fn normalized_ref(entry: &LedgerEntry) -> Option<&str> {
    entry
        .processor_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
}

/// Classify the ledger against the processor's transactions for `range`.
pub fn reconcile(
    range: &DateRange,
    ledger: &[LedgerEntry],
    transactions: &[ProcessorTransaction],
    policy: &ReconciliationPolicy,
) -> ReconciliationOutcome {
    let mut locals: Vec<&LedgerEntry> = ledger.iter().collect();
    locals.sort_by(|a, b| {
        a.occurred_at
            .cmp(&b.occurred_at)
            .then(a.donation_id.cmp(&b.donation_id))
    });

    let mut externals: Vec<&ProcessorTransaction> = transactions.iter().collect();
    externals.sort_by(|a, b| {
        a.occurred_at
            .cmp(&b.occurred_at)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });

    let mut by_ref: HashMap<&str, usize> = HashMap::new();
    for (idx, txn) in externals.iter().enumerate() {
        by_ref.entry(txn.transaction_id.as_str()).or_insert(idx);
        if let Some(intent) = txn.payment_intent_id.as_deref() {
            by_ref.entry(intent).or_insert(idx);
        }
    }

    let mut paired = vec![false; externals.len()];
    let mut seen_refs: HashSet<&str> = HashSet::new();
    let mut unreferenced: Vec<&LedgerEntry> = Vec::new();
    let mut outcome = ReconciliationOutcome::default();

    // Pass 1: explicit processor references.
    for entry in &locals {
        let Some(reference) = normalized_ref(entry) else {
            unreferenced.push(entry);
            continue;
        };

        if !seen_refs.insert(reference) {
            outcome.discrepancies.push(Discrepancy::local_only(
                entry,
                format!("duplicate processor reference {reference}"),
            ));
            continue;
        }

        match by_ref.get(reference) {
            Some(&idx) if !paired[idx] => {
                paired[idx] = true;
                let txn = externals[idx];
                match compare_pair(entry, txn, policy) {
                    PairResult::Matched => outcome.matched.push(MatchedPair {
                        donation_id: entry.donation_id,
                        transaction_id: txn.transaction_id.clone(),
                        method: MatchMethod::Reference,
                    }),
                    PairResult::Mismatch(kind, detail) => outcome
                        .discrepancies
                        .push(Discrepancy::paired(kind, entry, txn, detail)),
                }
            }
            Some(&idx) => outcome.discrepancies.push(Discrepancy::local_only(
                entry,
                format!(
                    "processor transaction {} already paired with another donation",
                    externals[idx].transaction_id
                ),
            )),
            None => outcome.discrepancies.push(Discrepancy::local_only(
                entry,
                format!("no processor transaction with reference {reference}"),
            )),
        }
    }

    // Pass 2: amount/date matching for entries without a reference.
    for entry in unreferenced {
        let candidate = if policy.fuzzy_match {
            externals
                .iter()
                .enumerate()
                .filter(|(idx, txn)| {
                    !paired[*idx]
                        && txn.currency.eq_ignore_ascii_case(&entry.currency)
                        && (txn.amount_cents - entry.amount_cents).abs()
                            <= policy.amount_tolerance_cents
                        && (txn.occurred_at - entry.occurred_at).abs() <= policy.date_tolerance
                })
                .min_by_key(|(idx, txn)| ((txn.occurred_at - entry.occurred_at).abs(), *idx))
                .map(|(idx, _)| idx)
        } else {
            None
        };

        match candidate {
            Some(idx) => {
                paired[idx] = true;
                outcome.matched.push(MatchedPair {
                    donation_id: entry.donation_id,
                    transaction_id: externals[idx].transaction_id.clone(),
                    method: MatchMethod::Fuzzy,
                });
            }
            None => outcome.discrepancies.push(Discrepancy::local_only(
                entry,
                "no processor reference and no matching transaction".to_string(),
            )),
        }
    }

    // Pass 3: processor transactions nobody claimed.
    for (idx, txn) in externals.iter().enumerate() {
        if !paired[idx] && range.contains(txn.occurred_at) {
            outcome.discrepancies.push(Discrepancy::external_only(txn));
        }
    }

    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
