use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{norm_text, Transaction};

/// Round to kopecks and always print two decimals so `100` and `100.00` agree.
fn kopecks(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Identity of a bank movement for deduplication across imports.
///
/// Built from date, signed amount, counterparty, purpose and document type.
/// The transaction id and the assigned category never take part, so the same
/// movement parsed from two different files yields the same key.
pub fn fingerprint(txn: &Transaction) -> String {
    let incoming = kopecks(txn.incoming);
    let amount = if incoming > Decimal::ZERO {
        format!("IN:{incoming}")
    } else {
        format!("OUT:{}", kopecks(txn.outgoing))
    };
    [
        txn.date.to_string().trim().to_string(),
        amount,
        norm_text(&txn.counterparty),
        norm_text(&txn.purpose),
        norm_text(&txn.doctype),
    ]
    .join("|")
}
