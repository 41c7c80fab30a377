use serde::{Deserialize, Serialize};

/// The kind of besitos transaction being applied. Only `Purchase` and
/// `Penalty` are debits and therefore subject to the
/// `balance + delta >= 0` check in `process_besitos_transaction`;
/// `Reward` and `Bonus` are credits that never fail on balance
/// grounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BesitosTransactionType {
  Reward,
  Purchase,
  Penalty,
  Bonus,
}

impl BesitosTransactionType {
  pub fn as_str(&self) -> &'static str {
    match self {
      BesitosTransactionType::Reward => "reward",
      BesitosTransactionType::Purchase => "purchase",
      BesitosTransactionType::Penalty => "penalty",
      BesitosTransactionType::Bonus => "bonus",
    }
  }

  /// Whether this transaction type is checked against the current
  /// balance before being applied (Invariant U2).
  pub fn is_debit(&self) -> bool {
    matches!(self, BesitosTransactionType::Purchase | BesitosTransactionType::Penalty)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_purchase_and_penalty_are_debits() {
    assert!(BesitosTransactionType::Purchase.is_debit());
    assert!(BesitosTransactionType::Penalty.is_debit());
    assert!(!BesitosTransactionType::Reward.is_debit());
    assert!(!BesitosTransactionType::Bonus.is_debit());
  }
}
