use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::{ChoiceId, FragmentId, HintId};

/// Per-user progress through the narrative, embedded in the user's
/// document. Invariant N1: `current_fragment` never appears in
/// `completed_fragments` until the user moves off it. Invariant N2:
/// every key in `choices_made` is a fragment the user has visited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrativeProgress {
  pub current_fragment: FragmentId,
  pub completed_fragments: Vec<FragmentId>,
  pub choices_made: HashMap<FragmentId, ChoiceId>,
  pub completion_percentage: u8,
  pub last_updated: DateTime<Utc>,
}

impl Default for NarrativeProgress {
  fn default() -> Self {
    Self {
      current_fragment: FragmentId::from("start"),
      completed_fragments: Vec::new(),
      choices_made: HashMap::new(),
      completion_percentage: 0,
      last_updated: Utc::now(),
    }
  }
}

impl NarrativeProgress {
  /// Advance from the current fragment to `next_fragment`, recording
  /// the choice taken (if any). Preserves first-insertion order in
  /// `completed_fragments` and dedups repeated visits.
  pub fn advance(
    &mut self,
    next_fragment: FragmentId,
    choice: Option<ChoiceId>,
    now: DateTime<Utc>,
  ) {
    let outgoing = self.current_fragment.clone();
    if !self.completed_fragments.contains(&outgoing) {
      self.completed_fragments.push(outgoing.clone());
    }
    if let Some(choice_id) = choice {
      self.choices_made.insert(outgoing, choice_id);
    }
    self.current_fragment = next_fragment;
    self.completion_percentage = Self::completion_for(self.completed_fragments.len());
    self.last_updated = now;
  }

  /// 10% per completed fragment, capped at 100 — a stand-in formula
  /// per spec.md's design notes; real content likely wants weighted
  /// progression, but no weighting data is defined here.
  fn completion_for(completed_count: usize) -> u8 {
    (completed_count.saturating_mul(10)).min(100) as u8
  }

  pub fn has_visited(&self, fragment: &FragmentId) -> bool {
    self.current_fragment == *fragment || self.completed_fragments.contains(fragment)
  }
}

/// A single branch choice offered on a fragment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
  pub choice_id: ChoiceId,
  pub text: String,
  pub next_fragment_id: Option<FragmentId>,
  #[serde(default)]
  pub conditions: Option<UnlockConditions>,
}

/// Conditions gating entry into a checkpoint fragment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UnlockConditions {
  #[serde(default)]
  pub required_completed_fragments: Vec<FragmentId>,
  #[serde(default)]
  pub required_choices: HashMap<FragmentId, ChoiceId>,
}

/// Metadata describing how a fragment behaves structurally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FragmentMetadata {
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub is_checkpoint: bool,
  #[serde(default)]
  pub unlock_conditions: Option<UnlockConditions>,
}

/// Read-only narrative content fragment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrativeFragment {
  pub fragment_id: FragmentId,
  pub title: String,
  pub content: String,
  pub choices: Vec<Choice>,
  pub vip_required: bool,
  pub metadata: FragmentMetadata,
}

/// A reaction that should trigger a hint to unlock: matched against
/// an incoming `reaction_detected` event's `(content_id, reaction_type)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HintUnlockCondition {
  pub trigger: String,
  pub content_id: String,
  pub reaction_type: String,
}

/// A narrative hint (pista): content tied to a fragment, unlocked by
/// satisfying its trigger condition and stored as a gamification item
/// in the user's inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HintDefinition {
  pub hint_id: HintId,
  pub content: String,
  pub fragment_id: FragmentId,
  pub unlock_condition: HintUnlockCondition,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn advance_dedups_and_recomputes_percentage() {
    let mut progress = NarrativeProgress::default();
    let now = Utc::now();
    progress.advance(FragmentId::from("f1"), Some(ChoiceId("c1".to_string())), now);
    progress.advance(FragmentId::from("f2"), Some(ChoiceId("c2".to_string())), now);

    assert_eq!(progress.current_fragment, FragmentId::from("f2"));
    assert_eq!(
      progress.completed_fragments,
      vec![FragmentId::from("start"), FragmentId::from("f1")]
    );
    assert_eq!(progress.completion_percentage, 20);
    assert_eq!(
      progress.choices_made.get(&FragmentId::from("start")),
      Some(&ChoiceId("c1".to_string()))
    );
    assert_eq!(
      progress.choices_made.get(&FragmentId::from("f1")),
      Some(&ChoiceId("c2".to_string()))
    );
  }

  #[test]
  fn completion_percentage_caps_at_100() {
    let mut progress = NarrativeProgress::default();
    let now = Utc::now();
    for i in 0..15 {
      progress.advance(FragmentId::from(format!("f{i}")), None, now);
    }
    assert_eq!(progress.completion_percentage, 100);
  }
}
