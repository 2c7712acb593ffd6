//! Escalation policy model
//!
//! An escalation policy is an ordered list of steps; list position is the
//! escalation order, and step levels are always the 1-based position after
//! any edit. Only the first step may run immediately. Validation collects
//! violations per step so a caller can point at the offending level, and
//! persistence is expected to be gated on [`EscalationPolicy::ensure_valid`].

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delay assigned to non-first steps created through `add_step`.
pub const DEFAULT_STEP_DELAY_MINUTES: u32 = 15;

/// Notification channels a step can fan out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepChannel {
    Email,
    Sms,
    Voice,
    Slack,
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    User,
    Team,
    Schedule,
}

/// Who a step notifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTarget {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationStep {
    pub id: String,
    /// 1-based escalation order; rewritten by every list edit.
    pub level: u32,
    /// Minutes to wait after the previous step fires. 0 only on the first step.
    pub delay_minutes: u32,
    pub notification_channels: Vec<StepChannel>,
    pub targets: Vec<EscalationTarget>,
    pub is_final: bool,
    pub repeat_enabled: bool,
    pub repeat_count: u32,
}

impl EscalationStep {
    fn new(level: u32, delay_minutes: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            level,
            delay_minutes,
            notification_channels: Vec::new(),
            targets: Vec::new(),
            is_final: false,
            repeat_enabled: false,
            repeat_count: 1,
        }
    }
}

/// Policy-level repeat settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatConfig {
    pub repeat_escalation: bool,
    /// How many times the whole ladder may repeat; 0 means until acknowledged.
    pub max_repeat_count: u32,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self {
            repeat_escalation: false,
            max_repeat_count: 0,
        }
    }
}

/// Violations found in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepViolation {
    pub step_id: String,
    pub level: u32,
    pub errors: Vec<String>,
}

/// Ordered escalation ladder plus repeat settings.
///
/// The step list is only editable through the policy so that levels stay
/// contiguous and the policy never drops below one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    steps: Vec<EscalationStep>,
    pub repeat: RepeatConfig,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationPolicy {
    /// A new policy starts with a single immediate step. Targets and
    /// channels are empty, so the policy does not validate until the
    /// caller fills them in.
    pub fn new() -> Self {
        Self {
            steps: vec![EscalationStep::new(1, 0)],
            repeat: RepeatConfig::default(),
        }
    }

    pub fn steps(&self) -> &[EscalationStep] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&EscalationStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Mutable access to one step's configuration. Order and level are
    /// managed by the list operations; edits here cover delay, channels,
    /// targets, and repeat settings.
    pub fn step_mut(&mut self, id: &str) -> Option<&mut EscalationStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Append a step. The first step is immediate; later steps default to
    /// [`DEFAULT_STEP_DELAY_MINUTES`].
    pub fn add_step(&mut self) -> &EscalationStep {
        let delay = if self.steps.is_empty() {
            0
        } else {
            DEFAULT_STEP_DELAY_MINUTES
        };
        self.steps
            .push(EscalationStep::new(self.steps.len() as u32 + 1, delay));
        self.renumber();
        &self.steps[self.steps.len() - 1]
    }

    /// Remove a step and renumber. A policy never drops below one step.
    pub fn remove_step(&mut self, id: &str) -> Result<EscalationStep> {
        if self.steps.len() <= 1 {
            return Err(DispatchError::validation(
                "steps",
                "an escalation policy must keep at least one step",
            ));
        }
        let index = self
            .steps
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| unknown_step(id))?;
        let removed = self.steps.remove(index);
        self.renumber();
        Ok(removed)
    }

    /// Reorder steps to the given id sequence, which must be a permutation
    /// of the current ids. The step landing first becomes immediate; other
    /// delays are left untouched for [`Self::validate`] to judge, so a
    /// zero-delay step moved off the front is reported, not silently fixed.
    pub fn reorder(&mut self, order: &[String]) -> Result<()> {
        if order.len() != self.steps.len() {
            return Err(DispatchError::validation(
                "steps",
                "reorder must list every step exactly once",
            ));
        }

        let mut reordered: Vec<EscalationStep> = Vec::with_capacity(order.len());
        for id in order {
            if reordered.iter().any(|s| &s.id == id) {
                return Err(DispatchError::validation(
                    "steps",
                    format!("escalation step '{id}' listed more than once"),
                ));
            }
            let step = self
                .step(id)
                .cloned()
                .ok_or_else(|| unknown_step(id))?;
            reordered.push(step);
        }

        self.steps = reordered;
        self.renumber();
        if let Some(first) = self.steps.first_mut() {
            first.delay_minutes = 0;
        }
        Ok(())
    }

    /// Clone a step's configuration into a fresh step appended at the end.
    pub fn duplicate_step(&mut self, id: &str) -> Result<&EscalationStep> {
        let mut copy = self.step(id).cloned().ok_or_else(|| unknown_step(id))?;
        copy.id = Uuid::new_v4().to_string();
        self.steps.push(copy);
        self.renumber();
        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Collect violations, attributed to the step that carries them.
    pub fn validate(&self) -> Vec<StepViolation> {
        let mut violations = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            let mut errors = Vec::new();
            if step.targets.is_empty() {
                errors.push("step must notify at least one target".to_string());
            }
            if step.notification_channels.is_empty() {
                errors.push("step must use at least one notification channel".to_string());
            }
            if index > 0 && step.delay_minutes == 0 {
                errors.push("only the first step may run immediately".to_string());
            }
            if step.repeat_count == 0 {
                errors.push("step repeat count must be at least 1".to_string());
            }
            if !errors.is_empty() {
                violations.push(StepViolation {
                    step_id: step.id.clone(),
                    level: step.level,
                    errors,
                });
            }
        }
        violations
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Gate for persistence: fails with every violation while any exists.
    pub fn ensure_valid(&self) -> Result<()> {
        let violations = self.validate();
        if violations.is_empty() {
            return Ok(());
        }
        let message = violations
            .iter()
            .map(|v| format!("step {}: {}", v.level, v.errors.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        Err(DispatchError::validation("escalation_policy", message))
    }

    fn renumber(&mut self) {
        for (index, step) in self.steps.iter_mut().enumerate() {
            step.level = index as u32 + 1;
        }
    }
}

fn unknown_step(id: &str) -> DispatchError {
    DispatchError::validation("steps", format!("unknown escalation step '{id}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fill(step: &mut EscalationStep) {
        step.notification_channels.push(StepChannel::Email);
        step.targets.push(EscalationTarget {
            target_type: TargetType::User,
            id: "user-1".to_string(),
        });
    }

    /// Two-step policy with valid targets/channels everywhere.
    fn two_step_policy() -> EscalationPolicy {
        let mut policy = EscalationPolicy::new();
        policy.add_step();
        let ids: Vec<String> = policy.steps().iter().map(|s| s.id.clone()).collect();
        for id in &ids {
            fill(policy.step_mut(id).unwrap());
        }
        policy
    }

    #[test]
    fn test_new_policy_has_one_immediate_step() {
        let policy = EscalationPolicy::new();
        assert_eq!(policy.steps().len(), 1);
        assert_eq!(policy.steps()[0].level, 1);
        assert_eq!(policy.steps()[0].delay_minutes, 0);
        // Empty targets and channels: not yet persistable.
        assert!(!policy.is_valid());
    }

    #[test]
    fn test_add_step_defaults() {
        let mut policy = EscalationPolicy::new();
        let second = policy.add_step();
        assert_eq!(second.level, 2);
        assert_eq!(second.delay_minutes, DEFAULT_STEP_DELAY_MINUTES);
        assert!(!second.repeat_enabled);
        assert_eq!(second.repeat_count, 1);
        assert_eq!(policy.steps()[0].delay_minutes, 0);
    }

    #[test]
    fn test_remove_step_renumbers() {
        let mut policy = two_step_policy();
        policy.add_step();
        let middle = policy.steps()[1].id.clone();

        let removed = policy.remove_step(&middle).unwrap();
        assert_eq!(removed.id, middle);
        assert_eq!(policy.steps().len(), 2);
        let levels: Vec<u32> = policy.steps().iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![1, 2]);
    }

    #[test]
    fn test_cannot_remove_last_step() {
        let mut policy = EscalationPolicy::new();
        let only = policy.steps()[0].id.clone();
        let err = policy.remove_step(&only).unwrap_err();
        assert!(err.to_string().contains("at least one step"));
        assert_eq!(policy.steps().len(), 1);
    }

    #[test]
    fn test_remove_unknown_step() {
        let mut policy = two_step_policy();
        assert!(policy.remove_step("nope").is_err());
    }

    #[test]
    fn test_reorder_forces_new_first_delay_to_zero() {
        let mut policy = two_step_policy();
        let first = policy.steps()[0].id.clone();
        let second = policy.steps()[1].id.clone();
        assert_eq!(policy.steps()[1].delay_minutes, DEFAULT_STEP_DELAY_MINUTES);

        policy.reorder(&[second.clone(), first.clone()]).unwrap();

        // The step that had a 15 minute delay now leads and runs immediately.
        assert_eq!(policy.steps()[0].id, second);
        assert_eq!(policy.steps()[0].delay_minutes, 0);
        assert_eq!(policy.steps()[0].level, 1);

        // The old first step kept its zero delay in position two; that is a
        // violation to report, not to fix silently.
        assert_eq!(policy.steps()[1].id, first);
        assert_eq!(policy.steps()[1].delay_minutes, 0);
        let violations = policy.validate();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].level, 2);
        assert!(violations[0].errors[0].contains("first step"));
    }

    #[test]
    fn test_reorder_rejects_non_permutations() {
        let mut policy = two_step_policy();
        let first = policy.steps()[0].id.clone();
        let second = policy.steps()[1].id.clone();
        let original: Vec<String> = policy.steps().iter().map(|s| s.id.clone()).collect();

        assert!(policy.reorder(&[first.clone()]).is_err());
        assert!(policy
            .reorder(&[first.clone(), "ghost".to_string()])
            .is_err());
        assert!(policy.reorder(&[first.clone(), first.clone()]).is_err());

        // Failed reorders leave the policy untouched.
        let after: Vec<String> = policy.steps().iter().map(|s| s.id.clone()).collect();
        assert_eq!(after, original);
        assert_eq!(policy.steps()[1].id, second);
    }

    #[test]
    fn test_duplicate_step_clones_config_with_fresh_identity() {
        let mut policy = two_step_policy();
        let source_id = policy.steps()[1].id.clone();
        policy.step_mut(&source_id).unwrap().repeat_enabled = true;
        policy.step_mut(&source_id).unwrap().repeat_count = 4;

        let copy = policy.duplicate_step(&source_id).unwrap().clone();
        let copy_id = copy.id.clone();

        assert_ne!(copy_id, source_id);
        assert_eq!(copy.level, 3);
        assert!(copy.repeat_enabled);
        assert_eq!(copy.repeat_count, 4);
        assert_eq!(copy.targets, policy.step(&source_id).unwrap().targets);
        assert_eq!(policy.steps().len(), 3);
        assert_eq!(policy.steps()[2].id, copy_id);
    }

    #[test]
    fn test_validation_attributes_violations_per_step() {
        let mut policy = EscalationPolicy::new();
        policy.add_step();
        // First step misses targets and channels; second additionally gets
        // a broken repeat count.
        let second_id = policy.steps()[1].id.clone();
        policy.step_mut(&second_id).unwrap().repeat_count = 0;

        let violations = policy.validate();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].level, 1);
        assert_eq!(violations[0].errors.len(), 2);
        assert_eq!(violations[1].level, 2);
        assert!(violations[1]
            .errors
            .iter()
            .any(|e| e.contains("repeat count")));
    }

    #[test]
    fn test_ensure_valid_blocks_and_names_levels() {
        let policy = EscalationPolicy::new();
        let err = policy.ensure_valid().unwrap_err();
        assert!(err.to_string().contains("step 1"));

        let policy = two_step_policy();
        assert!(policy.ensure_valid().is_ok());
    }

    #[test]
    fn test_repeat_config_defaults() {
        let policy = EscalationPolicy::new();
        assert!(!policy.repeat.repeat_escalation);
        // Zero means repeat until acknowledged once repeats are enabled.
        assert_eq!(policy.repeat.max_repeat_count, 0);
    }

    #[test]
    fn test_serde_uses_snake_case_tags() {
        let step_channel = serde_json::to_value(StepChannel::Voice).unwrap();
        assert_eq!(step_channel, serde_json::json!("voice"));

        let target = EscalationTarget {
            target_type: TargetType::Schedule,
            id: "rot-1".to_string(),
        };
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(value, serde_json::json!({"type": "schedule", "id": "rot-1"}));
    }
}
