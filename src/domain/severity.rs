// Classification outcome domain models
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::reading::Axis;

/// Outcome for a single field.
///
/// `Good < Warning < Danger` by escalation. `Invalid` marks malformed or
/// out-of-domain input and has no place on that scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Good,
    Warning,
    Danger,
    Invalid,
}

impl Severity {
    /// Position on the escalation scale, `None` for `Invalid`.
    pub fn escalation(&self) -> Option<u8> {
        match self {
            Severity::Good => Some(0),
            Severity::Warning => Some(1),
            Severity::Danger => Some(2),
            Severity::Invalid => None,
        }
    }

    /// Whether this outcome should reach a user.
    pub fn is_alerting(&self) -> bool {
        !matches!(self, Severity::Good)
    }

    /// The more severe of two outcomes; an escalated reading outranks `Invalid`.
    pub fn max(self, other: Severity) -> Severity {
        match (self.escalation(), other.escalation()) {
            (Some(a), Some(b)) => {
                if b > a {
                    other
                } else {
                    self
                }
            }
            (Some(a), None) if a > 0 => self,
            (None, Some(b)) if b > 0 => other,
            (None, _) => self,
            (_, None) => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Good => "good",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
            Severity::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one field: a single severity, or one per vector component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Verdict {
    Scalar(Severity),
    Vector(BTreeMap<Axis, Severity>),
}

/// Field name to verdict. Fields that could not be judged are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationResult {
    verdicts: BTreeMap<String, Verdict>,
}

impl ClassificationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, verdict: Verdict) {
        self.verdicts.insert(field.into(), verdict);
    }

    pub fn set(&mut self, field: impl Into<String>, severity: Severity) {
        self.insert(field, Verdict::Scalar(severity));
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    /// Every leaf as `(field_path, severity)`, vector components as `field.axis`.
    pub fn leaves(&self) -> Vec<(String, Severity)> {
        let mut out = Vec::new();
        for (field, verdict) in &self.verdicts {
            match verdict {
                Verdict::Scalar(s) => out.push((field.clone(), *s)),
                Verdict::Vector(components) => {
                    for (axis, s) in components {
                        out.push((format!("{}.{}", field, axis), *s));
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
impl ClassificationResult {
    /// Severity of a scalar field, if one was assigned.
    pub fn severity(&self, field: &str) -> Option<Severity> {
        match self.verdicts.get(field) {
            Some(Verdict::Scalar(s)) => Some(*s),
            _ => None,
        }
    }

    /// Severity of one vector component, if one was assigned.
    pub fn component(&self, field: &str, axis: Axis) -> Option<Severity> {
        match self.verdicts.get(field) {
            Some(Verdict::Vector(m)) => m.get(&axis).copied(),
            _ => None,
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.verdicts.contains_key(field)
    }
}
