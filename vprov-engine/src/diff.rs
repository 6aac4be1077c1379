//! Attribute comparison between desired and observed state.
//!
//! Every desired attribute is compared by exact JSON equality, so lists are
//! compared as ordered sequences. Attributes named in
//! [`DiffPolicy::unordered`] are compared by set equality instead, which
//! suits collections such as role names or uplink lists where the remote
//! system does not preserve order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::Attributes;

/// How attributes are compared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPolicy {
    /// List-valued attributes compared by set equality.
    #[serde(default)]
    pub unordered: BTreeSet<String>,
}

impl DiffPolicy {
    pub fn unordered<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unordered: names.into_iter().map(Into::into).collect(),
        }
    }

    fn is_unordered(&self, name: &str) -> bool {
        self.unordered.contains(name)
    }
}

/// Attributes that differ between desired and observed state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Drift {
    /// Desired value of every attribute that differs or is missing remotely.
    pub changed: Attributes,
    /// Additive subset of `changed`: for unordered lists only the members
    /// missing remotely, for everything else the desired value. Lists whose
    /// remote side only has extra members are left out.
    pub additions: Attributes,
}

impl Drift {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Compare `desired` against `observed`.
///
/// Only attributes present in `desired` are considered; extra remote
/// attributes never cause drift.
pub fn diff_attributes(desired: &Attributes, observed: &Attributes, policy: &DiffPolicy) -> Drift {
    let mut drift = Drift::default();

    for (name, want) in desired {
        let unordered = policy.is_unordered(name);
        let have = observed.get(name);

        let same = match have {
            None => false,
            Some(have) if unordered => same_members(want, have),
            Some(have) => want == have,
        };
        if same {
            continue;
        }

        drift.changed.insert(name.clone(), want.clone());

        match (unordered, want, have) {
            (true, Value::Array(want), Some(Value::Array(have))) => {
                let mut missing: Vec<Value> = Vec::new();
                for member in want {
                    if !have.contains(member) && !missing.contains(member) {
                        missing.push(member.clone());
                    }
                }
                if !missing.is_empty() {
                    drift.additions.insert(name.clone(), Value::Array(missing));
                }
            }
            _ => {
                drift.additions.insert(name.clone(), want.clone());
            }
        }
    }

    drift
}

/// Set equality for arrays; plain equality for anything else.
fn same_members(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(a), Value::Array(b)) => {
            a.iter().all(|m| b.contains(m)) && b.iter().all(|m| a.contains(m))
        }
        _ => a == b,
    }
}

/// Full values for an additive update: each list in `additions` is appended
/// to the observed list, keeping the remote members and their order.
/// Non-list additions replace the observed value.
pub fn merge_additions(observed: &Attributes, additions: &Attributes) -> Attributes {
    additions
        .iter()
        .map(|(name, add)| {
            let merged = match (observed.get(name), add) {
                (Some(Value::Array(have)), Value::Array(add)) => {
                    let mut members = have.clone();
                    for member in add {
                        if !members.contains(member) {
                            members.push(member.clone());
                        }
                    }
                    Value::Array(members)
                }
                _ => add.clone(),
            };
            (name.clone(), merged)
        })
        .collect()
}
