//! Desired and observed state of a remote resource.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{diff_attributes, DiffPolicy, Drift};

/// Attribute name -> value mapping, ordered for stable output.
pub type Attributes = BTreeMap<String, Value>;

/// One enclosing container of a resource, e.g. `datacenter=dc01`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeSegment {
    pub kind: String,
    pub name: String,
}

/// Key identifying a remote resource.
///
/// `scope` lists the containers the resource lives in, outermost first.
/// A probe must fail with a missing-dependency error when one of them
/// does not exist, rather than reporting the resource as absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetIdentity {
    pub name: String,
    #[serde(default)]
    pub scope: Vec<ScopeSegment>,
}

impl TargetIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: Vec::new(),
        }
    }

    /// Append an enclosing container (call outermost first).
    pub fn within(mut self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.scope.push(ScopeSegment {
            kind: kind.into(),
            name: name.into(),
        });
        self
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.scope {
            write!(f, "{}={}/", seg.kind, seg.name)?;
        }
        f.write_str(&self.name)
    }
}

/// Steady state a caller may request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredLifecycle {
    #[default]
    Present,
    Absent,
}

impl DesiredLifecycle {
    pub const ALL: [DesiredLifecycle; 2] = [DesiredLifecycle::Present, DesiredLifecycle::Absent];

    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredLifecycle::Present => "present",
            DesiredLifecycle::Absent => "absent",
        }
    }
}

impl fmt::Display for DesiredLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a resource as read from the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedLifecycle {
    Absent,
    Present,
    /// Exists, but at least one desired attribute differs.
    NeedsUpdate,
}

impl ObservedLifecycle {
    pub const ALL: [ObservedLifecycle; 3] = [
        ObservedLifecycle::Absent,
        ObservedLifecycle::Present,
        ObservedLifecycle::NeedsUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObservedLifecycle::Absent => "absent",
            ObservedLifecycle::Present => "present",
            ObservedLifecycle::NeedsUpdate => "needs_update",
        }
    }
}

impl fmt::Display for ObservedLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller wants a remote resource to look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredStateSpec {
    pub target: TargetIdentity,
    #[serde(default, rename = "state")]
    pub lifecycle: DesiredLifecycle,
    /// Only consulted when `lifecycle` is present.
    #[serde(default)]
    pub attributes: Attributes,
}

impl DesiredStateSpec {
    pub fn present(target: TargetIdentity) -> Self {
        Self {
            target,
            lifecycle: DesiredLifecycle::Present,
            attributes: Attributes::new(),
        }
    }

    pub fn absent(target: TargetIdentity) -> Self {
        Self {
            target,
            lifecycle: DesiredLifecycle::Absent,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Raw reading returned by a probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<H> {
    Absent,
    Present { attributes: Attributes, handle: H },
}

/// Observed state of a resource for one reconciliation run.
///
/// Built fresh per run and never cached. `handle` is only set when the
/// resource exists and is consumed by the action within the same run.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedState<H> {
    pub lifecycle: ObservedLifecycle,
    pub attributes: Attributes,
    pub drift: Drift,
    pub handle: Option<H>,
}

impl<H> ObservedState<H> {
    /// Classify a probe reading against the desired state.
    ///
    /// Attributes are only compared when the caller wants the resource
    /// present; for an absent request any existing resource is `Present`.
    pub fn classify(
        observation: Observation<H>,
        desired: &DesiredStateSpec,
        policy: &DiffPolicy,
    ) -> Self {
        match observation {
            Observation::Absent => Self {
                lifecycle: ObservedLifecycle::Absent,
                attributes: Attributes::new(),
                drift: Drift::default(),
                handle: None,
            },
            Observation::Present { attributes, handle } => {
                let drift = match desired.lifecycle {
                    DesiredLifecycle::Present => {
                        diff_attributes(&desired.attributes, &attributes, policy)
                    }
                    DesiredLifecycle::Absent => Drift::default(),
                };
                let lifecycle = if drift.is_empty() {
                    ObservedLifecycle::Present
                } else {
                    ObservedLifecycle::NeedsUpdate
                };
                Self {
                    lifecycle,
                    attributes,
                    drift,
                    handle: Some(handle),
                }
            }
        }
    }

    /// Serializable snapshot without the handle.
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "lifecycle": self.lifecycle,
            "attributes": self.attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn target_display_includes_scope() {
        let t = TargetIdentity::new("pg-mgmt")
            .within("datacenter", "dc01")
            .within("dvs", "dvs-core");
        assert_eq!(t.to_string(), "datacenter=dc01/dvs=dvs-core/pg-mgmt");
    }

    #[test]
    fn classify_present_matching() {
        let spec = DesiredStateSpec::present(TargetIdentity::new("vds")).with_attribute("mtu", 9000);
        let obs = Observation::Present {
            attributes: attrs(&[("mtu", json!(9000)), ("uplinks", json!(2))]),
            handle: "vds-1",
        };
        let state = ObservedState::classify(obs, &spec, &DiffPolicy::default());
        assert_eq!(state.lifecycle, ObservedLifecycle::Present);
        assert!(state.drift.is_empty());
        assert_eq!(state.handle, Some("vds-1"));
    }

    #[test]
    fn classify_present_drifted() {
        let spec = DesiredStateSpec::present(TargetIdentity::new("vds")).with_attribute("mtu", 9000);
        let obs = Observation::Present {
            attributes: attrs(&[("mtu", json!(1500))]),
            handle: (),
        };
        let state = ObservedState::classify(obs, &spec, &DiffPolicy::default());
        assert_eq!(state.lifecycle, ObservedLifecycle::NeedsUpdate);
        assert_eq!(state.drift.changed, attrs(&[("mtu", json!(9000))]));
    }

    #[test]
    fn classify_absent_request_ignores_attributes() {
        let mut spec = DesiredStateSpec::absent(TargetIdentity::new("vds"));
        spec.attributes.insert("mtu".into(), json!(9000));
        let obs = Observation::Present {
            attributes: attrs(&[("mtu", json!(1500))]),
            handle: (),
        };
        let state = ObservedState::classify(obs, &spec, &DiffPolicy::default());
        assert_eq!(state.lifecycle, ObservedLifecycle::Present);
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: DesiredStateSpec =
            serde_json::from_value(json!({ "target": { "name": "dc01" } })).unwrap();
        assert_eq!(spec.lifecycle, DesiredLifecycle::Present);
        assert!(spec.attributes.is_empty());
        assert!(spec.target.scope.is_empty());
    }
}
