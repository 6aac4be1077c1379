//! Result contract returned to the front end.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{ErrorKind, ReconcileError};

/// Final result of a reconciliation run: `{changed, result, error}`.
///
/// `error` holds the first fatal error. It can be set together with
/// `changed = true` when an action went through but a later step (such as
/// waiting for the remote process) failed; the resource is left as is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub changed: bool,
    pub result: Option<Value>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ReconcileError>,
}

impl Outcome {
    pub fn succeeded(changed: bool, result: Value) -> Self {
        Self {
            changed,
            result: (!result.is_null()).then_some(result),
            error: None,
        }
    }

    pub fn failed(error: ReconcileError) -> Self {
        Self {
            changed: false,
            result: None,
            error: Some(error),
        }
    }

    /// Action went through, a follow-up step failed.
    pub fn partially_applied(changed: bool, result: Value, error: ReconcileError) -> Self {
        Self {
            changed,
            result: (!result.is_null()).then_some(result),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ReconcileError::kind)
    }

    /// Single user-facing message, in the style of the module `msg` field.
    pub fn message(&self) -> String {
        match (&self.error, self.changed) {
            (Some(e), _) => e.to_string(),
            (None, true) => "changed".to_string(),
            (None, false) => "unchanged".to_string(),
        }
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<ReconcileError>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match error {
        None => s.serialize_none(),
        Some(e) => {
            let mut st = s.serialize_struct("Error", 2)?;
            st.serialize_field("kind", &e.kind())?;
            st.serialize_field("msg", &e.to_string())?;
            st.end()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_serializes_with_null_error() {
        let o = Outcome::succeeded(true, json!({ "id": "dvportgroup-42" }));
        assert_eq!(
            serde_json::to_value(&o).unwrap(),
            json!({ "changed": true, "result": { "id": "dvportgroup-42" }, "error": null })
        );
    }

    #[test]
    fn null_result_becomes_none() {
        let o = Outcome::succeeded(false, Value::Null);
        assert!(o.result.is_none());
        assert_eq!(o.message(), "unchanged");
    }

    #[test]
    fn failure_serializes_kind_and_msg() {
        let o = Outcome::failed(ReconcileError::MissingDependency("datacenter dc01".into()));
        assert_eq!(
            serde_json::to_value(&o).unwrap(),
            json!({
                "changed": false,
                "result": null,
                "error": { "kind": "missing_dependency", "msg": "missing dependency: datacenter dc01" }
            })
        );
    }
}
