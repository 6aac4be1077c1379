//! In-memory inventory implementing probe and action.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;

use super::task::CountdownTask;
use crate::backend::{Action, ActionResult, Probe};
use crate::context::RunContext;
use crate::diff::merge_additions;
use crate::error::RemoteError;
use crate::state::{Attributes, Observation, ScopeSegment, TargetIdentity};

/// Operation kinds, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Observe,
    Create,
    Update,
    Delete,
}

/// Recorded call against the inventory.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Observe(String),
    Create(String, Attributes),
    Update(String, Attributes),
    /// Additive update, holding only the members to add.
    UpdatePartial(String, Attributes),
    Delete(String),
}

#[derive(Debug, Clone)]
struct Resource {
    id: String,
    attributes: Attributes,
}

#[derive(Default)]
struct Inner {
    containers: BTreeSet<String>,
    resources: BTreeMap<String, Resource>,
    next_id: u64,
    calls: Vec<Call>,
    failures: HashMap<Op, RemoteError>,
    hidden: HashSet<String>,
    vanish_after_observe: bool,
    create_task: Option<CountdownTask>,
}

/// Shared in-memory remote system. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryInventory {
    inner: Arc<Mutex<Inner>>,
}

fn scope_key(scope: &[ScopeSegment]) -> String {
    scope
        .iter()
        .map(|s| format!("{}={}", s.kind, s.name))
        .collect::<Vec<_>>()
        .join("/")
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register every container enclosing `target`.
    pub fn add_scope(&self, target: &TargetIdentity) -> &Self {
        let mut inner = self.lock();
        for depth in 1..=target.scope.len() {
            inner.containers.insert(scope_key(&target.scope[..depth]));
        }
        self
    }

    /// Seed an existing resource (and its containers).
    pub fn insert(&self, target: &TargetIdentity, attributes: Attributes) -> String {
        self.add_scope(target);
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("res-{}", inner.next_id);
        inner.resources.insert(
            target.to_string(),
            Resource {
                id: id.clone(),
                attributes,
            },
        );
        id
    }

    /// Remove a resource behind the reconciler's back.
    pub fn remove(&self, target: &TargetIdentity) {
        self.lock().resources.remove(&target.to_string());
    }

    pub fn get(&self, target: &TargetIdentity) -> Option<Attributes> {
        self.lock()
            .resources
            .get(&target.to_string())
            .map(|r| r.attributes.clone())
    }

    pub fn contains(&self, target: &TargetIdentity) -> bool {
        self.lock().resources.contains_key(&target.to_string())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of mutating calls (create, update, delete) seen so far.
    pub fn mutations(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| !matches!(c, Call::Observe(_)))
            .count()
    }

    /// Fail the next call of kind `op` with `error`.
    pub fn fail_next(&self, op: Op, error: RemoteError) {
        self.lock().failures.insert(op, error);
    }

    /// Make an existing resource invisible to the probe.
    pub fn hide(&self, target: &TargetIdentity) {
        self.lock().hidden.insert(target.to_string());
    }

    /// Delete the observed resource right after the next observe, so a
    /// following delete races with an external removal.
    pub fn vanish_after_observe(&self) {
        self.lock().vanish_after_observe = true;
    }

    /// Creates return `task` as pending work.
    pub fn create_starts(&self, task: CountdownTask) {
        self.lock().create_task = Some(task);
    }

    fn take_failure(inner: &mut Inner, op: Op) -> Result<(), RemoteError> {
        match inner.failures.remove(&op) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Probe for MemoryInventory {
    /// Resource key (`TargetIdentity` display form).
    type Handle = String;

    async fn observe(
        &self,
        _ctx: &RunContext,
        target: &TargetIdentity,
        _desired: &Attributes,
    ) -> Result<Observation<String>, RemoteError> {
        let mut inner = self.lock();
        let key = target.to_string();
        inner.calls.push(Call::Observe(key.clone()));
        Self::take_failure(&mut inner, Op::Observe)?;

        for depth in 1..=target.scope.len() {
            let container = scope_key(&target.scope[..depth]);
            if !inner.containers.contains(&container) {
                return Err(RemoteError::MissingDependency(container));
            }
        }

        if inner.hidden.contains(&key) {
            return Ok(Observation::Absent);
        }

        let Some(resource) = inner.resources.get(&key).cloned() else {
            return Ok(Observation::Absent);
        };

        if inner.vanish_after_observe {
            inner.vanish_after_observe = false;
            inner.resources.remove(&key);
        }

        Ok(Observation::Present {
            attributes: resource.attributes,
            handle: key,
        })
    }
}

#[async_trait]
impl Action for MemoryInventory {
    type Handle = String;

    async fn create(
        &self,
        _ctx: &RunContext,
        target: &TargetIdentity,
        attributes: &Attributes,
    ) -> Result<ActionResult, RemoteError> {
        let mut inner = self.lock();
        let key = target.to_string();
        inner.calls.push(Call::Create(key.clone(), attributes.clone()));
        Self::take_failure(&mut inner, Op::Create)?;

        if inner.resources.contains_key(&key) {
            return Err(RemoteError::AlreadyExists(key));
        }

        inner.next_id += 1;
        let id = format!("res-{}", inner.next_id);
        inner.resources.insert(
            key.clone(),
            Resource {
                id: id.clone(),
                attributes: attributes.clone(),
            },
        );
        inner.hidden.remove(&key);

        let result = ActionResult::changed(json!({ "name": target.name, "id": id }));
        Ok(match inner.create_task.clone() {
            Some(task) => result.then_wait_for(task),
            None => result,
        })
    }

    async fn update(
        &self,
        _ctx: &RunContext,
        handle: &String,
        changes: &Attributes,
    ) -> Result<ActionResult, RemoteError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Update(handle.clone(), changes.clone()));
        Self::take_failure(&mut inner, Op::Update)?;

        let Some(resource) = inner.resources.get_mut(handle) else {
            return Err(RemoteError::NotFound(handle.clone()));
        };
        for (name, value) in changes {
            resource.attributes.insert(name.clone(), value.clone());
        }
        Ok(ActionResult::changed(json!({
            "id": resource.id,
            "attributes": resource.attributes,
        })))
    }

    async fn update_partial(
        &self,
        _ctx: &RunContext,
        handle: &String,
        additions: &Attributes,
        _observed: &Attributes,
    ) -> Result<ActionResult, RemoteError> {
        let mut inner = self.lock();
        inner
            .calls
            .push(Call::UpdatePartial(handle.clone(), additions.clone()));
        Self::take_failure(&mut inner, Op::Update)?;

        let Some(resource) = inner.resources.get_mut(handle) else {
            return Err(RemoteError::NotFound(handle.clone()));
        };
        // Merge against the stored state, not the caller's snapshot.
        let merged = merge_additions(&resource.attributes, additions);
        resource.attributes.extend(merged);
        Ok(ActionResult::changed(json!({
            "id": resource.id,
            "attributes": resource.attributes,
        })))
    }

    async fn delete(&self, _ctx: &RunContext, handle: &String) -> Result<ActionResult, RemoteError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Delete(handle.clone()));
        Self::take_failure(&mut inner, Op::Delete)?;

        match inner.resources.remove(handle) {
            Some(resource) => Ok(ActionResult::changed(json!({ "id": resource.id }))),
            None => Err(RemoteError::NotFound(handle.clone())),
        }
    }
}
