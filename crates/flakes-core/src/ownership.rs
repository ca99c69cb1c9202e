//! # Ownership Classification
//!
//! Decides, for every object reference met during a pass, whether the target
//! is part of the graph being serialized (inlined, later duplicated on
//! reconstruction) or a pointer out of it (written as a path).
//!
//! ## Rules
//!
//! Evaluated in order for a non-null target:
//! 1. Target currently on the ownership stack → `External` (back-edge)
//! 2. Target already inlined earlier in this pass → `External`
//! 3. Target's outer is the top of the stack → `Owned`
//! 4. Policy `OuterOrLiveScope` and target lives beneath a live scope → `Owned`
//! 5. Otherwise → `External`
//!
//! Rule 2 guarantees an object is inlined at most once per pass, so shared
//! sub-objects and cycles terminate.

use crate::primitives::MAX_GRAPH_DEPTH;
use crate::types::{FlakesError, ObjectId};
use crate::world::ObjectStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// REFERENCE MARKER
// =============================================================================

/// The byte written before every object reference in the binary codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RefMarker {
    /// Null reference; nothing follows.
    NoReference = 0,
    /// Inlined sub-object: type path and fields follow.
    Owned = 1,
    /// Pointer out of the graph: object path follows.
    External = 2,
}

impl TryFrom<u8> for RefMarker {
    type Error = FlakesError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::NoReference),
            1 => Ok(Self::Owned),
            2 => Ok(Self::External),
            other => Err(FlakesError::Format(format!(
                "invalid reference marker {}",
                other
            ))),
        }
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// How references to objects that are not directly owned are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPolicy {
    /// Only objects whose outer is the current owner are inlined.
    StrictOuter,
    /// Also inline anything that lives beneath a live runtime scope.
    #[default]
    OuterOrLiveScope,
}

impl std::str::FromStr for OwnershipPolicy {
    type Err = FlakesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict_outer" | "strict" => Ok(Self::StrictOuter),
            "outer_or_live_scope" | "live_scope" => Ok(Self::OuterOrLiveScope),
            other => Err(FlakesError::Format(format!(
                "unknown ownership policy '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// TRACKER
// =============================================================================

/// Per-pass ownership stack plus the set of objects already inlined.
///
/// One tracker lives for exactly one serialization or deserialization call.
#[derive(Debug, Clone)]
pub struct OwnershipTracker {
    stack: Vec<Option<ObjectId>>,
    exported: BTreeSet<ObjectId>,
    policy: OwnershipPolicy,
}

impl OwnershipTracker {
    /// Start a pass. The stack is seeded with `owner`, which may be "no owner".
    #[must_use]
    pub fn new(owner: Option<ObjectId>, policy: OwnershipPolicy) -> Self {
        Self {
            stack: vec![owner],
            exported: BTreeSet::new(),
            policy,
        }
    }

    /// Classify a non-null reference and record it if it is inlined.
    pub fn classify(&mut self, store: &dyn ObjectStore, target: ObjectId) -> RefMarker {
        if self.stack.contains(&Some(target)) || self.exported.contains(&target) {
            return RefMarker::External;
        }

        let outer = store.outer_of(target).ok().flatten();
        let owned_by_top = outer.is_some() && outer == self.current_owner();
        let owned_by_scope =
            self.policy == OwnershipPolicy::OuterOrLiveScope && store.is_live_scoped(target);

        if owned_by_top || owned_by_scope {
            self.exported.insert(target);
            RefMarker::Owned
        } else {
            RefMarker::External
        }
    }

    /// Push an owner while its fields are walked.
    pub fn enter(&mut self, owner: ObjectId) -> Result<(), FlakesError> {
        if self.stack.len() >= MAX_GRAPH_DEPTH {
            return Err(FlakesError::Format(format!(
                "ownership nesting exceeds {} levels",
                MAX_GRAPH_DEPTH
            )));
        }
        self.stack.push(Some(owner));
        Ok(())
    }

    /// Pop the owner pushed by the matching `enter`. The seed entry is never popped.
    pub fn leave(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Top of the stack.
    #[must_use]
    pub fn current_owner(&self) -> Option<ObjectId> {
        self.stack.last().copied().flatten()
    }

    /// Current stack depth, seed included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Number of objects inlined so far.
    #[must_use]
    pub fn exported_count(&self) -> usize {
        self.exported.len()
    }

    #[must_use]
    pub fn policy(&self) -> OwnershipPolicy {
        self.policy
    }
}

// =============================================================================
// TESTS
// =============================================================================
