//! Composable container predicates.
//!
//! A [`Predicate`] is a pure function over a [`ContainerSummary`]; the
//! combinators never call the runtime. [`list`] is the only place a
//! predicate meets a runtime listing.

use std::{fmt, sync::Arc};

use berth_model::{ContainerState, ContainerSummary, NAME_SEPARATOR};
use tracing::{debug, instrument, warn};

use crate::{error::CoreError, runtime::ContainerRuntime};

type MatchFn = dyn Fn(&ContainerSummary) -> bool + Send + Sync;

/// Shareable boolean predicate over container descriptors.
#[derive(Clone)]
pub struct Predicate {
    f: Arc<MatchFn>,
}

impl Predicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ContainerSummary) -> bool + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Matches every descriptor.
    pub fn any() -> Self {
        Self::new(|_| true)
    }

    #[inline]
    pub fn matches(&self, container: &ContainerSummary) -> bool {
        (self.f)(container)
    }

    pub fn and(self, other: Predicate) -> Self {
        Self::new(move |c| self.matches(c) && other.matches(c))
    }

    pub fn or(self, other: Predicate) -> Self {
        Self::new(move |c| self.matches(c) || other.matches(c))
    }

    pub fn not(self) -> Self {
        Self::new(move |c| !self.matches(c))
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate")
    }
}

/// Exact runtime identifier.
pub fn with_id(id: impl Into<String>) -> Predicate {
    let id = id.into();
    Predicate::new(move |c| c.id == id)
}

/// Exact logical name; the runtime stores aliases with a leading `/`.
pub fn with_name(name: impl AsRef<str>) -> Predicate {
    let wanted = format!("{NAME_SEPARATOR}{}", name.as_ref());
    Predicate::new(move |c| c.names.iter().any(|n| *n == wanted))
}

/// Label `key` present with exactly `value`.
pub fn with_label(key: impl Into<String>, value: impl Into<String>) -> Predicate {
    let key = key.into();
    let value = value.into();
    Predicate::new(move |c| c.labels.get(&key).is_some_and(|v| *v == value))
}

pub fn with_state(state: ContainerState) -> Predicate {
    Predicate::new(move |c| c.state == Some(state))
}

/// Containers known to the runtime that satisfy `predicate`.
///
/// `all` includes containers that are not running. Order follows the
/// runtime's listing.
#[instrument(level = "debug", skip(runtime, predicate), fields(runtime = runtime.name()))]
pub async fn list(
    runtime: &dyn ContainerRuntime,
    predicate: &Predicate,
    all: bool,
) -> Result<Vec<ContainerSummary>, CoreError> {
    let containers = runtime.list_containers(all).await.map_err(|e| {
        warn!(target: "berth.core.filter", error = %e, "error listing containers");
        e
    })?;

    let total = containers.len();
    let matching: Vec<_> = containers
        .into_iter()
        .filter(|c| predicate.matches(c))
        .collect();

    debug!(total, matching = matching.len(), "containers filtered");
    Ok(matching)
}
