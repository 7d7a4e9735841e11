//! Values that only exist once the provisioning engine has created a resource.
//!
//! A [`Resolver`]/[`Deferred`] pair behaves like a one-shot promise: the
//! resolver is consumed on use, the deferred side is a future yielding the
//! value (or [`TopologyError::Unresolved`] when the resolver is dropped).

use crate::error::{TopologyError, TopologyResult};
use futures::future::{BoxFuture, FutureExt, TryFutureExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Attribute values reported by the engine for one created resource.
pub type Outputs = BTreeMap<String, String>;

/// Address of one output attribute, e.g. `db.endpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub resource: String,
    pub attribute: String,
}

impl OutputRef {
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> OutputRef {
        OutputRef {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// The `id` attribute every resource reports.
    pub fn id(resource: impl Into<String>) -> OutputRef {
        OutputRef::new(resource, "id")
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// Create a linked resolver/deferred pair.
pub fn channel<T: Send + 'static>(label: impl Into<String>) -> (Resolver<T>, Deferred<T>) {
    let label = label.into();
    let (tx, rx) = oneshot::channel();
    let missing = label.clone();
    let inner = rx
        .map_err(move |_| TopologyError::Unresolved(missing))
        .boxed();
    (
        Resolver {
            label: label.clone(),
            tx,
        },
        Deferred { label, inner },
    )
}

/// Producer side of a deferred binding.
pub struct Resolver<T> {
    label: String,
    tx: oneshot::Sender<T>,
}

impl<T> Resolver<T> {
    /// Hand the value to the consumer. Consumes the resolver.
    pub fn resolve(self, value: T) {
        if self.tx.send(value).is_err() {
            log::debug!("nobody is waiting on {}", self.label);
        }
    }
}

/// Consumer side of a deferred binding.
pub struct Deferred<T> {
    label: String,
    inner: BoxFuture<'static, TopologyResult<T>>,
}

impl<T: Send + 'static> Deferred<T> {
    /// A deferred value that is already known.
    pub fn ready(label: impl Into<String>, value: T) -> Deferred<T> {
        Deferred {
            label: label.into(),
            inner: futures::future::ready(Ok(value)).boxed(),
        }
    }

    /// Transform the value once it resolves.
    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Deferred {
            label: self.label,
            inner: self.inner.map_ok(f).boxed(),
        }
    }

    /// Wait for both values.
    pub fn zip<U: Send + 'static>(self, other: Deferred<U>) -> Deferred<(T, U)> {
        Deferred {
            label: format!("{}+{}", self.label, other.label),
            inner: futures::future::try_join(self.inner, other.inner).boxed(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> Future for Deferred<T> {
    type Output = TopologyResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deferred({})", self.label)
    }
}

/// Resolved outputs plus the deferred cells still waiting on them.
#[derive(Default)]
pub struct OutputRegistry {
    values: HashMap<OutputRef, String>,
    pending: HashMap<OutputRef, Vec<Resolver<String>>>,
}

impl OutputRegistry {
    pub fn new() -> OutputRegistry {
        OutputRegistry::default()
    }

    /// A deferred cell for `output`, resolved when its resource is recorded.
    pub fn watch(&mut self, output: OutputRef) -> Deferred<String> {
        if let Some(value) = self.values.get(&output) {
            return Deferred::ready(output.to_string(), value.clone());
        }
        let (resolver, deferred) = channel(output.to_string());
        self.pending.entry(output).or_default().push(resolver);
        deferred
    }

    /// Store a created resource's outputs and resolve whoever waits on them.
    ///
    /// Cells watching an attribute the resource did not report are dropped,
    /// which fails their consumers with [`TopologyError::Unresolved`].
    pub fn record(&mut self, resource: &str, outputs: &Outputs) {
        for (attribute, value) in outputs {
            self.values
                .insert(OutputRef::new(resource, attribute.clone()), value.clone());
        }

        let waiting: Vec<OutputRef> = self
            .pending
            .keys()
            .filter(|k| k.resource == resource)
            .cloned()
            .collect();
        for output in waiting {
            let resolvers = self.pending.remove(&output).unwrap_or_default();
            match outputs.get(&output.attribute) {
                Some(value) => {
                    log::debug!("resolving {} ({} waiting)", output, resolvers.len());
                    for resolver in resolvers {
                        resolver.resolve(value.clone());
                    }
                }
                None => log::warn!("{} never reported attribute '{}'", resource, output.attribute),
            }
        }
    }

    pub fn get(&self, output: &OutputRef) -> Option<&str> {
        self.values.get(output).map(|v| v.as_str())
    }

    /// Number of deferred cells still waiting.
    pub fn pending(&self) -> usize {
        self.pending.values().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_once() {
        let (resolver, deferred) = channel::<String>("db.endpoint");
        resolver.resolve("db.local:3306".to_string());
        assert_eq!(deferred.await.unwrap(), "db.local:3306");
    }

    #[tokio::test]
    async fn test_dropped_resolver_fails() {
        let (resolver, deferred) = channel::<String>("db.endpoint");
        drop(resolver);
        assert!(matches!(
            deferred.await,
            Err(TopologyError::Unresolved(label)) if label == "db.endpoint"
        ));
    }

    #[tokio::test]
    async fn test_map_runs_after_resolution() {
        let (resolver, deferred) = channel::<String>("db.endpoint");
        let url = deferred.map(|host| format!("jdbc:mariadb://{host}/app"));
        let waiter = tokio::spawn(url);
        resolver.resolve("db:3306".to_string());
        assert_eq!(waiter.await.unwrap().unwrap(), "jdbc:mariadb://db:3306/app");
    }

    #[tokio::test]
    async fn test_zip_waits_for_both() {
        let (host, host_deferred) = channel::<String>("db.endpoint");
        let (topic, topic_deferred) = channel::<String>("topic.arn");
        let both = host_deferred.zip(topic_deferred);
        assert_eq!(both.label(), "db.endpoint+topic.arn");
        topic.resolve("arn:aws:sns:topic".to_string());
        host.resolve("db:3306".to_string());
        assert_eq!(
            both.await.unwrap(),
            ("db:3306".to_string(), "arn:aws:sns:topic".to_string())
        );
    }

    #[tokio::test]
    async fn test_registry_resolves_watchers() {
        let mut registry = OutputRegistry::new();
        let endpoint = registry.watch(OutputRef::new("db", "endpoint"));
        let missing = registry.watch(OutputRef::new("db", "no_such_attr"));
        assert_eq!(registry.pending(), 2);

        let mut outputs = Outputs::new();
        outputs.insert("id".to_string(), "db-1".to_string());
        outputs.insert("endpoint".to_string(), "db-1.rds:3306".to_string());
        registry.record("db", &outputs);

        assert_eq!(registry.pending(), 0);
        assert_eq!(endpoint.await.unwrap(), "db-1.rds:3306");
        assert!(missing.await.is_err());
        assert_eq!(registry.get(&OutputRef::id("db")), Some("db-1"));

        // watching after the fact returns the recorded value
        let late = registry.watch(OutputRef::new("db", "endpoint"));
        assert_eq!(late.await.unwrap(), "db-1.rds:3306");
    }
}
