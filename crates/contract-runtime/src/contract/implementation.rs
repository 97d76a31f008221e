//! Implementation functions

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::arguments::ArgumentBag;
use crate::invocation::{CallContext, Exits};

pub type AsyncImplFn =
    Arc<dyn Fn(ArgumentBag, Exits, CallContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub type SyncImplFn = Arc<dyn Fn(ArgumentBag, Exits, CallContext) -> anyhow::Result<()> + Send + Sync>;

/// The unit of work behind a contract
///
/// The function receives the sanitized arguments, the `Exits` used to
/// signal exactly one outcome, and call-scoped context. Returning `Err` (or
/// panicking) before signaling is captured as a fault and delivered as
/// `error`.
#[derive(Clone)]
pub enum Implementation {
    Async { name: Option<String>, func: AsyncImplFn },
    Sync { name: Option<String>, func: SyncImplFn },
}

impl Implementation {
    pub fn asynchronous<F, Fut>(func: F) -> Self
    where
        F: Fn(ArgumentBag, Exits, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Implementation::Async {
            name: None,
            func: Arc::new(move |args, exits, ctx| func(args, exits, ctx).boxed()),
        }
    }

    pub fn synchronous<F>(func: F) -> Self
    where
        F: Fn(ArgumentBag, Exits, CallContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Implementation::Sync {
            name: None,
            func: Arc::new(func),
        }
    }

    /// Attach a name used for identity derivation and logs
    pub fn named(self, name: impl Into<String>) -> Self {
        let name = Some(name.into());
        match self {
            Implementation::Async { func, .. } => Implementation::Async { name, func },
            Implementation::Sync { func, .. } => Implementation::Sync { name, func },
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Implementation::Async { name, .. } | Implementation::Sync { name, .. } => name.as_deref(),
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, Implementation::Sync { .. })
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_sync() { "Sync" } else { "Async" };
        f.debug_struct(kind).field("name", &self.name()).finish_non_exhaustive()
    }
}
