//! Per-key cache of compiled chains.

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use tracing::debug;

use crate::builder::Resolver;

/// Compiles the chain for one key.
pub type ChainFactory<K, TIn, TOut> = Arc<dyn Fn(&K) -> Resolver<TIn, TOut> + Send + Sync>;

/// Memoizes one compiled [`Resolver`] per key.
///
/// Lookups compile on miss through the registered factory. The
/// check-compile-store sequence runs under a single lock, so concurrent
/// first lookups of a key compile it once. [`clear`](Self::clear) starts a
/// new generation: resolvers handed out earlier keep working but are no
/// longer returned by [`get`](Self::get).
pub struct ChainRegistry<K, TIn, TOut> {
    compiled: Mutex<HashMap<K, Resolver<TIn, TOut>>>,
    factory: RwLock<ChainFactory<K, TIn, TOut>>,
}

impl<K, TIn, TOut> fmt::Debug for ChainRegistry<K, TIn, TOut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("compiled", &self.lock().len())
            .finish()
    }
}

impl<K, TIn, TOut> ChainRegistry<K, TIn, TOut> {
    pub fn new(factory: impl Fn(&K) -> Resolver<TIn, TOut> + Send + Sync + 'static) -> Self {
        Self {
            compiled: Mutex::new(HashMap::new()),
            factory: RwLock::new(Arc::new(factory)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Resolver<TIn, TOut>>> {
        self.compiled.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the factory. Chains compiled by the previous one are dropped.
    pub fn register_factory(
        &self,
        factory: impl Fn(&K) -> Resolver<TIn, TOut> + Send + Sync + 'static,
    ) {
        *self.factory.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(factory);
        self.clear();
    }

    /// Drop every compiled chain.
    pub fn clear(&self) {
        let mut compiled = self.lock();
        if !compiled.is_empty() {
            debug!(count = compiled.len(), "invalidating compiled chains");
        }
        compiled.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<K, TIn, TOut> ChainRegistry<K, TIn, TOut>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// The chain for `key`, compiling it on first use.
    pub fn get(&self, key: &K) -> Resolver<TIn, TOut> {
        let mut compiled = self.lock();
        if let Some(chain) = compiled.get(key) {
            return Arc::clone(chain);
        }

        let factory = Arc::clone(&self.factory.read().unwrap_or_else(|e| e.into_inner()));
        let chain = factory(key);
        debug!(key = ?key, "compiled interception chain");
        compiled.insert(key.clone(), Arc::clone(&chain));
        chain
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::builder::{ChainBuilder, action},
        std::{
            sync::{
                Barrier,
                atomic::{AtomicUsize, Ordering},
            },
            thread,
        },
    };

    fn counting_registry(
        compiled: Arc<AtomicUsize>,
        offset: i32,
    ) -> ChainRegistry<&'static str, i32, i32> {
        ChainRegistry::new(move |_key: &&'static str| {
            compiled.fetch_add(1, Ordering::SeqCst);
            ChainBuilder::new().build(
                action(move |ctx: crate::InterceptionContext<i32>| async move {
                    Ok(ctx.data() + offset)
                }),
                vec![],
            )
        })
    }

    #[tokio::test]
    async fn compiles_once_per_key() {
        let compiled = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(Arc::clone(&compiled), 1);

        let a = registry.get(&"a");
        let again = registry.get(&"a");
        registry.get(&"b");

        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(compiled.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
        assert_eq!(a(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn clear_recompiles_and_keeps_old_resolvers_usable() {
        let compiled = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(Arc::clone(&compiled), 10);

        let before = registry.get(&"a");
        registry.clear();
        assert!(registry.is_empty());
        let after = registry.get(&"a");

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(compiled.load(Ordering::SeqCst), 2);
        assert_eq!(before(1).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn register_factory_replaces_compiled_chains() {
        let registry = counting_registry(Arc::new(AtomicUsize::new(0)), 1);
        assert_eq!(registry.get(&"a")(1).await.unwrap(), 2);

        registry.register_factory(|_key: &&'static str| {
            ChainBuilder::new().build(
                action(|ctx: crate::InterceptionContext<i32>| async move { Ok(-ctx.data()) }),
                vec![],
            )
        });

        assert_eq!(registry.get(&"a")(1).await.unwrap(), -1);
    }

    #[test]
    fn concurrent_first_lookups_compile_once() {
        let compiled = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(counting_registry(Arc::clone(&compiled), 0));
        let barrier = Arc::new(Barrier::new(8));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.get(&"hot");
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(compiled.load(Ordering::SeqCst), 1);
    }
}
