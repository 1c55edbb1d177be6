use log::debug;
use lru::LruCache;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, RwLock};

/// A type-erased compiled artifact. The evaluator stores an
/// `Arc<CompiledExpr<T>>` here and downcasts it back on retrieval; the cache
/// itself never inspects what it holds.
pub type CachedArtifact = std::sync::Arc<dyn Any + Send + Sync>;

/// Storage for compiled artifacts keyed by formula text and input type.
///
/// Text keys are compared verbatim. The evaluator folds formula case before
/// calling in whenever two spellings are guaranteed to bind identically, so
/// those spellings share one artifact; case-sensitive keyed artifacts keep
/// their exact spelling because each spelling binds different map keys. Only
/// successful builds are ever stored.
pub trait ExpressionCache: Send + Sync {
    fn get(&self, text: &str, input_type: TypeId) -> Option<CachedArtifact>;
    fn put(&self, text: &str, input_type: TypeId, artifact: CachedArtifact);
}

fn cache_key(text: &str, input_type: TypeId) -> (String, TypeId) {
    (text.to_string(), input_type)
}

/// Unbounded cache; the default. Suited to hosts with a closed set of
/// formulas, where every compiled artifact stays hot forever.
#[derive(Default)]
pub struct CompiledExpressionsCache {
    entries: RwLock<HashMap<(String, TypeId), CachedArtifact>>,
}

impl CompiledExpressionsCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExpressionCache for CompiledExpressionsCache {
    fn get(&self, text: &str, input_type: TypeId) -> Option<CachedArtifact> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(&cache_key(text, input_type))
            .cloned()
    }

    fn put(&self, text: &str, input_type: TypeId, artifact: CachedArtifact) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(cache_key(text, input_type), artifact);
    }
}

/// Bounded cache evicting the least recently used artifact. For hosts that
/// evaluate user-supplied formulas with unbounded variety.
pub struct LruExpressionsCache {
    entries: Mutex<LruCache<(String, TypeId), CachedArtifact>>,
}

impl LruExpressionsCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        debug!("lru artifact cache with capacity {capacity}");
        LruExpressionsCache {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl ExpressionCache for LruExpressionsCache {
    fn get(&self, text: &str, input_type: TypeId) -> Option<CachedArtifact> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(&cache_key(text, input_type))
            .cloned()
    }

    fn put(&self, text: &str, input_type: TypeId, artifact: CachedArtifact) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .put(cache_key(text, input_type), artifact);
    }
}
