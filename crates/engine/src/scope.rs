//! Scope container – the composition root's lifecycle policies.
//!
//! Every type is registered once, either as a process-wide singleton or as a
//! per-request instance. Request boundaries are explicit: callers create a
//! [`RequestContext`], resolve through it, and end it when the request is
//! done, which drops everything constructed for that request.

use crate::factory::ResolveError;
use crate::registry::RegistryError;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

type Instance = Arc<dyn Any + Send + Sync>;
type SingletonCtor = Box<dyn Fn(&Container) -> Result<Instance, ScopeError> + Send + Sync>;
type PerRequestCtor =
    Box<dyn Fn(&Container, &RequestContext) -> Result<Instance, ScopeError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Singleton,
    PerRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("no registration for `{type_name}`")]
    Unregistered { type_name: &'static str },

    #[error("`{type_name}` is already registered")]
    AlreadyRegistered { type_name: &'static str },

    #[error("`{type_name}` is registered as {actual:?}, not {requested:?}")]
    LifecycleMismatch {
        type_name: &'static str,
        requested: Lifecycle,
        actual: Lifecycle,
    },

    #[error("failed to construct `{type_name}`: {message}")]
    Construction {
        type_name: &'static str,
        message: String,
    },

    #[error(transparent)]
    Engine(#[from] ResolveError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ScopeError {
    pub fn construction<T: ?Sized>(err: impl std::fmt::Display) -> Self {
        ScopeError::Construction {
            type_name: std::any::type_name::<T>(),
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Slots and entries
// ---------------------------------------------------------------------------

/// One memoised instance. Construction happens under the slot's own lock,
/// so a key is never built twice concurrently. Failures are not stored.
#[derive(Default)]
struct InstanceSlot(Mutex<Option<Instance>>);

impl InstanceSlot {
    fn get_or_try_init(
        &self,
        init: impl FnOnce() -> Result<Instance, ScopeError>,
    ) -> Result<Instance, ScopeError> {
        let mut guard = self.0.lock();
        if let Some(instance) = guard.as_ref() {
            return Ok(Arc::clone(instance));
        }
        let instance = init()?;
        *guard = Some(Arc::clone(&instance));
        Ok(instance)
    }

    /// Peek without constructing.
    fn get(&self) -> Option<Instance> {
        self.0.lock().clone()
    }

    fn clear(&self) -> Option<Instance> {
        self.0.lock().take()
    }
}

enum Constructor {
    Singleton { ctor: SingletonCtor, slot: InstanceSlot },
    PerRequest(PerRequestCtor),
}

struct ScopeEntry {
    type_name: &'static str,
    constructor: Constructor,
}

impl ScopeEntry {
    fn lifecycle(&self) -> Lifecycle {
        match self.constructor {
            Constructor::Singleton { .. } => Lifecycle::Singleton,
            Constructor::PerRequest(_) => Lifecycle::PerRequest,
        }
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Container {
    entries: HashMap<TypeId, ScopeEntry>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` to be built on first resolve and shared by every caller.
    pub fn register_singleton<T, F>(&mut self, factory: F) -> Result<(), ScopeError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, ScopeError> + Send + Sync + 'static,
    {
        let ctor: SingletonCtor = Box::new(move |c| Ok(Arc::new(factory(c)?) as Instance));
        self.insert::<T>(Constructor::Singleton {
            ctor,
            slot: InstanceSlot::default(),
        })
    }

    /// Register an already-built singleton.
    pub fn register_instance<T>(&mut self, instance: Arc<T>) -> Result<(), ScopeError>
    where
        T: Send + Sync + 'static,
    {
        let ctor: SingletonCtor = Box::new(move |_| Ok(Arc::clone(&instance) as Instance));
        self.insert::<T>(Constructor::Singleton {
            ctor,
            slot: InstanceSlot::default(),
        })
    }

    /// Register `T` to be built once per [`RequestContext`].
    pub fn register_per_request<T, F>(&mut self, factory: F) -> Result<(), ScopeError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container, &RequestContext) -> Result<T, ScopeError> + Send + Sync + 'static,
    {
        let ctor: PerRequestCtor =
            Box::new(move |c, ctx| Ok(Arc::new(factory(c, ctx)?) as Instance));
        self.insert::<T>(Constructor::PerRequest(ctor))
    }

    fn insert<T: 'static>(&mut self, constructor: Constructor) -> Result<(), ScopeError> {
        let type_name = std::any::type_name::<T>();
        if self.entries.contains_key(&TypeId::of::<T>()) {
            return Err(ScopeError::AlreadyRegistered { type_name });
        }
        let entry = ScopeEntry {
            type_name,
            constructor,
        };
        tracing::debug!(key = type_name, lifecycle = ?entry.lifecycle(), "registered scope entry");
        self.entries.insert(TypeId::of::<T>(), entry);
        Ok(())
    }

    pub fn lifecycle_of<T: 'static>(&self) -> Option<Lifecycle> {
        self.entries.get(&TypeId::of::<T>()).map(ScopeEntry::lifecycle)
    }

    fn entry<T: 'static>(&self) -> Result<&ScopeEntry, ScopeError> {
        self.entries
            .get(&TypeId::of::<T>())
            .ok_or(ScopeError::Unregistered {
                type_name: std::any::type_name::<T>(),
            })
    }

    /// Resolve `T` within `ctx`. Singletons ignore the context.
    pub fn resolve<T>(&self, ctx: &RequestContext) -> Result<Arc<T>, ScopeError>
    where
        T: Send + Sync + 'static,
    {
        let entry = self.entry::<T>()?;
        let instance = match &entry.constructor {
            Constructor::Singleton { ctor, slot } => slot.get_or_try_init(|| ctor(self))?,
            Constructor::PerRequest(ctor) => {
                let key = TypeId::of::<T>();
                ctx.slot(key).get_or_try_init(|| {
                    let instance = ctor(self, ctx)?;
                    ctx.built.lock().push(key);
                    Ok(instance)
                })?
            }
        };
        downcast::<T>(instance)
    }

    /// Resolve a singleton without a request. Fails for per-request keys.
    pub fn singleton<T>(&self) -> Result<Arc<T>, ScopeError>
    where
        T: Send + Sync + 'static,
    {
        let entry = self.entry::<T>()?;
        match &entry.constructor {
            Constructor::Singleton { ctor, slot } => {
                downcast::<T>(slot.get_or_try_init(|| ctor(self))?)
            }
            Constructor::PerRequest(_) => Err(ScopeError::LifecycleMismatch {
                type_name: entry.type_name,
                requested: Lifecycle::Singleton,
                actual: Lifecycle::PerRequest,
            }),
        }
    }

    /// The singleton `T` if it has already been built. Never constructs.
    pub fn built_singleton<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        match &self.entries.get(&TypeId::of::<T>())?.constructor {
            Constructor::Singleton { slot, .. } => slot.get()?.downcast::<T>().ok(),
            Constructor::PerRequest(_) => None,
        }
    }
}

fn downcast<T: Send + Sync + 'static>(instance: Instance) -> Result<Arc<T>, ScopeError> {
    instance
        .downcast::<T>()
        .map_err(|_| ScopeError::construction::<T>("instance stored under the wrong type key"))
}

// ---------------------------------------------------------------------------
// Request context
// ---------------------------------------------------------------------------

/// Boundary of one logical request. Owns the per-request instances built
/// while it is alive and releases them, in reverse construction order, when it ends.
pub struct RequestContext {
    id: Uuid,
    scoped: Mutex<Vec<(TypeId, Arc<InstanceSlot>)>>,
    // Keys in the order their instances finished construction.
    built: Mutex<Vec<TypeId>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            scoped: Mutex::new(Vec::new()),
            built: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of per-request instances currently held.
    pub fn instance_count(&self) -> usize {
        self.built.lock().len()
    }

    fn slot(&self, key: TypeId) -> Arc<InstanceSlot> {
        let mut scoped = self.scoped.lock();
        if let Some((_, slot)) = scoped.iter().find(|(k, _)| *k == key) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(InstanceSlot::default());
        scoped.push((key, Arc::clone(&slot)));
        slot
    }

    /// End the request, releasing its instances.
    pub fn end(self) {}
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        let scoped = std::mem::take(self.scoped.get_mut());
        let built = std::mem::take(self.built.get_mut());
        let released = built.len();
        for key in built.into_iter().rev() {
            if let Some((_, slot)) = scoped.iter().find(|(k, _)| *k == key) {
                drop(slot.clear());
            }
        }
        drop(scoped);
        tracing::trace!(request_id = %self.id, released, "request context ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    struct Settings {
        greeting: String,
    }

    struct Greeter {
        settings: Arc<Settings>,
        request_id: Uuid,
    }

    fn container_with_counts() -> (Container, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let settings_built = Arc::new(AtomicUsize::new(0));
        let greeters_built = Arc::new(AtomicUsize::new(0));
        let mut c = Container::new();

        let counter = settings_built.clone();
        c.register_singleton(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Settings {
                greeting: "hello".into(),
            })
        })
        .unwrap();

        let counter = greeters_built.clone();
        c.register_per_request(move |c, ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Greeter {
                settings: c.singleton::<Settings>()?,
                request_id: ctx.id(),
            })
        })
        .unwrap();

        (c, settings_built, greeters_built)
    }

    #[test]
    fn test_singleton_shared_across_contexts() {
        let (c, settings_built, _) = container_with_counts();
        let r1 = RequestContext::new();
        let r2 = RequestContext::new();

        let a = c.resolve::<Settings>(&r1).unwrap();
        let b = c.resolve::<Settings>(&r2).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(settings_built.load(Ordering::SeqCst), 1);
        assert_eq!(c.lifecycle_of::<Settings>(), Some(Lifecycle::Singleton));
    }

    #[test]
    fn test_per_request_scoped_to_context() {
        let (c, _, greeters_built) = container_with_counts();
        let r1 = RequestContext::new();
        let r2 = RequestContext::new();

        let a1 = c.resolve::<Greeter>(&r1).unwrap();
        let a2 = c.resolve::<Greeter>(&r1).unwrap();
        let b = c.resolve::<Greeter>(&r2).unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(a1.request_id, r1.id());
        assert_eq!(b.request_id, r2.id());
        assert_eq!(greeters_built.load(Ordering::SeqCst), 2);
        // Both requests share the singleton dependency.
        assert!(Arc::ptr_eq(&a1.settings, &b.settings));
        assert_eq!(a1.settings.greeting, "hello");
    }

    #[test]
    fn test_end_releases_per_request_instances() {
        let (c, _, _) = container_with_counts();
        let ctx = RequestContext::new();
        let greeter = Arc::downgrade(&c.resolve::<Greeter>(&ctx).unwrap());
        let settings = Arc::downgrade(&c.resolve::<Settings>(&ctx).unwrap());
        assert_eq!(ctx.instance_count(), 1);

        ctx.end();
        assert!(greeter.upgrade().is_none());
        // Singletons outlive the request.
        assert!(settings.upgrade().is_some());
    }

    #[test]
    fn test_unregistered_key_fails() {
        let c = Container::new();
        let err = c.resolve::<Settings>(&RequestContext::new()).err().unwrap();
        assert!(
            matches!(err, ScopeError::Unregistered { type_name } if type_name.ends_with("Settings"))
        );
        assert!(c.singleton::<Settings>().is_err());
        assert_eq!(c.lifecycle_of::<Settings>(), None);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let (mut c, _, _) = container_with_counts();
        let err = c
            .register_instance(Arc::new(Settings {
                greeting: "again".into(),
            }))
            .unwrap_err();
        assert!(matches!(err, ScopeError::AlreadyRegistered { .. }));
        let settings = c.singleton::<Settings>().unwrap();
        assert_eq!(settings.greeting, "hello");
    }

    #[test]
    fn test_singleton_lookup_of_per_request_key() {
        let (c, _, _) = container_with_counts();
        let err = c.singleton::<Greeter>().err().unwrap();
        assert!(matches!(
            err,
            ScopeError::LifecycleMismatch {
                requested: Lifecycle::Singleton,
                actual: Lifecycle::PerRequest,
                ..
            }
        ));
    }

    #[test]
    fn test_registered_instance_is_returned() {
        let mut c = Container::new();
        let original = Arc::new(Settings {
            greeting: "hi".into(),
        });
        c.register_instance(original.clone()).unwrap();
        assert!(Arc::ptr_eq(&original, &c.singleton::<Settings>().unwrap()));
    }

    #[test]
    fn test_failed_construction_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut c = Container::new();
        let counter = attempts.clone();
        c.register_singleton(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ScopeError::construction::<Settings>("first attempt fails"));
            }
            Ok(Settings {
                greeting: "ok".into(),
            })
        })
        .unwrap();

        assert!(matches!(
            c.singleton::<Settings>().err().unwrap(),
            ScopeError::Construction { .. }
        ));
        assert_eq!(c.singleton::<Settings>().unwrap().greeting, "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_resolves_in_one_context_construct_once() {
        const THREADS: usize = 8;
        let (c, settings_built, greeters_built) = container_with_counts();
        let ctx = RequestContext::new();
        let barrier = Barrier::new(THREADS);

        let greeters: Vec<Arc<Greeter>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        c.resolve::<Greeter>(&ctx).unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(greeters_built.load(Ordering::SeqCst), 1);
        assert_eq!(settings_built.load(Ordering::SeqCst), 1);
        assert!(greeters.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    struct Tracked {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.lock().push(self.label);
        }
    }

    struct Inner(Tracked);
    struct Outer(Tracked);

    #[test]
    fn test_end_releases_in_reverse_construction_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut c = Container::new();

        let inner_log = log.clone();
        c.register_per_request(move |_, _| {
            Ok(Inner(Tracked {
                label: "inner",
                log: inner_log.clone(),
            }))
        })
        .unwrap();

        let outer_log = log.clone();
        c.register_per_request(move |c, ctx| {
            // Built (but not kept) while Outer is under construction.
            c.resolve::<Inner>(ctx)?;
            Ok(Outer(Tracked {
                label: "outer",
                log: outer_log.clone(),
            }))
        })
        .unwrap();

        let ctx = RequestContext::new();
        drop(c.resolve::<Outer>(&ctx).unwrap());
        assert_eq!(ctx.instance_count(), 2);
        assert!(log.lock().is_empty());

        ctx.end();
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_built_singleton_never_constructs() {
        let (c, settings_built, _) = container_with_counts();
        assert!(c.built_singleton::<Settings>().is_none());
        assert!(c.built_singleton::<Greeter>().is_none());
        assert_eq!(settings_built.load(Ordering::SeqCst), 0);

        let settings = c.singleton::<Settings>().unwrap();
        let peeked = c.built_singleton::<Settings>().unwrap();
        assert!(Arc::ptr_eq(&settings, &peeked));
        assert_eq!(settings_built.load(Ordering::SeqCst), 1);
    }
}
