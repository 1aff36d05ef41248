pub mod builtin;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    Shared, SharedCell, Value, compiler::error::CompileError, error::runtime::RuntimeError,
    range::Range,
};

pub type FilterFunction = dyn Fn(&[Value]) -> Result<Value, RuntimeError>;

/// A named transformation applied with `input | name:arg...`.
///
/// The piped input arrives as the first argument.
#[derive(Clone)]
pub struct Filter {
    func: Shared<FilterFunction>,
    stateful: bool,
}

impl Filter {
    /// A pure filter: same arguments, same result. Calls to it with constant
    /// arguments are treated as constant.
    pub fn new(func: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static) -> Self {
        Self {
            func: Shared::new(func),
            stateful: false,
        }
    }

    /// A filter whose result may change between calls with equal arguments.
    pub fn stateful(func: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static) -> Self {
        Self {
            func: Shared::new(func),
            stateful: true,
        }
    }

    #[inline(always)]
    pub fn is_stateful(&self) -> bool {
        self.stateful
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("stateful", &self.stateful)
            .finish()
    }
}

/// Name to filter mapping shared between the parser service and its host.
///
/// Cloning the registry yields another handle to the same filters.
#[derive(Clone, Debug)]
pub struct FilterRegistry(Shared<SharedCell<FxHashMap<SmolStr, Filter>>>);

impl Default for FilterRegistry {
    fn default() -> Self {
        let registry = Self::empty();
        registry.register("filter", builtin::filter_filter());
        registry
    }
}

impl FilterRegistry {
    /// A registry holding the built-in filters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self(Shared::new(SharedCell::new(FxHashMap::default())))
    }

    pub fn register(&self, name: impl Into<SmolStr>, filter: Filter) {
        self.0.borrow_mut().insert(name.into(), filter);
    }

    pub fn get(&self, name: &str) -> Option<Filter> {
        self.0.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    pub fn resolve(&self, name: &str, range: Range) -> Result<Filter, CompileError> {
        self.get(name)
            .ok_or_else(|| CompileError::UnknownFilter(SmolStr::new(name), range))
    }

    /// Unknown filters count as stateful so they are never folded.
    pub fn is_stateful(&self, name: &str) -> bool {
        self.get(name).is_none_or(|filter| filter.is_stateful())
    }

    pub fn names(&self) -> Vec<SmolStr> {
        let mut names = self.0.borrow().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}
