//! Integrands and the process-wide integrand registry.
//!
//! A closure cannot cross a process boundary, so integrands meant for
//! worker processes are registered under a name at link time and looked up
//! again inside the worker. Closures are still accepted for in-process
//! executors.

use crate::error::UnknownIntegrand;
use std::fmt;
use std::sync::Arc;

/// Integrand registered via [`register_integrand!`](crate::register_integrand)
#[derive(Debug, Clone, Copy)]
pub struct IntegrandDef {
    /// Registry key; must be unique within a binary
    pub name: &'static str,
    /// One-line description shown by `partint list`
    pub description: &'static str,
    /// The function itself
    pub func: fn(f64) -> f64,
}

inventory::collect!(IntegrandDef);

fn square(x: f64) -> f64 {
    x * x
}

fn one(_x: f64) -> f64 {
    1.0
}

inventory::submit! { IntegrandDef { name: "cos", description: "cosine", func: f64::cos } }
inventory::submit! { IntegrandDef { name: "sin", description: "sine", func: f64::sin } }
inventory::submit! { IntegrandDef { name: "exp", description: "natural exponential", func: f64::exp } }
inventory::submit! { IntegrandDef { name: "sqrt", description: "square root (NaN below 0)", func: f64::sqrt } }
inventory::submit! { IntegrandDef { name: "ln", description: "natural logarithm (-inf at 0)", func: f64::ln } }
inventory::submit! { IntegrandDef { name: "recip", description: "1/x (inf at 0)", func: f64::recip } }
inventory::submit! { IntegrandDef { name: "square", description: "x^2", func: square } }
inventory::submit! { IntegrandDef { name: "one", description: "constant 1", func: one } }

/// Look up a registered integrand by name.
pub fn lookup(name: &str) -> Option<&'static IntegrandDef> {
    inventory::iter::<IntegrandDef>
        .into_iter()
        .find(|def| def.name == name)
}

/// All registered integrands, sorted by name. Duplicate names keep the
/// entry that [`lookup`] would return.
pub fn registered_integrands() -> Vec<&'static IntegrandDef> {
    let mut defs: Vec<&'static IntegrandDef> = Vec::new();
    for def in inventory::iter::<IntegrandDef> {
        if !defs.iter().any(|d| d.name == def.name) {
            defs.push(def);
        }
    }
    defs.sort_by_key(|d| d.name);
    defs
}

/// Names of all registered integrands, sorted.
pub fn registered_names() -> Vec<String> {
    registered_integrands()
        .into_iter()
        .map(|d| d.name.to_string())
        .collect()
}

/// A function of one real variable to be integrated.
///
/// Cheap to clone; every job of one integration shares the same function.
#[derive(Clone)]
pub struct Integrand {
    name: Arc<str>,
    func: Arc<dyn Fn(f64) -> f64 + Send + Sync>,
    transferable: bool,
}

impl Integrand {
    /// Resolve a registered integrand. The result can be sent to worker
    /// processes.
    pub fn named(name: &str) -> Result<Self, UnknownIntegrand> {
        lookup(name)
            .map(Self::from_def)
            .ok_or_else(|| UnknownIntegrand(name.to_string()))
    }

    /// Wrap a registry entry
    pub fn from_def(def: &'static IntegrandDef) -> Self {
        Self {
            name: Arc::from(def.name),
            func: Arc::new(def.func),
            transferable: true,
        }
    }

    /// Wrap an arbitrary closure. Only in-process executors accept it.
    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
            transferable: false,
        }
    }

    /// Registry name, or the label given to [`Integrand::from_fn`]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a worker process can rebuild this integrand by name
    pub fn is_transferable(&self) -> bool {
        self.transferable
    }

    /// Evaluate at `x`
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        (self.func)(x)
    }
}

impl fmt::Debug for Integrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Integrand")
            .field("name", &self.name)
            .field("transferable", &self.transferable)
            .finish()
    }
}
