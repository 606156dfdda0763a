//! Motor de políticas.
//!
//! Una `Policy` es una regla booleana evaluada contra un `PolicyRequest`.
//! Los `PolicyBinding` la asocian a un flow o a un stage; el `PolicyEngine`
//! evalúa un conjunto de bindings en orden con semántica `All` / `Any`.

mod binding;
mod engine;
mod registry;
mod result;

pub use binding::{Policy, PolicyBinding, PolicyError, PolicyMode, PolicyRequest};
pub use engine::{BindingOutcome, PolicyEngine, PolicyTrace};
pub use registry::PolicyRegistry;
pub use result::PolicyResult;
