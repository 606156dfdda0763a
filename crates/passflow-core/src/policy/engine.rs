//! Evaluación ordenada de bindings con cortocircuito.
//!
//! Los bindings que no llegan a evaluarse quedan en la traza como
//! `BindingOutcome::Skipped`.

use log::{debug, warn};

use super::{PolicyBinding, PolicyMode, PolicyRequest, PolicyResult};

#[derive(Debug, Clone, PartialEq)]
pub enum BindingOutcome {
    Evaluated {
        policy: String,
        result: PolicyResult,
        /// La política devolvió error y se aplicó `fail_closed`.
        errored: bool,
    },
    Skipped { policy: String },
}

/// Resultado agregado más el detalle por binding (en orden de evaluación).
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTrace {
    pub result: PolicyResult,
    pub outcomes: Vec<BindingOutcome>,
}

impl PolicyTrace {
    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|o| match o {
                                BindingOutcome::Skipped { policy } => Some(policy.as_str()),
                                _ => None,
                            })
    }
}

/// Motor sin estado; no cachea resultados entre llamadas.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine {
    mode: PolicyMode,
}

impl PolicyEngine {
    pub fn new(mode: PolicyMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn evaluate(&self, bindings: &[PolicyBinding], request: &PolicyRequest<'_>) -> PolicyResult {
        self.evaluate_traced(bindings, request).result
    }

    pub fn evaluate_traced(&self, bindings: &[PolicyBinding], request: &PolicyRequest<'_>) -> PolicyTrace {
        let mut ordered: Vec<&PolicyBinding> = bindings.iter().filter(|b| b.enabled).collect();
        // sort estable: empates conservan el orden de inserción
        ordered.sort_by_key(|b| b.order);

        let mut outcomes = Vec::with_capacity(ordered.len());
        let mut messages = Vec::new();
        let mut decided: Option<PolicyResult> = None;

        for binding in ordered {
            let policy = binding.policy.name().to_string();
            if decided.is_some() {
                debug!("policy skipped by short-circuit policy={policy} mode={:?}", self.mode);
                outcomes.push(BindingOutcome::Skipped { policy });
                continue;
            }
            let (result, errored) = Self::evaluate_binding(binding, request);
            messages.extend(result.messages.iter().cloned());
            let decisive = match self.mode {
                PolicyMode::All => !result.passing,
                PolicyMode::Any => result.passing,
            };
            if decisive {
                decided = Some(result.clone());
            }
            outcomes.push(BindingOutcome::Evaluated { policy,
                                                      result,
                                                      errored });
        }

        let (passing, data) = match decided {
            Some(r) => (r.passing, r.data),
            None if outcomes.is_empty() => (true, None),
            None => (self.mode == PolicyMode::All, None),
        };
        PolicyTrace { result: PolicyResult { passing,
                                             messages,
                                             data },
                      outcomes }
    }

    fn evaluate_binding(binding: &PolicyBinding, request: &PolicyRequest<'_>) -> (PolicyResult, bool) {
        match binding.policy.passes(request) {
            Ok(mut result) => {
                if binding.negate {
                    result.passing = !result.passing;
                }
                (result, false)
            }
            // El resultado de un error nunca se niega: sólo `fail_closed` decide.
            Err(e) if binding.fail_closed => {
                warn!("policy error (fail closed) policy={} err={e}", binding.policy.name());
                (PolicyResult::fail(e.to_string()), true)
            }
            Err(e) => {
                warn!("policy error (fail open) policy={} err={e}", binding.policy.name());
                (PolicyResult::pass(), true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContextStore;
    use crate::policy::{Policy, PolicyError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Fixed {
        name: &'static str,
        outcome: Result<bool, &'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, outcome: Result<bool, &'static str>) -> Arc<Self> {
            Arc::new(Self { name,
                            outcome,
                            calls: AtomicUsize::new(0) })
        }
    }

    impl Policy for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn passes(&self, _request: &PolicyRequest<'_>) -> Result<PolicyResult, PolicyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Ok(true) => Ok(PolicyResult::pass()),
                Ok(false) => Ok(PolicyResult::fail(format!("{} failed", self.name))),
                Err(e) => Err(PolicyError::Unavailable(e.to_string())),
            }
        }
    }

    #[test]
    fn all_mode_stops_at_first_failure_and_reports_skips() {
        let a = Fixed::new("a", Ok(true));
        let b = Fixed::new("b", Ok(false));
        let c = Fixed::new("c", Ok(true));
        let bindings = vec![PolicyBinding::new(c.clone(), 30),
                            PolicyBinding::new(a.clone(), 10),
                            PolicyBinding::new(b.clone(), 20)];
        let ctx = ContextStore::new();
        let trace = PolicyEngine::new(PolicyMode::All).evaluate_traced(&bindings, &PolicyRequest::new(&ctx));
        assert!(!trace.result.passing);
        assert_eq!(trace.result.messages, vec!["b failed".to_string()]);
        assert_eq!(trace.skipped().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn any_mode_stops_at_first_success() {
        let a = Fixed::new("a", Ok(false));
        let b = Fixed::new("b", Ok(true));
        let c = Fixed::new("c", Ok(true));
        let bindings = vec![PolicyBinding::new(a, 0), PolicyBinding::new(b, 0), PolicyBinding::new(c.clone(), 0)];
        let ctx = ContextStore::new();
        let result = PolicyEngine::new(PolicyMode::Any).evaluate(&bindings, &PolicyRequest::new(&ctx));
        assert!(result.passing);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0, "ties keep insertion order, c comes last");
    }

    #[test]
    fn errors_fail_closed_unless_binding_opts_out() {
        let broken = Fixed::new("broken", Err("reputation store down"));
        let ctx = ContextStore::new();
        let request = PolicyRequest::new(&ctx);
        let engine = PolicyEngine::new(PolicyMode::All);

        let closed = engine.evaluate(&[PolicyBinding::new(broken.clone(), 0)], &request);
        assert!(!closed.passing);
        assert_eq!(closed.messages, vec!["policy unavailable: reputation store down".to_string()]);

        let open = engine.evaluate(&[PolicyBinding::new(broken, 0).fail_open()], &request);
        assert!(open.passing);
    }

    #[test]
    fn empty_or_disabled_bindings_pass() {
        let ctx = ContextStore::new();
        let request = PolicyRequest::new(&ctx);
        assert!(PolicyEngine::new(PolicyMode::Any).evaluate(&[], &request).passing);
        let disabled = PolicyBinding::new(Fixed::new("no", Ok(false)), 0).disabled();
        assert!(PolicyEngine::new(PolicyMode::All).evaluate(&[disabled], &request).passing);
    }

    #[test]
    fn negate_inverts_successful_evaluations() {
        let ctx = ContextStore::new();
        let negated = PolicyBinding::new(Fixed::new("denied", Ok(false)), 0).negated();
        assert!(PolicyEngine::new(PolicyMode::All).evaluate(&[negated], &PolicyRequest::new(&ctx)).passing);
    }
}
