//! Política de prueba con resultado fijo y espera opcional.

use std::thread;
use std::time::Duration;

use log::debug;
use passflow_core::{Policy, PolicyError, PolicyRequest, PolicyResult};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct DummyPolicy {
    name: String,
    result: bool,
    wait_min_ms: u64,
    wait_max_ms: u64,
}

impl DummyPolicy {
    pub fn new(name: impl Into<String>, result: bool) -> Self {
        Self { name: name.into(),
               result,
               wait_min_ms: 0,
               wait_max_ms: 0 }
    }

    /// Espera un tiempo aleatorio en `[min, max]` ms antes de responder.
    pub fn with_wait(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.wait_min_ms = min_ms.min(max_ms);
        self.wait_max_ms = max_ms.max(min_ms);
        self
    }

    fn wait(&self) -> Duration {
        if self.wait_max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.wait_min_ms..=self.wait_max_ms))
    }
}

impl Policy for DummyPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn passes(&self, _request: &PolicyRequest<'_>) -> Result<PolicyResult, PolicyError> {
        let wait = self.wait();
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        debug!("dummy policy name={} result={} waited_ms={}", self.name, self.result, wait.as_millis());
        Ok(if self.result {
               PolicyResult::pass()
           } else {
               PolicyResult::fail("dummy")
           })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passflow_core::ContextStore;

    #[test]
    fn returns_configured_result() {
        let ctx = ContextStore::new();
        let request = PolicyRequest::new(&ctx);
        assert!(DummyPolicy::new("yes", true).passes(&request).expect("eval").passing);
        let denied = DummyPolicy::new("no", false).passes(&request).expect("eval");
        assert!(!denied.passing);
        assert_eq!(denied.messages, vec!["dummy".to_string()]);
    }

    #[test]
    fn wait_bounds_are_normalized() {
        let p = DummyPolicy::new("w", true).with_wait(20, 5);
        assert_eq!((p.wait_min_ms, p.wait_max_ms), (5, 20));
        let w = p.wait();
        assert!(w >= Duration::from_millis(5) && w <= Duration::from_millis(20));
    }
}
