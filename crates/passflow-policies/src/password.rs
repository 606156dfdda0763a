//! Complejidad de contraseña.
//!
//! La contraseña se busca primero como entrada propia del contexto (los
//! campos `Password` del stage `Prompt` quedan ahí, marcados como sensibles)
//! y si no en `prompt_data`.

use passflow_core::constants::CTX_PROMPT_DATA;
use passflow_core::{Policy, PolicyError, PolicyRequest, PolicyResult};
use serde::{Deserialize, Serialize};

const DEFAULT_SYMBOLS: &str = "!\\\"#$%&'()*+,-./:;<=>?@[]^_`{|}~ ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub name: String,
    #[serde(default = "default_field")]
    pub password_field: String,
    #[serde(default)]
    pub amount_uppercase: usize,
    #[serde(default)]
    pub amount_lowercase: usize,
    #[serde(default)]
    pub amount_symbols: usize,
    #[serde(default)]
    pub length_min: usize,
    #[serde(default = "default_symbols")]
    pub symbol_charset: String,
    #[serde(default = "default_message")]
    pub error_message: String,
}

fn default_field() -> String {
    "password".to_string()
}

fn default_symbols() -> String {
    DEFAULT_SYMBOLS.to_string()
}

fn default_message() -> String {
    "Password does not meet the complexity requirements.".to_string()
}

impl PasswordPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               password_field: default_field(),
               amount_uppercase: 0,
               amount_lowercase: 0,
               amount_symbols: 0,
               length_min: 0,
               symbol_charset: default_symbols(),
               error_message: default_message() }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.password_field = field.into();
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.length_min = n;
        self
    }

    pub fn uppercase(mut self, n: usize) -> Self {
        self.amount_uppercase = n;
        self
    }

    pub fn lowercase(mut self, n: usize) -> Self {
        self.amount_lowercase = n;
        self
    }

    pub fn symbols(mut self, n: usize) -> Self {
        self.amount_symbols = n;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    fn password<'a>(&self, request: &'a PolicyRequest<'_>) -> Option<&'a str> {
        if let Some(pw) = request.context.get_str(&self.password_field) {
            return Some(pw);
        }
        request.context
               .get(CTX_PROMPT_DATA)
               .and_then(|v| v.as_record())
               .and_then(|data| data.get(&self.password_field))
               .and_then(|v| v.as_str())
    }

    fn check(&self, password: &str) -> bool {
        let count = |pred: &dyn Fn(char) -> bool| password.chars().filter(|c| pred(*c)).count();
        password.chars().count() >= self.length_min
        && count(&|c| c.is_uppercase()) >= self.amount_uppercase
        && count(&|c| c.is_lowercase()) >= self.amount_lowercase
        && count(&|c| self.symbol_charset.contains(c)) >= self.amount_symbols
    }
}

impl Policy for PasswordPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn passes(&self, request: &PolicyRequest<'_>) -> Result<PolicyResult, PolicyError> {
        let Some(password) = self.password(request) else {
            return Ok(PolicyResult::fail(format!("Field '{}' is missing.", self.password_field)));
        };
        Ok(if self.check(password) {
               PolicyResult::pass()
           } else {
               PolicyResult::fail(self.error_message.clone())
           })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passflow_core::{ContextStore, ContextValue};
    use serde_json::json;

    fn strict() -> PasswordPolicy {
        PasswordPolicy::new("complexity").min_length(8).uppercase(1).lowercase(1).symbols(1)
    }

    fn with_password(pw: &str) -> ContextStore {
        let mut ctx = ContextStore::new();
        ctx.set_sensitive("password", ContextValue::Str(pw.into()));
        ctx
    }

    #[test]
    fn complexity_rules() {
        let policy = strict();
        for (pw, expected) in [("Tr0ub4dor&3", true), ("short!A", false), ("alllowercase!", false),
                               ("NoSymbolsHere", false)]
        {
            let ctx = with_password(pw);
            assert_eq!(policy.passes(&PolicyRequest::new(&ctx)).expect("eval").passing, expected, "{pw}");
        }
    }

    #[test]
    fn reads_prompt_data_when_no_sensitive_entry() {
        let mut ctx = ContextStore::new();
        ctx.set(CTX_PROMPT_DATA, ContextValue::Record(json!({"new_password": "Secret!Value"})));
        let policy = strict().field("new_password");
        assert!(policy.passes(&PolicyRequest::new(&ctx)).expect("eval").passing);
    }

    #[test]
    fn missing_field_fails_with_custom_message_only_on_weak_passwords() {
        let ctx = ContextStore::new();
        let missing = strict().passes(&PolicyRequest::new(&ctx)).expect("eval");
        assert_eq!(missing.messages, vec!["Field 'password' is missing.".to_string()]);

        let ctx = with_password("weak");
        let weak = strict().message("Too weak.").passes(&PolicyRequest::new(&ctx)).expect("eval");
        assert_eq!(weak.messages, vec!["Too weak.".to_string()]);
    }
}
