//! Formularios genéricos.
//!
//! Los valores no secretos se acumulan en `prompt_data`; los campos de tipo
//! `Password` se guardan como entradas sensibles con su propia clave para
//! que el siguiente stage que los consuma (p.ej. `UserWrite`) dispare la
//! purga.

use serde_json::{json, Map, Value};

use super::prompt_data;
use crate::constants::{CTX_PASSWORD, CTX_PROMPT_DATA};
use crate::errors::StageError;
use crate::model::{ContextPatch, ContextValue};
use crate::policy::{PolicyBinding, PolicyEngine, PolicyMode, PolicyRequest};
use crate::stage::{PromptField, PromptFieldKind, Stage, StageInput, StagePrompt, StageRequest, StageVerdict};

const PASSWORD_REPEAT: &str = "password_repeat";

fn validate_field(field: &PromptField, value: Option<&Value>) -> Result<Option<Value>, String> {
    let value = match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    };
    let Some(value) = value else {
        if field.required && field.kind != PromptFieldKind::Checkbox {
            return Err(format!("{} is required.", field.label));
        }
        return Ok(None);
    };

    let normalized = match field.kind {
        PromptFieldKind::Text | PromptFieldKind::Hidden | PromptFieldKind::Password => {
            let s = value.as_str().ok_or_else(|| format!("{} must be text.", field.label))?;
            Value::String(s.to_string())
        }
        PromptFieldKind::Email => {
            let s = value.as_str().map(str::trim).unwrap_or_default();
            match s.split_once('@') {
                Some((local, domain)) if !local.is_empty() && domain.contains('.') => Value::String(s.to_string()),
                _ => return Err(format!("{} must be a valid email address.", field.label)),
            }
        }
        PromptFieldKind::Number => match value {
            Value::Number(_) => value.clone(),
            Value::String(s) => s.trim()
                                 .parse::<i64>()
                                 .map(Value::from)
                                 .map_err(|_| format!("{} must be a number.", field.label))?,
            _ => return Err(format!("{} must be a number.", field.label)),
        },
        PromptFieldKind::Checkbox => {
            let checked = match value {
                Value::Bool(b) => *b,
                Value::String(s) => matches!(s.as_str(), "true" | "on" | "1"),
                _ => false,
            };
            Value::Bool(checked)
        }
    };
    Ok(Some(normalized))
}

pub(in crate::stage) fn handle(stage: &Stage, request: &StageRequest<'_>, input: Option<&StageInput>,
                               fields: &[PromptField], validation_policies: &[String])
                               -> Result<StageVerdict, StageError> {
    let Some(input) = input else {
        return Ok(StageVerdict::suspend(StagePrompt::for_stage(stage, json!({ "fields": fields }))));
    };

    let mut errors = Vec::new();
    let mut data = prompt_data(request);
    let mut secrets: Map<String, Value> = Map::new();

    for field in fields {
        match validate_field(field, input.get(&field.field_key)) {
            Ok(Some(value)) if field.kind == PromptFieldKind::Password => {
                secrets.insert(field.field_key.clone(), value);
            }
            Ok(Some(value)) => {
                data.insert(field.field_key.clone(), value);
            }
            Ok(None) => {}
            Err(message) => errors.push(message),
        }
    }

    if let (Some(password), Some(repeat)) = (secrets.get(CTX_PASSWORD), secrets.get(PASSWORD_REPEAT)) {
        if password != repeat {
            errors.push("Passwords don't match.".to_string());
        }
    }
    if !errors.is_empty() {
        return Ok(StageVerdict::retry(errors.join(" ")));
    }

    let mut patch = ContextPatch::new().set(CTX_PROMPT_DATA, ContextValue::Record(Value::Object(data)));
    for (key, value) in secrets {
        if key == PASSWORD_REPEAT {
            continue;
        }
        if let Value::String(s) = value {
            patch = patch.set_sensitive(key, ContextValue::Str(s));
        }
    }

    if !validation_policies.is_empty() {
        let mut bindings = Vec::with_capacity(validation_policies.len());
        for (order, name) in validation_policies.iter().enumerate() {
            let policy = request.services
                                .policies
                                .get(name)
                                .ok_or_else(|| StageError::Fatal(format!("unknown validation policy '{name}'")))?;
            bindings.push(PolicyBinding::new(policy, order as i32));
        }
        // Las políticas validan el contexto tal como quedaría tras avanzar.
        let mut candidate = request.context.clone();
        candidate.merge(patch.clone());
        let user = match candidate.pending_user() {
            Some(id) => request.services.users.get(id)?,
            None => None,
        };
        let policy_request = PolicyRequest::new(&candidate).with_user(user.as_ref())
                                                           .with_remote_addr(request.remote_addr)
                                                           .at(request.now);
        let result = PolicyEngine::new(PolicyMode::All).evaluate(&bindings, &policy_request);
        if !result.passing {
            return Ok(StageVerdict::retry(result.messages.join(" ")));
        }
    }

    Ok(StageVerdict::Advance(patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_fields_reject_malformed_addresses() {
        let field = PromptField::new("email", "Email", PromptFieldKind::Email);
        assert!(validate_field(&field, Some(&json!("nobody"))).is_err());
        assert_eq!(validate_field(&field, Some(&json!(" a@b.io "))), Ok(Some(json!("a@b.io"))));
    }

    #[test]
    fn optional_fields_may_be_blank() {
        let field = PromptField::new("name", "Name", PromptFieldKind::Text).optional();
        assert_eq!(validate_field(&field, Some(&json!("  "))), Ok(None));
        let required = PromptField::new("name", "Name", PromptFieldKind::Text);
        assert_eq!(validate_field(&required, None), Err("Name is required.".to_string()));
    }

    #[test]
    fn numbers_accept_numeric_strings() {
        let field = PromptField::new("age", "Age", PromptFieldKind::Number);
        assert_eq!(validate_field(&field, Some(&json!("42"))), Ok(Some(json!(42))));
    }
}
