//! `ContextStore`: estado clave/valor compartido entre los stages de un plan.
//!
//! - Está acotado a un único `FlowPlan`; nunca se comparte entre flows.
//! - Las entradas sensibles (contraseñas, secretos OTP, tokens) se purgan en
//!   cuanto un stage las consume. `Debug` nunca muestra su valor.
//! - El orden de inserción se conserva (`IndexMap`) para que la
//!   serialización del snapshot sea estable.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{CTX_PENDING_USER, REF_USER};

/// Valor débilmente tipado de una entrada de contexto.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContextValue {
    Str(String),
    Bool(bool),
    Int(i64),
    /// Registro estructurado (p.ej. `prompt_data`).
    Record(Value),
    /// Referencia opaca a una entidad externa (usuario, sesión...).
    Reference { kind: String, id: String },
}

impl ContextValue {
    pub fn user(id: Uuid) -> Self {
        ContextValue::Reference { kind: REF_USER.to_string(),
                                  id: id.to_string() }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ContextValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Value> {
        match self {
            ContextValue::Record(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_reference(&self, expected_kind: &str) -> Option<&str> {
        match self {
            ContextValue::Reference { kind, id } if kind == expected_kind => Some(id),
            _ => None,
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Str(s) => write!(f, "Str({s:?})"),
            ContextValue::Bool(b) => write!(f, "Bool({b})"),
            ContextValue::Int(i) => write!(f, "Int({i})"),
            ContextValue::Record(v) => write!(f, "Record({v})"),
            ContextValue::Reference { kind, id } => write!(f, "Reference({kind}:{id})"),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub value: ContextValue,
    #[serde(default)]
    pub sensitive: bool,
}

impl fmt::Debug for ContextEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sensitive {
            f.write_str("<redacted>")
        } else {
            self.value.fmt(f)
        }
    }
}

/// Cambios que un stage pide aplicar al contexto al avanzar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPatch {
    pub entries: IndexMap<String, ContextEntry>,
    pub removals: Vec<String>,
}

impl ContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.entries.insert(key.into(), ContextEntry { value, sensitive: false });
        self
    }

    pub fn set_sensitive(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.entries.insert(key.into(), ContextEntry { value, sensitive: true });
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.removals.push(key.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.removals.is_empty()
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStore {
    entries: IndexMap<String, ContextEntry>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ContextValue::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.sensitive)
    }

    pub fn set(&mut self, key: impl Into<String>, value: ContextValue) {
        self.entries.insert(key.into(), ContextEntry { value, sensitive: false });
    }

    pub fn set_sensitive(&mut self, key: impl Into<String>, value: ContextValue) {
        self.entries.insert(key.into(), ContextEntry { value, sensitive: true });
    }

    pub fn delete(&mut self, key: &str) -> Option<ContextValue> {
        self.entries.shift_remove(key).map(|e| e.value)
    }

    /// Elimina todas las entradas sensibles y devuelve cuántas había.
    pub fn purge_sensitive(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.sensitive);
        before - self.entries.len()
    }

    /// Aplica un `ContextPatch`: primero las eliminaciones, luego las
    /// entradas (una entrada nueva reemplaza a la previa, incluida su marca
    /// de sensibilidad).
    pub fn merge(&mut self, patch: ContextPatch) {
        for key in &patch.removals {
            self.entries.shift_remove(key);
        }
        for (key, entry) in patch.entries {
            self.entries.insert(key, entry);
        }
    }

    /// Libera todo el contexto (transición terminal).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Usuario pendiente (referencia `user`) si existe y es un UUID válido.
    pub fn pending_user(&self) -> Option<Uuid> {
        self.get(CTX_PENDING_USER)
            .and_then(|v| v.as_reference(REF_USER))
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    /// Vista JSON de las entradas no sensibles, usada por políticas que
    /// inspeccionan el contexto.
    pub fn public_view(&self) -> serde_json::Map<String, Value> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.sensitive)
            .filter_map(|(k, e)| serde_json::to_value(&e.value).ok().map(|v| (k.clone(), v)))
            .collect()
    }
}

impl fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}
