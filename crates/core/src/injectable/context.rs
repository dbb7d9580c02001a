//! Per-request context handed to every injector, and the value map that
//! injectors read their dependencies from.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::auth::CallerIdentity;
use crate::injectable::value::{InjectableValue, FALLBACK_LOCALE};
use crate::types::DbId;

/// Opaque result of the init hook, shared by every injector of a request.
pub type InitData = Arc<dyn Any + Send + Sync>;

// ---------------------------------------------------------------------------
// InjectorContext
// ---------------------------------------------------------------------------

/// Read-only request context.
///
/// Built once per render request with the `with_*` methods and passed by
/// reference into every resolve call. Header names are matched
/// case-insensitively.
#[derive(Clone, Default)]
pub struct InjectorContext {
    external_id: Option<String>,
    tenant_id: Option<DbId>,
    workspace_id: Option<DbId>,
    workspace_key: Option<String>,
    headers: HashMap<String, String>,
    caller: CallerIdentity,
    init_data: Option<InitData>,
    payload: Option<serde_json::Value>,
    selected_formats: HashMap<String, String>,
    locale: Option<String>,
}

impl InjectorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the subject the document is rendered for (case, order,
    /// contract...). Opaque to the engine.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_scope(mut self, tenant_id: Option<DbId>, workspace_id: Option<DbId>) -> Self {
        self.tenant_id = tenant_id;
        self.workspace_id = workspace_id;
        self
    }

    /// Workspace whose catalog override applies to provider codes.
    pub fn with_workspace_key(mut self, key: impl Into<String>) -> Self {
        self.workspace_key = Some(key.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.headers.insert(k.as_ref().to_ascii_lowercase(), v.into());
        }
        self
    }

    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_init_data(mut self, data: InitData) -> Self {
        self.init_data = Some(data);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Select an output format for one code.
    pub fn with_format(mut self, code: impl Into<String>, format: impl Into<String>) -> Self {
        self.selected_formats.insert(code.into(), format.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn tenant_id(&self) -> Option<DbId> {
        self.tenant_id
    }

    pub fn workspace_id(&self) -> Option<DbId> {
        self.workspace_id
    }

    pub fn workspace_key(&self) -> Option<&str> {
        self.workspace_key.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }

    /// Borrow the init hook result as `T`. `None` when no hook ran or the
    /// data is of another type.
    pub fn init_data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.init_data.as_ref()?.downcast_ref::<T>()
    }

    pub fn has_init_data(&self) -> bool {
        self.init_data.is_some()
    }

    /// Request payload as decoded by the registered request mapper.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    pub fn selected_format(&self, code: &str) -> Option<&str> {
        self.selected_formats.get(code).map(String::as_str)
    }

    pub fn locale(&self) -> &str {
        self.locale.as_deref().unwrap_or(FALLBACK_LOCALE)
    }
}

impl fmt::Debug for InjectorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectorContext")
            .field("external_id", &self.external_id)
            .field("tenant_id", &self.tenant_id)
            .field("workspace_id", &self.workspace_id)
            .field("workspace_key", &self.workspace_key)
            .field("header_count", &self.headers.len())
            .field("caller", &self.caller)
            .field("has_init_data", &self.init_data.is_some())
            .field("selected_formats", &self.selected_formats)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ResolvedValues
// ---------------------------------------------------------------------------

/// Values resolved so far, keyed by code, together with the effective
/// display format of each code that declares formats.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedValues {
    values: HashMap<String, InjectableValue>,
    formats: HashMap<String, String>,
}

impl ResolvedValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, value: InjectableValue) {
        self.values.insert(code.into(), value);
    }

    pub fn set_format(&mut self, code: impl Into<String>, format: impl Into<String>) {
        self.formats.insert(code.into(), format.into());
    }

    pub fn get(&self, code: &str) -> Option<&InjectableValue> {
        self.values.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.values.contains_key(code)
    }

    /// Effective display format for `code`, if it has one.
    pub fn format_for(&self, code: &str) -> Option<&str> {
        self.formats.get(code).map(String::as_str)
    }

    /// Display string of `code` using its effective format.
    pub fn display(&self, code: &str) -> Option<String> {
        self.get(code)
            .map(|v| v.to_display_string(self.format_for(code)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InjectableValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of the entries for `codes` only.
    pub fn subset(&self, codes: &[String]) -> ResolvedValues {
        let mut out = ResolvedValues::new();
        for code in codes {
            if let Some(value) = self.values.get(code) {
                out.values.insert(code.clone(), value.clone());
            }
            if let Some(format) = self.formats.get(code) {
                out.formats.insert(code.clone(), format.clone());
            }
        }
        out
    }

    pub fn remove(&mut self, code: &str) -> Option<InjectableValue> {
        self.formats.remove(code);
        self.values.remove(code)
    }

    /// Move every value and format of `other` into `self`.
    pub fn merge(&mut self, other: ResolvedValues) {
        self.values.extend(other.values);
        self.formats.extend(other.formats);
    }
}
