//! Injector registry.
//!
//! Registration happens once at startup through [`RegistryBuilder`]; the
//! frozen [`InjectorRegistry`] is then shared behind an `Arc` and only read
//! while requests resolve, so it needs no locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{CoreError, ErrorKind};
use crate::injectable::builtin;
use crate::injectable::format::Formats;
use crate::injectable::injector::{InitHook, Injector, RequestMapper};
use crate::injectable::value::{DataType, I18nLabels, InjectableValue, TableColumn};
use crate::naming::CODE_SEPARATOR;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Injector code '{0}' is already registered")]
    DuplicateCode(String),

    #[error("No injector registered for code '{0}'")]
    NotFound(String),

    #[error("Invalid injector code '{code}': {reason}")]
    InvalidCode { code: String, reason: &'static str },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateCode(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidCode { .. } => ErrorKind::Validation,
        }
    }
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(code) => CoreError::NotFoundByKey {
                entity: "Injector",
                key: code,
            },
            other => CoreError::from_kind(other.kind(), other.to_string()),
        }
    }
}

/// Check that a code is usable for an in-process injector.
///
/// `:` is reserved for provider codes (`has:group`, `type:question`).
pub fn validate_code(code: &str) -> Result<(), RegistryError> {
    let invalid = |reason| RegistryError::InvalidCode {
        code: code.to_string(),
        reason,
    };
    if code.is_empty() {
        return Err(invalid("code must not be empty"));
    }
    if code.chars().any(char::is_whitespace) {
        return Err(invalid("code must not contain whitespace"));
    }
    if code.contains(CODE_SEPARATOR) {
        return Err(invalid("':' is reserved for provider codes"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects injectors and hooks before the registry is frozen.
pub struct RegistryBuilder {
    injectors: Vec<Arc<dyn Injector>>,
    index: HashMap<String, usize>,
    init_hook: Option<Arc<dyn InitHook>>,
    request_mapper: Option<Arc<dyn RequestMapper>>,
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("injectors", &self.injectors)
            .field("init_hook", &self.init_hook.is_some())
            .field("request_mapper", &self.request_mapper.is_some())
            .finish_non_exhaustive()
    }
}

impl RegistryBuilder {
    /// Start a builder with the built-in injectors already registered.
    pub fn new() -> Self {
        let mut builder = Self::empty();
        for injector in builtin::all() {
            // Built-in codes are distinct constants.
            let _ = builder.register_arc(injector);
        }
        builder
    }

    /// Start a builder without any built-ins.
    pub fn empty() -> Self {
        Self {
            injectors: Vec::new(),
            index: HashMap::new(),
            init_hook: None,
            request_mapper: None,
        }
    }

    pub fn register<I: Injector + 'static>(&mut self, injector: I) -> Result<&mut Self, RegistryError> {
        self.register_arc(Arc::new(injector))
    }

    pub fn register_arc(&mut self, injector: Arc<dyn Injector>) -> Result<&mut Self, RegistryError> {
        let code = injector.code().to_string();
        validate_code(&code)?;
        if self.index.contains_key(&code) {
            return Err(RegistryError::DuplicateCode(code));
        }
        tracing::debug!(code = %code, data_type = %injector.data_type(), "Injector registered");
        self.index.insert(code, self.injectors.len());
        self.injectors.push(injector);
        Ok(self)
    }

    /// Set the single per-request init hook, replacing any previous one.
    pub fn init_hook<H: InitHook + 'static>(&mut self, hook: H) -> &mut Self {
        self.init_hook = Some(Arc::new(hook));
        self
    }

    pub fn request_mapper<M: RequestMapper + 'static>(&mut self, mapper: M) -> &mut Self {
        self.request_mapper = Some(Arc::new(mapper));
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> InjectorRegistry {
        tracing::info!(count = self.injectors.len(), "Injector registry frozen");
        InjectorRegistry {
            injectors: self.injectors,
            index: self.index,
            init_hook: self.init_hook,
            request_mapper: self.request_mapper,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Frozen registry
// ---------------------------------------------------------------------------

/// Immutable set of injectors, in registration order.
pub struct InjectorRegistry {
    injectors: Vec<Arc<dyn Injector>>,
    index: HashMap<String, usize>,
    init_hook: Option<Arc<dyn InitHook>>,
    request_mapper: Option<Arc<dyn RequestMapper>>,
}

impl InjectorRegistry {
    pub fn lookup(&self, code: &str) -> Result<&Arc<dyn Injector>, RegistryError> {
        self.index
            .get(code)
            .map(|&i| &self.injectors[i])
            .ok_or_else(|| RegistryError::NotFound(code.to_string()))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    /// All injectors in registration order (built-ins first).
    pub fn list(&self) -> &[Arc<dyn Injector>] {
        &self.injectors
    }

    pub fn len(&self) -> usize {
        self.injectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.injectors.is_empty()
    }

    pub fn init_hook(&self) -> Option<&Arc<dyn InitHook>> {
        self.init_hook.as_ref()
    }

    pub fn request_mapper(&self) -> Option<&Arc<dyn RequestMapper>> {
        self.request_mapper.as_ref()
    }

    /// Catalog entries for every injector.
    pub fn catalog(&self) -> Vec<InjectorDescriptor> {
        self.injectors
            .iter()
            .map(|i| InjectorDescriptor::from_injector(i.as_ref()))
            .collect()
    }
}

/// Serializable description of a registered injector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectorDescriptor {
    pub code: String,
    pub data_type: DataType,
    pub labels: I18nLabels,
    pub is_critical: bool,
    pub timeout_ms: Option<u64>,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<Formats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<InjectableValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_columns: Option<Vec<TableColumn>>,
}

impl InjectorDescriptor {
    pub fn from_injector(injector: &dyn Injector) -> Self {
        let timeout = injector.timeout();
        Self {
            code: injector.code().to_string(),
            data_type: injector.data_type(),
            labels: injector.labels(),
            is_critical: injector.is_critical(),
            timeout_ms: (timeout != Duration::ZERO).then(|| timeout.as_millis() as u64),
            dependencies: injector.dependencies(),
            formats: injector.formats(),
            default_value: injector.default_value(),
            table_columns: injector.as_table_schema().map(|s| s.columns()),
        }
    }
}
