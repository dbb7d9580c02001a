//! The injector plugin interface and its companions.
//!
//! Every value source implements [`Injector`]. Optional capabilities are
//! queried through accessor methods that return `None` by default (see
//! [`Injector::as_table_schema`]) instead of through downcasting.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::ErrorKind;
use crate::injectable::context::{InitData, InjectorContext, ResolvedValues};
use crate::injectable::format::Formats;
use crate::injectable::value::{DataType, I18nLabels, InjectableValue, TableColumn};

/// Errors an injector, init hook or request mapper may return.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InjectorError {
    #[error("{0}")]
    Failed(String),

    #[error("Dependency '{0}' has no resolved value")]
    MissingDependency(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

impl InjectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Failed(_) | Self::MissingDependency(_) => ErrorKind::Internal,
            Self::InvalidInput(_) => ErrorKind::Validation,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

/// A named plugin producing one typed value per render request.
///
/// Injectors are registered once at startup and shared across requests;
/// all per-request state arrives through the [`InjectorContext`].
#[async_trait]
pub trait Injector: Send + Sync {
    /// Globally unique code, referenced from template content.
    fn code(&self) -> &str;

    fn data_type(&self) -> DataType;

    /// Codes whose values must be resolved before this injector runs.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Produce the value. `deps` holds the values of [`Self::dependencies`]
    /// that resolved successfully. `Ok(None)` means "no value".
    async fn resolve(
        &self,
        ctx: &InjectorContext,
        deps: &ResolvedValues,
    ) -> Result<Option<InjectableValue>, InjectorError>;

    /// Critical injectors abort the render on failure.
    fn is_critical(&self) -> bool {
        false
    }

    /// Resolve timeout. `Duration::ZERO` means the engine default.
    fn timeout(&self) -> Duration {
        Duration::ZERO
    }

    /// Used when a non-critical resolve fails, times out, or yields nothing.
    fn default_value(&self) -> Option<InjectableValue> {
        None
    }

    fn formats(&self) -> Option<Formats> {
        None
    }

    /// Display labels for catalogs.
    fn labels(&self) -> I18nLabels {
        I18nLabels::new()
    }

    /// Table injectors may expose their column layout up front so editors
    /// can show it before any value exists.
    fn as_table_schema(&self) -> Option<&dyn TableSchema> {
        None
    }
}

/// Capability: a fixed column layout for a table-typed injector.
pub trait TableSchema: Send + Sync {
    fn columns(&self) -> Vec<TableColumn>;
}

/// Hook run once per render request before any injector.
#[async_trait]
pub trait InitHook: Send + Sync {
    async fn init(&self, ctx: &InjectorContext) -> Result<InitData, InjectorError>;
}

/// Decodes the raw request payload before resolution starts.
#[async_trait]
pub trait RequestMapper: Send + Sync {
    async fn map(
        &self,
        raw: &[u8],
        ctx: &InjectorContext,
    ) -> Result<serde_json::Value, InjectorError>;
}

/// Request mapper that parses the payload as JSON. An empty payload maps
/// to `null`.
pub struct JsonRequestMapper;

#[async_trait]
impl RequestMapper for JsonRequestMapper {
    async fn map(
        &self,
        raw: &[u8],
        _ctx: &InjectorContext,
    ) -> Result<serde_json::Value, InjectorError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(raw)
            .map_err(|e| InjectorError::InvalidInput(format!("Payload is not valid JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// FnInjector
// ---------------------------------------------------------------------------

type ResolveFn = Arc<
    dyn Fn(InjectorContext, ResolvedValues) -> BoxFuture<'static, Result<Option<InjectableValue>, InjectorError>>
        + Send
        + Sync,
>;

/// Closure-backed injector for plugins that do not need their own type.
///
/// ```
/// use docforge_core::injectable::{DataType, FnInjector, InjectableValue};
///
/// let greeting = FnInjector::new("greeting", DataType::Text, |ctx, _deps| async move {
///     let name = ctx.header("x-user-name").unwrap_or("there").to_string();
///     Ok(Some(InjectableValue::Text(format!("Hello, {name}"))))
/// });
/// ```
#[derive(Clone)]
pub struct FnInjector {
    code: String,
    data_type: DataType,
    dependencies: Vec<String>,
    critical: bool,
    timeout: Duration,
    default_value: Option<InjectableValue>,
    formats: Option<Formats>,
    labels: I18nLabels,
    resolve: ResolveFn,
}

impl FnInjector {
    pub fn new<F, Fut>(code: impl Into<String>, data_type: DataType, resolve: F) -> Self
    where
        F: Fn(InjectorContext, ResolvedValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<InjectableValue>, InjectorError>> + Send + 'static,
    {
        Self {
            code: code.into(),
            data_type,
            dependencies: Vec::new(),
            critical: false,
            timeout: Duration::ZERO,
            default_value: None,
            formats: None,
            labels: I18nLabels::new(),
            resolve: Arc::new(move |ctx, deps| Box::pin(resolve(ctx, deps))),
        }
    }

    pub fn depends_on(mut self, codes: &[&str]) -> Self {
        self.dependencies = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default(mut self, value: InjectableValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_formats(mut self, formats: Formats) -> Self {
        self.formats = Some(formats);
        self
    }

    pub fn with_label(mut self, locale: &str, label: impl Into<String>) -> Self {
        self.labels.insert(locale.to_string(), label.into());
        self
    }
}

#[async_trait]
impl Injector for FnInjector {
    fn code(&self) -> &str {
        &self.code
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    async fn resolve(
        &self,
        ctx: &InjectorContext,
        deps: &ResolvedValues,
    ) -> Result<Option<InjectableValue>, InjectorError> {
        (self.resolve)(ctx.clone(), deps.clone()).await
    }

    fn is_critical(&self) -> bool {
        self.critical
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn default_value(&self) -> Option<InjectableValue> {
        self.default_value.clone()
    }

    fn formats(&self) -> Option<Formats> {
        self.formats.clone()
    }

    fn labels(&self) -> I18nLabels {
        self.labels.clone()
    }
}

impl std::fmt::Debug for dyn Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("code", &self.code())
            .field("data_type", &self.data_type())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn fn_injector_reads_context() {
        let inj = FnInjector::new("who", DataType::Text, |ctx, _| async move {
            Ok(ctx.external_id().map(|id| InjectableValue::Text(id.to_string())))
        });
        let ctx = InjectorContext::new().with_external_id("case-9");
        let value = inj.resolve(&ctx, &ResolvedValues::new()).await.unwrap();
        assert_eq!(value, Some(InjectableValue::Text("case-9".into())));
    }

    #[test]
    fn fn_injector_builder_sets_policy() {
        let inj = FnInjector::new("x", DataType::Number, |_, _| async { Ok(None) })
            .depends_on(&["a", "b"])
            .critical()
            .with_timeout(Duration::from_millis(250))
            .with_default(InjectableValue::Number(0.0));
        assert_eq!(inj.dependencies(), vec!["a".to_string(), "b".to_string()]);
        assert!(inj.is_critical());
        assert_eq!(inj.timeout(), Duration::from_millis(250));
        assert_eq!(inj.default_value(), Some(InjectableValue::Number(0.0)));
        assert!(inj.as_table_schema().is_none());
    }

    #[tokio::test]
    async fn json_mapper_parses_and_rejects() {
        let ctx = InjectorContext::new();
        let value = JsonRequestMapper.map(br#"{"a":1}"#, &ctx).await.unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(
            JsonRequestMapper.map(b"  ", &ctx).await.unwrap(),
            serde_json::Value::Null
        );
        assert_matches!(
            JsonRequestMapper.map(b"{nope", &ctx).await,
            Err(InjectorError::InvalidInput(_))
        );
    }
}
