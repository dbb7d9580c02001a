use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::injectable::{
    Injector, InjectorContext, InjectorError, InjectorRegistry, ResolvedValues,
};
use crate::provider::{ProviderResolution, WorkspaceInjectableProvider};

use super::graph;
use super::{ResolutionError, ResolverConfig, ScopeFilter};

/// A non-critical code that did not resolve normally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedCode {
    pub code: String,
    pub reason: String,
    /// Whether the injector's default value was substituted.
    pub used_default: bool,
}

/// Output of a successful resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub values: ResolvedValues,
    pub degraded: Vec<DegradedCode>,
}

enum Failure {
    Error(InjectorError),
    TimedOut,
}

/// Resolves requested codes against the registry, the scope filter and the
/// workspace provider.
pub struct ResolutionEngine {
    registry: Arc<InjectorRegistry>,
    provider: Option<Arc<dyn WorkspaceInjectableProvider>>,
    scope: Option<Arc<dyn ScopeFilter>>,
    config: ResolverConfig,
}

impl ResolutionEngine {
    pub fn new(registry: Arc<InjectorRegistry>, config: ResolverConfig) -> Self {
        Self {
            registry,
            provider: None,
            scope: None,
            config,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn WorkspaceInjectableProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_scope_filter(mut self, scope: Arc<dyn ScopeFilter>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn registry(&self) -> &Arc<InjectorRegistry> {
        &self.registry
    }

    pub fn provider(&self) -> Option<&Arc<dyn WorkspaceInjectableProvider>> {
        self.provider.as_ref()
    }

    pub fn scope_filter(&self) -> Option<&Arc<dyn ScopeFilter>> {
        self.scope.as_ref()
    }

    fn timeout_for(&self, injector: &dyn Injector) -> Duration {
        match injector.timeout() {
            Duration::ZERO => self.config.default_timeout,
            t => t,
        }
    }

    /// Resolve `codes` for one request.
    ///
    /// The init hook runs first. Every code that nothing can resolve
    /// (unknown, owned by nobody, or switched off for the request's scope,
    /// including dependencies pulled in by requested codes) is then reported
    /// in a single [`ResolutionError::MissingInjectables`] before any
    /// injector runs.
    pub async fn resolve(
        &self,
        codes: &[String],
        ctx: InjectorContext,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolutionError> {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let requested: Vec<String> = codes
            .iter()
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect();

        let ctx = self.run_init_hook(ctx, cancel).await?;

        let plan = graph::plan(&self.registry, &requested)?;
        let planned: Vec<String> = plan.levels.iter().flatten().cloned().collect();
        let inactive = self.inactive_codes(&planned, &ctx).await?;

        let mut foreign = plan.foreign.clone();
        for dep in &plan.unregistered_dependencies {
            if !foreign.contains(dep) {
                foreign.push(dep.clone());
            }
        }
        let provided = self.resolve_foreign(&foreign, &ctx, cancel).await?;

        let mut missing: Vec<String> = Vec::new();
        for code in requested
            .iter()
            .chain(&planned)
            .chain(&plan.unregistered_dependencies)
        {
            let unresolvable = inactive.contains(code) || provided.unknown.contains(code);
            if unresolvable && !missing.contains(code) {
                missing.push(code.clone());
            }
        }
        if !missing.is_empty() {
            tracing::info!(codes = ?missing, "Unresolvable injectables requested");
            return Err(ResolutionError::MissingInjectables { codes: missing });
        }

        let ctx = Arc::new(ctx);

        let mut resolved = ResolvedValues::new();
        for (code, value) in provided.values {
            resolved.insert(code, value);
        }
        let mut degraded = Vec::new();

        for (depth, level) in plan.levels.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ResolutionError::Cancelled);
            }

            let mut tasks = Vec::with_capacity(level.len());
            for code in level {
                let injector = self.registry.lookup(code).map_err(|_| {
                    ResolutionError::MissingInjectables {
                        codes: vec![code.clone()],
                    }
                })?;
                let injector = Arc::clone(injector);
                let timeout = self.timeout_for(injector.as_ref());
                let deps = resolved.subset(&injector.dependencies());
                let task_ctx = Arc::clone(&ctx);
                let task_injector = Arc::clone(&injector);
                let handle = tokio::spawn(async move {
                    tokio::time::timeout(timeout, task_injector.resolve(&task_ctx, &deps)).await
                });
                tasks.push((injector, timeout, handle));
            }

            let outcomes = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(level = depth, "Resolution cancelled, detaching running injectors");
                    return Err(ResolutionError::Cancelled);
                }
                outcomes = join_all(tasks.iter_mut().map(|(_, _, handle)| handle)) => outcomes,
            };

            for ((injector, timeout, _), outcome) in tasks.into_iter().zip(outcomes) {
                let code = injector.code();
                let failure = match outcome {
                    Ok(Ok(Ok(Some(value)))) if value.data_type() == injector.data_type() => {
                        resolved.insert(code, value);
                        None
                    }
                    Ok(Ok(Ok(Some(value)))) => Some(Failure::Error(InjectorError::Failed(format!(
                        "returned a {} value but declares {}",
                        value.data_type(),
                        injector.data_type()
                    )))),
                    Ok(Ok(Ok(None))) => {
                        if let Some(default) = injector.default_value() {
                            resolved.insert(code, default);
                        }
                        None
                    }
                    Ok(Ok(Err(e))) => Some(Failure::Error(e)),
                    Ok(Err(_elapsed)) => Some(Failure::TimedOut),
                    Err(join_err) => Some(Failure::Error(InjectorError::Failed(format!(
                        "injector task aborted: {join_err}"
                    )))),
                };

                if let Some(failure) = failure {
                    if injector.is_critical() {
                        tracing::error!(code, "Critical injector failed, aborting render");
                        return Err(match failure {
                            Failure::Error(source) => ResolutionError::InjectorFailed {
                                code: code.to_string(),
                                source,
                            },
                            Failure::TimedOut => ResolutionError::InjectorTimeout {
                                code: code.to_string(),
                                timeout,
                            },
                        });
                    }

                    let reason = match failure {
                        Failure::Error(e) => e.to_string(),
                        Failure::TimedOut => format!("timed out after {timeout:?}"),
                    };
                    let default = injector.default_value();
                    let used_default = default.is_some();
                    if let Some(default) = default {
                        resolved.insert(code, default);
                    }
                    tracing::warn!(code, reason = %reason, used_default, "Injector failed");
                    degraded.push(DegradedCode {
                        code: code.to_string(),
                        reason,
                        used_default,
                    });
                }

                if resolved.contains(code) {
                    if let Some(formats) = injector.formats() {
                        resolved.set_format(code, formats.select(ctx.selected_format(code)));
                    }
                }
            }
        }

        tracing::debug!(
            requested = requested.len(),
            resolved = resolved.len(),
            degraded = degraded.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Injectables resolved"
        );
        Ok(Resolution {
            values: resolved,
            degraded,
        })
    }

    async fn inactive_codes(
        &self,
        codes: &[String],
        ctx: &InjectorContext,
    ) -> Result<HashSet<String>, ResolutionError> {
        let Some(scope) = &self.scope else {
            return Ok(HashSet::new());
        };
        let owned: Vec<String> = codes
            .iter()
            .filter(|c| self.registry.contains(c))
            .cloned()
            .collect();
        if owned.is_empty() {
            return Ok(HashSet::new());
        }
        let inactive = scope
            .inactive_codes(&owned, ctx.tenant_id(), ctx.workspace_id())
            .await
            .map_err(ResolutionError::Scope)?;
        Ok(inactive.into_iter().collect())
    }

    async fn resolve_foreign(
        &self,
        codes: &[String],
        ctx: &InjectorContext,
        cancel: &CancellationToken,
    ) -> Result<ProviderResolution, ResolutionError> {
        if codes.is_empty() {
            return Ok(ProviderResolution::default());
        }
        let Some(provider) = &self.provider else {
            return Ok(ProviderResolution {
                unknown: codes.to_vec(),
                ..Default::default()
            });
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(ResolutionError::Cancelled),
            result = provider.resolve_injectables(ctx, codes) => Ok(result?),
        }
    }

    async fn run_init_hook(
        &self,
        ctx: InjectorContext,
        cancel: &CancellationToken,
    ) -> Result<InjectorContext, ResolutionError> {
        let Some(hook) = self.registry.init_hook() else {
            return Ok(ctx);
        };
        let limit = self.config.init_timeout;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ResolutionError::Cancelled),
            outcome = tokio::time::timeout(limit, hook.init(&ctx)) => outcome,
        };
        match outcome {
            Ok(Ok(data)) => Ok(ctx.with_init_data(data)),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Init hook failed");
                Err(ResolutionError::InitFailed(e))
            }
            Err(_) => Err(ResolutionError::InitTimeout(limit)),
        }
    }
}
