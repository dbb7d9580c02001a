//! [`CatalogProvider`]: the stock [`WorkspaceInjectableProvider`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::CallerIdentity;
use crate::injectable::{DataType, InjectableValue, InjectorContext};
use crate::naming::{composite_code, parse_provider_code, virtual_code, ProviderCode};

use super::catalog::{merge_catalogs, CatalogSource};
use super::{
    CatalogRequest, ProviderCodeKind, ProviderError, ProviderInjectable, ProviderResolution,
    WorkspaceInjectableProvider,
};

/// Recorded answers for a case.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// Answers of one template type, keyed by question code.
    async fn answers(
        &self,
        external_id: &str,
        template_type: &str,
    ) -> Result<HashMap<String, serde_json::Value>, ProviderError>;

    /// Whether anything in `group` was answered for the case.
    async fn group_answered(&self, external_id: &str, group: &str) -> Result<bool, ProviderError>;
}

/// Verifies that an end user may read a case.
#[async_trait]
pub trait OwnershipChecker: Send + Sync {
    async fn owns(&self, subject: &str, external_id: &str) -> Result<bool, ProviderError>;
}

/// Convert a recorded answer by its runtime JSON type.
///
/// Scalars map to the matching value, arrays to a comma-joined string of
/// their non-null items. `null` and empty arrays count as unanswered.
pub fn answer_to_value(answer: &serde_json::Value) -> Option<InjectableValue> {
    use serde_json::Value;

    match answer {
        Value::Null => None,
        Value::Bool(b) => Some(InjectableValue::Bool(*b)),
        Value::Number(n) => n.as_f64().map(InjectableValue::Number),
        Value::String(s) => Some(InjectableValue::Text(s.clone())),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(answer_to_value)
                .map(|v| v.to_display_string(None))
                .collect();
            (!parts.is_empty()).then(|| InjectableValue::Text(parts.join(", ")))
        }
        Value::Object(_) => Some(InjectableValue::Text(answer.to_string())),
    }
}

pub struct CatalogProvider {
    catalogs: Arc<dyn CatalogSource>,
    answers: Arc<dyn AnswerSource>,
    ownership: Arc<dyn OwnershipChecker>,
    /// Catalog environment used when resolving render codes.
    environment: String,
}

impl CatalogProvider {
    pub fn new(
        catalogs: Arc<dyn CatalogSource>,
        answers: Arc<dyn AnswerSource>,
        ownership: Arc<dyn OwnershipChecker>,
    ) -> Self {
        Self {
            catalogs,
            answers,
            ownership,
            environment: "production".into(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Check the caller may read `external_id`. Internal callers are
    /// trusted; end users must own the case.
    async fn authorize(&self, caller: &CallerIdentity, external_id: &str) -> Result<(), ProviderError> {
        match caller {
            CallerIdentity::Internal { .. } => Ok(()),
            CallerIdentity::EndUser { subject } => {
                if self.ownership.owns(subject, external_id).await? {
                    Ok(())
                } else {
                    tracing::warn!(subject = %subject, external_id, "Case ownership check failed");
                    Err(ProviderError::Forbidden(format!(
                        "'{subject}' does not own case '{external_id}'"
                    )))
                }
            }
            CallerIdentity::Anonymous => Err(ProviderError::Unauthorized(
                "provider values require an authenticated caller".into(),
            )),
        }
    }
}

#[async_trait]
impl WorkspaceInjectableProvider for CatalogProvider {
    async fn get_injectables(
        &self,
        request: &CatalogRequest,
    ) -> Result<Vec<ProviderInjectable>, ProviderError> {
        let default = self.catalogs.fetch(&request.environment, None).await?;
        let overrides = match &request.workspace_key {
            Some(key) => self.catalogs.fetch(&request.environment, Some(key)).await?,
            None => None,
        };

        let merged = merge_catalogs(default.as_ref(), overrides.as_ref());
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for (operation, catalog) in &merged {
            for group in &catalog.groups {
                let code = virtual_code(&group.key);
                if seen.insert(code.clone()) {
                    out.push(ProviderInjectable {
                        code,
                        kind: ProviderCodeKind::Virtual,
                        data_type: DataType::Bool,
                        operation: operation.clone(),
                        group: group.key.clone(),
                        labels: group.labels.clone(),
                    });
                }
                for question in &group.questions {
                    let code = composite_code(operation, &question.code);
                    if seen.insert(code.clone()) {
                        out.push(ProviderInjectable {
                            code,
                            kind: ProviderCodeKind::Composite,
                            data_type: question.data_type,
                            operation: operation.clone(),
                            group: group.key.clone(),
                            labels: question.labels.clone(),
                        });
                    }
                }
            }
        }

        tracing::debug!(
            environment = %request.environment,
            workspace = ?request.workspace_key,
            count = out.len(),
            "Provider catalog loaded"
        );
        Ok(out)
    }

    async fn resolve_injectables(
        &self,
        ctx: &InjectorContext,
        codes: &[String],
    ) -> Result<ProviderResolution, ProviderError> {
        let mut resolution = ProviderResolution::default();
        let mut parsed_codes = Vec::new();
        for code in codes {
            match parse_provider_code(code) {
                Some(parsed) => parsed_codes.push((code, parsed)),
                None => resolution.unknown.push(code.clone()),
            }
        }
        if parsed_codes.is_empty() {
            return Ok(resolution);
        }

        // Well-formed codes must still name a group or question of the
        // merged catalog for the request's workspace.
        let request = CatalogRequest {
            environment: self.environment.clone(),
            workspace_key: ctx.workspace_key().map(str::to_string),
        };
        let known: HashSet<String> = self
            .get_injectables(&request)
            .await?
            .into_iter()
            .map(|p| p.code)
            .collect();
        let mut owned = Vec::new();
        for (code, parsed) in parsed_codes {
            if known.contains(code.as_str()) {
                owned.push((code, parsed));
            } else {
                tracing::debug!(code = %code, "Provider code not in catalog");
                resolution.unknown.push(code.clone());
            }
        }
        if owned.is_empty() {
            return Ok(resolution);
        }

        let external_id = ctx.external_id().ok_or_else(|| {
            ProviderError::InvalidRequest("an external id is required for provider codes".into())
        })?;
        self.authorize(ctx.caller(), external_id).await?;

        let mut answers_by_type: HashMap<&str, HashMap<String, serde_json::Value>> = HashMap::new();
        for (code, parsed) in owned {
            let value = match parsed {
                ProviderCode::Virtual { group } => Some(InjectableValue::Bool(
                    self.answers.group_answered(external_id, group).await?,
                )),
                ProviderCode::Composite {
                    template_type,
                    question_code,
                } => {
                    if !answers_by_type.contains_key(template_type) {
                        let answers = self.answers.answers(external_id, template_type).await?;
                        answers_by_type.insert(template_type, answers);
                    }
                    answers_by_type
                        .get(template_type)
                        .and_then(|answers| answers.get(question_code))
                        .and_then(answer_to_value)
                }
            };
            if let Some(value) = value {
                resolution.values.insert(code.clone(), value);
            }
        }

        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::provider::CatalogDocument;

    struct StaticCatalogs {
        default: Option<CatalogDocument>,
        workspace: Option<CatalogDocument>,
    }

    #[async_trait]
    impl CatalogSource for StaticCatalogs {
        async fn fetch(
            &self,
            _environment: &str,
            workspace_key: Option<&str>,
        ) -> Result<Option<CatalogDocument>, ProviderError> {
            Ok(match workspace_key {
                None => self.default.clone(),
                Some(_) => self.workspace.clone(),
            })
        }
    }

    struct StaticAnswers;

    #[async_trait]
    impl AnswerSource for StaticAnswers {
        async fn answers(
            &self,
            _external_id: &str,
            template_type: &str,
        ) -> Result<HashMap<String, serde_json::Value>, ProviderError> {
            if template_type != "intake" {
                return Ok(HashMap::new());
            }
            Ok(HashMap::from([
                ("name".to_string(), json!("Ana")),
                ("age".to_string(), json!(41)),
                ("pets".to_string(), json!(["cat", "dog"])),
                ("notes".to_string(), json!(null)),
            ]))
        }

        async fn group_answered(&self, _external_id: &str, group: &str) -> Result<bool, ProviderError> {
            Ok(group == "personal")
        }
    }

    struct OwnerIs(&'static str);

    #[async_trait]
    impl OwnershipChecker for OwnerIs {
        async fn owns(&self, subject: &str, _external_id: &str) -> Result<bool, ProviderError> {
            Ok(subject == self.0)
        }
    }

    fn provider() -> CatalogProvider {
        let default: CatalogDocument = serde_json::from_value(json!({
            "operations": {
                "intake": { "groups": [
                    { "key": "personal", "questions": [
                        { "code": "name" },
                        { "code": "age", "data_type": "number" },
                        { "code": "pets" },
                        { "code": "notes" }
                    ]},
                    { "key": "work" }
                ]}
            }
        }))
        .unwrap();
        CatalogProvider::new(
            Arc::new(StaticCatalogs {
                default: Some(default),
                workspace: None,
            }),
            Arc::new(StaticAnswers),
            Arc::new(OwnerIs("u1")),
        )
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn catalog_lists_virtual_code_before_questions() {
        let request = CatalogRequest {
            environment: "test".into(),
            workspace_key: Some("acme".into()),
        };
        let list = provider().get_injectables(&request).await.unwrap();
        let listed: Vec<&str> = list.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(
            listed,
            vec!["has:personal", "intake:name", "intake:age", "intake:pets", "intake:notes", "has:work"]
        );
        assert_eq!(list[0].data_type, DataType::Bool);
        assert_eq!(list[2].data_type, DataType::Number);
    }

    #[tokio::test]
    async fn internal_caller_resolves_answers() {
        let ctx = InjectorContext::new()
            .with_external_id("case-1")
            .with_caller(CallerIdentity::internal("backoffice"));
        let res = provider()
            .resolve_injectables(
                &ctx,
                &codes(&["has:personal", "has:work", "intake:name", "intake:age", "intake:pets", "intake:notes", "plain"]),
            )
            .await
            .unwrap();
        assert_eq!(res.values["has:personal"], InjectableValue::Bool(true));
        assert_eq!(res.values["has:work"], InjectableValue::Bool(false));
        assert_eq!(res.values["intake:name"], InjectableValue::Text("Ana".into()));
        assert_eq!(res.values["intake:age"], InjectableValue::Number(41.0));
        assert_eq!(res.values["intake:pets"], InjectableValue::Text("cat, dog".into()));
        assert!(!res.values.contains_key("intake:notes"));
        assert_eq!(res.unknown, codes(&["plain"]));
    }

    #[tokio::test]
    async fn end_user_must_own_case() {
        let ctx = InjectorContext::new()
            .with_external_id("case-1")
            .with_caller(CallerIdentity::end_user("intruder"));
        assert_matches!(
            provider().resolve_injectables(&ctx, &codes(&["intake:name"])).await,
            Err(ProviderError::Forbidden(_))
        );

        let ctx = ctx.with_caller(CallerIdentity::end_user("u1"));
        let res = provider().resolve_injectables(&ctx, &codes(&["intake:name"])).await.unwrap();
        assert_eq!(res.values.len(), 1);
    }

    #[tokio::test]
    async fn anonymous_caller_is_rejected() {
        let ctx = InjectorContext::new().with_external_id("case-1");
        assert_matches!(
            provider().resolve_injectables(&ctx, &codes(&["has:personal"])).await,
            Err(ProviderError::Unauthorized(_))
        );
    }

    #[tokio::test]
    async fn codes_missing_from_catalog_are_unknown() {
        let ctx = InjectorContext::new()
            .with_external_id("case-1")
            .with_caller(CallerIdentity::internal("backoffice"));
        let res = provider()
            .resolve_injectables(&ctx, &codes(&["intake:name", "intake:nmae", "has:nosuchgroup", "billing:name"]))
            .await
            .unwrap();
        assert_eq!(res.values.len(), 1);
        assert_eq!(res.unknown, codes(&["intake:nmae", "has:nosuchgroup", "billing:name"]));
    }

    #[tokio::test]
    async fn workspace_override_adds_resolvable_codes() {
        let overrides: CatalogDocument = serde_json::from_value(json!({
            "operations": {
                "billing": { "groups": [ { "key": "invoice", "questions": [ { "code": "name" } ] } ] }
            }
        }))
        .unwrap();
        let mut p = provider();
        p.catalogs = Arc::new(StaticCatalogs {
            default: None,
            workspace: Some(overrides),
        });
        let ctx = InjectorContext::new()
            .with_external_id("case-1")
            .with_caller(CallerIdentity::internal("backoffice"));
        let res = p
            .resolve_injectables(&ctx, &codes(&["billing:name"]))
            .await
            .unwrap();
        assert_eq!(res.unknown, codes(&["billing:name"]));

        let ctx = ctx.with_workspace_key("acme");
        let res = p
            .resolve_injectables(&ctx, &codes(&["billing:name", "has:invoice"]))
            .await
            .unwrap();
        assert!(res.unknown.is_empty());
        assert_eq!(res.values["has:invoice"], InjectableValue::Bool(false));
    }

    #[tokio::test]
    async fn non_provider_codes_need_no_caller() {
        let res = provider()
            .resolve_injectables(&InjectorContext::new(), &codes(&["unknown1"]))
            .await
            .unwrap();
        assert_eq!(res.unknown, codes(&["unknown1"]));
    }

    #[test]
    fn answers_convert_by_runtime_type() {
        assert_eq!(answer_to_value(&json!(true)), Some(InjectableValue::Bool(true)));
        assert_eq!(answer_to_value(&json!(2.5)), Some(InjectableValue::Number(2.5)));
        assert_eq!(answer_to_value(&json!([1, null, "x"])), Some(InjectableValue::Text("1, x".into())));
        assert_eq!(answer_to_value(&json!([])), None);
        assert_eq!(answer_to_value(&json!(null)), None);
    }
}
