//! Built-in date/time injectors, registered before any user plugin.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};

use crate::injectable::context::{InjectorContext, ResolvedValues};
use crate::injectable::format::Formats;
use crate::injectable::injector::{Injector, InjectorError};
use crate::injectable::value::{DataType, I18nLabels, InjectableValue};
use crate::types::Timestamp;

pub const CURRENT_DATE: &str = "current_date";
pub const CURRENT_TIME: &str = "current_time";
pub const CURRENT_DATETIME: &str = "current_datetime";
pub const CURRENT_YEAR: &str = "current_year";

struct ClockInjector {
    code: &'static str,
    data_type: DataType,
    formats: Option<Formats>,
    labels: &'static [(&'static str, &'static str)],
    read: fn(Timestamp) -> InjectableValue,
}

#[async_trait]
impl Injector for ClockInjector {
    fn code(&self) -> &str {
        self.code
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    async fn resolve(
        &self,
        _ctx: &InjectorContext,
        _deps: &ResolvedValues,
    ) -> Result<Option<InjectableValue>, InjectorError> {
        Ok(Some((self.read)(Utc::now())))
    }

    fn formats(&self) -> Option<Formats> {
        self.formats.clone()
    }

    fn labels(&self) -> I18nLabels {
        self.labels
            .iter()
            .map(|(locale, label)| (locale.to_string(), label.to_string()))
            .collect()
    }
}

/// Every built-in injector, in registration order.
pub fn all() -> Vec<Arc<dyn Injector>> {
    vec![
        Arc::new(ClockInjector {
            code: CURRENT_DATE,
            data_type: DataType::Time,
            formats: Some(Formats::new(
                "DD/MM/YYYY",
                &["MM/DD/YYYY", "YYYY-MM-DD", "D MMMM YYYY"],
            )),
            labels: &[("en", "Current date"), ("es", "Fecha actual")],
            read: InjectableValue::Time,
        }),
        Arc::new(ClockInjector {
            code: CURRENT_TIME,
            data_type: DataType::Time,
            formats: Some(Formats::new("HH:mm", &["HH:mm:ss", "hh:mm A"])),
            labels: &[("en", "Current time"), ("es", "Hora actual")],
            read: InjectableValue::Time,
        }),
        Arc::new(ClockInjector {
            code: CURRENT_DATETIME,
            data_type: DataType::Time,
            formats: Some(Formats::new("DD/MM/YYYY HH:mm", &["YYYY-MM-DD HH:mm:ss"])),
            labels: &[("en", "Current date and time"), ("es", "Fecha y hora actual")],
            read: InjectableValue::Time,
        }),
        Arc::new(ClockInjector {
            code: CURRENT_YEAR,
            data_type: DataType::Number,
            formats: None,
            labels: &[("en", "Current year"), ("es", "Año actual")],
            read: |now| InjectableValue::Number(f64::from(now.year())),
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtins_resolve_to_their_declared_type() {
        let ctx = InjectorContext::new();
        let deps = ResolvedValues::new();
        for injector in all() {
            let value = injector.resolve(&ctx, &deps).await.unwrap().unwrap();
            assert_eq!(value.data_type(), injector.data_type(), "{}", injector.code());
        }
    }

    #[test]
    fn date_formats_have_default() {
        let date = all().into_iter().find(|i| i.code() == CURRENT_DATE).unwrap();
        let formats = date.formats().unwrap();
        assert_eq!(formats.default, "DD/MM/YYYY");
        assert!(formats.allows("YYYY-MM-DD"));
    }
}
