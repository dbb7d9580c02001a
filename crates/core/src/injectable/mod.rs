//! Injectable values and the injector plugin system.
//!
//! - [`value`] -- the typed value model (text, number, table, list...)
//! - [`format`] -- time and number display formats
//! - [`injector`] -- the [`Injector`] trait, init hook and request mapper
//! - [`context`] -- per-request [`InjectorContext`] and [`ResolvedValues`]
//! - [`registry`] -- write-once registry of injectors
//! - [`builtin`] -- date/time injectors registered by default

pub mod builtin;
pub mod context;
pub mod format;
pub mod injector;
pub mod registry;
pub mod value;

pub use context::{InitData, InjectorContext, ResolvedValues};
pub use format::Formats;
pub use injector::{
    FnInjector, InitHook, Injector, InjectorError, JsonRequestMapper, RequestMapper, TableSchema,
};
pub use registry::{InjectorDescriptor, InjectorRegistry, RegistryBuilder, RegistryError};
pub use value::{
    DataType, I18nLabels, InjectableValue, ListItem, ListSymbol, ListValue, Styles, TableCell,
    TableColumn, TableRow, TableValue, TextAlign,
};
