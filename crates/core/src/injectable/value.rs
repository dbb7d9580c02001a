//! Typed injectable values.
//!
//! [`InjectableValue`] is the closed set of shapes an injector may produce.
//! Tables and lists carry their own structure and styling; an empty cell or
//! list item always renders as an empty string.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::injectable::format;
use crate::types::Timestamp;

/// Translated labels keyed by locale (`"en"`, `"es"`, ...).
pub type I18nLabels = BTreeMap<String, String>;

/// Locale used when a requested translation is missing.
pub const FALLBACK_LOCALE: &str = "en";

/// Pick the label for `locale`, falling back to [`FALLBACK_LOCALE`] and
/// then to any label at all.
pub fn label_for<'a>(labels: &'a I18nLabels, locale: &str) -> Option<&'a str> {
    labels
        .get(locale)
        .or_else(|| labels.get(FALLBACK_LOCALE))
        .or_else(|| labels.values().next())
        .map(String::as_str)
}

// ---------------------------------------------------------------------------
// DataType
// ---------------------------------------------------------------------------

/// Declared output type of an injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Number,
    Bool,
    Time,
    Image,
    Table,
    List,
}

impl DataType {
    /// Return the wire-format string for this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Time => "time",
            Self::Image => "image",
            Self::Table => "table",
            Self::List => "list",
        }
    }

    /// Parse from a wire-format string.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "bool" => Ok(Self::Bool),
            "time" => Ok(Self::Time),
            "image" => Ok(Self::Image),
            "table" => Ok(Self::Table),
            "list" => Ok(Self::List),
            _ => Err(CoreError::Validation(format!(
                "Invalid data_type: '{s}'. Must be one of: text, number, bool, time, \
                 image, table, list"
            ))),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Styles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// Style overrides for a table header/body or list header/items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Styles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// Font size in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    /// Hex color, e.g. `#333333`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_align: Option<TextAlign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub key: String,
    #[serde(default)]
    pub labels: I18nLabels,
    pub data_type: DataType,
    /// Typst track size, e.g. `"2fr"` or `"40mm"`. `auto` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    /// Display format applied to every cell of the column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl TableColumn {
    pub fn new(key: impl Into<String>, label: impl Into<String>, data_type: DataType) -> Self {
        let mut labels = I18nLabels::new();
        labels.insert(FALLBACK_LOCALE.to_string(), label.into());
        Self {
            key: key.into(),
            labels,
            data_type,
            width: None,
            format: None,
        }
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<InjectableValue>,
    #[serde(default = "one")]
    pub colspan: u32,
    #[serde(default = "one")]
    pub rowspan: u32,
}

impl TableCell {
    pub fn new(value: InjectableValue) -> Self {
        Self {
            value: Some(value),
            colspan: 1,
            rowspan: 1,
        }
    }

    pub fn empty() -> Self {
        Self {
            value: None,
            colspan: 1,
            rowspan: 1,
        }
    }

    pub fn span(mut self, colspan: u32, rowspan: u32) -> Self {
        self.colspan = colspan;
        self.rowspan = rowspan;
        self
    }

    /// Text shown for this cell. Empty when the cell has no value.
    pub fn display_text(&self, format: Option<&str>) -> String {
        self.value
            .as_ref()
            .map(|v| v.to_display_string(format))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableValue {
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_styles: Option<Styles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_styles: Option<Styles>,
}

impl TableValue {
    pub fn new(columns: Vec<TableColumn>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    pub fn with_row(mut self, cells: Vec<TableCell>) -> Self {
        self.rows.push(TableRow { cells });
        self
    }

    /// Check that every span is at least 1 and no cell spans past the last
    /// column.
    pub fn validate(&self) -> Result<(), CoreError> {
        let width = self.columns.len() as u32;
        for (r, row) in self.rows.iter().enumerate() {
            for (c, cell) in row.cells.iter().enumerate() {
                if cell.colspan == 0 || cell.rowspan == 0 {
                    return Err(CoreError::Validation(format!(
                        "Table cell [{r}][{c}] has a zero span"
                    )));
                }
                if cell.colspan > width {
                    return Err(CoreError::Validation(format!(
                        "Table cell [{r}][{c}] spans {} columns but the table has {width}",
                        cell.colspan
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Marker style of a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSymbol {
    #[default]
    Bullet,
    Number,
    Dash,
    Roman,
    Letter,
}

impl ListSymbol {
    /// Marker text for the item at zero-based `index`.
    pub fn marker(&self, index: usize) -> String {
        let n = index + 1;
        match self {
            Self::Bullet => "\u{2022}".to_string(),
            Self::Dash => "\u{2013}".to_string(),
            Self::Number => format!("{n}."),
            Self::Roman => format!("{}.", to_roman(n)),
            Self::Letter => format!("{}.", to_letters(n)),
        }
    }

    /// Whether the marker depends on the item position.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Number | Self::Roman | Self::Letter)
    }
}

/// Lowercase roman numeral for `n` (1-based). Returns the decimal form for
/// values outside 1..=3999.
fn to_roman(n: usize) -> String {
    if n == 0 || n > 3999 {
        return n.to_string();
    }
    const TABLE: [(usize, &str); 13] = [
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut rest = n;
    let mut out = String::new();
    for (value, numeral) in TABLE {
        while rest >= value {
            out.push_str(numeral);
            rest -= value;
        }
    }
    out
}

/// Spreadsheet-style letters: 1 → a, 26 → z, 27 → aa.
fn to_letters(n: usize) -> String {
    let mut rest = n;
    let mut out = Vec::new();
    while rest > 0 {
        rest -= 1;
        out.push(b'a' + (rest % 26) as u8);
        rest /= 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<InjectableValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ListItem>,
}

impl ListItem {
    pub fn new(value: InjectableValue) -> Self {
        Self {
            value: Some(value),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ListItem>) -> Self {
        self.children = children;
        self
    }

    /// Text shown for this item. Empty when the item has no value.
    pub fn display_text(&self, format: Option<&str>) -> String {
        self.value
            .as_ref()
            .map(|v| v.to_display_string(format))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListValue {
    #[serde(default)]
    pub symbol: ListSymbol,
    #[serde(default)]
    pub items: Vec<ListItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_label: Option<I18nLabels>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_styles: Option<Styles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_styles: Option<Styles>,
}

impl ListValue {
    pub fn new(symbol: ListSymbol, items: Vec<ListItem>) -> Self {
        Self {
            symbol,
            items,
            ..Self::default()
        }
    }

    /// Deepest nesting level (a flat list has depth 1, an empty list 0).
    pub fn depth(&self) -> usize {
        fn depth_of(items: &[ListItem]) -> usize {
            items
                .iter()
                .map(|i| 1 + depth_of(&i.children))
                .max()
                .unwrap_or(0)
        }
        depth_of(&self.items)
    }
}

// ---------------------------------------------------------------------------
// InjectableValue
// ---------------------------------------------------------------------------

/// A resolved value ready for substitution into a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InjectableValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Time(Timestamp),
    /// Image URL; fetched through the image cache at render time.
    Image(String),
    Table(TableValue),
    List(ListValue),
}

impl InjectableValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Text(_) => DataType::Text,
            Self::Number(_) => DataType::Number,
            Self::Bool(_) => DataType::Bool,
            Self::Time(_) => DataType::Time,
            Self::Image(_) => DataType::Image,
            Self::Table(_) => DataType::Table,
            Self::List(_) => DataType::List,
        }
    }

    /// Plain-text rendering of the value.
    ///
    /// `format` applies to times and numbers; it is ignored by the other
    /// variants. Tables flatten to one line per row, lists to their
    /// top-level items joined with `", "`.
    pub fn to_display_string(&self, format: Option<&str>) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => format::format_number(*n, format),
            Self::Bool(b) => b.to_string(),
            Self::Time(t) => format::format_time(t, format.unwrap_or(format::DEFAULT_TIME_FORMAT)),
            Self::Image(url) => url.clone(),
            Self::Table(table) => table
                .rows
                .iter()
                .map(|row| {
                    row.cells
                        .iter()
                        .map(|c| c.display_text(None))
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Self::List(list) => list
                .items
                .iter()
                .map(|i| i.display_text(None))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<String> for InjectableValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for InjectableValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for InjectableValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for InjectableValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Timestamp> for InjectableValue {
    fn from(value: Timestamp) -> Self {
        Self::Time(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
