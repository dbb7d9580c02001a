//! Typst source generation.
//!
//! Content is compiled once into a list of [`Segment`]s: static markup with
//! slots for injectable values and images. Filling a compiled template with
//! resolved values yields the final Typst source. All text coming from
//! content or values is escaped, so neither can inject Typst code.

use std::collections::HashMap;

use crate::content::{parse_content, Document, ImageSource, Mark, Node};
use crate::injectable::value::label_for;
use crate::injectable::{
    InjectableValue, ListItem, ListSymbol, ListValue, ResolvedValues, Styles, TableValue, TextAlign,
};
use crate::types::DbId;

use super::RenderError;

const PREAMBLE: &str = "#set page(paper: \"a4\", margin: 2cm)\n#set text(size: 11pt)\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Markup(String),
    Value { code: String, format: Option<String> },
    Image { source: ImageSource, width: Option<String> },
}

/// A template compiled from one version's content.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    pub template_id: DbId,
    pub version_id: DbId,
    pub segments: Vec<Segment>,
    /// Codes the content references, in document order.
    pub codes: Vec<String>,
    /// Per-code formats chosen in the content.
    pub selected_formats: HashMap<String, String>,
}

impl CompiledTemplate {
    pub fn compile(
        template_id: DbId,
        version_id: DbId,
        content: &serde_json::Value,
    ) -> Result<Self, RenderError> {
        let doc = parse_content(content).map_err(RenderError::InvalidContent)?;
        Ok(Self::from_document(template_id, version_id, &doc))
    }

    pub fn from_document(template_id: DbId, version_id: DbId, doc: &Document) -> Self {
        let mut out = SegmentWriter::default();
        out.markup(PREAMBLE);
        for block in &doc.blocks {
            write_block(block, &mut out);
        }
        Self {
            template_id,
            version_id,
            segments: out.finish(),
            codes: doc.referenced_codes(),
            selected_formats: doc.selected_formats(),
        }
    }

    /// Every image URL the filled template will need.
    pub fn image_urls(&self, values: &ResolvedValues) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        let mut push = |url: &str| {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        };
        for segment in &self.segments {
            match segment {
                Segment::Image {
                    source: ImageSource::Url(url),
                    ..
                } => push(url),
                Segment::Image {
                    source: ImageSource::Code(code),
                    ..
                }
                | Segment::Value { code, .. } => {
                    if let Some(InjectableValue::Image(url)) = values.get(code) {
                        push(url);
                    }
                }
                Segment::Markup(_) => {}
            }
        }
        urls
    }

    /// Produce Typst source. `images` maps image URLs to asset paths
    /// relative to the project root; images without an entry are left out.
    pub fn fill(&self, values: &ResolvedValues, images: &HashMap<String, String>, locale: &str) -> String {
        let mut source = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Markup(markup) => source.push_str(markup),
                Segment::Value { code, format } => {
                    let format = values.format_for(code).or(format.as_deref());
                    if let Some(value) = values.get(code) {
                        source.push_str(&render_value(value, format, images, locale));
                    }
                }
                Segment::Image { source: image, width } => {
                    let url = match image {
                        ImageSource::Url(url) => Some(url.as_str()),
                        ImageSource::Code(code) => match values.get(code) {
                            Some(InjectableValue::Image(url)) => Some(url.as_str()),
                            _ => None,
                        },
                    };
                    if let Some(asset) = url.and_then(|u| images.get(u)) {
                        source.push_str(&image_call(asset, width.as_deref()));
                    }
                }
            }
        }
        source
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SegmentWriter {
    segments: Vec<Segment>,
    pending: String,
}

impl SegmentWriter {
    fn markup(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    fn slot(&mut self, segment: Segment) {
        self.flush();
        self.segments.push(segment);
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.segments.push(Segment::Markup(std::mem::take(&mut self.pending)));
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.segments
    }
}

fn write_block(node: &Node, out: &mut SegmentWriter) {
    match node {
        Node::Paragraph(children) => {
            write_inline(children, out);
            out.markup("\n\n");
        }
        Node::Heading { level, children } => {
            out.markup(&"=".repeat(usize::from(*level)));
            out.markup(" ");
            write_inline(children, out);
            out.markup("\n\n");
        }
        Node::PageBreak => out.markup("#pagebreak()\n\n"),
        inline => {
            write_inline(std::slice::from_ref(inline), out);
            out.markup("\n\n");
        }
    }
}

fn write_inline(nodes: &[Node], out: &mut SegmentWriter) {
    for node in nodes {
        match node {
            Node::Text { text, marks } => out.markup(&apply_marks(&escape_markup(text), marks)),
            Node::Injectable { code, format } => out.slot(Segment::Value {
                code: code.clone(),
                format: format.clone(),
            }),
            Node::Image { source, width } => out.slot(Segment::Image {
                source: source.clone(),
                width: width.clone(),
            }),
            Node::Paragraph(children) | Node::Heading { children, .. } => write_inline(children, out),
            Node::PageBreak => out.markup("#pagebreak()\n"),
        }
    }
}

// Every embedded call ends in `;` so following text such as `(net)` or
// `.com` is not parsed as arguments or a field access.
fn apply_marks(text: &str, marks: &[Mark]) -> String {
    marks.iter().fold(text.to_string(), |acc, mark| match mark {
        Mark::Bold => format!("#strong[{acc}];"),
        Mark::Italic => format!("#emph[{acc}];"),
        Mark::Underline => format!("#underline[{acc}];"),
    })
}

// ---------------------------------------------------------------------------
// Escaping and validated literals
// ---------------------------------------------------------------------------

/// Escape text for Typst markup mode. Newlines become forced line breaks.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '*' | '_' | '`' | '$' | '#' | '<' | '>' | '@' | '[' | ']' | '~' | '/' | '='
            | '-' | '+' | '"' | '\'' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Quote a string for Typst code mode.
fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn is_hex_color(s: &str) -> bool {
    s.strip_prefix('#').is_some_and(|hex| {
        matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
    })
}

/// `auto`, or a number followed by a Typst unit.
fn is_size(s: &str) -> bool {
    if s == "auto" {
        return true;
    }
    let unit_start = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(unit_start);
    !number.is_empty()
        && number.parse::<f64>().is_ok()
        && matches!(unit, "fr" | "pt" | "mm" | "cm" | "in" | "em" | "%")
}

fn image_call(asset: &str, width: Option<&str>) -> String {
    match width.filter(|w| is_size(w)) {
        Some(width) => format!("#image({}, width: {width});", string_literal(asset)),
        None => format!("#image({});", string_literal(asset)),
    }
}

fn styled(content: String, styles: Option<&Styles>) -> String {
    let Some(styles) = styles else {
        return content;
    };
    let mut args = Vec::new();
    if let Some(font) = &styles.font_family {
        args.push(format!("font: {}", string_literal(font)));
    }
    if let Some(size) = styles.font_size.filter(|s| s.is_finite() && *s > 0.0) {
        args.push(format!("size: {size}pt"));
    }
    if let Some(weight) = styles
        .font_weight
        .as_deref()
        .filter(|w| w.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        match weight.parse::<u16>() {
            Ok(n) => args.push(format!("weight: {n}")),
            Err(_) => args.push(format!("weight: {}", string_literal(weight))),
        }
    }
    if let Some(color) = styles.text_color.as_deref().filter(|c| is_hex_color(c)) {
        args.push(format!("fill: rgb({})", string_literal(color)));
    }

    let mut out = if args.is_empty() {
        content
    } else {
        format!("#text({})[{content}];", args.join(", "))
    };
    if let Some(align) = styles.text_align {
        let align = match align {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        };
        out = format!("#align({align})[{out}];");
    }
    out
}

fn cell_fill(styles: Option<&Styles>) -> Option<String> {
    styles
        .and_then(|s| s.background.as_deref())
        .filter(|c| is_hex_color(c))
        .map(|c| format!("fill: rgb({})", string_literal(c)))
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

fn render_value(
    value: &InjectableValue,
    format: Option<&str>,
    images: &HashMap<String, String>,
    locale: &str,
) -> String {
    match value {
        InjectableValue::Table(table) => render_table(table, locale),
        InjectableValue::List(list) => render_list(list, locale),
        InjectableValue::Image(url) => images
            .get(url)
            .map(|asset| image_call(asset, None))
            .unwrap_or_default(),
        scalar => escape_markup(&scalar.to_display_string(format)),
    }
}

/// Typst `#table(...)` call for a table value.
pub fn render_table(table: &TableValue, locale: &str) -> String {
    let tracks: Vec<&str> = table
        .columns
        .iter()
        .map(|c| c.width.as_deref().filter(|w| is_size(w)).unwrap_or("auto"))
        .collect();
    let header_fill = cell_fill(table.header_styles.as_ref());
    let body_fill = cell_fill(table.body_styles.as_ref());

    let mut out = String::from("#table(\n");
    out.push_str(&format!("  columns: ({}),\n", tracks.join(", ")));

    if !table.columns.is_empty() {
        let headers: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                let label = label_for(&c.labels, locale).unwrap_or(&c.key);
                let content = styled(
                    format!("#strong[{}];", escape_markup(label)),
                    table.header_styles.as_ref(),
                );
                cell(&content, 1, 1, header_fill.as_deref())
            })
            .collect();
        out.push_str(&format!("  table.header({}),\n", headers.join(", ")));
    }

    for row in &table.rows {
        let mut column = 0usize;
        let mut cells = Vec::with_capacity(row.cells.len());
        for c in &row.cells {
            let format = table.columns.get(column).and_then(|col| col.format.as_deref());
            let content = styled(escape_markup(&c.display_text(format)), table.body_styles.as_ref());
            cells.push(cell(&content, c.colspan, c.rowspan, body_fill.as_deref()));
            column += c.colspan.max(1) as usize;
        }
        if !cells.is_empty() {
            out.push_str(&format!("  {},\n", cells.join(", ")));
        }
    }
    out.push_str(")\n");
    out
}

fn cell(content: &str, colspan: u32, rowspan: u32, fill: Option<&str>) -> String {
    let mut args = Vec::new();
    if colspan > 1 {
        args.push(format!("colspan: {colspan}"));
    }
    if rowspan > 1 {
        args.push(format!("rowspan: {rowspan}"));
    }
    if let Some(fill) = fill {
        args.push(fill.to_string());
    }
    if args.is_empty() {
        format!("[{content}]")
    } else {
        format!("table.cell({})[{content}]", args.join(", "))
    }
}

/// Typst `#list`/`#enum` call for a list value, preceded by its header.
pub fn render_list(list: &ListValue, locale: &str) -> String {
    let mut out = String::new();
    if let Some(label) = list.header_label.as_ref().and_then(|l| label_for(l, locale)) {
        out.push_str(&styled(
            format!("#strong[{}];", escape_markup(label)),
            list.header_styles.as_ref(),
        ));
        out.push_str("\n\n");
    }
    out.push_str(&list_call(list.symbol, &list.items, list.item_styles.as_ref()));
    out.push('\n');
    out
}

fn list_call(symbol: ListSymbol, items: &[ListItem], styles: Option<&Styles>) -> String {
    let head = match symbol {
        ListSymbol::Bullet => "#list(marker: [\u{2022}]".to_string(),
        ListSymbol::Dash => "#list(marker: [\u{2013}]".to_string(),
        ListSymbol::Number => "#enum(numbering: \"1.\"".to_string(),
        ListSymbol::Roman => "#enum(numbering: \"i.\"".to_string(),
        ListSymbol::Letter => "#enum(numbering: \"a.\"".to_string(),
    };
    let body: Vec<String> = items
        .iter()
        .map(|item| {
            let mut content = styled(escape_markup(&item.display_text(None)), styles);
            if !item.children.is_empty() {
                content.push(' ');
                content.push_str(&list_call(symbol, &item.children, styles));
            }
            format!("[{content}]")
        })
        .collect();
    if body.is_empty() {
        format!("{head})")
    } else {
        format!("{head}, {})", body.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::injectable::{DataType, TableCell, TableColumn};

    fn compiled(content: serde_json::Value) -> CompiledTemplate {
        CompiledTemplate::compile(1, 2, &content).unwrap()
    }

    #[test]
    fn escapes_typst_specials() {
        assert_eq!(escape_markup("a*b_c#d"), "a\\*b\\_c\\#d");
        assert_eq!(escape_markup("[x] $5"), "\\[x\\] \\$5");
        assert_eq!(escape_markup("line\nnext"), "line\\\nnext");
    }

    #[test]
    fn compile_splits_markup_and_slots() {
        let t = compiled(json!({ "type": "doc", "content": [
            { "type": "heading", "attrs": { "level": 2 }, "content": [
                { "type": "text", "text": "Hello " },
                { "type": "injectable", "attrs": { "code": "name", "format": "x" } }
            ]}
        ]}));
        assert_eq!(t.codes, vec!["name"]);
        assert_eq!(
            t.segments[1],
            Segment::Value {
                code: "name".into(),
                format: Some("x".into())
            }
        );
        match &t.segments[0] {
            Segment::Markup(m) => assert!(m.ends_with("== Hello ")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fill_escapes_values_and_skips_missing() {
        let t = compiled(json!({ "type": "doc", "content": [
            { "type": "paragraph", "content": [
                { "type": "injectable", "attrs": { "code": "name" } },
                { "type": "text", "text": "|" },
                { "type": "injectable", "attrs": { "code": "absent" } }
            ]}
        ]}));
        let mut values = ResolvedValues::new();
        values.insert("name", InjectableValue::Text("#evil()".into()));
        let source = t.fill(&values, &HashMap::new(), "en");
        assert!(source.contains("\\#evil()|\n\n"));
    }

    #[test]
    fn marks_wrap_text() {
        let t = compiled(json!({ "type": "doc", "content": [
            { "type": "paragraph", "content": [
                { "type": "text", "text": "hi", "marks": [{ "type": "bold" }, { "type": "italic" }] }
            ]}
        ]}));
        let source = t.fill(&ResolvedValues::new(), &HashMap::new(), "en");
        assert!(source.contains("#emph[#strong[hi];];"));
    }

    #[test]
    fn embedded_calls_end_before_following_text() {
        let t = compiled(json!({ "type": "doc", "content": [
            { "type": "paragraph", "content": [
                { "type": "text", "text": "Total", "marks": [{ "type": "bold" }] },
                { "type": "text", "text": "(net) " },
                { "type": "text", "text": "Site", "marks": [{ "type": "italic" }] },
                { "type": "text", "text": ".com " },
                { "type": "injectable", "attrs": { "code": "logo" } },
                { "type": "text", "text": ".png" }
            ]}
        ]}));
        let mut values = ResolvedValues::new();
        values.insert("logo", InjectableValue::Image("https://x/logo.png".into()));
        let images = HashMap::from([("https://x/logo.png".to_string(), "img/logo.png".to_string())]);
        let source = t.fill(&values, &images, "en");
        assert!(source.contains("#strong[Total];(net) #emph[Site];.com #image(\"img/logo.png\");.png"));
    }

    #[test]
    fn images_resolve_through_asset_map() {
        let t = compiled(json!({ "type": "doc", "content": [
            { "type": "image", "attrs": { "src": "https://x/logo.png", "width": "40mm" } },
            { "type": "image", "attrs": { "code": "signature" } },
            { "type": "image", "attrs": { "src": "https://x/missing.png" } }
        ]}));
        let mut values = ResolvedValues::new();
        values.insert("signature", InjectableValue::Image("https://x/sig.png".into()));
        assert_eq!(
            t.image_urls(&values),
            vec!["https://x/logo.png", "https://x/sig.png", "https://x/missing.png"]
        );

        let images = HashMap::from([
            ("https://x/logo.png".to_string(), "img/a.png".to_string()),
            ("https://x/sig.png".to_string(), "img/b.png".to_string()),
        ]);
        let source = t.fill(&values, &images, "en");
        assert!(source.contains("#image(\"img/a.png\", width: 40mm)"));
        assert!(source.contains("#image(\"img/b.png\")"));
        assert!(!source.contains("missing"));
    }

    #[test]
    fn table_renders_header_and_spans() {
        let mut qty = TableColumn::new("qty", "Qty", DataType::Number);
        qty.format = Some("0.00".into());
        qty.width = Some("1fr; evil".into());
        let table = TableValue::new(vec![TableColumn::new("item", "Item", DataType::Text), qty])
            .with_row(vec![
                TableCell::new(InjectableValue::Text("Bolts".into())),
                TableCell::new(InjectableValue::Number(3.0)),
            ])
            .with_row(vec![TableCell::empty().span(2, 1)]);
        let out = render_table(&table, "en");
        assert!(out.contains("columns: (auto, auto)"));
        assert!(out.contains("table.header([#strong[Item];], [#strong[Qty];])"));
        assert!(out.contains("[Bolts], [3.00]"));
        assert!(out.contains("table.cell(colspan: 2)[]"));
    }

    #[test]
    fn header_styles_apply_fill_and_text() {
        let mut table = TableValue::new(vec![TableColumn::new("a", "A", DataType::Text)]);
        table.header_styles = Some(Styles {
            background: Some("#eeeeee".into()),
            text_color: Some("red\")".into()),
            font_size: Some(9.0),
            ..Styles::default()
        });
        let out = render_table(&table, "en");
        assert!(out.contains("table.cell(fill: rgb(\"#eeeeee\"))[#text(size: 9pt)[#strong[A];];]"));
    }

    #[test]
    fn nested_lists_use_symbol_numbering() {
        let list = ListValue::new(
            ListSymbol::Roman,
            vec![
                ListItem::new(InjectableValue::Text("one".into()))
                    .with_children(vec![ListItem::new(InjectableValue::Text("one-a".into()))]),
                ListItem::default(),
            ],
        );
        let out = render_list(&list, "en");
        assert_eq!(
            out,
            "#enum(numbering: \"i.\", [one #enum(numbering: \"i.\", [one\\-a])], [])\n"
        );
    }

    #[test]
    fn list_header_uses_locale() {
        let mut list = ListValue::new(ListSymbol::Dash, vec![]);
        list.header_label = Some(
            [("en".to_string(), "Items".to_string()), ("es".to_string(), "Elementos".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(render_list(&list, "es").starts_with("#strong[Elementos]"));
        assert!(render_list(&list, "fr").starts_with("#strong[Items]"));
    }

    #[test]
    fn sizes_are_validated() {
        assert!(is_size("auto"));
        assert!(is_size("2fr"));
        assert!(is_size("12.5mm"));
        assert!(is_size("50%"));
        assert!(!is_size("fr"));
        assert!(!is_size("10px"));
        assert!(!is_size("1fr; evil"));
    }
}
