//! Canonical naming for tags, injectable keys and provider codes.
//!
//! Provider-owned codes come in two shapes:
//!
//! - virtual: `has:{group}` -- did the subject answer anything in the group
//! - composite: `{template_type}:{question_code}` -- one recorded answer
//!
//! Injector codes registered in-process may not contain `:`, so the two
//! code spaces never collide.

/// Prefix that marks a virtual presence code.
pub const VIRTUAL_CODE_PREFIX: &str = "has";

/// Separator between the parts of a provider code.
pub const CODE_SEPARATOR: char = ':';

/// Normalize a tag or key: trim, lowercase, and collapse every run of inner
/// whitespace into a single `-`.
///
/// Normalizing an already-normalized string returns it unchanged.
///
/// ```
/// use docforge_core::naming::normalize_tag_name;
///
/// assert_eq!(normalize_tag_name("  Client   Intake "), "client-intake");
/// assert_eq!(normalize_tag_name("client-intake"), "client-intake");
/// ```
pub fn normalize_tag_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Build the virtual presence code for a provider group.
pub fn virtual_code(group: &str) -> String {
    format!("{VIRTUAL_CODE_PREFIX}{CODE_SEPARATOR}{group}")
}

/// Build the composite answer code for a question inside a template type.
pub fn composite_code(template_type: &str, question_code: &str) -> String {
    format!("{template_type}{CODE_SEPARATOR}{question_code}")
}

/// A provider code split into its meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCode<'a> {
    /// `has:{group}`
    Virtual { group: &'a str },
    /// `{template_type}:{question_code}`
    Composite {
        template_type: &'a str,
        question_code: &'a str,
    },
}

/// Parse a provider code. Returns `None` for codes that are not provider
/// codes at all (no separator, or an empty part).
pub fn parse_provider_code(code: &str) -> Option<ProviderCode<'_>> {
    let (head, tail) = code.split_once(CODE_SEPARATOR)?;
    if head.is_empty() || tail.is_empty() {
        return None;
    }
    if head == VIRTUAL_CODE_PREFIX {
        Some(ProviderCode::Virtual { group: tail })
    } else {
        Some(ProviderCode::Composite {
            template_type: head,
            question_code: tail,
        })
    }
}
