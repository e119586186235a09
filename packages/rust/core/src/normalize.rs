//! Page title normalization.

use oncall_report_shared::ReplaceRule;

/// Apply `rules` to `raw` in declared order.
///
/// Each rule sees the previous rule's output, so reordering rules can change
/// the result.
pub fn normalize_title(raw: &str, rules: &[ReplaceRule]) -> String {
    rules.iter().fold(raw.to_string(), |title, rule| {
        rule.pattern
            .replace_all(&title, rule.replacement.as_str())
            .into_owned()
    })
}
