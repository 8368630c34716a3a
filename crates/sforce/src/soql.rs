//! SOQL helpers
//!
//! Builds the exact-match SELECT statements the client issues. Every value is
//! passed through [`quote`], so lookups by email or id cannot break out of the
//! string literal.

/// Quote a value as a SOQL string literal.
///
/// Backslashes and single quotes are escaped; line breaks are written as their
/// escape sequences.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// `SELECT <fields> FROM <object> WHERE <field> = '<value>'`
pub fn select_where_eq(fields: &[&str], object: &str, field: &str, value: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = {}",
        fields.join(", "),
        object,
        field,
        quote(value)
    )
}
