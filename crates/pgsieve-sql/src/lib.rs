//! Postgres quoting, naming and expression-comparison helpers.
//!
//! Everything that turns schema objects into SQL text goes through these
//! helpers, so identifiers are always quoted the same way and generated
//! constraint names are deterministic across runs.

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use pgsieve_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use pgsieve_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Quote a schema-qualified name, e.g. `"public"."users"`.
pub fn quote_qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", Ident(schema), Ident(name))
}

/// Name Postgres gives a single-column `UNIQUE` constraint: `{table}_{column}_key`.
pub fn unique_constraint_name(table: &str, column: &str) -> String {
    truncate_ident(format!("{}_{}_key", table, column))
}

/// Name Postgres gives an inline primary key: `{table}_pkey`.
pub fn primary_key_name(table: &str) -> String {
    truncate_ident(format!("{}_pkey", table))
}

/// Postgres truncates identifiers longer than this many bytes.
pub const PG_IDENT_MAX: usize = 63;

fn truncate_ident(mut name: String) -> String {
    let len = truncate_at_char_boundary(&name, PG_IDENT_MAX).len();
    name.truncate(len);
    name
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut len = max;
    while len > 0 && !s.is_char_boundary(len) {
        len -= 1;
    }
    &s[..len]
}

/// A comparison key for SQL expressions written by hand vs. read back from
/// the catalog.
///
/// Postgres re-renders expressions (`price > 0` comes back as `(price > 0)`),
/// so whitespace and parentheses are dropped and unquoted text is lowercased.
/// Quoted sections are kept verbatim.
///
/// ```
/// use pgsieve_sql::expr_fingerprint;
/// assert_eq!(expr_fingerprint("price > 0"), expr_fingerprint("((price > 0))"));
/// assert_ne!(expr_fingerprint("name = 'A'"), expr_fingerprint("name = 'a'"));
/// ```
pub fn expr_fingerprint(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut quote: Option<char> = None;

    for ch in expr.chars() {
        match quote {
            Some(q) => {
                out.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    out.push(ch);
                    quote = Some(ch);
                }
                '(' | ')' => {}
                c if c.is_whitespace() => {}
                c => out.extend(c.to_lowercase()),
            },
        }
    }

    out
}

/// Strip a trailing top-level type cast from a default expression.
///
/// The catalog reports `DEFAULT 'x'` on a text column as `'x'::text`; casts
/// nested inside function calls (`nextval('seq'::regclass)`) are left alone.
///
/// ```
/// use pgsieve_sql::strip_top_level_cast;
/// assert_eq!(strip_top_level_cast("'x'::text"), "'x'");
/// assert_eq!(strip_top_level_cast("now()"), "now()");
/// assert_eq!(strip_top_level_cast("nextval('s'::regclass)"), "nextval('s'::regclass)");
/// ```
pub fn strip_top_level_cast(expr: &str) -> &str {
    let bytes = expr.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                    return expr[..i].trim_end();
                }
                _ => {}
            },
        }
        i += 1;
    }

    expr.trim_end()
}
