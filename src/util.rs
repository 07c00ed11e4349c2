/// Miscellaneous utilities.

use std::fmt;

use regex::Regex;

lazy_static! {
    /// A possibly bracketed `table.field` name.
    static ref QUALIFIED_NAME: Regex = Regex::new(
        r"^\s*(?:\[([^\]]+)\]|([^.\[\]]+))\.(?:\[([^\]]+)\]|([^.\[\]]+))\s*$"
    ).expect("qualified name pattern is valid");
}

/// Splits a qualified `table.field` name into its two parts.
///
/// Either part may be wrapped in square brackets, which is how names
/// containing spaces are written. Returns None if `text` is not of this form.
pub fn split_qualified(text: &str) -> Option<(&str, &str)> {
    let caps = QUALIFIED_NAME.captures(text)?;
    let table = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
    let field = caps.get(3).or_else(|| caps.get(4))?.as_str().trim();
    if table.is_empty() || field.is_empty() {
        return None;
    }
    Some((table, field))
}

/// Helper newtype for displaying an identifier, bracketed if it has a space.
pub struct Ident<'a>(pub &'a str);

impl<'a> fmt::Display for Ident<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.contains(' ') {
            write!(f, "[{}]", self.0)
        } else {
            f.write_str(self.0)
        }
    }
}

/// Helper newtype for displaying `table.field`, bracketing either part.
pub struct Qualified<'a>(pub &'a str, pub &'a str);

impl<'a> fmt::Display for Qualified<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", Ident(self.0), Ident(self.1))
    }
}

/// Helper newtype for implementing `Display` on lists of items.
pub struct CommaSep<'a, T: 'a>(pub &'a [T]);

impl<'a, T> fmt::Display for CommaSep<'a, T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            item.fmt(f)?
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_plain() {
        assert_eq!(split_qualified("EmpDept.EmpNo"), Some(("EmpDept", "EmpNo")));
    }

    #[test]
    fn split_bracketed() {
        assert_eq!(
            split_qualified(" [Emp Dept].[Emp No] "),
            Some(("Emp Dept", "Emp No"))
        );
    }

    #[test]
    fn split_rejects_other_text() {
        assert_eq!(split_qualified("Smith"), None);
        assert_eq!(split_qualified("a.b.c"), None);
        assert_eq!(split_qualified(".b"), None);
    }

    #[test]
    fn ident_brackets_spaces() {
        assert_eq!(Ident("Emp Dept").to_string(), "[Emp Dept]");
        assert_eq!(Ident("EmpDept").to_string(), "EmpDept");
        assert_eq!(Qualified("Emp Dept", "No").to_string(), "[Emp Dept].No");
    }

    #[test]
    fn comma_separated() {
        assert_eq!(CommaSep(&["a", "b", "c"]).to_string(), "a, b, c");
        assert_eq!(CommaSep::<&str>(&[]).to_string(), "");
    }
}
