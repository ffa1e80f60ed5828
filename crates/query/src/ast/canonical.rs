//! Canonical expression text.
//!
//! Canonical text is byte-stable for semantically identical expressions: a
//! no-argument getter call renders as the property it reads, so `p.getStatus()`
//! and `p.status` produce the same text. Index matching and GROUP BY checks
//! compare canonical text.

use super::node::{CompiledValue, NodeId, Projection};
use super::CompiledQuery;
use core::fmt::Write;
use tessera_core::Value;

/// How an identifier relates to the iterator an expression is made relative to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootKind {
    /// The identifier is the iterator itself.
    Iterator,
    /// The identifier (or receiver-less method) is an implicit attribute of the iterator.
    ImplicitAttribute,
    /// Anything else.
    Other,
}

/// Decapitalizes a property name the JavaBeans way: `Status` -> `status`,
/// but `ID` stays `ID`.
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(a), Some(b)) if a.is_uppercase() && b.is_uppercase() => name.to_owned(),
        (Some(a), _) => {
            let mut out: String = a.to_lowercase().collect();
            out.push_str(&name[a.len_utf8()..]);
            out
        }
        (None, _) => String::new(),
    }
}

/// Returns the property a no-argument getter reads (`getStatus` -> `status`).
pub fn getter_property(method: &str, argc: usize) -> Option<String> {
    if argc != 0 {
        return None;
    }
    let rest = method.strip_prefix("get")?;
    match rest.chars().next() {
        Some(c) if c.is_uppercase() => Some(decapitalize(rest)),
        _ => None,
    }
}

fn write_literal(value: &Value, out: &mut String) {
    let _ = match value {
        Value::String(s) => write!(out, "'{}'", s.replace('\'', "''")),
        Value::Long(l) => write!(out, "{}L", l),
        Value::Double(d) if d.fract() == 0.0 && d.is_finite() => write!(out, "{:.1}", d),
        Value::Collection(items) => {
            out.push_str("LIST(");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(item, out);
            }
            out.push(')');
            Ok(())
        }
        Value::Null => write!(out, "null"),
        other => write!(out, "{}", other),
    };
}

impl CompiledQuery {
    /// Returns the canonical text of a node.
    pub fn canonical(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_canonical(id, &mut out);
        out
    }

    fn write_list(&self, ids: &[NodeId], out: &mut String) {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_canonical(*id, out);
        }
    }

    fn write_canonical(&self, id: NodeId, out: &mut String) {
        match self.node(id) {
            CompiledValue::Literal(v) => write_literal(v, out),
            CompiledValue::BindArgument(i) => {
                let _ = write!(out, "${}", i);
            }
            CompiledValue::Identifier(name) => out.push_str(name),
            CompiledValue::Path {
                receiver,
                attribute,
            } => {
                self.write_canonical(*receiver, out);
                out.push('.');
                out.push_str(attribute);
            }
            CompiledValue::MethodInvocation {
                receiver,
                name,
                args,
            } => {
                if let Some(receiver) = receiver {
                    self.write_canonical(*receiver, out);
                    out.push('.');
                }
                match getter_property(name, args.len()) {
                    Some(property) => out.push_str(&property),
                    None => {
                        out.push_str(name);
                        out.push('(');
                        self.write_list(args, out);
                        out.push(')');
                    }
                }
            }
            CompiledValue::RegionPath(name) => {
                out.push('/');
                out.push_str(name);
            }
            CompiledValue::IteratorDef { name, collection } => {
                self.write_canonical(*collection, out);
                if let Some(name) = name {
                    out.push(' ');
                    out.push_str(name);
                }
            }
            CompiledValue::Comparison { op, left, right } => {
                self.write_canonical(*left, out);
                let _ = write!(out, " {} ", op.symbol());
                self.write_canonical(*right, out);
            }
            CompiledValue::Junction { op, operands } => {
                out.push('(');
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        let _ = write!(out, " {} ", op.keyword());
                    }
                    self.write_canonical(*operand, out);
                }
                out.push(')');
            }
            CompiledValue::Not(inner) => {
                out.push_str("NOT (");
                self.write_canonical(*inner, out);
                out.push(')');
            }
            CompiledValue::In {
                element,
                collection,
            } => {
                self.write_canonical(*element, out);
                out.push_str(" IN ");
                self.write_canonical(*collection, out);
            }
            CompiledValue::Like {
                operand,
                pattern,
                negated,
            } => {
                self.write_canonical(*operand, out);
                out.push_str(if *negated { " NOT LIKE " } else { " LIKE " });
                self.write_canonical(*pattern, out);
            }
            CompiledValue::Function { function, args } => {
                out.push_str(function.name());
                out.push('(');
                self.write_list(args, out);
                out.push(')');
            }
            CompiledValue::Index { receiver, index } => {
                self.write_canonical(*receiver, out);
                out.push('[');
                self.write_canonical(*index, out);
                out.push(']');
            }
            CompiledValue::Construct { kind, elements } => {
                out.push_str(match kind {
                    super::CollectionKind::Set => "SET(",
                    super::CollectionKind::List => "LIST(",
                });
                self.write_list(elements, out);
                out.push(')');
            }
            CompiledValue::SortCriterion { expr, descending } => {
                self.write_canonical(*expr, out);
                if *descending {
                    out.push_str(" DESC");
                }
            }
            CompiledValue::Select(select) => {
                out.push_str("(SELECT ");
                if select.distinct {
                    out.push_str("DISTINCT ");
                }
                match &select.projection {
                    Projection::All => out.push('*'),
                    Projection::Count => out.push_str("COUNT(*)"),
                    Projection::Columns(fields) => {
                        for (i, field) in fields.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            self.write_canonical(field.expr, out);
                        }
                    }
                }
                out.push_str(" FROM ");
                self.write_list(&select.iterators, out);
                if let Some(w) = select.where_clause {
                    out.push_str(" WHERE ");
                    self.write_canonical(w, out);
                }
                if !select.order_by.is_empty() {
                    out.push_str(" ORDER BY ");
                    self.write_list(&select.order_by, out);
                }
                if let Some(limit) = select.limit {
                    out.push_str(" LIMIT ");
                    self.write_canonical(limit, out);
                }
                out.push(')');
            }
        }
    }

    /// Returns the canonical text of an attribute chain relative to the iterator
    /// it starts from: `p.status.name` relative to `p` is `status.name`.
    ///
    /// `classify` tells how identifiers and receiver-less method calls relate to
    /// that iterator. Returns None when the expression is not a chain rooted at it.
    pub fn relative_canonical(
        &self,
        id: NodeId,
        classify: &dyn Fn(NodeId) -> RootKind,
    ) -> Option<String> {
        match self.node(id) {
            CompiledValue::Identifier(name) => match classify(id) {
                RootKind::Iterator => Some(String::new()),
                RootKind::ImplicitAttribute => Some(name.clone()),
                RootKind::Other => None,
            },
            CompiledValue::Path {
                receiver,
                attribute,
            } => {
                let base = self.relative_canonical(*receiver, classify)?;
                Some(join(base, attribute))
            }
            CompiledValue::MethodInvocation {
                receiver,
                name,
                args,
            } => {
                let base = match receiver {
                    Some(r) => self.relative_canonical(*r, classify)?,
                    None if classify(id) == RootKind::ImplicitAttribute => String::new(),
                    None => return None,
                };
                // Only constant arguments keep the text stable across rows.
                let mut call = match getter_property(name, args.len()) {
                    Some(property) => property,
                    None => {
                        if !args
                            .iter()
                            .all(|a| matches!(self.node(*a), CompiledValue::Literal(_)))
                        {
                            return None;
                        }
                        let mut call = format!("{}(", name);
                        self.write_list(args, &mut call);
                        call.push(')');
                        call
                    }
                };
                if base.is_empty() {
                    Some(call)
                } else {
                    call = join(base, &call);
                    Some(call)
                }
            }
            _ => None,
        }
    }
}

fn join(base: String, attribute: &str) -> String {
    if base.is_empty() {
        attribute.to_owned()
    } else {
        format!("{}.{}", base, attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decapitalize() {
        assert_eq!(decapitalize("Status"), "status");
        assert_eq!(decapitalize("ID"), "ID");
        assert_eq!(decapitalize("x"), "x");
        assert_eq!(decapitalize(""), "");
    }

    #[test]
    fn test_getter_property() {
        assert_eq!(getter_property("getStatus", 0), Some("status".into()));
        assert_eq!(getter_property("getID", 0), Some("ID".into()));
        assert_eq!(getter_property("getStatus", 1), None);
        assert_eq!(getter_property("get", 0), None);
        assert_eq!(getter_property("getter", 0), None);
        assert_eq!(getter_property("status", 0), None);
    }

    #[test]
    fn test_literal_text() {
        let mut out = String::new();
        write_literal(&Value::from("it's"), &mut out);
        assert_eq!(out, "'it''s'");

        let mut out = String::new();
        write_literal(&Value::Long(5), &mut out);
        assert_eq!(out, "5L");

        let mut out = String::new();
        write_literal(&Value::Double(2.0), &mut out);
        assert_eq!(out, "2.0");
    }
}
