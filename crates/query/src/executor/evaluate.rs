//! Expression evaluation.

use super::compare::{accepts, compare, contains, junction_step, truth};
use crate::ast::{getter_property, CollectionKind, CompiledValue, Function, JunctionOp, NodeId};
use crate::context::{Binding, ExecutionContext};
use crate::error::{QueryError, Result};
use crate::method::{resolve_method, MethodDescriptor};
use indexmap::IndexSet;
use std::sync::Arc;
use tessera_core::pattern_match::like;
use tessera_core::{ObjectType, Value};

impl ExecutionContext<'_> {
    /// Evaluates a node against the current iterator values.
    pub(crate) fn evaluate(&mut self, id: NodeId) -> Result<Value> {
        let query = self.query;
        match query.node(id) {
            CompiledValue::Literal(value) => Ok(value.clone()),
            CompiledValue::BindArgument(position) => self.param(*position),
            CompiledValue::Identifier(name) => match self.bindings.get(&id).cloned() {
                Some(Binding::Iterator(def)) => Ok(self.iterator_value(def)),
                Some(Binding::Region(region)) => Ok(Value::Region(self.region(&region)?)),
                Some(Binding::Implicit(def)) => {
                    let receiver = self.iterator_value(def);
                    self.attribute(receiver, name)
                }
                None => Err(QueryError::unresolved(name.clone())),
            },
            CompiledValue::RegionPath(path) => Ok(Value::Region(self.region(path)?)),
            CompiledValue::Path {
                receiver,
                attribute,
            } => {
                let receiver = self.evaluate(*receiver)?;
                self.attribute(receiver, attribute)
            }
            CompiledValue::MethodInvocation {
                receiver,
                name,
                args,
            } => {
                let receiver = match receiver {
                    Some(r) => self.evaluate(*r)?,
                    None => match self.bindings.get(&id) {
                        Some(Binding::Implicit(def)) => self.iterator_value(*def),
                        _ => return Err(QueryError::unresolved(name.clone())),
                    },
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(*arg)?);
                }
                self.invoke(receiver, name, &values)
            }
            CompiledValue::IteratorDef { collection, .. } => self.evaluate(*collection),
            CompiledValue::Comparison { op, left, right } => {
                let left = self.evaluate(*left)?;
                let right = self.evaluate(*right)?;
                compare(*op, &left, &right)
            }
            CompiledValue::Junction { op, operands } => {
                let mut acc = Some(*op == JunctionOp::And);
                for operand in operands {
                    let value = self.evaluate(*operand)?;
                    if let Some(decided) = junction_step(*op, &mut acc, truth(&value)?) {
                        return Ok(Value::Boolean(decided));
                    }
                }
                Ok(acc.map_or(Value::Undefined, Value::Boolean))
            }
            CompiledValue::Not(inner) => {
                let value = self.evaluate(*inner)?;
                Ok(truth(&value)?.map_or(Value::Undefined, |b| Value::Boolean(!b)))
            }
            CompiledValue::In {
                element,
                collection,
            } => {
                let element = self.evaluate(*element)?;
                let collection = self.evaluate(*collection)?;
                contains(&element, &collection)
            }
            CompiledValue::Like {
                operand,
                pattern,
                negated,
            } => {
                let operand = self.evaluate(*operand)?;
                let pattern = self.evaluate(*pattern)?;
                if operand.is_undefined() || operand.is_null() || pattern.is_undefined() {
                    return Ok(Value::Undefined);
                }
                let (Some(text), Some(pattern)) = (operand.as_str(), pattern.as_str()) else {
                    let got = if operand.as_str().is_none() {
                        operand.data_type()
                    } else {
                        pattern.data_type()
                    };
                    return Err(QueryError::type_mismatch("String", got));
                };
                Ok(Value::Boolean(like(text, pattern) != *negated))
            }
            CompiledValue::Function { function, args } => self.call_function(*function, args),
            CompiledValue::Index { receiver, index } => {
                let receiver = self.evaluate(*receiver)?;
                let index = self.evaluate(*index)?;
                index_into(&receiver, &index)
            }
            CompiledValue::Construct { kind, elements } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(*element)?);
                }
                Ok(match kind {
                    CollectionKind::List => Value::collection(values),
                    CollectionKind::Set => {
                        let unique: IndexSet<Value> = values.into_iter().collect();
                        Value::collection(unique)
                    }
                })
            }
            CompiledValue::Select(_) => self.evaluate_subquery(id),
            CompiledValue::SortCriterion { expr, .. } => self.evaluate(*expr),
        }
    }

    /// Evaluates a WHERE-style condition.
    pub(crate) fn evaluate_condition(&mut self, id: NodeId) -> Result<bool> {
        let value = self.evaluate(id)?;
        accepts(&value)
    }

    fn call_function(&mut self, function: Function, args: &[NodeId]) -> Result<Value> {
        let Some(arg) = args.first() else {
            return Err(QueryError::invalid_query(format!(
                "{} expects one argument",
                function.name()
            )));
        };
        let value = self.evaluate(*arg)?;
        match function {
            Function::IsDefined => Ok(Value::Boolean(!value.is_undefined())),
            Function::IsUndefined => Ok(Value::Boolean(value.is_undefined())),
            Function::Element => match &value {
                Value::Undefined => Ok(Value::Undefined),
                Value::Collection(items) if items.len() == 1 => Ok(items[0].clone()),
                Value::Collection(items) => Err(QueryError::invalid_query(format!(
                    "ELEMENT expects exactly one element, found {}",
                    items.len()
                ))),
                other => Err(QueryError::type_mismatch("Collection", other.data_type())),
            },
        }
    }

    fn evaluate_subquery(&mut self, id: NodeId) -> Result<Value> {
        let uncorrelated = self.dependencies_of(id).map_or(false, |d| d.is_empty());
        if uncorrelated {
            if let Some(cached) = self.subquery_results.get(&id) {
                return Ok(cached.clone());
            }
        }
        let results = self.execute_select(id)?;
        let value = results.into_value();
        if uncorrelated {
            self.subquery_results.insert(id, value.clone());
        }
        Ok(value)
    }

    /// Reads `receiver.name`.
    pub(crate) fn attribute(&mut self, receiver: Value, name: &str) -> Result<Value> {
        match &receiver {
            Value::Undefined | Value::Null => Ok(Value::Undefined),
            Value::Entry(entry) => {
                if entry.is_destroyed() {
                    return Ok(Value::Undefined);
                }
                match name {
                    "key" => Ok(entry.key().clone()),
                    "value" => Ok(entry.value().clone()),
                    _ => self.member(receiver, name),
                }
            }
            Value::Region(region) => {
                if region.is_destroyed() {
                    return Err(QueryError::RegionUnavailable(format!(
                        "region /{} has been destroyed",
                        region.name()
                    )));
                }
                match name {
                    "entrySet" | "entries" => {
                        let entries = region.entries().map_err(QueryError::from_storage)?;
                        Ok(Value::collection(entries.into_iter().map(Value::Entry)))
                    }
                    "keySet" | "keys" => Ok(Value::collection(
                        region.keys().map_err(QueryError::from_storage)?,
                    )),
                    "values" => Ok(Value::collection(
                        region.values().map_err(QueryError::from_storage)?,
                    )),
                    "size" => Ok(Value::count(region.size())),
                    "isEmpty" => Ok(Value::Boolean(region.size() == 0)),
                    "name" | "fullPath" => Ok(Value::String(format!("/{}", region.name()))),
                    _ => self.member(receiver, name),
                }
            }
            Value::Object(object) => match object.field(name) {
                Some(value) => Ok(value.clone()),
                None => self.member(receiver, name),
            },
            Value::Struct(row) => match row.get(name) {
                Some(value) => Ok(value.clone()),
                None => self.member(receiver, name),
            },
            Value::Collection(_) if name == "values" => Ok(receiver),
            _ => self.member(receiver, name),
        }
    }

    /// Reads an attribute through a no-argument method: `name`, `getName` or `isName`.
    /// A receiver with none of them yields UNDEFINED.
    fn member(&mut self, receiver: Value, name: &str) -> Result<Value> {
        let class = receiver.data_type();
        let capitalized = capitalize(name);
        let candidates = [
            name.to_owned(),
            format!("get{}", capitalized),
            format!("is{}", capitalized),
        ];
        for candidate in &candidates {
            match resolve_method(&self.env.registry, class.class_name(), candidate, &[]) {
                Ok(method) => return self.call(&receiver, &class, &method, &[]),
                Err(QueryError::NameResolution(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Value::Undefined)
    }

    /// Invokes `receiver.name(args)`.
    pub(crate) fn invoke(&mut self, receiver: Value, name: &str, args: &[Value]) -> Result<Value> {
        if receiver.is_undefined() || receiver.is_null() {
            return Ok(Value::Undefined);
        }
        if matches!(&receiver, Value::Entry(e) if e.is_destroyed()) {
            return Ok(Value::Undefined);
        }
        if args.iter().any(Value::is_undefined) {
            return Ok(Value::Undefined);
        }
        let class = receiver.data_type();
        let arg_types: Vec<ObjectType> = args.iter().map(Value::data_type).collect();
        match resolve_method(&self.env.registry, class.class_name(), name, &arg_types) {
            Ok(method) => self.call(&receiver, &class, &method, args),
            Err(QueryError::NameResolution(message)) => {
                // A getter without a registered method reads the field directly.
                match getter_property(name, args.len()).and_then(|p| receiver.field(&p).cloned()) {
                    Some(value) => Ok(value),
                    None => Err(QueryError::NameResolution(message)),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn call(
        &mut self,
        receiver: &Value,
        class: &ObjectType,
        method: &Arc<MethodDescriptor>,
        args: &[Value],
    ) -> Result<Value> {
        let signature = method.signature();
        let key = (class.class_name().to_owned(), signature);
        let allowed = match self.authorized.get(&key) {
            Some(allowed) => *allowed,
            None => {
                let allowed = self.env.authorizer.authorize(class.class_name(), method);
                if !allowed {
                    let signature = &key.1;
                    tracing::warn!(class = %class, method = %signature, "method invocation denied");
                }
                self.authorized.insert(key.clone(), allowed);
                allowed
            }
        };
        if !allowed {
            return Err(QueryError::NotAuthorized(format!(
                "{} on {} is not authorized",
                key.1, class
            )));
        }
        method.invoke(receiver, args).map_err(|source| {
            match source.downcast_ref::<tessera_core::Error>() {
                Some(e) if e.is_region_destroyed() => QueryError::RegionUnavailable(e.to_string()),
                _ => QueryError::InvocationTarget {
                    method: key.1,
                    source,
                },
            }
        })
    }

    /// Evaluates an iterator's collection and returns the values to iterate.
    pub(crate) fn iteration_values(&mut self, def: NodeId) -> Result<Vec<Value>> {
        let collection = self.evaluate(def)?;
        match collection {
            Value::Undefined | Value::Null => Ok(Vec::new()),
            Value::Collection(items) => Ok(items.as_ref().clone()),
            Value::Region(region) => region.values().map_err(QueryError::from_storage),
            other => Err(QueryError::type_mismatch("Collection", other.data_type())),
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn index_into(receiver: &Value, index: &Value) -> Result<Value> {
    if receiver.is_undefined() || receiver.is_null() || index.is_undefined() {
        return Ok(Value::Undefined);
    }
    if let Value::Region(region) = receiver {
        return Ok(region.get(index).unwrap_or(Value::Null));
    }
    let Some(position) = index.as_i64() else {
        return Err(QueryError::type_mismatch("Integer", index.data_type()));
    };
    let position = match usize::try_from(position) {
        Ok(p) => p,
        Err(_) => return Ok(Value::Undefined),
    };
    match receiver {
        Value::Collection(items) => Ok(items.get(position).cloned().unwrap_or(Value::Undefined)),
        Value::Struct(row) => Ok(row.values().get(position).cloned().unwrap_or(Value::Undefined)),
        Value::String(s) => Ok(s
            .chars()
            .nth(position)
            .map_or(Value::Undefined, |c| Value::String(c.to_string()))),
        other => Err(QueryError::type_mismatch("indexable value", other.data_type())),
    }
}
