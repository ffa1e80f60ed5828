//! Built-in classes.

use super::{ClassDescriptor, TypeRegistry, OBJECT_CLASS};
use crate::error::MethodError;
use tessera_core::{ObjectType, Value};

type BodyResult = core::result::Result<Value, MethodError>;

pub(super) fn register(registry: &mut TypeRegistry) {
    registry.register(object_class());
    registry.register(string_class());
    registry.register(number_class());
    for name in ["Integer", "Long", "Double"] {
        registry.register(ClassDescriptor::new(name).extends("Number"));
    }
    registry.register(
        ClassDescriptor::new("Boolean").method("booleanValue", [], |v, _| {
            v.as_bool().map(Value::Boolean).ok_or_else(|| receiver_error("Boolean"))
        }),
    );
    registry.register(collection_class());
    registry.register(entry_class());
    registry.register(region_class());
}

fn receiver_error(expected: &str) -> MethodError {
    format!("receiver is not a {}", expected).into()
}

fn string<'a>(v: &'a Value) -> core::result::Result<&'a str, MethodError> {
    v.as_str().ok_or_else(|| receiver_error("String"))
}

fn string_arg<'a>(args: &'a [Value], i: usize) -> core::result::Result<&'a str, MethodError> {
    args.get(i)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {} is not a String", i + 1).into())
}

fn int_arg(args: &[Value], i: usize) -> core::result::Result<i64, MethodError> {
    args.get(i)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("argument {} is not an integer", i + 1).into())
}

fn char_index(len: usize, index: i64) -> core::result::Result<usize, MethodError> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i <= len)
        .ok_or_else(|| format!("index {} out of range for length {}", index, len).into())
}

fn object_class() -> ClassDescriptor {
    ClassDescriptor::new(OBJECT_CLASS)
        .method("toString", [], |v, _| Ok(Value::String(v.to_string())))
        .method("equals", [ObjectType::Any], |v, args| {
            Ok(Value::Boolean(args.first().map_or(false, |a| a == v)))
        })
}

fn string_class() -> ClassDescriptor {
    ClassDescriptor::new("String")
        .method("toString", [], |v, _| Ok(Value::String(string(v)?.to_owned())))
        .method("length", [], |v, _| {
            Ok(Value::count(string(v)?.chars().count()))
        })
        .method("isEmpty", [], |v, _| Ok(Value::Boolean(string(v)?.is_empty())))
        .method("trim", [], |v, _| Ok(Value::String(string(v)?.trim().to_owned())))
        .method("toUpperCase", [], |v, _| {
            Ok(Value::String(string(v)?.to_uppercase()))
        })
        .method("toLowerCase", [], |v, _| {
            Ok(Value::String(string(v)?.to_lowercase()))
        })
        .method("startsWith", [ObjectType::String], |v, args| {
            Ok(Value::Boolean(string(v)?.starts_with(string_arg(args, 0)?)))
        })
        .method("endsWith", [ObjectType::String], |v, args| {
            Ok(Value::Boolean(string(v)?.ends_with(string_arg(args, 0)?)))
        })
        .method("contains", [ObjectType::String], |v, args| {
            Ok(Value::Boolean(string(v)?.contains(string_arg(args, 0)?)))
        })
        .method("equalsIgnoreCase", [ObjectType::String], |v, args| {
            Ok(Value::Boolean(
                string(v)?.to_lowercase() == string_arg(args, 0)?.to_lowercase(),
            ))
        })
        .method("concat", [ObjectType::String], |v, args| {
            Ok(Value::String(format!("{}{}", string(v)?, string_arg(args, 0)?)))
        })
        .method("indexOf", [ObjectType::String], |v, args| {
            let s = string(v)?;
            let index = s
                .find(string_arg(args, 0)?)
                .map_or(-1, |byte| s[..byte].chars().count() as i32);
            Ok(Value::Int(index))
        })
        .method("charAt", [ObjectType::Int], |v, args| {
            let s = string(v)?;
            let index = int_arg(args, 0)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| format!("index {} out of range", index).into())
        })
        .method("substring", [ObjectType::Int], |v, args| {
            let chars: Vec<char> = string(v)?.chars().collect();
            let begin = char_index(chars.len(), int_arg(args, 0)?)?;
            Ok(Value::String(chars[begin..].iter().collect()))
        })
        .method("substring", [ObjectType::Int, ObjectType::Int], |v, args| {
            let chars: Vec<char> = string(v)?.chars().collect();
            let begin = char_index(chars.len(), int_arg(args, 0)?)?;
            let end = char_index(chars.len(), int_arg(args, 1)?)?;
            if begin > end {
                return Err(format!("begin {} greater than end {}", begin, end).into());
            }
            Ok(Value::String(chars[begin..end].iter().collect()))
        })
}

fn number_class() -> ClassDescriptor {
    ClassDescriptor::new("Number")
        .method("intValue", [], |v, _| {
            v.as_f64()
                .map(|n| Value::Int(n as i32))
                .ok_or_else(|| receiver_error("Number"))
        })
        .method("longValue", [], |v, _| {
            v.as_f64()
                .map(|n| Value::Long(n as i64))
                .ok_or_else(|| receiver_error("Number"))
        })
        .method("doubleValue", [], |v, _| {
            v.as_f64().map(Value::Double).ok_or_else(|| receiver_error("Number"))
        })
}

fn collection_class() -> ClassDescriptor {
    fn items(v: &Value) -> core::result::Result<&[Value], MethodError> {
        v.as_collection().ok_or_else(|| receiver_error("Collection"))
    }
    ClassDescriptor::new("Collection")
        .method("size", [], |v, _| Ok(Value::count(items(v)?.len())))
        .method("isEmpty", [], |v, _| Ok(Value::Boolean(items(v)?.is_empty())))
        .method("contains", [ObjectType::Any], |v, args| {
            let needle = args.first().unwrap_or(&Value::Null);
            Ok(Value::Boolean(items(v)?.contains(needle)))
        })
        .method("get", [ObjectType::Int], |v, args| {
            let items = items(v)?;
            let index = int_arg(args, 0)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| format!("index {} out of range", index).into())
        })
}

fn entry_class() -> ClassDescriptor {
    ClassDescriptor::new("Entry")
        .method("getKey", [], |v, _| {
            v.as_entry().map(|e| e.key().clone()).ok_or_else(|| receiver_error("Entry"))
        })
        .method("getValue", [], |v, _| {
            v.as_entry().map(|e| e.value().clone()).ok_or_else(|| receiver_error("Entry"))
        })
}

fn region_class() -> ClassDescriptor {
    fn region(v: &Value) -> core::result::Result<&tessera_core::RegionRef, MethodError> {
        v.as_region().ok_or_else(|| receiver_error("Region"))
    }
    fn storage(e: tessera_core::Error) -> MethodError {
        Box::new(e)
    }
    ClassDescriptor::new("Region")
        .method("getName", [], |v, _| Ok(Value::String(region(v)?.name().to_owned())))
        .method("size", [], |v, _| Ok(Value::count(region(v)?.size())))
        .method("isEmpty", [], |v, _| Ok(Value::Boolean(region(v)?.size() == 0)))
        .method("get", [ObjectType::Any], |v, args| {
            let key = args.first().unwrap_or(&Value::Null);
            Ok(region(v)?.get(key).unwrap_or(Value::Null))
        })
        .method("containsKey", [ObjectType::Any], |v, args| {
            let key = args.first().unwrap_or(&Value::Null);
            Ok(Value::Boolean(region(v)?.get_entry(key).is_some()))
        })
        .method("keySet", [], |v, _| {
            Ok(Value::collection(region(v)?.keys().map_err(storage)?))
        })
        .method("values", [], |v, _| {
            Ok(Value::collection(region(v)?.values().map_err(storage)?))
        })
        .method("entrySet", [], |v, _| {
            let entries = region(v)?.entries().map_err(storage)?;
            Ok(Value::collection(entries.into_iter().map(Value::Entry)))
        })
}
